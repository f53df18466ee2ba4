//! Memory structure

pub mod cache;
pub mod store;

pub use store::MainMemory;

/// Main memory as seen by the core.
///
/// Accesses never fail and take no time; latency is modeled by the
/// caches in front of it.
pub trait MemoryInterface {
    /// Reads the little-endian word at `address`
    fn read_word(&mut self, address: u64) -> u32;

    /// Writes `value` little-endian at `address`
    fn write_word(&mut self, address: u64, value: u32);

    /// Two consecutive words, low word first
    fn read_double(&mut self, address: u64) -> u64 {
        let low = self.read_word(address) as u64;
        let high = self.read_word(address.wrapping_add(4)) as u64;
        (high << 32) | low
    }

    fn write_double(&mut self, address: u64, value: u64) {
        self.write_word(address, value as u32);
        self.write_word(address.wrapping_add(4), (value >> 32) as u32);
    }
}
