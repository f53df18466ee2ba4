//! Byte-addressable backing store with lazily allocated pages

use std::collections::HashMap;

use super::MemoryInterface;
use crate::error::MemoryError;
use crate::error::SimulatorResult;

const PAGE_WIDTH: usize = 12;
const PAGE_SIZE: usize = 1 << PAGE_WIDTH;

// Defines page type
type PageType = Box<[u8; PAGE_SIZE]>;

/// Sparse main memory.
///
/// Pages are allocated on first write; reading an unallocated page
/// yields zeros.
#[derive(Default)]
pub struct MainMemory {
    pages: HashMap<u64, PageType>,
}

impl MainMemory {
    pub fn make() -> Self {
        Self::default()
    }

    /// The page number of the address
    pub fn get_page_number(address: u64) -> u64 {
        address >> PAGE_WIDTH
    }

    /// The offset within the page
    pub fn get_page_offset(address: u64) -> usize {
        (address as usize) & (PAGE_SIZE - 1)
    }


    /// Set the byte at the given address
    pub fn set8(&mut self, address: u64, byte: u8) {
        let page = self
            .pages
            .entry(Self::get_page_number(address))
            .or_insert_with(|| Box::new([0; PAGE_SIZE]));
        page[Self::get_page_offset(address)] = byte;
    }

    /// Get the byte at the given address
    pub fn get8(&self, address: u64) -> u8 {
        self.pages
            .get(&Self::get_page_number(address))
            .map_or(0, |page| page[Self::get_page_offset(address)])
    }

    /// Copies `bytes` into memory starting at `base`
    pub fn load_bytes(&mut self, base: u64, bytes: &[u8]) -> SimulatorResult<()> {
        let len = bytes.len() as u64;
        if base.checked_add(len).is_none() {
            return Err(MemoryError::Overflow(base).into());
        }
        for (i, byte) in bytes.iter().enumerate() {
            self.set8(base + i as u64, *byte);
        }
        Ok(())
    }

    /// Zeroes `len` bytes from `base`. Unallocated pages already read as
    /// zero and are left unallocated.
    pub fn clear_range(&mut self, base: u64, len: u64) {
        let Some(last) = len.checked_sub(1).map(|n| base.saturating_add(n)) else {
            return;
        };
        let mut address = base;
        loop {
            let page_last = (address | (PAGE_SIZE as u64 - 1)).min(last);
            if let Some(page) = self.pages.get_mut(&Self::get_page_number(address)) {
                page[Self::get_page_offset(address)..=Self::get_page_offset(page_last)].fill(0);
            }
            match page_last.checked_add(1) {
                Some(next) if page_last < last => address = next,
                _ => break,
            }
        }
    }

    /// Places consecutive instruction words starting at `base`
    pub fn load_words(&mut self, base: u64, words: &[u32]) -> SimulatorResult<()> {
        if base % 4 != 0 {
            return Err(MemoryError::AlignmentError(base, 4).into());
        }
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        self.load_bytes(base, &bytes)
    }
}

impl MemoryInterface for MainMemory {
    fn read_word(&mut self, address: u64) -> u32 {
        let mut bytes = [0u8; 4];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.get8(address.wrapping_add(i as u64));
        }
        u32::from_le_bytes(bytes)
    }

    fn write_word(&mut self, address: u64, value: u32) {
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.set8(address.wrapping_add(i as u64), byte);
        }
    }
}
