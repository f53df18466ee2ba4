//! Hazard detection and operand forwarding.
//!
//! Both checks look at the operation that just left a later stage (the
//! producer) and the operation waiting in DE/EX (the consumer). Forwarded
//! values are written into the consumer's snapshot.

use super::pipeline::StageRegister;
use crate::instruction::Operation;
use crate::stages_simple::effective_address;

/// Why the front of the pipeline is held this cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stall {
    /// Memory is waiting on the data cache
    DataCache,
    /// The consumer needs a value that is still being loaded
    LoadUse,
    /// The consumer loads from a word the producer just stored to
    StoreLoad,
    /// Forwarding is disabled and the consumer depends on the producer
    NoForwarding,
}

/// True if `consumer` reads a register or flag that `producer` writes
pub fn depends_on(producer: &Operation, consumer: &Operation) -> bool {
    if producer.is_bubble || consumer.is_bubble {
        return false;
    }
    producer.destination().is_some_and(|rt| consumer.reads_register(rt))
        || (producer.sets_flags && consumer.reads_flags())
}

fn accesses_overlap(store_address: u64, load_address: u64) -> bool {
    store_address.abs_diff(load_address) < 4
}

/// Copies the producer's result into the consumer's snapshot where the
/// consumer reads it. Returns true if anything was forwarded.
fn forward(producer: &StageRegister, consumer: &mut StageRegister) -> bool {
    let (p, c) = (&producer.op, &consumer.op);
    let mut forwarded = false;
    if let Some(rt) = p.destination().filter(|rt| c.reads_register(*rt)) {
        consumer.regs.write(rt, producer.regs.read(rt));
        forwarded = true;
    }
    if p.sets_flags && c.reads_flags() {
        consumer.flags = producer.flags;
        forwarded = true;
    }
    forwarded
}

/// Memory-to-Execute check, run once the Memory stage has finished with
/// `producer`.
///
/// Stalls on a load-use or store-load dependency, or on any dependency
/// when forwarding is disabled. Otherwise forwards register and flag
/// results. Load results are never forwarded from here.
pub fn check_memory_stage(
    producer: &StageRegister,
    consumer: &mut StageRegister,
    forwarding: bool,
) -> Option<Stall> {
    let (p, c) = (&producer.op, &consumer.op);
    if p.is_bubble || c.is_bubble {
        return None;
    }

    if p.is_load && depends_on(p, c) {
        return Some(Stall::LoadUse);
    }
    if p.is_store
        && c.is_load
        && accesses_overlap(
            effective_address(p, &producer.regs),
            effective_address(c, &consumer.regs),
        )
    {
        return Some(Stall::StoreLoad);
    }
    if !forwarding {
        return depends_on(p, c).then_some(Stall::NoForwarding);
    }

    if !p.is_load && forward(producer, consumer) {
        tracing::debug!("MEM: forwarding result of {:#010x} to EX", p.pc);
    }
    None
}

/// Writeback-to-Execute path.
///
/// With forwarding disabled this still runs: it stands for the register
/// file write being visible to the held consumer.
pub fn forward_from_writeback(producer: &StageRegister, consumer: &mut StageRegister) -> bool {
    if producer.op.is_bubble || consumer.op.is_bubble {
        return false;
    }
    forward(producer, consumer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::classify;

    fn stage(word: u32) -> StageRegister {
        StageRegister { op: classify(word, 0x40_0000).unwrap(), ..Default::default() }
    }

    // ADD X3, X1, X2
    const ADD_X3: u32 = 0x8b02_0023;
    // ADD X4, X3, X3
    const ADD_X4_X3: u32 = 0x8b03_0064;
    // LDUR X3, [X1]
    const LDUR_X3: u32 = 0xf840_0023;
    // STUR X2, [X1]
    const STUR_X2: u32 = 0xf800_0022;
    // CMP X1, X2
    const CMP: u32 = 0xeb02_003f;
    // B.EQ #8
    const BEQ: u32 = 0x5400_0040;

    #[test]
    fn forwards_alu_result() {
        let mut producer = stage(ADD_X3);
        producer.regs.write(3, 42);
        let mut consumer = stage(ADD_X4_X3);
        assert_eq!(check_memory_stage(&producer, &mut consumer, true), None);
        assert_eq!(consumer.regs.read(3), 42);
    }

    #[test]
    fn load_use_stalls_instead_of_forwarding() {
        let mut producer = stage(LDUR_X3);
        producer.regs.write(3, 42);
        let mut consumer = stage(ADD_X4_X3);
        assert_eq!(check_memory_stage(&producer, &mut consumer, true), Some(Stall::LoadUse));
        assert_eq!(consumer.regs.read(3), 0);
        // One cycle later the load reaches Writeback
        assert!(forward_from_writeback(&producer, &mut consumer));
        assert_eq!(consumer.regs.read(3), 42);
    }

    #[test]
    fn independent_load_does_not_stall() {
        let producer = stage(LDUR_X3);
        let mut consumer = stage(ADD_X3);
        assert_eq!(check_memory_stage(&producer, &mut consumer, true), None);
    }

    #[test]
    fn store_then_overlapping_load_stalls() {
        let mut producer = stage(STUR_X2);
        producer.regs.write(1, 0x1000_0000);
        let mut consumer = stage(LDUR_X3);
        consumer.regs.write(1, 0x1000_0000);
        assert_eq!(check_memory_stage(&producer, &mut consumer, true), Some(Stall::StoreLoad));
        consumer.regs.write(1, 0x1000_0004);
        assert_eq!(check_memory_stage(&producer, &mut consumer, true), None);
    }

    #[test]
    fn forwards_flags_to_conditional_branch() {
        let mut producer = stage(CMP);
        producer.flags.z = true;
        let mut consumer = stage(BEQ);
        assert_eq!(check_memory_stage(&producer, &mut consumer, true), None);
        assert!(consumer.flags.z);
    }

    #[test]
    fn no_forwarding_stalls_on_dependency() {
        let mut producer = stage(ADD_X3);
        producer.regs.write(3, 42);
        let mut consumer = stage(ADD_X4_X3);
        assert_eq!(
            check_memory_stage(&producer, &mut consumer, false),
            Some(Stall::NoForwarding)
        );
        assert_eq!(consumer.regs.read(3), 0);
        let mut unrelated = stage(ADD_X3);
        assert_eq!(check_memory_stage(&producer, &mut unrelated, false), None);
    }

    #[test]
    fn bubbles_never_interact() {
        let producer = stage(ADD_X3);
        let mut consumer = StageRegister::bubble();
        assert_eq!(check_memory_stage(&producer, &mut consumer, false), None);
        assert!(!forward_from_writeback(&producer, &mut consumer));
    }
}
