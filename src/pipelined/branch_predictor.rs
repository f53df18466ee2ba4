//! Branch predictor: a direct-mapped BTB for targets and a gshare table of
//! 2-bit saturating counters for the direction of conditional branches

use crate::bits::get_mask;
use crate::cpu::INSTRUCTION_WIDTH;

/// Width of the global history register
pub const GHR_BITS: usize = 8;
pub const PHT_SIZE: usize = 1 << GHR_BITS;
pub const BTB_SIZE: usize = 1024;

const COUNTER_MAX: u8 = 3;
const TAKEN_THRESHOLD: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PredictorHeuristic {
    /// Always fall through; the tables are never consulted nor trained
    AlwaysNotTaken,
    #[default]
    Gshare,
}

/// Where a prediction came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confidence {
    /// No BTB entry for this PC
    NoEntry,
    PredictedTaken,
    PredictedNotTaken,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Prediction {
    pub next_pc: u64,
    pub confidence: Confidence,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct BTBEntry {
    /// Full PC of the branch that owns the entry
    tag: u64,
    target: u64,
    valid: bool,
    conditional: bool,
}

pub struct BranchPredictor {
    heuristic: PredictorHeuristic,
    ghr: u64,
    pht: Vec<u8>,
    btb: Vec<BTBEntry>,
}

impl BranchPredictor {
    pub fn new(heuristic: PredictorHeuristic) -> Self {
        Self {
            heuristic,
            ghr: 0,
            pht: vec![0; PHT_SIZE],
            btb: vec![BTBEntry::default(); BTB_SIZE],
        }
    }

    fn btb_index(pc: u64) -> usize {
        ((pc >> 2) & (BTB_SIZE as u64 - 1)) as usize
    }

    fn pht_index(&self, pc: u64) -> usize {
        ((self.ghr ^ (pc >> 2)) & get_mask(GHR_BITS)) as usize
    }

    pub fn predict(&self, pc: u64) -> Prediction {
        let fall_through = Prediction {
            next_pc: pc.wrapping_add(INSTRUCTION_WIDTH),
            confidence: Confidence::NoEntry,
        };
        if self.heuristic != PredictorHeuristic::Gshare {
            return fall_through;
        }

        let entry = self.btb[Self::btb_index(pc)];
        if !entry.valid || entry.tag != pc {
            return fall_through;
        }
        if !entry.conditional || self.pht[self.pht_index(pc)] >= TAKEN_THRESHOLD {
            Prediction { next_pc: entry.target, confidence: Confidence::PredictedTaken }
        } else {
            Prediction {
                next_pc: fall_through.next_pc,
                confidence: Confidence::PredictedNotTaken,
            }
        }
    }

    /// Trains the predictor with a resolved branch. `target` is where the
    /// branch goes when taken, whatever the outcome this time.
    pub fn update(&mut self, pc: u64, target: u64, taken: bool, is_conditional: bool) {
        if self.heuristic != PredictorHeuristic::Gshare {
            return;
        }

        self.btb[Self::btb_index(pc)] =
            BTBEntry { tag: pc, target, valid: true, conditional: is_conditional };

        if is_conditional {
            let index = self.pht_index(pc);
            let counter = &mut self.pht[index];
            *counter = if taken {
                (*counter + 1).min(COUNTER_MAX)
            } else {
                counter.saturating_sub(1)
            };
            self.ghr = ((self.ghr << 1) | taken as u64) & get_mask(GHR_BITS);
        }
    }

    /// Whether a latched prediction matches the resolved control flow.
    ///
    /// `resolved_pc` is the branch target when taken, and the address of
    /// the operation itself otherwise.
    pub fn resolves(predicted_pc: u64, resolved_pc: u64, taken: bool) -> bool {
        predicted_pc == Self::expected_pc(resolved_pc, taken)
    }

    /// Next PC implied by a resolved outcome
    pub fn expected_pc(resolved_pc: u64, taken: bool) -> u64 {
        if taken {
            resolved_pc
        } else {
            resolved_pc.wrapping_add(INSTRUCTION_WIDTH)
        }
    }

    pub fn global_history(&self) -> u64 {
        self.ghr
    }

    /// Counter that a conditional branch at `pc` would read right now
    pub fn counter(&self, pc: u64) -> u8 {
        self.pht[self.pht_index(pc)]
    }
}
