//! Set-associative cache timing model
//!
//! Only tags are tracked; data always comes from main memory. A miss
//! does not fill the line by itself: the owner starts a countdown with
//! [`Cache::start_miss`], ticks it every cycle, and calls
//! [`Cache::finish_miss`] once it reaches zero.

use crate::bits::{get_log_2, get_mask, is_pow_2};

/// Line size shared by both caches
pub const BLOCK_SIZE: u64 = 32;
/// Cycles between a miss and the line becoming usable
pub const MISS_LATENCY: u32 = 50;

pub const ICACHE_SETS: usize = 64;
pub const ICACHE_WAYS: usize = 4;
pub const DCACHE_SETS: usize = 256;
pub const DCACHE_WAYS: usize = 8;

/// Outcome of a cache probe
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheAccess {
    Hit,
    Miss,
}

/// Cache implementation
#[derive(Clone, Debug)]
pub struct Cache {
    pub policy: CachePolicy,

    pub history: CacheHistory,

    // Constants
    offset_bits: usize,
    index_bits: usize,
    index_mask: u64,

    sets: Vec<Vec<Block>>,

    /// Monotonic access counter used as the recency stamp
    counter: u64,
    /// Remaining cycles of the outstanding miss, if any
    miss_countdown: Option<u32>,
}

// Address layout:
// | tag | index | offset |
impl Cache {
    pub fn make(policy: CachePolicy) -> Self {
        assert!(policy.is_valid());

        let offset_bits = get_log_2(policy.block_size);
        let index_bits = get_log_2(policy.sets as u64);

        Self {
            policy,
            history: CacheHistory::default(),
            offset_bits,
            index_bits,
            index_mask: get_mask(index_bits),
            sets: vec![vec![Block::default(); policy.ways]; policy.sets],
            counter: 0,
            miss_countdown: None,
        }
    }

    pub fn get_index(&self, address: u64) -> usize {
        ((address >> self.offset_bits) & self.index_mask) as usize
    }

    pub fn get_tag(&self, address: u64) -> u64 {
        address >> (self.offset_bits + self.index_bits)
    }

    /// Probes the cache. A hit refreshes the line's stamp; a miss changes
    /// nothing but the statistics.
    pub fn lookup(&mut self, address: u64) -> CacheAccess {
        let tag = self.get_tag(address);
        let index = self.get_index(address);

        self.counter += 1;
        self.history.accesses += 1;

        let stamp = self.counter;
        match self.sets[index]
            .iter_mut()
            .find(|block| block.valid && block.tag == tag)
        {
            Some(block) => {
                block.last_used = stamp;
                CacheAccess::Hit
            }
            None => {
                self.history.misses += 1;
                CacheAccess::Miss
            }
        }
    }

    /// True if the line holding `address` is resident; does not count
    /// as an access
    pub fn is_in_cache(&self, address: u64) -> bool {
        let tag = self.get_tag(address);
        self.sets[self.get_index(address)]
            .iter()
            .any(|block| block.valid && block.tag == tag)
    }

    /// Way to fill in a set: the first invalid way, else the least
    /// recently used one (lowest way on ties)
    pub fn get_index_to_replace(&self, index: usize) -> usize {
        let set = &self.sets[index];
        if let Some(way) = set.iter().position(|block| !block.valid) {
            return way;
        }
        let mut result = 0;
        for (way, block) in set.iter().enumerate() {
            if block.last_used < set[result].last_used {
                result = way;
            }
        }
        result
    }

    /// Fills the line holding `address`
    pub fn insert(&mut self, address: u64) {
        let tag = self.get_tag(address);
        let index = self.get_index(address);
        let way = self.get_index_to_replace(index);
        self.sets[index][way] = Block { valid: true, tag, last_used: self.counter };
    }

    /// Whether two addresses map to the same line.
    ///
    /// Only the set index is compared, so two lines that share a set but
    /// differ in tag are reported as the same line.
    pub fn belongs_to_same_line(&self, a: u64, b: u64) -> bool {
        self.get_index(a) == self.get_index(b)
    }

    pub fn is_waiting(&self) -> bool {
        self.miss_countdown.is_some()
    }

    pub fn start_miss(&mut self) {
        debug_assert!(!self.is_waiting(), "a miss is already outstanding");
        self.miss_countdown = Some(self.policy.miss_latency);
    }

    /// Advances the outstanding miss by one cycle. Returns true once the
    /// countdown has elapsed.
    pub fn tick(&mut self) -> bool {
        match self.miss_countdown.as_mut() {
            Some(cycles) => {
                *cycles = cycles.saturating_sub(1);
                *cycles == 0
            }
            None => false,
        }
    }

    /// Completes the outstanding miss by filling the line
    pub fn finish_miss(&mut self, address: u64) {
        self.miss_countdown = None;
        self.insert(address);
    }

    /// Drops the outstanding miss without filling anything
    pub fn abandon_miss(&mut self) {
        self.miss_countdown = None;
    }

    /// Computes the current miss rate of the cache
    pub fn get_miss_rate(&self) -> f64 {
        if self.history.accesses == 0 {
            return 0.0;
        }
        self.history.misses as f64 / self.history.accesses as f64
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Block {
    pub valid: bool,
    pub tag: u64,
    pub last_used: u64,
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct CacheHistory {
    pub accesses: u64,
    pub misses: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachePolicy {
    pub sets: usize,
    pub ways: usize,
    pub block_size: u64,
    pub miss_latency: u32,
}

impl CachePolicy {
    pub fn make(sets: usize, ways: usize) -> Self {
        Self { sets, ways, block_size: BLOCK_SIZE, miss_latency: MISS_LATENCY }
    }

    /// 64 sets x 4 ways
    pub fn instruction() -> Self {
        Self::make(ICACHE_SETS, ICACHE_WAYS)
    }

    /// 256 sets x 8 ways
    pub fn data() -> Self {
        Self::make(DCACHE_SETS, DCACHE_WAYS)
    }

    pub fn is_valid(&self) -> bool {
        is_pow_2(self.sets as u64) && is_pow_2(self.block_size) && self.ways > 0
    }
}
