//! Bit manipulation helpers shared by the decoder and the cache geometry

/// Floor of log2 for a non-zero value
pub fn get_log_2(value: u64) -> usize {
    assert!(value > 0);
    63 - value.leading_zeros() as usize
}

pub fn is_pow_2(value: u64) -> bool {
    value != 0 && value & (value - 1) == 0
}

/// Mask with the low `bits` bits set
pub fn get_mask(bits: usize) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Extracts `width` bits of `word` starting at bit `lo`
pub fn extract(word: u32, lo: usize, width: usize) -> u32 {
    ((word as u64 >> lo) & get_mask(width)) as u32
}

/// Interprets the low `bits` bits of `value` as a two's complement number
pub fn sign_extend(value: u64, bits: usize) -> i64 {
    assert!(bits > 0 && bits <= 64);
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}
