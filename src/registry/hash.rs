//! The job-handle/unique-key hash described in spec §4.5: a one-at-a-time
//! (Jenkins) hash, reproduced exactly so the documented "closed-hash of size
//! 383" bucket placement is reimplementable bit-for-bit where callers need
//! wire-identical bucket ordering (e.g. matching the reference
//! implementation's `status`/replay traversal order in tests). General
//! in-memory lookups use `std::collections::HashMap` instead, which spec §4.5
//! explicitly permits ("reimplementers may substitute any good hash").

pub const HASH_TABLE_SIZE: u32 = 383;

pub fn fnv_like_hash(key: &[u8]) -> u32 {
    let mut value: i32 = 0;

    for &b in key {
        value = value.wrapping_add(b as i8 as i32);
        value = value.wrapping_add(value.wrapping_shl(10));
        value ^= value >> 6;
    }

    value = value.wrapping_add(value.wrapping_shl(3));
    value ^= value >> 11;
    value = value.wrapping_add(value.wrapping_shl(15));

    let value = value as u32;
    if value == 0 {
        1
    } else {
        value
    }
}

pub fn bucket(key: &[u8]) -> u32 {
    fnv_like_hash(key) % HASH_TABLE_SIZE
}
