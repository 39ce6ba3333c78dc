//! Hash functions for URL Redirector
//!
//! Declarative rule IDs are derived from Murmur3 32-bit over the normalized
//! source plus a per-descriptor salt, so the same rule set always compiles
//! to the same IDs.
//!
//! # ID Space
//!
//! Declarative rule IDs must be positive 32-bit signed integers. The hash is
//! masked to 31 bits and `0` is remapped to `1`. Two unrelated sources can
//! still land on the same ID; callers that need uniqueness within one table
//! must probe (see `ur-compiler`).

const ID_SEED: u32 = 0x9e3779b9; // Golden ratio

/// Murmur3 32-bit hash implementation.
/// Optimized for short strings (typical domain lengths).
#[inline]
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let len = data.len();
    let mut h = seed;
    let mut i = 0;

    // Process 4-byte chunks
    let chunks = (len >> 2) << 2;
    while i < chunks {
        let k = u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);

        let k = k.wrapping_mul(0xcc9e2d51);
        let k = k.rotate_left(15);
        let k = k.wrapping_mul(0x1b873593);

        h ^= k;
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe6546b64);

        i += 4;
    }

    // Process remaining bytes
    let mut k: u32 = 0;
    let remainder = len & 3;
    if remainder >= 3 {
        k ^= (data[i + 2] as u32) << 16;
    }
    if remainder >= 2 {
        k ^= (data[i + 1] as u32) << 8;
    }
    if remainder >= 1 {
        k ^= data[i] as u32;
        let k = k.wrapping_mul(0xcc9e2d51);
        let k = k.rotate_left(15);
        let k = k.wrapping_mul(0x1b873593);
        h ^= k;
    }

    // Finalization
    h ^= len as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;

    h
}

/// Fold a 32-bit hash into the positive `i32` range, never returning 0.
#[inline]
pub const fn to_rule_id(h: u32) -> i32 {
    let id = (h & 0x7fff_ffff) as i32;
    if id == 0 {
        1
    } else {
        id
    }
}

/// Hash a descriptor key (`<normalized source>|<salt>`) into a rule ID.
#[inline]
pub fn descriptor_id(normalized_source: &str, salt: &str) -> i32 {
    let mut key = String::with_capacity(normalized_source.len() + salt.len() + 1);
    key.push_str(normalized_source);
    key.push('|');
    key.push_str(salt);
    to_rule_id(murmur3_32(key.as_bytes(), ID_SEED))
}

/// Next candidate ID when `id` is already taken in a table.
#[inline]
pub fn probe_id(normalized_source: &str, salt: &str, attempt: u32) -> i32 {
    let salted = format!("{}#{}", salt, attempt);
    descriptor_id(normalized_source, &salted)
}
