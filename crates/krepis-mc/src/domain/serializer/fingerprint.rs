//! FP64 polynomial fingerprint (Rabin) over `i32` streams
//!
//! A polynomial rolling hash over GF(2^64) with a fixed irreducible
//! polynomial. Extension is byte-at-a-time through a 256-entry table that
//! is computed once, on first use.

use std::sync::OnceLock;

/// Irreducible polynomial, also the fingerprint of the empty stream
pub const FP64_INIT: u64 = 0x9114_98AE_0E66_BAD6;

const ONE: u64 = 0x8000_0000_0000_0000;
const X63: u64 = 0x1;

static BYTE_MOD_TABLE: OnceLock<[u64; 256]> = OnceLock::new();

#[inline]
fn byte_mod_table() -> &'static [u64; 256] {
    BYTE_MOD_TABLE.get_or_init(|| compute_byte_mod_table(FP64_INIT))
}

fn compute_byte_mod_table(irred_poly: u64) -> [u64; 256] {
    // highest power used is 127 - 7*8 = 71
    const PLENGTH: usize = 72;
    let mut power_table = [0u64; PLENGTH];

    let mut t = ONE;
    for entry in &mut power_table {
        *entry = t;
        let mask = if (t & X63) != 0 { irred_poly } else { 0 };
        t = (t >> 1) ^ mask;
    }

    let mut table = [0u64; 256];
    for (j, entry) in table.iter_mut().enumerate() {
        let mut v = 0u64;
        for k in 0..=7 {
            if (j & (1usize << k)) != 0 {
                v ^= power_table[127 - 7 * 8 - k];
            }
        }
        *entry = v;
    }
    table
}

/// Extend a fingerprint by one byte
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub fn fp64_extend_byte(fp: u64, b: u8) -> u64 {
    let idx = (u64::from(b) ^ fp) as usize & 0xFF;
    (fp >> 8) ^ byte_mod_table()[idx]
}

/// Extend a fingerprint by an `i32` (four bytes, little-endian)
#[inline]
pub fn fp64_extend_i32(fp: u64, x: i32) -> u64 {
    x.to_le_bytes().into_iter().fold(fp, fp64_extend_byte)
}

/// Fingerprint of a whole stream
pub fn fp64_of(values: &[i32]) -> u64 {
    values.iter().fold(FP64_INIT, |fp, v| fp64_extend_i32(fp, *v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stream_is_init() {
        assert_eq!(fp64_of(&[]), FP64_INIT);
    }

    #[test]
    fn test_table_is_linear() {
        let table = byte_mod_table();
        assert_eq!(table[0], 0);
        assert_eq!(table[3], table[1] ^ table[2]);
        assert_eq!(table[0xFF], (0..8).fold(0, |acc, k| acc ^ table[1 << k]));
    }

    #[test]
    fn test_order_sensitive() {
        assert_ne!(fp64_of(&[1, 2]), fp64_of(&[2, 1]));
        assert_ne!(fp64_of(&[0]), fp64_of(&[]));
        assert_eq!(fp64_of(&[7, -1, 3]), fp64_of(&[7, -1, 3]));
    }

    #[test]
    fn test_incremental_equals_whole() {
        let fp = fp64_extend_i32(fp64_extend_i32(FP64_INIT, 42), -7);
        assert_eq!(fp, fp64_of(&[42, -7]));
    }
}
