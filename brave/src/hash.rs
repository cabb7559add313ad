//! Small deterministic hashes used to index the fixed-slot caches.

use std::hash::Hasher;

pub const FNV_OFFSET_BIAS: u32 = 2_166_136_261;
pub const FNV_PRIME: u32 = 16_777_619;

/// 32-bit FNV-1a over the written bytes.
#[derive(Debug, Clone, Copy)]
pub struct Fnv1a(u32);

impl Fnv1a {
    pub const fn new() -> Self {
        Self(FNV_OFFSET_BIAS)
    }

    pub fn finish32(&self) -> u32 {
        self.0
    }
}

impl Default for Fnv1a {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for Fnv1a {
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = (self.0 ^ b as u32).wrapping_mul(FNV_PRIME);
        }
    }

    fn finish(&self) -> u64 {
        self.0 as u64
    }
}

/// FNV-1a of a string's UTF-8 bytes.
pub fn fnv1a(text: &str) -> u32 {
    let mut hasher = Fnv1a::new();
    hasher.write(text.as_bytes());
    hasher.finish32()
}

/// MurmurHash3 finalizer.
pub const fn fmix32(mut x: u32) -> u32 {
    x ^= x >> 16;
    x = x.wrapping_mul(0x85EB_CA6B);
    x ^= x >> 13;
    x = x.wrapping_mul(0xC2B2_AE35);
    x ^= x >> 16;
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv_of_empty_is_offset_bias() {
        assert_eq!(fnv1a(""), FNV_OFFSET_BIAS);
    }

    #[test]
    fn fnv_known_vector() {
        // "a" => 0xE40C292C for 32-bit FNV-1a
        assert_eq!(fnv1a("a"), 0xE40C_292C);
    }

    #[test]
    fn fmix_spreads_neighbours() {
        assert_ne!(fmix32(1) & 15, fmix32(2) & 15);
        assert_eq!(fmix32(0), 0);
    }
}
