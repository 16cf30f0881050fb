//! Incremental 32-bit Murmur3 hasher.
//!
//! The block mixing is plain Murmur3 (x86, 32 bit). Input may arrive in
//! arbitrarily sized writes: bytes that do not complete a 4-byte block are
//! parked in a small tail buffer and mixed once the block fills up, so the
//! result only depends on the concatenated input and never on how it was
//! split.

use std::hash::Hasher;

const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;
const BLOCK: usize = 4;

/// Streaming Murmur3 accumulator.
///
/// [`Murmur32::sum32`] does not mutate the hasher: it may be called any
/// number of times and further writes continue from the accumulated state.
///
/// # Example
/// ```rust
/// use columnar_frame::helpers::murmur::Murmur32;
///
/// let mut whole = Murmur32::new();
/// whole.write_bytes(b"hello world");
///
/// let mut split = Murmur32::new();
/// split.write_bytes(b"hel");
/// split.write_bytes(b"lo wo");
/// split.write_bytes(b"rld");
///
/// assert_eq!(whole.sum32(), split.sum32());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Murmur32 {
    total_len: usize,
    hash: u32,
    tail: [u8; BLOCK],
    tail_size: usize,
}

impl Murmur32 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single byte to the input.
    pub fn write_byte(&mut self, b: u8) {
        self.total_len += 1;
        self.tail[self.tail_size] = b;
        self.tail_size += 1;
        self.flush_tail_if_full();
    }

    /// Adds `data` to the input.
    pub fn write_bytes(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.total_len += data.len();

        let mut rest = data;
        if self.tail_size > 0 {
            // Top up the pending tail first
            let take = (BLOCK - self.tail_size).min(rest.len());
            self.tail[self.tail_size..self.tail_size + take].copy_from_slice(&rest[..take]);
            self.tail_size += take;
            rest = &rest[take..];
            self.flush_tail_if_full();
            if self.tail_size > 0 {
                return;
            }
        }

        let blocks = rest.chunks_exact(BLOCK);
        let remainder = blocks.remainder();
        for block in blocks {
            self.mix_block([block[0], block[1], block[2], block[3]]);
        }

        self.tail[..remainder.len()].copy_from_slice(remainder);
        self.tail_size = remainder.len();
    }

    /// Adds 32 random bits to the input.
    ///
    /// Used for keys that must never hash alike, such as nulls that do not
    /// group together.
    pub fn write_rand32(&mut self) {
        self.write_bytes(&rand::random::<u32>().to_le_bytes());
    }

    /// Returns the hasher to its zero state.
    pub fn reset(&mut self) {
        self.total_len = 0;
        self.hash = 0;
        self.tail_size = 0;
    }

    /// Number of bytes written since creation or the last reset.
    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Final 32-bit hash of everything written so far.
    pub fn sum32(&self) -> u32 {
        let mut h1 = self.hash;
        let mut k1: u32 = 0;

        match self.tail_size {
            0 => {}
            n @ 1..=3 => {
                if n == 3 {
                    k1 ^= u32::from(self.tail[2]) << 16;
                }
                if n >= 2 {
                    k1 ^= u32::from(self.tail[1]) << 8;
                }
                k1 ^= u32::from(self.tail[0]);
                h1 ^= scramble(k1);
            }
            n => unreachable!("murmur tail length {n} outside 0..=3, this is an implementation bug"),
        }

        // Murmur3 folds the length in as a 32-bit value
        h1 ^= self.total_len as u32;
        fmix32(h1)
    }

    fn flush_tail_if_full(&mut self) {
        if self.tail_size == BLOCK {
            self.tail_size = 0;
            self.mix_block(self.tail);
        }
    }

    fn mix_block(&mut self, block: [u8; BLOCK]) {
        let k1 = u32::from_le_bytes(block);
        let mut h1 = self.hash ^ scramble(k1);
        h1 = h1.rotate_left(13);
        self.hash = h1.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }
}

impl Hasher for Murmur32 {
    fn finish(&self) -> u64 {
        u64::from(self.sum32())
    }

    fn write(&mut self, bytes: &[u8]) {
        self.write_bytes(bytes);
    }

    fn write_u8(&mut self, i: u8) {
        self.write_byte(i);
    }
}

#[inline]
fn scramble(k1: u32) -> u32 {
    k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
}

#[inline]
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    fn hash_of(data: &[u8]) -> u32 {
        let mut h = Murmur32::new();
        h.write_bytes(data);
        h.sum32()
    }

    #[rstest]
    #[case("", 0x0000_0000)]
    #[case("a", 0x3c25_69b2)]
    #[case("abc", 0xb3dd_93fa)]
    #[case("hello", 0x248b_fa47)]
    #[case("Hello, world!", 0xc036_3e43)]
    #[case("The quick brown fox jumps over the lazy dog", 0x2e4f_f723)]
    fn test_reference_vectors(#[case] input: &str, #[case] expected: u32) {
        assert_eq!(hash_of(input.as_bytes()), expected);
    }

    #[test]
    fn test_every_split_point_matches_single_write() {
        let data: Vec<u8> = (0u8..=40).collect();
        let expected = hash_of(&data);

        for first in 0..=data.len() {
            for second in first..=data.len() {
                let mut h = Murmur32::new();
                h.write_bytes(&data[..first]);
                h.write_bytes(&data[first..second]);
                h.write_bytes(&data[second..]);
                assert_eq!(h.sum32(), expected, "split at {first}/{second}");
            }
        }
    }

    #[test]
    fn test_byte_at_a_time_matches_single_write() {
        let data = b"byte by byte input that spans several blocks";
        let mut h = Murmur32::new();
        for &b in data.iter() {
            h.write_byte(b);
        }
        assert_eq!(h.sum32(), hash_of(data));
        assert_eq!(h.total_len(), data.len());
    }

    #[test]
    fn test_mixed_byte_and_slice_writes() {
        let mut h = Murmur32::new();
        h.write_byte(b'a');
        h.write_bytes(b"bcdef");
        h.write_byte(b'g');
        h.write_bytes(b"h");
        assert_eq!(h.sum32(), hash_of(b"abcdefgh"));
    }

    #[test]
    fn test_sum_is_repeatable_and_writes_continue() {
        let mut h = Murmur32::new();
        h.write_bytes(b"abc");
        let first = h.sum32();
        assert_eq!(first, h.sum32());

        h.write_bytes(b"def");
        assert_eq!(h.sum32(), hash_of(b"abcdef"));
    }

    #[test]
    fn test_reset_reproduces_value() {
        let mut h = Murmur32::new();
        h.write_bytes(b"some key");
        let before = h.sum32();

        h.write_bytes(b"more");
        h.reset();
        assert_eq!(h.sum32(), hash_of(b""));

        h.write_bytes(b"some key");
        assert_eq!(h.sum32(), before);
    }

    #[test]
    fn test_rand32_adds_four_bytes() {
        let mut h = Murmur32::new();
        h.write_bytes(b"ab");
        h.write_rand32();
        assert_eq!(h.total_len(), 6);

        let sums: HashSet<u32> = (0..16)
            .map(|_| {
                let mut h = Murmur32::new();
                h.write_rand32();
                h.sum32()
            })
            .collect();
        assert!(sums.len() > 1);
    }

    #[test]
    fn test_std_hasher_impl() {
        let mut h = Murmur32::new();
        Hasher::write(&mut h, b"abc");
        assert_eq!(h.finish(), u64::from(hash_of(b"abc")));
    }
}
