//! Deterministic Entropy Stream
//!
//! Expands a 32-byte key into an unbounded pseudo-random byte stream using
//! SHA-256 in counter mode: `block_i = SHA256(key || i)`.
//! Given the same key, produces identical output on all platforms.

use sha2::{Digest, Sha256};

use super::hash::{Digest32, DIGEST_LEN};

/// Deterministic byte stream over SHA-256 counter blocks.
///
/// # Example
///
/// ```
/// use battle_dinghy::core::hash::Digest32;
/// use battle_dinghy::core::rng::EntropyStream;
///
/// let mut a = EntropyStream::new(Digest32::new([1; 32]));
/// let mut b = EntropyStream::new(Digest32::new([1; 32]));
/// assert_eq!(a.next_u32(), b.next_u32());
/// ```
#[derive(Clone, Debug)]
pub struct EntropyStream {
    key: Digest32,
    counter: u64,
    block: [u8; DIGEST_LEN],
    offset: usize,
}

impl EntropyStream {
    /// Create a stream from a key.
    pub fn new(key: Digest32) -> Self {
        Self {
            key,
            counter: 0,
            block: [0; DIGEST_LEN],
            // Forces a refill on first read
            offset: DIGEST_LEN,
        }
    }

    fn refill(&mut self) {
        let mut hasher = Sha256::new();
        hasher.update(self.key.as_bytes());
        hasher.update(self.counter.to_le_bytes());
        self.block = hasher.finalize().into();
        self.counter += 1;
        self.offset = 0;
    }

    /// Next byte of the stream.
    #[inline]
    pub fn next_u8(&mut self) -> u8 {
        if self.offset >= DIGEST_LEN {
            self.refill();
        }
        let byte = self.block[self.offset];
        self.offset += 1;
        byte
    }

    /// Next 32-bit value (little-endian over four stream bytes).
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        for b in &mut bytes {
            *b = self.next_u8();
        }
        u32::from_le_bytes(bytes)
    }

    /// Generate an integer in range [0, max).
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // Modulo bias is below 2^-27 for the grid-sized ranges used here
        self.next_u32() % max
    }

    /// Generate a fair boolean.
    #[inline]
    pub fn next_bool(&mut self) -> bool {
        self.next_u8() & 1 == 1
    }

    /// Number of bytes consumed so far.
    pub fn bytes_consumed(&self) -> u64 {
        if self.counter == 0 {
            0
        } else {
            (self.counter - 1) * DIGEST_LEN as u64 + self.offset as u64
        }
    }
}
