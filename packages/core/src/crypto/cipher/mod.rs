//! Size-generalized AES
//!
//! A Rijndael substitution-permutation network with a fixed 16-byte block and
//! a key of any whole number of bytes, from 8 bits up to
//! [`Config::max_symmetric_bits`](crate::config::Config).
//!
//! ## Параметры
//!
//! | key bits        | `Nk` (words)     | `Nr` (rounds)              |
//! |-----------------|------------------|----------------------------|
//! | 8 ..= 128       | `ceil(bits/32)`  | 10                         |
//! | 136 ..= 256     | `ceil(bits/32)`  | `Nk + 6` (12 at 192, 14 at 256) |
//! | above 256       | `ceil(bits/32)`  | `max(14, ceil(Nk/4) + 6)`  |
//!
//! The schedule holds `4 * (Nr + 1)` words. At 128, 192 and 256 bits the
//! cipher is exactly AES. Above 256 bits the round count grows with the key
//! so that every key word is used directly as round-key material; this is
//! where the design departs from AES, which stops at 256-bit keys.
//!
//! Bulk messages use CBC chaining with a random IV and PKCS#7 padding
//! (see [`bulk`]).

mod block;
pub mod bulk;
mod schedule;
mod tables;

pub use block::{transform_block, Direction};
pub use bulk::{bulk_decrypt, bulk_encrypt};

use crate::config::Config;
use crate::error::{CryptoError, Result};
use rand_core::{CryptoRng, RngCore};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Block size in bytes, independent of key size.
pub const BLOCK_SIZE: usize = 16;

/// Number of 32-bit key words for a key of `bits` bits.
pub fn key_words(bits: usize) -> usize {
    (bits + 31) / 32
}

/// Round count for a key of `bits` bits.
pub fn rounds_for(bits: usize) -> usize {
    let nk = key_words(bits);
    if nk <= 8 {
        nk.max(4) + 6
    } else {
        ((nk + 3) / 4 + 6).max(14)
    }
}

/// Schedule length in 32-bit words for a key of `bits` bits.
pub fn schedule_words(bits: usize) -> usize {
    4 * (rounds_for(bits) + 1)
}

/// Validate a key size against an explicit upper bound.
///
/// [`SymmetricKey::generate`] and [`SymmetricKey::from_raw`] pass
/// `Config::global().max_symmetric_bits`; everything else here is independent
/// of configuration.
pub fn check_bits(bits: usize, max: usize) -> Result<()> {
    if bits == 0 || bits % 8 != 0 || bits > max {
        return Err(CryptoError::RangeError(format!(
            "Symmetric key size {} must be a positive multiple of 8 up to {}",
            bits, max
        )));
    }
    Ok(())
}

/// Симметричный ключ с расширенным расписанием раундов
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    bits: usize,
    raw: Vec<u8>,
    schedule: Vec<u8>,
    rounds: usize,
}

impl SymmetricKey {
    /// Generate a fresh key of `bits` bits from `rng`.
    ///
    /// # Errors
    ///
    /// [`CryptoError::RangeError`] for zero, non-byte-aligned or oversized
    /// requests. The size limit is the global `max_symmetric_bits`.
    pub fn generate<R: RngCore + CryptoRng>(bits: usize, rng: &mut R) -> Result<Self> {
        check_bits(bits, Config::global().max_symmetric_bits)?;
        let mut raw = vec![0u8; bits / 8];
        rng.fill_bytes(&mut raw);

        let key = Self::build(bits, raw);
        tracing::debug!(
            target: "crypto::cipher",
            bits,
            rounds = key.rounds,
            schedule_words = key.schedule.len() / 4,
            "Generated symmetric key"
        );
        Ok(key)
    }

    /// Rebuild a key from its un-expanded bytes.
    ///
    /// # Errors
    ///
    /// [`CryptoError::RangeError`] for an unsupported `bits` (limit from the
    /// global config),
    /// [`CryptoError::FormatError`] if `raw` is not `bits / 8` bytes long.
    pub fn from_raw(bits: usize, raw: &[u8]) -> Result<Self> {
        check_bits(bits, Config::global().max_symmetric_bits)?;
        if raw.len() != bits / 8 {
            return Err(CryptoError::FormatError(format!(
                "Expected {} key bytes for a {}-bit key, got {}",
                bits / 8,
                bits,
                raw.len()
            )));
        }
        Ok(Self::build(bits, raw.to_vec()))
    }

    fn build(bits: usize, raw: Vec<u8>) -> Self {
        let schedule = schedule::expand(&raw);
        Self {
            bits,
            raw,
            schedule,
            rounds: rounds_for(bits),
        }
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    /// The un-expanded key bytes; the only part that is ever transported.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Schedule length in 32-bit words.
    pub fn schedule_len(&self) -> usize {
        self.schedule.len() / 4
    }

    pub(crate) fn round_key(&self, round: usize) -> &[u8] {
        &self.schedule[round * BLOCK_SIZE..(round + 1) * BLOCK_SIZE]
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits && self.raw == other.raw
    }
}

impl Eq for SymmetricKey {}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bits", &self.bits)
            .field("rounds", &self.rounds)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_standard_round_counts() {
        assert_eq!(rounds_for(128), 10);
        assert_eq!(rounds_for(192), 12);
        assert_eq!(rounds_for(256), 14);
        assert_eq!(schedule_words(128), 44);
        assert_eq!(schedule_words(256), 60);
    }

    #[test]
    fn test_boundary_round_counts() {
        assert_eq!(rounds_for(8), 10);
        assert_eq!(rounds_for(264), 14);
        assert_eq!(rounds_for(1024), 14);
        assert_eq!(rounds_for(2048), 22);
        // 1 megabit: Nk = 32768
        assert_eq!(rounds_for(1 << 20), 8198);
        assert_eq!(schedule_words(1 << 20), 32796);
        // 1 gigabit: Nk = 2^25
        assert_eq!(rounds_for(1 << 30), (1 << 23) + 6);
    }

    #[test]
    fn test_schedule_always_covers_key() {
        let mut bits = 8;
        while bits <= 1 << 24 {
            assert!(schedule_words(bits) >= key_words(bits), "bits = {}", bits);
            bits = bits * 3 / 2 + 8 - (bits * 3 / 2) % 8;
        }
    }

    #[test]
    fn test_generate_lengths() {
        let mut rng = StdRng::seed_from_u64(5);
        for bits in [8, 128, 200, 256, 4096] {
            let key = SymmetricKey::generate(bits, &mut rng).unwrap();
            assert_eq!(key.bits(), bits);
            assert_eq!(key.raw_bytes().len(), bits / 8);
            assert_eq!(key.schedule_len(), schedule_words(bits));
            assert_eq!(key.block_size(), BLOCK_SIZE);
        }
    }

    #[test]
    fn test_generate_rejects_bad_sizes() {
        let mut rng = StdRng::seed_from_u64(5);
        for bits in [0, 7, 129, (1 << 30) + 8] {
            assert!(
                matches!(SymmetricKey::generate(bits, &mut rng), Err(CryptoError::RangeError(_))),
                "accepted {}",
                bits
            );
        }
    }

    #[test]
    fn test_from_raw_rebuilds_same_key() {
        let mut rng = StdRng::seed_from_u64(6);
        let key = SymmetricKey::generate(256, &mut rng).unwrap();
        let rebuilt = SymmetricKey::from_raw(256, key.raw_bytes()).unwrap();
        assert_eq!(rebuilt, key);
        assert_eq!(rebuilt.schedule, key.schedule);

        assert!(matches!(
            SymmetricKey::from_raw(256, &key.raw_bytes()[1..]),
            Err(CryptoError::FormatError(_))
        ));
    }

    #[test]
    fn test_check_bits_uses_given_bound() {
        assert!(check_bits(64, 64).is_ok());
        assert!(matches!(check_bits(72, 64), Err(CryptoError::RangeError(_))));
        assert!(check_bits(1 << 31, 1 << 31).is_ok());
        assert!(matches!(check_bits(12, 1 << 31), Err(CryptoError::RangeError(_))));
    }

    #[test]
    fn test_zeroize_clears_material() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut key = SymmetricKey::generate(128, &mut rng).unwrap();
        assert!(key.raw.iter().any(|b| *b != 0));
        assert!(key.schedule.iter().any(|b| *b != 0));

        let raw = (key.raw.as_ptr(), key.raw.capacity());
        let schedule = (key.schedule.as_ptr(), key.schedule.capacity());
        key.zeroize();

        assert!(key.raw.is_empty());
        assert!(key.schedule.is_empty());
        // Vec::zeroize wipes the whole allocation, then truncates without freeing it
        assert_eq!(key.raw.capacity(), raw.1);
        assert_eq!(key.schedule.capacity(), schedule.1);
        for (ptr, capacity) in [raw, schedule] {
            let wiped = unsafe { std::slice::from_raw_parts(ptr, capacity) };
            assert!(wiped.iter().all(|b| *b == 0));
        }
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = SymmetricKey::from_raw(128, &[0xab; 16]).unwrap();
        assert!(!format!("{:?}", key).contains("ab"));
    }
}
