//! RSA engine
//!
//! Key generation, block-wise encryption/decryption and public-key text
//! serialization on top of `num-bigint-dig`.
//!
//! ## Block framing
//!
//! A message is cut into chunks of at most [`PublicKey::max_block_len`] bytes.
//! Each chunk is prefixed with a `0x01` marker byte before being read as a
//! big-endian integer, so leading zero bytes survive the round trip and every
//! block value stays strictly below the modulus. An empty message is a single
//! block holding only the marker.
//!
//! ## Text forms
//!
//! ```text
//! public key:  <modulus hex>:<exponent hex>
//! ciphertext:  <block hex>.<block hex>. ...
//! ```

use crate::config::{Config, MIN_MODULUS_BITS};
use crate::error::{CryptoError, Result};
use num_bigint_dig::prime::probably_prime;
use num_bigint_dig::{BigUint, ModInverse, RandBigInt};
use num_integer::Integer;
use num_traits::{Num, One, Zero};
use rand_core::{CryptoRng, RngCore};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

const RADIX: u32 = 16;
const KEY_DELIMITER: char = ':';
const BLOCK_DELIMITER: char = '.';
const BLOCK_MARKER: u8 = 0x01;

/// Публичный ключ: (modulus, exponent)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    modulus: BigUint,
    exponent: BigUint,
}

impl PublicKey {
    /// Build a public key, rejecting values that cannot encrypt anything.
    pub fn new(modulus: BigUint, exponent: BigUint) -> Result<Self> {
        if modulus.bits() < Config::global().min_rsa_bits.max(MIN_MODULUS_BITS) {
            return Err(CryptoError::FormatError(format!(
                "Modulus of {} bits is too small",
                modulus.bits()
            )));
        }
        if exponent <= BigUint::one() || exponent >= modulus {
            return Err(CryptoError::FormatError(
                "Public exponent is outside (1, modulus)".to_string(),
            ));
        }
        Ok(Self { modulus, exponent })
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    pub fn exponent(&self) -> &BigUint {
        &self.exponent
    }

    /// Modulus width in bits.
    pub fn bits(&self) -> usize {
        self.modulus.bits()
    }

    /// Largest chunk (in bytes) carried by one ciphertext block.
    pub fn max_block_len(&self) -> usize {
        max_block_len(&self.modulus)
    }
}

/// Precomputed CRT values for decryption with known factors.
#[derive(Clone, Zeroize)]
struct CrtParams {
    p: BigUint,
    q: BigUint,
    dp: BigUint,
    dq: BigUint,
    qinv: BigUint,
}

impl CrtParams {
    fn new(p: BigUint, q: BigUint, d: &BigUint) -> Option<Self> {
        let one = BigUint::one();
        let dp = d % (&p - &one);
        let dq = d % (&q - &one);
        let qinv = q.clone().mod_inverse(p.clone())?.to_biguint()?;
        Some(Self { p, q, dp, dq, qinv })
    }

    fn exp(&self, c: &BigUint) -> BigUint {
        let m1 = c.modpow(&self.dp, &self.p);
        let m2 = c.modpow(&self.dq, &self.q);
        // h = qinv * (m1 - m2) mod p, kept non-negative
        let diff = (&m1 + &self.p - (&m2 % &self.p)) % &self.p;
        let h = (&self.qinv * diff) % &self.p;
        m2 + h * &self.q
    }
}

/// Приватный ключ. Никогда не сериализуется для собеседника.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey {
    modulus: BigUint,
    exponent: BigUint,
    crt: Option<CrtParams>,
}

impl PrivateKey {
    /// Build a private key. With `primes` present, decryption uses the CRT
    /// and the factors must multiply to `modulus`.
    pub fn new(
        modulus: BigUint,
        exponent: BigUint,
        primes: Option<(BigUint, BigUint)>,
    ) -> Result<Self> {
        if exponent.is_zero() || exponent >= modulus {
            return Err(CryptoError::FormatError(
                "Private exponent is outside (0, modulus)".to_string(),
            ));
        }
        let crt = match primes {
            Some((p, q)) => {
                if &p * &q != modulus {
                    return Err(CryptoError::FormatError(
                        "Prime factors do not match the modulus".to_string(),
                    ));
                }
                Some(CrtParams::new(p, q, &exponent).ok_or_else(|| {
                    CryptoError::FormatError("Prime factors are not coprime".to_string())
                })?)
            }
            None => None,
        };
        Ok(Self {
            modulus,
            exponent,
            crt,
        })
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    pub fn exponent(&self) -> &BigUint {
        &self.exponent
    }

    /// The two prime factors, when the key was generated locally or restored with them.
    pub fn primes(&self) -> Option<(&BigUint, &BigUint)> {
        self.crt.as_ref().map(|crt| (&crt.p, &crt.q))
    }

    fn exp(&self, c: &BigUint) -> BigUint {
        match &self.crt {
            Some(crt) => crt.exp(c),
            None => c.modpow(&self.exponent, &self.modulus),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("bits", &self.modulus.bits())
            .field("crt", &self.crt.is_some())
            .finish_non_exhaustive()
    }
}

/// Пара ключей RSA
#[derive(Debug, Clone)]
pub struct KeyPair {
    public: PublicKey,
    private: PrivateKey,
}

impl KeyPair {
    /// Generate a key pair with a modulus of `bits` bits.
    ///
    /// Two probable primes of `bits / 2` and `bits - bits / 2` bits are drawn
    /// from `rng`. A prime is re-sampled whenever `p - 1` shares a factor with
    /// the public exponent or the two primes coincide. The private exponent is
    /// the inverse of the public exponent modulo `lcm(p - 1, q - 1)`.
    ///
    /// # Errors
    ///
    /// [`CryptoError::RangeError`] if `bits` is outside the configured bounds
    /// or below [`Config::rsa_bits_floor`].
    pub fn generate<R: RngCore + CryptoRng>(bits: usize, rng: &mut R) -> Result<Self> {
        Self::generate_with_config(bits, Config::global(), rng)
    }

    pub(crate) fn generate_with_config<R: RngCore + CryptoRng>(
        bits: usize,
        config: &Config,
        rng: &mut R,
    ) -> Result<Self> {
        if config.public_exponent <= 1 || config.public_exponent % 2 == 0 {
            return Err(CryptoError::RangeError(format!(
                "Public exponent {} must be odd and greater than 1",
                config.public_exponent
            )));
        }
        let min_bits = config.min_rsa_bits.max(config.rsa_bits_floor());
        if bits < min_bits || bits > config.max_rsa_bits {
            return Err(CryptoError::RangeError(format!(
                "RSA modulus size {} is outside [{}, {}]",
                bits, min_bits, config.max_rsa_bits
            )));
        }

        let e = BigUint::from(config.public_exponent);
        let one = BigUint::one();
        let p_bits = bits / 2;
        let q_bits = bits - p_bits;

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let p = random_prime(p_bits, &e, rng, config.primality_rounds);
            let q = random_prime(q_bits, &e, rng, config.primality_rounds);
            if p == q {
                continue;
            }

            let modulus = &p * &q;
            if modulus.bits() != bits {
                continue;
            }

            let lambda = (&p - &one).lcm(&(&q - &one));
            let d = match e.clone().mod_inverse(lambda.clone()).and_then(|d| d.to_biguint()) {
                Some(d) => d,
                None => continue,
            };

            tracing::debug!(
                target: "crypto::rsa",
                bits,
                attempts,
                "Generated RSA key pair"
            );

            let public = PublicKey {
                modulus: modulus.clone(),
                exponent: e,
            };
            let private = PrivateKey::new(modulus, d, Some((p, q)))?;
            return Ok(Self { public, private });
        }
    }

    /// Assemble a key pair from restored halves.
    ///
    /// When the private key carries its factors, `e * d ≡ 1 (mod λ(n))` is
    /// checked as well.
    pub fn from_parts(public: PublicKey, private: PrivateKey) -> Result<Self> {
        if public.modulus != private.modulus {
            return Err(CryptoError::FormatError(
                "Public and private moduli differ".to_string(),
            ));
        }
        if let Some((p, q)) = private.primes() {
            let one = BigUint::one();
            let lambda = (p - &one).lcm(&(q - &one));
            if !((&public.exponent * &private.exponent) % lambda).is_one() {
                return Err(CryptoError::FormatError(
                    "Exponents are not inverse for these factors".to_string(),
                ));
            }
        }
        Ok(Self { public, private })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    /// Decrypt ciphertext text addressed to this key pair.
    pub fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>> {
        decrypt(ciphertext, &self.private)
    }
}

impl Zeroize for KeyPair {
    fn zeroize(&mut self) {
        self.private.zeroize();
    }
}

/// Sample a probable prime of exactly `bits` bits with `gcd(p - 1, e) == 1`.
///
/// The two top bits are forced so that the product of two such primes has
/// the full requested width.
fn random_prime<R: RngCore + CryptoRng>(
    bits: usize,
    e: &BigUint,
    rng: &mut R,
    rounds: usize,
) -> BigUint {
    let one = BigUint::one();
    let top = (&one << (bits - 1)) | (&one << (bits - 2));
    loop {
        let candidate = rng.gen_biguint(bits) | &top | &one;
        if !probably_prime(&candidate, rounds) {
            continue;
        }
        if (&candidate - &one).gcd(e).is_one() {
            return candidate;
        }
    }
}

fn max_block_len(modulus: &BigUint) -> usize {
    // (marker || chunk) must stay below 2^(bits - 1) <= modulus
    (modulus.bits().saturating_sub(1) / 8).saturating_sub(1)
}

/// Encrypt `message` under `public_key`.
///
/// Deterministic: the same message and key always produce the same text.
pub fn encrypt(message: &[u8], public_key: &PublicKey) -> String {
    let chunk_len = public_key.max_block_len();
    let mut blocks: Vec<&[u8]> = message.chunks(chunk_len).collect();
    if blocks.is_empty() {
        blocks.push(&[]);
    }

    let mut buf = Vec::with_capacity(chunk_len + 1);
    let encoded: Vec<String> = blocks
        .iter()
        .map(|chunk| {
            buf.clear();
            buf.push(BLOCK_MARKER);
            buf.extend_from_slice(chunk);
            let m = BigUint::from_bytes_be(&buf);
            m.modpow(&public_key.exponent, &public_key.modulus)
                .to_str_radix(RADIX)
        })
        .collect();
    buf.zeroize();

    tracing::debug!(
        target: "crypto::rsa",
        blocks = encoded.len(),
        "Encrypted message"
    );

    encoded.join(&BLOCK_DELIMITER.to_string())
}

/// Decrypt ciphertext text with `private_key`.
///
/// # Errors
///
/// - [`CryptoError::FormatError`] on empty input or a non-hex block.
/// - [`CryptoError::DecryptionError`] if a block is not below the modulus or
///   does not decode to a marked chunk of valid length.
pub fn decrypt(ciphertext: &str, private_key: &PrivateKey) -> Result<Vec<u8>> {
    if ciphertext.is_empty() {
        return Err(CryptoError::FormatError("Ciphertext is empty".to_string()));
    }

    // Framing is validated for every block before any exponentiation
    let blocks = ciphertext
        .split(BLOCK_DELIMITER)
        .map(parse_hex)
        .collect::<Result<Vec<BigUint>>>()?;
    if let Some(index) = blocks.iter().position(|c| c >= &private_key.modulus) {
        return Err(CryptoError::DecryptionError(format!(
            "Block {} is not below the modulus",
            index
        )));
    }

    let max_len = max_block_len(&private_key.modulus);
    let mut message = Vec::new();
    for (index, c) in blocks.iter().enumerate() {
        let mut bytes = private_key.exp(c).to_bytes_be();
        let valid = bytes.first() == Some(&BLOCK_MARKER) && bytes.len() - 1 <= max_len;
        if !valid {
            bytes.zeroize();
            message.zeroize();
            return Err(CryptoError::DecryptionError(format!(
                "Block {} does not decode under this key",
                index
            )));
        }
        message.extend_from_slice(&bytes[1..]);
        bytes.zeroize();
    }
    Ok(message)
}

/// Serialize a public key as `<modulus hex>:<exponent hex>`.
pub fn pack_key(public_key: &PublicKey) -> String {
    format!(
        "{}{}{}",
        public_key.modulus.to_str_radix(RADIX),
        KEY_DELIMITER,
        public_key.exponent.to_str_radix(RADIX)
    )
}

/// Parse the text produced by [`pack_key`].
pub fn unpack_key(text: &str) -> Result<PublicKey> {
    let (modulus, exponent) = text
        .split_once(KEY_DELIMITER)
        .ok_or_else(|| CryptoError::FormatError("Public key has no delimiter".to_string()))?;
    PublicKey::new(parse_hex(modulus)?, parse_hex(exponent)?)
}

pub(crate) fn parse_hex(text: &str) -> Result<BigUint> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CryptoError::FormatError(format!(
            "'{}' is not a hex number",
            truncate(text)
        )));
    }
    BigUint::from_str_radix(text, RADIX)
        .map_err(|e| CryptoError::FormatError(format!("Invalid hex number: {:?}", e)))
}

pub(crate) fn to_hex(value: &BigUint) -> String {
    value.to_str_radix(RADIX)
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(16) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn key_pair(bits: usize, seed: u64) -> KeyPair {
        let mut rng = StdRng::seed_from_u64(seed);
        KeyPair::generate(bits, &mut rng).unwrap()
    }

    #[test]
    fn test_generate_modulus_width_and_exponent_relation() {
        let pair = key_pair(512, 1);
        assert_eq!(pair.public_key().bits(), 512);
        assert_eq!(pair.public_key().modulus(), pair.private_key().modulus());

        let (p, q) = pair.private_key().primes().unwrap();
        let one = BigUint::one();
        let lambda = (p - &one).lcm(&(q - &one));
        let product = pair.public_key().exponent() * pair.private_key().exponent();
        assert!((product % lambda).is_one());
    }

    #[test]
    fn test_generate_is_deterministic_for_a_seed() {
        let a = key_pair(256, 42);
        let b = key_pair(256, 42);
        assert_eq!(a.public_key(), b.public_key());

        let c = key_pair(256, 43);
        assert_ne!(a.public_key(), c.public_key());
    }

    #[test]
    fn test_generate_rejects_out_of_range_sizes() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            KeyPair::generate(0, &mut rng),
            Err(CryptoError::RangeError(_))
        ));
        assert!(matches!(
            KeyPair::generate(32, &mut rng),
            Err(CryptoError::RangeError(_))
        ));
        assert!(matches!(
            KeyPair::generate(1 << 20, &mut rng),
            Err(CryptoError::RangeError(_))
        ));
    }

    #[test]
    fn test_encrypt_decrypt_multi_block_with_leading_zeros() {
        let pair = key_pair(256, 7);
        let mut message = vec![0u8; 5];
        message.extend_from_slice(b"spans several blocks of a small modulus, zeros first");
        assert!(message.len() > pair.public_key().max_block_len());

        let ciphertext = encrypt(&message, pair.public_key());
        assert!(ciphertext.contains(BLOCK_DELIMITER));
        assert_eq!(pair.decrypt(&ciphertext).unwrap(), message);
    }

    #[test]
    fn test_encrypt_is_deterministic_and_empty_message_round_trips() {
        let pair = key_pair(256, 8);
        assert_eq!(
            encrypt(b"same", pair.public_key()),
            encrypt(b"same", pair.public_key())
        );

        let ciphertext = encrypt(b"", pair.public_key());
        assert!(!ciphertext.is_empty());
        assert_eq!(pair.decrypt(&ciphertext).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_generate_enforces_modulus_floor() {
        let config = Config {
            min_rsa_bits: 16,
            ..Config::default()
        };
        let mut rng = StdRng::seed_from_u64(20);
        for bits in [16, 17] {
            assert!(matches!(
                KeyPair::generate_with_config(bits, &config, &mut rng),
                Err(CryptoError::RangeError(_))
            ));
        }

        // Smallest admissible size still yields a usable key
        let pair = KeyPair::generate_with_config(18, &config, &mut rng).unwrap();
        assert!(pair.public_key().modulus() > pair.public_key().exponent());
        assert_eq!(pair.public_key().max_block_len(), 1);
        let ciphertext = encrypt(b"hi", pair.public_key());
        assert_eq!(pair.decrypt(&ciphertext).unwrap(), b"hi");
    }

    #[test]
    fn test_generate_rejects_unusable_exponent() {
        let mut rng = StdRng::seed_from_u64(21);
        for exponent in [1, 4, 65536] {
            let config = Config {
                public_exponent: exponent,
                ..Config::default()
            };
            assert!(matches!(
                KeyPair::generate_with_config(256, &config, &mut rng),
                Err(CryptoError::RangeError(_))
            ));
        }
    }

    #[test]
    fn test_decrypt_without_crt_matches() {
        let pair = key_pair(256, 9);
        let plain = PrivateKey::new(
            pair.private_key().modulus().clone(),
            pair.private_key().exponent().clone(),
            None,
        )
        .unwrap();

        let ciphertext = encrypt(b"no factors needed", pair.public_key());
        assert_eq!(decrypt(&ciphertext, &plain).unwrap(), b"no factors needed");
    }

    #[test]
    fn test_decrypt_rejects_malformed_framing() {
        let pair = key_pair(256, 10);
        assert!(matches!(pair.decrypt(""), Err(CryptoError::FormatError(_))));
        assert!(matches!(pair.decrypt("zz"), Err(CryptoError::FormatError(_))));
        assert!(matches!(pair.decrypt("ab..cd"), Err(CryptoError::FormatError(_))));
        // A bad trailing block is reported before any earlier block is decoded
        let valid = encrypt(b"ok", pair.public_key());
        assert!(matches!(
            pair.decrypt(&format!("{}.", valid)),
            Err(CryptoError::FormatError(_))
        ));
        assert!(matches!(
            pair.decrypt(&format!("{}.xyz", valid)),
            Err(CryptoError::FormatError(_))
        ));
    }

    #[test]
    fn test_decrypt_rejects_block_at_or_above_modulus() {
        let pair = key_pair(256, 11);
        let too_big = to_hex(pair.public_key().modulus());
        assert!(matches!(
            pair.decrypt(&too_big),
            Err(CryptoError::DecryptionError(_))
        ));
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let alice = key_pair(256, 12);
        let bob = key_pair(256, 13);
        let ciphertext = encrypt(b"for alice only", alice.public_key());
        // Either out of range for bob's modulus or a bad marker
        assert!(bob.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn test_pack_unpack_key() {
        let pair = key_pair(256, 14);
        let text = pack_key(pair.public_key());
        assert_eq!(text.matches(KEY_DELIMITER).count(), 1);
        assert!(text.ends_with(":10001"));
        assert_eq!(&unpack_key(&text).unwrap(), pair.public_key());
    }

    #[test]
    fn test_unpack_key_rejects_malformed_input() {
        for bad in ["", "abc", ":10001", "abc:", "xyz:10001", "ff:1"] {
            assert!(
                matches!(unpack_key(bad), Err(CryptoError::FormatError(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_from_parts_checks_consistency() {
        let pair = key_pair(256, 16);
        let other = key_pair(256, 17);
        let private = pair.private_key().clone();

        let rebuilt = KeyPair::from_parts(pair.public_key().clone(), private.clone()).unwrap();
        assert_eq!(rebuilt.public_key(), pair.public_key());

        assert!(matches!(
            KeyPair::from_parts(other.public_key().clone(), private),
            Err(CryptoError::FormatError(_))
        ));

        let wrong_e = PublicKey::new(pair.public_key().modulus().clone(), BigUint::from(3u32)).unwrap();
        assert!(matches!(
            KeyPair::from_parts(wrong_e, pair.private_key().clone()),
            Err(CryptoError::FormatError(_))
        ));
    }

    #[test]
    fn test_private_key_debug_is_redacted() {
        let pair = key_pair(256, 15);
        let debug = format!("{:?}", pair.private_key());
        assert!(!debug.contains(&to_hex(pair.private_key().exponent())));
    }
}
