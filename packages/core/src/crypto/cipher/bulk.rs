//! Bulk encryption of arbitrary-length messages
//!
//! CBC chaining over [`transform_block`] with PKCS#7 padding:
//!
//! ```text
//! text = base64( IV (16 bytes) || C1 || C2 || ... || Cn )
//! C0 = IV,  Ci = E(Pi ^ C(i-1))
//! ```
//!
//! Padding is always present (1..=16 bytes, each equal to the pad length),
//! so an empty message encrypts to exactly one block after the IV.

use super::block::{transform_block, Direction};
use super::{SymmetricKey, BLOCK_SIZE};
use crate::error::{CryptoError, Result};
use crate::utils::b64;
use rand_core::{CryptoRng, RngCore};
use zeroize::{Zeroize, Zeroizing};

fn xor_in_place(block: &mut [u8; BLOCK_SIZE], other: &[u8]) {
    for (byte, o) in block.iter_mut().zip(other) {
        *byte ^= o;
    }
}

fn pad(plaintext: &[u8]) -> Zeroizing<Vec<u8>> {
    let pad_len = BLOCK_SIZE - plaintext.len() % BLOCK_SIZE;
    let mut padded = Zeroizing::new(Vec::with_capacity(plaintext.len() + pad_len));
    padded.extend_from_slice(plaintext);
    padded.resize(plaintext.len() + pad_len, pad_len as u8);
    padded
}

fn unpad(mut padded: Vec<u8>) -> Result<Vec<u8>> {
    let pad_len = padded.last().copied().unwrap_or(0) as usize;
    let valid = (1..=BLOCK_SIZE).contains(&pad_len)
        && pad_len <= padded.len()
        && padded[padded.len() - pad_len..]
            .iter()
            .all(|b| *b as usize == pad_len);
    if !valid {
        padded.zeroize();
        return Err(CryptoError::PaddingError(
            "Recovered padding is inconsistent".to_string(),
        ));
    }
    padded.truncate(padded.len() - pad_len);
    Ok(padded)
}

/// Encrypt `plaintext` under `key` with a fresh IV drawn from `rng`.
pub fn bulk_encrypt<R: RngCore + CryptoRng>(
    plaintext: &[u8],
    key: &SymmetricKey,
    rng: &mut R,
) -> String {
    let padded = pad(plaintext);
    let mut out = Vec::with_capacity(BLOCK_SIZE + padded.len());

    let mut chain = [0u8; BLOCK_SIZE];
    rng.fill_bytes(&mut chain);
    out.extend_from_slice(&chain);

    for chunk in padded.chunks_exact(BLOCK_SIZE) {
        xor_in_place(&mut chain, chunk);
        chain = transform_block(&chain, key, Direction::Encrypt);
        out.extend_from_slice(&chain);
    }

    tracing::debug!(
        target: "crypto::cipher",
        blocks = padded.len() / BLOCK_SIZE,
        key_bits = key.bits(),
        "Bulk encrypted message"
    );

    b64::encode(&out)
}

/// Decrypt text produced by [`bulk_encrypt`].
///
/// # Errors
///
/// - [`CryptoError::FormatError`] if the text is not base64 or its length is
///   not the IV plus a positive whole number of blocks.
/// - [`CryptoError::PaddingError`] if the recovered padding is inconsistent,
///   which is also what a wrong key almost always produces.
pub fn bulk_decrypt(ciphertext: &str, key: &SymmetricKey) -> Result<Vec<u8>> {
    let data = b64::decode(ciphertext)?;
    if data.len() < 2 * BLOCK_SIZE || data.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::FormatError(format!(
            "Bulk ciphertext of {} bytes is not IV plus whole blocks",
            data.len()
        )));
    }

    let (iv, body) = data.split_at(BLOCK_SIZE);
    let mut previous: &[u8] = iv;
    let mut plaintext = Vec::with_capacity(body.len());
    for chunk in body.chunks_exact(BLOCK_SIZE) {
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(chunk);
        let mut decrypted = transform_block(&block, key, Direction::Decrypt);
        xor_in_place(&mut decrypted, previous);
        plaintext.extend_from_slice(&decrypted);
        previous = chunk;
    }

    unpad(plaintext)
}
