// Base64 утилиты
//
// Text codec for every printable framing in the crate: bulk ciphertext,
// raw symmetric keys and packed sessions. Standard alphabet, `=` padding.

use crate::error::{CryptoError, Result};
use base64::{engine::general_purpose, Engine};

pub fn encode(data: &[u8]) -> String {
    general_purpose::STANDARD.encode(data)
}

/// Decodes canonical padded base64.
///
/// Rejects characters outside the alphabet, missing or excess padding, and
/// non-zero trailing bits with [`CryptoError::FormatError`].
pub fn decode(data: &str) -> Result<Vec<u8>> {
    general_purpose::STANDARD
        .decode(data)
        .map_err(CryptoError::from)
}
