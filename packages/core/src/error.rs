use thiserror::Error;

/// Ошибки криптографического ядра.
///
/// Every failure the engines and the session manager can surface falls into
/// one of these five kinds. Each variant carries a human-readable detail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Malformed serialized key, ciphertext, or session blob.
    #[error("Format error: {0}")]
    FormatError(String),
    /// Operation invoked in a session state that forbids it.
    #[error("State error: {0}")]
    StateError(String),
    /// Bulk-decrypt padding validation failed.
    #[error("Padding error: {0}")]
    PaddingError(String),
    /// Decoded block out of range, or a key response could not be recovered.
    #[error("Decryption error: {0}")]
    DecryptionError(String),
    /// Requested key size is non-positive or outside the supported bounds.
    #[error("Range error: {0}")]
    RangeError(String),
}

impl From<base64::DecodeError> for CryptoError {
    fn from(err: base64::DecodeError) -> Self {
        CryptoError::FormatError(format!("Base64 decode failed: {}", err))
    }
}

impl From<serde_json::Error> for CryptoError {
    fn from(err: serde_json::Error) -> Self {
        CryptoError::FormatError(format!("Session document is invalid: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, CryptoError>;
