// RSAES Core
// Hybrid RSA + size-generalized AES toolkit with a two-party session manager

#![warn(clippy::all)]

// Модули
pub mod config;
pub mod crypto;
pub mod error;
pub mod utils;

// Re-exports для удобства
pub use config::Config;
pub use crypto::{KeyPair, PrivateKey, PublicKey, Session, SessionState, SymmetricKey};
pub use error::{CryptoError, Result};
