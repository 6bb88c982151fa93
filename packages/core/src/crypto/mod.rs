//! Криптографический модуль
//!
//! # Архитектура
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Application                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Session (High-Level)                     │
//! │  - Рукопожатие: public key -> key response                  │
//! │  - Обмен сообщениями общим ключом                           │
//! │  - pack / unpack / destroy                                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                ┌─────────────┴─────────────┐
//!                ▼                           ▼
//! ┌───────────────────────────┐  ┌──────────────────────────┐
//! │   RSA engine              │  │  Symmetric cipher        │
//! │  - Key generation         │  │  - Any key size (bytes)  │
//! │  - Block encrypt/decrypt  │  │  - 16-byte block         │
//! │  - Public key text form   │  │  - CBC + PKCS#7 bulk     │
//! └───────────────────────────┘  └──────────────────────────┘
//! ```
//!
//! ## Модули
//!
//! - [`rsa`] - асимметричный движок, используется только для передачи ключа
//! - [`cipher`] - симметричный движок для всех сообщений
//! - [`session`] - конечный автомат рукопожатия поверх обоих движков

// ============================================================================
// Engines
// ============================================================================

/// RSA: генерация ключей, блочное шифрование, текстовая форма ключа
pub mod rsa;

/// Rijndael с ключом произвольной длины
pub mod cipher;

// ============================================================================
// High-Level API
// ============================================================================

/// Session - рукопожатие + обмен сообщениями
pub mod session;

// ============================================================================
// Re-exports для удобства
// ============================================================================

pub use cipher::{bulk_decrypt, bulk_encrypt, SymmetricKey, BLOCK_SIZE};
pub use rsa::{pack_key, unpack_key, KeyPair, PrivateKey, PublicKey};
pub use session::{Session, SessionState};
