//! Session - handshake state machine
//!
//! Объединяет RSA (установка ключа) и симметричный шифр (обмен сообщениями)
//! в одну сессию между двумя сторонами.
//!
//! ## Состояния
//!
//! ```text
//!            with_key_size                 register_pass
//!   Fresh ─────────────────▶ Published ───────────────────▶ Established
//!     │                                                         ▲
//!     │      from_peer_key                 get_key_response     │
//!     └─────────────────────▶ PeerKeyHeld ──────────────────────┘
//!
//!   any state ── destroy ──▶ Destroyed (terminal)
//! ```
//!
//! `Fresh` is also the state of [`Session::new`], which exists only to be
//! filled by [`Session::unpack`].
//!
//! ## Типичный сценарий
//!
//! ```text
//! Bob:    bob = Session::with_key_size(2048)        -> Published
//!         text = bob.get_public_key()               -> send to Alice
//! Alice:  alice = Session::from_peer_key(&text)     -> PeerKeyHeld
//!         resp = alice.get_key_response()           -> Established, send to Bob
//! Bob:    bob.register_pass(&resp)                  -> Established
//! both:   encrypt / decrypt / pack
//! ```
//!
//! Every operation either completes or leaves the session untouched.

use crate::config::Config;
use crate::crypto::cipher::{self, SymmetricKey};
use crate::crypto::rsa::{self, parse_hex, to_hex, KeyPair, PrivateKey, PublicKey};
use crate::error::{CryptoError, Result};
use crate::utils::b64;
use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const PACK_VERSION: u32 = 1;
const BITS_PREFIX_LEN: usize = 4;

/// Внешне видимый тег состояния сессии
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Fresh,
    Published,
    PeerKeyHeld,
    Established,
    Destroyed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Fresh => "Fresh",
            SessionState::Published => "Published",
            SessionState::PeerKeyHeld => "PeerKeyHeld",
            SessionState::Established => "Established",
            SessionState::Destroyed => "Destroyed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
enum Stage {
    Fresh,
    Published {
        key_pair: KeyPair,
    },
    PeerKeyHeld {
        peer: PublicKey,
        shared: SymmetricKey,
    },
    /// Exactly one of `key_pair` / `peer` is present, depending on the side.
    Established {
        key_pair: Option<KeyPair>,
        peer: Option<PublicKey>,
        shared: SymmetricKey,
    },
    Destroyed,
}

impl Stage {
    fn state(&self) -> SessionState {
        match self {
            Stage::Fresh => SessionState::Fresh,
            Stage::Published { .. } => SessionState::Published,
            Stage::PeerKeyHeld { .. } => SessionState::PeerKeyHeld,
            Stage::Established { .. } => SessionState::Established,
            Stage::Destroyed => SessionState::Destroyed,
        }
    }
}

/// Сессия одной стороны рукопожатия
#[derive(Debug)]
pub struct Session {
    stage: Stage,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Empty session, to be filled by [`Session::unpack`].
    pub fn new() -> Self {
        Self { stage: Stage::Fresh }
    }

    /// Key-pair owning side with a modulus of `bits` bits, using the OS RNG.
    pub fn with_key_size(bits: usize) -> Result<Self> {
        Self::with_key_size_and_rng(bits, &mut OsRng)
    }

    /// Key-pair owning side with the configured default modulus size.
    pub fn with_default_key_size() -> Result<Self> {
        Self::with_key_size(Config::global().default_rsa_bits)
    }

    /// Key-pair owning side, drawing randomness from `rng`.
    ///
    /// Starts in [`SessionState::Published`]: the public key can be exported
    /// and a key response registered.
    pub fn with_key_size_and_rng<R: RngCore + CryptoRng>(bits: usize, rng: &mut R) -> Result<Self> {
        let key_pair = KeyPair::generate(bits, rng)?;
        info!(
            target: "crypto::session",
            bits,
            "Session created with own key pair"
        );
        Ok(Self {
            stage: Stage::Published { key_pair },
        })
    }

    /// Responding side: store the peer's public key and generate a shared
    /// key of the configured default size with the OS RNG.
    pub fn from_peer_key(public_key_text: &str) -> Result<Self> {
        Self::from_peer_key_with(
            public_key_text,
            Config::global().default_symmetric_bits,
            &mut OsRng,
        )
    }

    /// Responding side with an explicit shared-key size and RNG.
    ///
    /// Starts in [`SessionState::PeerKeyHeld`].
    pub fn from_peer_key_with<R: RngCore + CryptoRng>(
        public_key_text: &str,
        symmetric_bits: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let peer = rsa::unpack_key(public_key_text)?;
        let shared = SymmetricKey::generate(symmetric_bits, rng)?;
        info!(
            target: "crypto::session",
            peer_bits = peer.bits(),
            symmetric_bits,
            "Session created from peer public key"
        );
        Ok(Self {
            stage: Stage::PeerKeyHeld { peer, shared },
        })
    }

    /// Unpack a session produced by [`Session::pack`].
    pub fn from_packed(text: &str) -> Result<Self> {
        let mut session = Self::new();
        session.unpack(text)?;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.stage.state()
    }

    fn state_error(&self, operation: &str, required: &str) -> CryptoError {
        CryptoError::StateError(format!(
            "{} requires {}, session is {}",
            operation,
            required,
            self.state()
        ))
    }

    /// Export the own public key as text.
    ///
    /// # Errors
    ///
    /// [`CryptoError::StateError`] unless the session owns a key pair.
    pub fn get_public_key(&self) -> Result<String> {
        match &self.stage {
            Stage::Published { key_pair }
            | Stage::Established {
                key_pair: Some(key_pair),
                ..
            } => Ok(rsa::pack_key(key_pair.public_key())),
            _ => Err(self.state_error("get_public_key", "an owned key pair")),
        }
    }

    /// Encrypt the shared key (with its bit length) under the peer's public key.
    ///
    /// The first call moves a `PeerKeyHeld` session to `Established`; later
    /// calls return the same response again.
    ///
    /// # Errors
    ///
    /// [`CryptoError::StateError`] unless a peer public key and a shared key are held.
    pub fn get_key_response(&mut self) -> Result<String> {
        let response = match &self.stage {
            Stage::PeerKeyHeld { peer, shared }
            | Stage::Established {
                peer: Some(peer),
                shared,
                ..
            } => key_response(peer, shared)?,
            _ => {
                return Err(self.state_error(
                    "get_key_response",
                    "a peer public key and a shared key",
                ))
            }
        };

        if let Stage::PeerKeyHeld { .. } = self.stage {
            if let Stage::PeerKeyHeld { peer, shared } =
                std::mem::replace(&mut self.stage, Stage::Destroyed)
            {
                self.stage = Stage::Established {
                    key_pair: None,
                    peer: Some(peer),
                    shared,
                };
                info!(target: "crypto::session", "Key response issued, session established");
            }
        }

        Ok(response)
    }

    /// Register the peer's key response and move to `Established`.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::StateError`] unless the session is `Published`.
    /// - [`CryptoError::FormatError`] / [`CryptoError::DecryptionError`] if the
    ///   response cannot be decoded with the own private key.
    pub fn register_pass(&mut self, response: &str) -> Result<()> {
        let shared = match &self.stage {
            Stage::Published { key_pair } => recover_shared_key(response, key_pair.private_key())?,
            _ => return Err(self.state_error("register_pass", "state Published")),
        };

        if let Stage::Published { key_pair } = std::mem::replace(&mut self.stage, Stage::Destroyed) {
            info!(
                target: "crypto::session",
                symmetric_bits = shared.bits(),
                "Key response registered, session established"
            );
            self.stage = Stage::Established {
                key_pair: Some(key_pair),
                peer: None,
                shared,
            };
        }
        Ok(())
    }

    fn shared_key(&self, operation: &str) -> Result<&SymmetricKey> {
        match &self.stage {
            Stage::Established { shared, .. } => Ok(shared),
            _ => Err(self.state_error(operation, "state Established")),
        }
    }

    /// Encrypt a message under the shared key, using the OS RNG for the IV.
    pub fn encrypt(&self, plaintext: impl AsRef<[u8]>) -> Result<String> {
        self.encrypt_with_rng(plaintext, &mut OsRng)
    }

    /// Encrypt a message under the shared key with an IV drawn from `rng`.
    ///
    /// # Errors
    ///
    /// [`CryptoError::StateError`] unless the session is `Established`.
    pub fn encrypt_with_rng<R: RngCore + CryptoRng>(
        &self,
        plaintext: impl AsRef<[u8]>,
        rng: &mut R,
    ) -> Result<String> {
        let shared = self.shared_key("encrypt")?;
        Ok(cipher::bulk_encrypt(plaintext.as_ref(), shared, rng))
    }

    /// Decrypt a message produced by the peer's [`Session::encrypt`].
    ///
    /// # Errors
    ///
    /// [`CryptoError::StateError`] unless the session is `Established`, then
    /// whatever [`cipher::bulk_decrypt`] reports.
    pub fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>> {
        let shared = self.shared_key("decrypt")?;
        cipher::bulk_decrypt(ciphertext, shared)
    }

    /// Serialize the whole session into one self-describing text blob.
    ///
    /// The blob contains private key material and must be stored accordingly.
    ///
    /// # Errors
    ///
    /// [`CryptoError::StateError`] once the session is destroyed.
    pub fn pack(&self) -> Result<String> {
        let body = match &self.stage {
            Stage::Fresh => SessionBody::new(SessionState::Fresh, None, None, None),
            Stage::Published { key_pair } => {
                SessionBody::new(SessionState::Published, Some(key_pair), None, None)
            }
            Stage::PeerKeyHeld { peer, shared } => {
                SessionBody::new(SessionState::PeerKeyHeld, None, Some(peer), Some(shared))
            }
            Stage::Established {
                key_pair,
                peer,
                shared,
            } => SessionBody::new(
                SessionState::Established,
                key_pair.as_ref(),
                peer.as_ref(),
                Some(shared),
            ),
            Stage::Destroyed => return Err(self.state_error("pack", "a live session")),
        };

        let digest = body.digest()?;
        let document = Zeroizing::new(serde_json::to_vec(&PackedSession { body, digest })?);
        debug!(
            target: "crypto::session",
            state = %self.state(),
            "Session packed"
        );
        Ok(b64::encode(&document))
    }

    /// Restore a session from [`Session::pack`] output.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::StateError`] unless the session is `Fresh`.
    /// - [`CryptoError::FormatError`] if the blob is corrupt, its digest does
    ///   not match, or the state tag disagrees with the fields present.
    pub fn unpack(&mut self, text: &str) -> Result<()> {
        if !matches!(self.stage, Stage::Fresh) {
            return Err(self.state_error("unpack", "state Fresh"));
        }

        let document = Zeroizing::new(b64::decode(text)?);
        let packed: PackedSession = serde_json::from_slice(&document)?;
        if packed.body.v != PACK_VERSION {
            return Err(CryptoError::FormatError(format!(
                "Unsupported session version {}",
                packed.body.v
            )));
        }
        if packed.body.digest()? != packed.digest {
            return Err(CryptoError::FormatError(
                "Session digest does not match its contents".to_string(),
            ));
        }

        let stage = packed.body.into_stage()?;
        debug!(
            target: "crypto::session",
            state = %stage.state(),
            "Session unpacked"
        );
        self.stage = stage;
        Ok(())
    }

    /// Overwrite all owned key material and move to `Destroyed`.
    ///
    /// Idempotent; every other operation fails with
    /// [`CryptoError::StateError`] afterwards.
    pub fn destroy(&mut self) {
        let previous = std::mem::replace(&mut self.stage, Stage::Destroyed);
        let was = previous.state();
        match previous {
            Stage::Published { mut key_pair } => key_pair.zeroize(),
            Stage::PeerKeyHeld { mut shared, .. } => shared.zeroize(),
            Stage::Established {
                key_pair,
                mut shared,
                ..
            } => {
                if let Some(mut key_pair) = key_pair {
                    key_pair.zeroize();
                }
                shared.zeroize();
            }
            Stage::Fresh | Stage::Destroyed => {}
        }
        if was != SessionState::Destroyed {
            info!(target: "crypto::session", from = %was, "Session destroyed");
        }
    }
}

fn key_response(peer: &PublicKey, shared: &SymmetricKey) -> Result<String> {
    let bits = u32::try_from(shared.bits())
        .map_err(|_| CryptoError::RangeError("Shared key too large for a key response".to_string()))?;
    let mut payload = Zeroizing::new(Vec::with_capacity(BITS_PREFIX_LEN + shared.raw_bytes().len()));
    payload.extend_from_slice(&bits.to_be_bytes());
    payload.extend_from_slice(shared.raw_bytes());
    Ok(rsa::encrypt(&payload, peer))
}

fn recover_shared_key(response: &str, private_key: &PrivateKey) -> Result<SymmetricKey> {
    let payload = Zeroizing::new(rsa::decrypt(response, private_key)?);
    if payload.len() < BITS_PREFIX_LEN {
        return Err(CryptoError::DecryptionError(
            "Key response is too short".to_string(),
        ));
    }
    let (prefix, raw) = payload.split_at(BITS_PREFIX_LEN);
    let mut bits_bytes = [0u8; BITS_PREFIX_LEN];
    bits_bytes.copy_from_slice(prefix);
    let bits = u32::from_be_bytes(bits_bytes) as usize;

    SymmetricKey::from_raw(bits, raw).map_err(|e| {
        CryptoError::DecryptionError(format!("Key response does not carry a valid key: {}", e))
    })
}

// ============================================================================
// Packed form
// ============================================================================

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(deny_unknown_fields)]
struct PackedKeyPair {
    modulus: String,
    public_exponent: String,
    private_exponent: String,
    p: Option<String>,
    q: Option<String>,
}

impl PackedKeyPair {
    fn from_key_pair(key_pair: &KeyPair) -> Self {
        let private = key_pair.private_key();
        let (p, q) = match private.primes() {
            Some((p, q)) => (Some(to_hex(p)), Some(to_hex(q))),
            None => (None, None),
        };
        Self {
            modulus: to_hex(key_pair.public_key().modulus()),
            public_exponent: to_hex(key_pair.public_key().exponent()),
            private_exponent: to_hex(private.exponent()),
            p,
            q,
        }
    }

    fn to_key_pair(&self) -> Result<KeyPair> {
        let modulus = parse_hex(&self.modulus)?;
        let public = PublicKey::new(modulus.clone(), parse_hex(&self.public_exponent)?)?;
        let primes = match (&self.p, &self.q) {
            (Some(p), Some(q)) => Some((parse_hex(p)?, parse_hex(q)?)),
            (None, None) => None,
            _ => {
                return Err(CryptoError::FormatError(
                    "Key pair carries only one prime factor".to_string(),
                ))
            }
        };
        let private = PrivateKey::new(modulus, parse_hex(&self.private_exponent)?, primes)?;
        KeyPair::from_parts(public, private)
    }
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(deny_unknown_fields)]
struct PackedSymmetricKey {
    bits: usize,
    key: String,
}

impl PackedSymmetricKey {
    fn from_key(key: &SymmetricKey) -> Self {
        Self {
            bits: key.bits(),
            key: b64::encode(key.raw_bytes()),
        }
    }

    fn to_key(&self) -> Result<SymmetricKey> {
        let raw = Zeroizing::new(b64::decode(&self.key)?);
        SymmetricKey::from_raw(self.bits, &raw).map_err(|e| match e {
            CryptoError::RangeError(msg) => CryptoError::FormatError(msg),
            other => other,
        })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionBody {
    v: u32,
    state: SessionState,
    key_pair: Option<PackedKeyPair>,
    peer: Option<String>,
    shared: Option<PackedSymmetricKey>,
}

impl SessionBody {
    fn new(
        state: SessionState,
        key_pair: Option<&KeyPair>,
        peer: Option<&PublicKey>,
        shared: Option<&SymmetricKey>,
    ) -> Self {
        Self {
            v: PACK_VERSION,
            state,
            key_pair: key_pair.map(PackedKeyPair::from_key_pair),
            peer: peer.map(rsa::pack_key),
            shared: shared.map(PackedSymmetricKey::from_key),
        }
    }

    fn digest(&self) -> Result<String> {
        let canonical = Zeroizing::new(serde_json::to_vec(self)?);
        Ok(hex::encode(Sha256::digest(canonical.as_slice())))
    }

    fn into_stage(self) -> Result<Stage> {
        let key_pair = self.key_pair.as_ref().map(PackedKeyPair::to_key_pair).transpose()?;
        let peer = self.peer.as_deref().map(rsa::unpack_key).transpose()?;
        let shared = self.shared.as_ref().map(PackedSymmetricKey::to_key).transpose()?;

        match (self.state, key_pair, peer, shared) {
            (SessionState::Fresh, None, None, None) => Ok(Stage::Fresh),
            (SessionState::Published, Some(key_pair), None, None) => {
                Ok(Stage::Published { key_pair })
            }
            (SessionState::PeerKeyHeld, None, Some(peer), Some(shared)) => {
                Ok(Stage::PeerKeyHeld { peer, shared })
            }
            (SessionState::Established, key_pair, peer, Some(shared))
                if key_pair.is_some() != peer.is_some() =>
            {
                Ok(Stage::Established {
                    key_pair,
                    peer,
                    shared,
                })
            }
            (state, ..) => Err(CryptoError::FormatError(format!(
                "State tag {} does not match the fields present",
                state
            ))),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PackedSession {
    body: SessionBody,
    digest: String,
}
