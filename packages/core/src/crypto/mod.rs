//! Cryptographic layer
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              MessagePipeline / RequestManager               │
//! └─────────────────────────────────────────────────────────────┘
//!                │                           │
//!                ▼                           ▼
//! ┌───────────────────────────┐  ┌──────────────────────────┐
//! │   LongTermKeyManager      │  │  SessionManager          │
//! │  - per-user KEM keypair   │  │  - server KEM keypair    │
//! │  - password-sealed at rest│  │  - handshake -> HKDF     │
//! │  - cached after unlock    │  │  - cached per user       │
//! └───────────────────────────┘  └──────────────────────────┘
//!                │                           │
//!                └─────────────┬─────────────┘
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   PrimitiveAdapter                          │
//! │  - KEM (Kyber-768, X25519 fallback)                         │
//! │  - AEAD (AES-256-GCM, detached tag)                         │
//! │  - KDF (HKDF-SHA256, Argon2id)                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both caches are [`cache::SecretCache`] instances: explicitly owned,
//! TTL-checked on read, zeroized on removal.

/// KemProvider trait for crypto-agility
pub mod provider;

/// KEM implementations and startup probing
pub mod suites;

pub mod aead;
pub mod kdf;
pub mod adapter;

pub mod master_key;
pub mod cache;
pub mod keys;
pub mod session;

pub use adapter::PrimitiveAdapter;
pub use provider::{KemProvider, SecurityLevel};

use zeroize::Zeroizing;

/// KEM public key length (Kyber-768).
pub const PUBLIC_KEY_LEN: usize = 1184;
/// KEM private key length (Kyber-768).
pub const PRIVATE_KEY_LEN: usize = 2400;
/// KEM ciphertext length (Kyber-768).
pub const KEM_CIPHERTEXT_LEN: usize = 1088;
pub const SHARED_SECRET_LEN: usize = 32;

pub const AEAD_KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// KEM shared secret, wiped on drop.
pub type SharedSecret = Zeroizing<[u8; SHARED_SECRET_LEN]>;

/// Symmetric AEAD key, wiped on drop.
pub type AeadKey = Zeroizing<[u8; AEAD_KEY_LEN]>;
