// Error types surfaced by the core

use crate::error::CryptoError;
use crate::storage::models::RequestStatus;
use std::fmt;
use thiserror::Error;

/// Why a stored message could not be opened for a viewer.
///
/// Both reasons render the same text; callers that need to tell them apart
/// match on the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptionFailure {
    /// The key needed to open the message is not cached (or expired).
    KeyNotCached,
    /// The authentication tag did not verify.
    Forged,
}

impl fmt::Display for DecryptionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("cannot decrypt message")
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PosternError {
    #[error("Primitive failure: {0}")]
    PrimitiveFailure(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Wrong password and unknown user share this variant and its text.
    #[error("Invalid credentials")]
    AuthenticationFailure,

    #[error("{0}")]
    Decryption(DecryptionFailure),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("A pending request already exists for this sender and recipient")]
    DuplicateRequest,

    #[error("Forbidden")]
    Forbidden,

    #[error("Invalid request transition: {from:?} -> {to:?}")]
    InvalidTransition { from: RequestStatus, to: RequestStatus },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Cryptographic primitive unavailable: {0}")]
    Unavailable(String),
}

impl PosternError {
    pub fn key_not_cached() -> Self {
        PosternError::Decryption(DecryptionFailure::KeyNotCached)
    }

    pub fn forged() -> Self {
        PosternError::Decryption(DecryptionFailure::Forged)
    }

    /// Policy violations and expected user-facing failures; not worth an
    /// error-level log line.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            PosternError::AuthenticationFailure
                | PosternError::Decryption(_)
                | PosternError::DuplicateRequest
                | PosternError::Forbidden
                | PosternError::InvalidTransition { .. }
                | PosternError::RateLimited
        )
    }
}

impl From<CryptoError> for PosternError {
    fn from(error: CryptoError) -> Self {
        match error {
            CryptoError::KeyGenerationError(msg) => PosternError::KeyGeneration(msg),
            CryptoError::AeadAuthenticationError => PosternError::forged(),
            CryptoError::Unavailable(msg) => PosternError::Unavailable(msg),
            other => PosternError::PrimitiveFailure(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for PosternError {
    fn from(error: serde_json::Error) -> Self {
        PosternError::Serialization(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PosternError>;
