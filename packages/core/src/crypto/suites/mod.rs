//! KEM suites
//!
//! ## Available providers
//!
//! ### Kyber-768 (feature `post-quantum`, default)
//! - **KEM**: ML-KEM / Kyber-768 via `pqcrypto-kyber`
//! - **Level**: [`SecurityLevel::PostQuantum`]
//!
//! ### Classical fallback
//! - **KEM**: X25519 padded to the Kyber sizes
//! - **Level**: [`SecurityLevel::ClassicalFallback`], warns on every operation
//!
//! ## Selection
//!
//! [`select_provider`] probes the real KEM once at startup. The choice is fixed
//! for the life of the process.

pub mod classic;
#[cfg(feature = "post-quantum")]
pub mod kyber;

use crate::crypto::provider::{KemProvider, SecurityLevel};
use crate::error::CryptoError;
use std::sync::Arc;
use tracing::{error, info, warn};

pub use classic::ClassicFallbackProvider;
#[cfg(feature = "post-quantum")]
pub use kyber::Kyber768Provider;

/// The provider chosen at startup.
#[derive(Debug, Clone)]
pub enum SelectedProvider {
    PostQuantum(Arc<dyn KemProvider>),
    Fallback(Arc<ClassicFallbackProvider>),
}

impl SelectedProvider {
    pub fn provider(&self) -> Arc<dyn KemProvider> {
        match self {
            SelectedProvider::PostQuantum(provider) => provider.clone(),
            SelectedProvider::Fallback(provider) => provider.clone(),
        }
    }

    pub fn security_level(&self) -> SecurityLevel {
        match self {
            SelectedProvider::PostQuantum(_) => SecurityLevel::PostQuantum,
            SelectedProvider::Fallback(_) => SecurityLevel::ClassicalFallback,
        }
    }

    /// Operations performed under the fallback; always 0 for the real KEM.
    pub fn degraded_operations(&self) -> u64 {
        match self {
            SelectedProvider::PostQuantum(_) => 0,
            SelectedProvider::Fallback(provider) => provider.degraded_operations(),
        }
    }
}

fn probe_post_quantum() -> Result<Arc<dyn KemProvider>, CryptoError> {
    #[cfg(feature = "post-quantum")]
    {
        let provider = Kyber768Provider;
        provider.self_test()?;
        Ok(Arc::new(provider))
    }

    #[cfg(not(feature = "post-quantum"))]
    {
        Err(CryptoError::Unavailable(
            "built without the post-quantum feature".to_string(),
        ))
    }
}

/// Picks the KEM for this process.
///
/// # Errors
///
/// `Unavailable` when the post-quantum KEM fails its self-test and
/// `allow_fallback` is false.
pub fn select_provider(allow_fallback: bool) -> Result<SelectedProvider, CryptoError> {
    match probe_post_quantum() {
        Ok(provider) => {
            info!(target: "crypto::kem", algorithm = provider.algorithm(), "KEM provider selected");
            Ok(SelectedProvider::PostQuantum(provider))
        }
        Err(err) if allow_fallback => {
            warn!(
                target: "crypto::kem",
                error = %err,
                "post-quantum KEM unavailable, using INSECURE classical fallback"
            );
            Ok(SelectedProvider::Fallback(Arc::new(ClassicFallbackProvider::new())))
        }
        Err(err) => {
            error!(target: "crypto::kem", error = %err, "no KEM available and fallback disabled");
            Err(CryptoError::Unavailable(err.to_string()))
        }
    }
}
