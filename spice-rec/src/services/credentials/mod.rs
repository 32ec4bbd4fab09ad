//! Upstream credential management
//!
//! Two independent strategies, selected per catalog:
//! - [`ClientCredentialsProvider`]: OAuth client-credentials bearer tokens,
//!   cached for the process lifetime and refreshed single-flight
//! - [`SignedRequestBuilder`]: API-key query strings with an optional keyed
//!   signature over the sorted parameters

mod client_credentials;
mod request_signer;

pub use client_credentials::{ClientCredentialsProvider, SPOTIFY_TOKEN_URL};
pub use request_signer::SignedRequestBuilder;

use async_trait::async_trait;
use thiserror::Error;

/// Credential acquisition failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CredentialError {
    /// Network or configuration problem; nothing was rejected upstream
    #[error("Could not obtain credential: {0}")]
    Unavailable(String),

    /// Upstream answered 401/403 to the credential
    #[error("Upstream rejected credential ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl CredentialError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, CredentialError::Rejected { .. })
    }
}

/// Source of bearer tokens for authenticated catalog calls
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A currently valid token, fetching one if none is cached
    async fn token(&self) -> Result<String, CredentialError>;

    /// Drop `stale` from the cache if it is still the cached token
    ///
    /// Comparing against the rejected value keeps a caller holding an old
    /// token from evicting one another caller already refreshed.
    async fn invalidate(&self, stale: &str);
}
