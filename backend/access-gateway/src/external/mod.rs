//! External identity lookup for personal access tokens.

mod github;

pub use github::{GitHubIdentityResolver, PROVIDER as GITHUB_PROVIDER};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("token rejected by identity provider")]
    Rejected,

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected identity provider response: {0}")]
    InvalidResponse(String),
}

/// An account at an external provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIdentity {
    pub provider: String,
    pub remote_id: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve the account that owns `token`.
    async fn resolve(&self, token: &str) -> Result<RemoteIdentity, ResolveError>;
}
