//! Ownership resolution for the `owner` role.

use async_trait::async_trait;
use session_claims::Claims;

use crate::capability::RequestMessage;
use crate::error::PolicyError;

/// Decides whether the caller created the resource a request refers to.
///
/// Implementations usually look the resource up in the database, so the
/// check is async and fallible.
#[async_trait]
pub trait OwnershipResolver: Send + Sync {
    async fn is_owner(
        &self,
        method: &str,
        claims: &Claims,
        request: &dyn RequestMessage,
    ) -> Result<bool, PolicyError>;
}

/// Resolver that never recognises ownership.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyOwnership;

#[async_trait]
impl OwnershipResolver for DenyOwnership {
    async fn is_owner(
        &self,
        _method: &str,
        _claims: &Claims,
        _request: &dyn RequestMessage,
    ) -> Result<bool, PolicyError> {
        Ok(false)
    }
}
