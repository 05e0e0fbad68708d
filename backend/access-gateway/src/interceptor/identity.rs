use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tonic::metadata::MetadataValue;
use tonic::Status;
use tracing::{debug, warn};

use super::{Call, CallResult, Interceptor, Next, COOKIE_HEADER, SET_COOKIE_HEADER};
use crate::error::GatewayError;
use crate::token_manager::TokenManager;

/// Verifies the session cookie and attaches the caller's claims.
///
/// Stale or flagged credentials are reissued here; the new cookie goes out
/// in `set-cookie` on the response or the error status. Everything after this
/// stage, the handler included, runs under the call deadline.
pub struct IdentityInterceptor {
    tokens: Arc<TokenManager>,
    deadline: Duration,
}

impl IdentityInterceptor {
    pub fn new(tokens: Arc<TokenManager>, deadline: Duration) -> Self {
        Self { tokens, deadline }
    }
}

#[async_trait]
impl Interceptor for IdentityInterceptor {
    fn name(&self) -> &'static str {
        "identity"
    }

    async fn intercept(&self, mut call: Call, next: Next<'_>) -> CallResult {
        let header = call
            .metadata()
            .get(COOKIE_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                warn!(method = %call.method(), "Missing session cookie");
                Status::unauthenticated("missing auth cookie")
            })?;

        let claims = self.tokens.claims_from_cookie_header(header).map_err(|e| {
            warn!(method = %call.method(), error = %e, "Session credential rejected");
            e.to_status()
        })?;

        let (claims, rotated) = match self.tokens.refresh(&claims).await {
            Ok(Some((fresh, cookie))) => (fresh, Some(cookie)),
            Ok(None) => (claims, None),
            Err(e) => return Err(e.to_status()),
        };

        debug!(user_id = claims.user_id(), method = %call.method(), "Caller identified");
        call.extensions_mut().insert(claims);

        let mut result = match timeout(self.deadline, next.run(call)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(deadline_secs = self.deadline.as_secs(), "Call deadline exceeded");
                Err(GatewayError::DeadlineExceeded(self.deadline).to_status())
            }
        };

        // The refresh flag is already consumed, so failures carry the cookie too.
        if let Some(cookie) = rotated {
            let value = MetadataValue::try_from(cookie.to_string())
                .map_err(|_| Status::internal("Internal server error"))?;
            match &mut result {
                Ok(response) => response.metadata_mut().insert(SET_COOKIE_HEADER, value),
                Err(status) => status.metadata_mut().insert(SET_COOKIE_HEADER, value),
            };
        }
        result
    }
}
