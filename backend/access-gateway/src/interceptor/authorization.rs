use async_trait::async_trait;
use grpc_access_control::{AccessPolicy, Decision};
use tracing::{debug, error, warn};

use super::{Call, CallResult, Interceptor, Next};
use crate::error::GatewayError;
use crate::extensions::ClaimsExt;

/// Enforces the per-method access policy against the attached claims.
pub struct AuthorizationInterceptor {
    policy: AccessPolicy,
}

impl AuthorizationInterceptor {
    pub fn new(policy: AccessPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Interceptor for AuthorizationInterceptor {
    fn name(&self) -> &'static str {
        "authorization"
    }

    async fn intercept(&self, call: Call, next: Next<'_>) -> CallResult {
        let method = call.method().to_string();
        let claims = call.claims()?;

        let decision = self
            .policy
            .check(&method, claims, call.message())
            .await
            .map_err(|e| {
                error!(method = %method, error = %e, "Access policy evaluation failed");
                GatewayError::from(e).to_status()
            })?;

        match decision {
            Decision::Allow => {}
            Decision::Unrestricted => {
                debug!(method = %method, "No role requirements for method");
            }
            Decision::Deny { reason } => {
                warn!(
                    user_id = claims.user_id(),
                    method = %method,
                    reason = %reason,
                    "Access denied"
                );
                return Err(GatewayError::PermissionDenied(format!(
                    "access denied for {method}: {reason}"
                ))
                .to_status());
            }
        }

        next.run(call).await
    }
}
