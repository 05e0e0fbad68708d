use std::sync::Arc;

use async_trait::async_trait;
use grpc_access_control::group_id_of;
use tonic::Status;
use tracing::{debug, error};

use super::{Call, CallResult, Interceptor, Next};
use crate::error::GatewayError;
use crate::extensions::ClaimsExt;
use crate::metrics::GatewayMetrics;
use crate::repository::RepositoryError;
use crate::token_manager::TokenManager;

/// Flags users whose roles a successful call changed, so their next request
/// carries freshly computed claims.
///
/// | Method              | Flagged users                    |
/// |---------------------|----------------------------------|
/// | `UpdateUser`        | users listed by the payload      |
/// | `UpdateGroup`       | users listed by the payload      |
/// | `UpdateEnrollments` | users listed by the payload      |
/// | `DeleteGroup`       | members before deletion          |
/// | `CreateCourse`      | the caller, now the course teacher |
pub struct TokenRefreshInterceptor {
    tokens: Arc<TokenManager>,
    metrics: GatewayMetrics,
}

impl TokenRefreshInterceptor {
    pub fn new(tokens: Arc<TokenManager>) -> Self {
        Self {
            tokens,
            metrics: GatewayMetrics::new(),
        }
    }

    /// Users to flag once `call` succeeds, or `None` for methods that change no roles.
    async fn affected_users(&self, call: &Call) -> Result<Option<Vec<u64>>, Status> {
        let method = call.method();
        match method {
            "UpdateUser" | "UpdateGroup" | "UpdateEnrollments" => {
                let Some(message) = call.message().as_affects_users() else {
                    return Err(Status::unimplemented(format!(
                        "cannot update token for {method}: message type {} does not list affected users",
                        call.message().type_name()
                    )));
                };
                Ok(Some(message.affected_user_ids()))
            }
            "DeleteGroup" => {
                let group_id = group_id_of(call.message());
                if group_id == 0 {
                    return Err(Status::unimplemented(format!(
                        "cannot update token for {method}: request does not contain a group"
                    )));
                }
                match self.tokens.repository().get_group_members(group_id).await {
                    Ok(members) => Ok(Some(members)),
                    Err(e @ RepositoryError::GroupNotFound(_)) => Err(Status::not_found(e.to_string())),
                    Err(e) => Err(GatewayError::from(e).to_status()),
                }
            }
            "CreateCourse" => Ok(Some(vec![call.claims()?.user_id()])),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl Interceptor for TokenRefreshInterceptor {
    fn name(&self) -> &'static str {
        "token_refresh"
    }

    async fn intercept(&self, call: Call, next: Next<'_>) -> CallResult {
        let method = call.method().to_string();
        let affected = self.affected_users(&call).await?;

        let response = next.run(call).await?;

        for user_id in affected.into_iter().flatten() {
            match self.tokens.mark(user_id).await {
                Ok(()) => debug!(user_id, method = %method, "Flagged user for claims refresh"),
                Err(e) => {
                    // Never overwrite the handler's result.
                    error!(user_id, method = %method, error = %e, "Failed to flag user for claims refresh");
                    self.metrics.record_mark_error(&method);
                }
            }
        }

        Ok(response)
    }
}
