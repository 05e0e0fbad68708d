use async_trait::async_trait;
use tracing::{debug, error, warn};

use super::{Body, Call, CallResult, Interceptor, Next};
use crate::error::GatewayError;

/// Rejects structurally invalid payloads before anything else looks at them.
///
/// Also logs downstream failures with the payload type and strips remote
/// provider identities from successful unary responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationInterceptor;

#[async_trait]
impl Interceptor for ValidationInterceptor {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn intercept(&self, call: Call, next: Next<'_>) -> CallResult {
        let method = call.method().to_string();
        let message_type = call.message().type_name();

        match call.message().as_validate().map(|v| v.is_valid()) {
            Some(false) => {
                warn!(method = %method, message_type, "Rejecting invalid payload");
                return Err(GatewayError::InvalidArgument("invalid payload".to_string()).to_status());
            }
            Some(true) => {}
            None => debug!(method = %method, message_type, "Payload has no validator"),
        }

        match next.run(call).await {
            Ok(mut response) => {
                if let Body::Unary(message) = response.get_mut() {
                    message.remove_remote_id();
                }
                Ok(response)
            }
            Err(status) => {
                error!(
                    method = %method,
                    message_type,
                    code = ?status.code(),
                    message = %status.message(),
                    "Call failed"
                );
                Err(status)
            }
        }
    }
}
