use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, info_span, warn, Instrument};

use super::{Call, CallResult, Interceptor, Next};
use crate::metrics::GatewayMetrics;

/// Outermost stage: one span per call, a completion log and call metrics.
#[derive(Clone, Default)]
pub struct ObservabilityInterceptor {
    metrics: GatewayMetrics,
}

impl ObservabilityInterceptor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Interceptor for ObservabilityInterceptor {
    fn name(&self) -> &'static str {
        "observability"
    }

    async fn intercept(&self, call: Call, next: Next<'_>) -> CallResult {
        let method = call.method().to_string();
        let span = info_span!("rpc", rpc.method = %method, rpc.kind = ?call.kind());
        let start = Instant::now();

        let result = next.run(call).instrument(span.clone()).await;

        let elapsed = start.elapsed();
        let _guard = span.enter();
        match &result {
            Ok(_) => {
                info!(duration_ms = elapsed.as_millis() as u64, "RPC completed");
                self.metrics.record_call(&method, None, elapsed.as_secs_f64());
            }
            Err(status) => {
                warn!(
                    code = ?status.code(),
                    duration_ms = elapsed.as_millis() as u64,
                    "RPC failed"
                );
                self.metrics
                    .record_call(&method, Some(status.code()), elapsed.as_secs_f64());
            }
        }

        result
    }
}
