//! Gateway metrics for observability

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

static METRICS: OnceLock<GatewayMetricsInner> = OnceLock::new();

struct GatewayMetricsInner {
    requests: CounterVec,
    failures: CounterVec,
    duration: HistogramVec,
    refreshes: CounterVec,
    refresh_mark_errors: CounterVec,
    exchange_cache: CounterVec,
}

impl GatewayMetricsInner {
    fn new() -> Self {
        Self {
            requests: CounterVec::new(
                Opts::new("coursegate_rpc_requests_total", "Total RPC calls"),
                &["method", "result"],
            )
            .expect("valid metric definition"),
            failures: CounterVec::new(
                Opts::new("coursegate_rpc_failures_total", "Total failed RPC calls"),
                &["method", "code"],
            )
            .expect("valid metric definition"),
            duration: HistogramVec::new(
                HistogramOpts::new(
                    "coursegate_rpc_duration_seconds",
                    "RPC latency including interceptors",
                )
                .buckets(vec![
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ]),
                &["method"],
            )
            .expect("valid metric definition"),
            refreshes: CounterVec::new(
                Opts::new(
                    "coursegate_credential_refreshes_total",
                    "Credentials reissued with fresh claims",
                ),
                &["reason"],
            )
            .expect("valid metric definition"),
            refresh_mark_errors: CounterVec::new(
                Opts::new(
                    "coursegate_refresh_mark_errors_total",
                    "Failures marking users for claims refresh",
                ),
                &["method"],
            )
            .expect("valid metric definition"),
            exchange_cache: CounterVec::new(
                Opts::new(
                    "coursegate_token_exchange_total",
                    "External token exchange lookups",
                ),
                &["outcome"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.requests.clone()))?;
        registry.register(Box::new(self.failures.clone()))?;
        registry.register(Box::new(self.duration.clone()))?;
        registry.register(Box::new(self.refreshes.clone()))?;
        registry.register(Box::new(self.refresh_mark_errors.clone()))?;
        registry.register(Box::new(self.exchange_cache.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static GatewayMetricsInner {
    METRICS.get_or_init(GatewayMetricsInner::new)
}

/// Gateway metrics wrapper
#[derive(Clone, Default)]
pub struct GatewayMetrics;

impl GatewayMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    /// Record a finished call; `code` is `None` on success.
    pub fn record_call(&self, method: &str, code: Option<tonic::Code>, seconds: f64) {
        let metrics = get_metrics();
        let result = if code.is_none() { "ok" } else { "error" };
        metrics.requests.with_label_values(&[method, result]).inc();
        if let Some(code) = code {
            metrics
                .failures
                .with_label_values(&[method, code_label(code)])
                .inc();
        }
        metrics.duration.with_label_values(&[method]).observe(seconds);
    }

    pub fn record_refresh(&self, reason: &str) {
        get_metrics().refreshes.with_label_values(&[reason]).inc();
    }

    pub fn record_mark_error(&self, method: &str) {
        get_metrics()
            .refresh_mark_errors
            .with_label_values(&[method])
            .inc();
    }

    pub fn record_exchange(&self, outcome: &str) {
        get_metrics()
            .exchange_cache
            .with_label_values(&[outcome])
            .inc();
    }
}

/// Render `registry` in the Prometheus text format.
pub fn render(registry: &Registry) -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

fn code_label(code: tonic::Code) -> &'static str {
    use tonic::Code;
    match code {
        Code::Ok => "ok",
        Code::Cancelled => "cancelled",
        Code::Unknown => "unknown",
        Code::InvalidArgument => "invalid_argument",
        Code::DeadlineExceeded => "deadline_exceeded",
        Code::NotFound => "not_found",
        Code::AlreadyExists => "already_exists",
        Code::PermissionDenied => "permission_denied",
        Code::ResourceExhausted => "resource_exhausted",
        Code::FailedPrecondition => "failed_precondition",
        Code::Aborted => "aborted",
        Code::OutOfRange => "out_of_range",
        Code::Unimplemented => "unimplemented",
        Code::Internal => "internal",
        Code::Unavailable => "unavailable",
        Code::DataLoss => "data_loss",
        Code::Unauthenticated => "unauthenticated",
    }
}
