use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "access_gateway=info,info";

/// Install the JSON tracing subscriber, honouring `RUST_LOG`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .json()
        .try_init()
        .is_ok()
}
