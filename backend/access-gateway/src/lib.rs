//! Authentication and access control in front of the Coursegate RPC handlers.
//!
//! Every call passes an [`InterceptorChain`] before it reaches its handler:
//! payload validation, optional exchange of an external access token, session
//! cookie verification with claims refresh, the per-method access policy and
//! tracking of role changes that invalidate issued claims.
//!
//! # Example
//!
//! ```no_run
//! use access_gateway::config::Settings;
//! use access_gateway::{handler_fn, Body, Call, ChainBuilder, ClaimsExt};
//! use tonic::Response;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     access_gateway::telemetry::init_tracing();
//!     let settings = Settings::load()?;
//!
//!     let chain = ChainBuilder::from_settings(&settings)
//!         .await?
//!         .build(handler_fn(|call: Call| async move {
//!             let claims = call.claims()?;
//!             tracing::info!(user_id = claims.user_id(), "GetUser");
//!             Ok(Response::new(Body::unary(())))
//!         }));
//!
//!     let _ = chain;
//!     Ok(())
//! }
//! ```

pub mod chain;
pub mod config;
pub mod error;
pub mod exchange;
pub mod extensions;
pub mod external;
pub mod interceptor;
pub mod metrics;
pub mod refresh_set;
pub mod repository;
pub mod submissions;
pub mod telemetry;
pub mod token_manager;

pub use chain::{connect_repository, ChainBuilder, InterceptorChain};
pub use error::{GatewayError, Result};
pub use exchange::TokenExchange;
pub use extensions::ClaimsExt;
pub use interceptor::{
    handler_fn, Body, BoxedRequest, BoxedResponse, Call, CallKind, CallResult, Handler,
    Interceptor, Next,
};
pub use metrics::GatewayMetrics;
pub use refresh_set::RefreshSet;
pub use submissions::StoreSubmissions;
pub use token_manager::{TokenManager, TokenSettings};
