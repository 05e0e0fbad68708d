//! Interceptor chain plumbing
//!
//! Each stage sees the whole [`Call`] and decides whether to pass it on via
//! [`Next::run`] or reject it with a `Status`. Stages run in a fixed order set
//! by [`crate::chain::ChainBuilder`]; the innermost step is the [`Handler`].
//!
//! ## Call lifecycle
//!
//! ```text
//! Received -> Validated -> Identified -> Authorized -> Handled -> Responded
//!                 |            |             |
//!                 +------------+-------------+--> Rejected
//! ```

mod authorization;
mod identity;
mod observability;
mod token_exchange;
mod token_refresh;
mod validation;

pub use authorization::AuthorizationInterceptor;
pub use identity::IdentityInterceptor;
pub use observability::ObservabilityInterceptor;
pub use token_exchange::TokenExchangeInterceptor;
pub use token_refresh::TokenRefreshInterceptor;
pub use validation::ValidationInterceptor;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use grpc_access_control::{RequestMessage, ResponseMessage};
use tonic::metadata::MetadataMap;
use tonic::{Extensions, Request, Response, Status};

/// Metadata key carrying the session cookie on requests.
pub const COOKIE_HEADER: &str = "cookie";
/// Metadata key carrying a rotated session cookie on responses.
pub const SET_COOKIE_HEADER: &str = "set-cookie";
/// Metadata key carrying an external personal access token.
pub const AUTHORIZATION_HEADER: &str = "authorization";

pub type BoxedRequest = Box<dyn RequestMessage>;
pub type BoxedResponse = Box<dyn ResponseMessage>;
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<BoxedResponse, Status>> + Send>>;
pub type CallResult = Result<Response<Body>, Status>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Unary,
    ServerStreaming,
}

/// An RPC in flight: procedure path, shape and the decoded request.
pub struct Call {
    procedure: String,
    kind: CallKind,
    request: Request<BoxedRequest>,
}

impl Call {
    pub fn new(procedure: impl Into<String>, kind: CallKind, request: Request<BoxedRequest>) -> Self {
        Self {
            procedure: procedure.into(),
            kind,
            request,
        }
    }

    pub fn unary(procedure: impl Into<String>, message: impl RequestMessage) -> Self {
        Self::new(procedure, CallKind::Unary, Request::new(Box::new(message) as BoxedRequest))
    }

    pub fn server_streaming(procedure: impl Into<String>, message: impl RequestMessage) -> Self {
        Self::new(
            procedure,
            CallKind::ServerStreaming,
            Request::new(Box::new(message) as BoxedRequest),
        )
    }

    /// Full procedure path, e.g. `/coursegate.CourseService/GetCourse`.
    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    /// Method name: the procedure path after its last `/`.
    pub fn method(&self) -> &str {
        self.procedure
            .rsplit_once('/')
            .map_or(self.procedure.as_str(), |(_, method)| method)
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    pub fn message(&self) -> &dyn RequestMessage {
        &**self.request.get_ref()
    }

    pub fn metadata(&self) -> &MetadataMap {
        self.request.metadata()
    }

    pub fn metadata_mut(&mut self) -> &mut MetadataMap {
        self.request.metadata_mut()
    }

    pub fn extensions(&self) -> &Extensions {
        self.request.extensions()
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        self.request.extensions_mut()
    }

    pub fn request(&self) -> &Request<BoxedRequest> {
        &self.request
    }

    pub fn into_request(self) -> Request<BoxedRequest> {
        self.request
    }

    /// Attach metadata, builder style.
    pub fn with_metadata(mut self, key: &'static str, value: &str) -> Result<Self, Status> {
        let value = value
            .parse()
            .map_err(|_| Status::invalid_argument(format!("invalid {key} metadata")))?;
        self.request.metadata_mut().insert(key, value);
        Ok(self)
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("procedure", &self.procedure)
            .field("kind", &self.kind)
            .field("message", &self.message())
            .finish()
    }
}

/// Response payload: a single message or a stream of them.
pub enum Body {
    Unary(BoxedResponse),
    Stream(ResponseStream),
}

impl Body {
    pub fn unary(message: impl ResponseMessage) -> Self {
        Body::Unary(Box::new(message))
    }

    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<BoxedResponse, Status>> + Send + 'static,
    {
        Body::Stream(Box::pin(stream))
    }

    pub fn as_unary(&self) -> Option<&dyn ResponseMessage> {
        match self {
            Body::Unary(message) => Some(&**message),
            Body::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<ResponseStream> {
        match self {
            Body::Stream(stream) => Some(stream),
            Body::Unary(_) => None,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Unary(message) => f.debug_tuple("Unary").field(message).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// One stage of the chain.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Stage name for logs and diagnostics.
    fn name(&self) -> &'static str;

    async fn intercept(&self, call: Call, next: Next<'_>) -> CallResult;
}

/// The business handler at the end of the chain.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, call: Call) -> CallResult;
}

/// The remaining stages of the chain.
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    handler: &'a dyn Handler,
}

impl<'a> Next<'a> {
    pub(crate) fn new(interceptors: &'a [Arc<dyn Interceptor>], handler: &'a dyn Handler) -> Self {
        Self {
            interceptors,
            handler,
        }
    }

    /// Pass `call` to the next stage, or to the handler if none remain.
    pub async fn run(self, call: Call) -> CallResult {
        match self.interceptors.split_first() {
            Some((stage, rest)) => stage.intercept(call, Next::new(rest, self.handler)).await,
            None => self.handler.call(call).await,
        }
    }
}

/// Handler backed by an async closure.
pub struct HandlerFn<F>(F);

/// Wrap an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Call) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallResult> + Send + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Call) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallResult> + Send + 'static,
{
    async fn call(&self, call: Call) -> CallResult {
        (self.0)(call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Ping;

    impl RequestMessage for Ping {}

    #[test]
    fn test_method_from_procedure() {
        let call = Call::unary("/coursegate.CourseService/GetCourse", Ping);
        assert_eq!(call.method(), "GetCourse");
        assert_eq!(call.kind(), CallKind::Unary);

        let bare = Call::unary("GetCourse", Ping);
        assert_eq!(bare.method(), "GetCourse");
    }

    #[tokio::test]
    async fn test_next_runs_handler_when_no_stages_remain() {
        let handler = handler_fn(|call: Call| async move {
            assert_eq!(call.method(), "Ping");
            Ok(Response::new(Body::unary(())))
        });

        let response = Next::new(&[], &handler)
            .run(Call::unary("/svc/Ping", Ping))
            .await
            .unwrap();
        assert!(response.get_ref().as_unary().is_some());
    }

    #[test]
    fn test_with_metadata() {
        let call = Call::unary("/svc/Ping", Ping)
            .with_metadata(COOKIE_HEADER, "auth=abc")
            .unwrap();
        assert_eq!(
            call.metadata().get(COOKIE_HEADER).unwrap().to_str().unwrap(),
            "auth=abc"
        );
    }
}
