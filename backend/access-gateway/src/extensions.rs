//! Request extension trait for claims access
//!
//! The identity stage stores verified [`Claims`] in the request extensions.
//! Handlers and later stages read them back through [`ClaimsExt`].

use session_claims::Claims;
use tonic::{Extensions, Request, Status};

use crate::interceptor::Call;

/// Access to the claims attached by the identity stage.
///
/// ## Usage
///
/// ```rust
/// use access_gateway::{handler_fn, Body, Call, ClaimsExt};
/// use tonic::Response;
///
/// let handler = handler_fn(|call: Call| async move {
///     let claims = call.claims()?;
///     tracing::info!(user_id = claims.user_id(), "handling call");
///     Ok(Response::new(Body::unary(())))
/// });
/// # let _ = handler;
/// ```
pub trait ClaimsExt {
    /// Claims of the caller.
    ///
    /// ## Errors
    ///
    /// `Status::unauthenticated` if the identity stage did not run.
    fn claims(&self) -> Result<&Claims, Status>;

    /// Claims of the caller, who must hold the admin flag.
    fn require_admin(&self) -> Result<&Claims, Status> {
        let claims = self.claims()?;
        if !claims.is_admin() {
            return Err(Status::permission_denied("admin privileges required"));
        }
        Ok(claims)
    }
}

fn claims_in(extensions: &Extensions) -> Result<&Claims, Status> {
    extensions
        .get::<Claims>()
        .ok_or_else(|| Status::unauthenticated("no claims attached to request"))
}

impl<T> ClaimsExt for Request<T> {
    fn claims(&self) -> Result<&Claims, Status> {
        claims_in(self.extensions())
    }
}

impl ClaimsExt for Call {
    fn claims(&self) -> Result<&Claims, Status> {
        claims_in(self.extensions())
    }
}
