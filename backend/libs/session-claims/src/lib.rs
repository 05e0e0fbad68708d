//! Coursegate session claims
//!
//! Shared by every service that issues or checks session credentials:
//!
//! - [`Claims`]: user id, admin flag, course enrollments and groups
//! - [`ClaimsCodec`]: HS256 signing and verification
//! - [`auth_cookie`] / [`token_from_cookie_header`]: cookie transport
//! - [`validate_secret_strength`]: startup check for the signing secret

pub mod claims;
pub mod codec;
pub mod transport;
pub mod secret;

pub use claims::{Claims, EnrollmentStatus, ISSUER};
pub use codec::{ClaimsCodec, CodecError, TokenRejection, SIGNING_ALGORITHM};
pub use transport::{auth_cookie, token_from_cookie_header, AUTH_COOKIE_NAME};
pub use secret::{generate_secret, validate_secret_strength, SecretStrength};
