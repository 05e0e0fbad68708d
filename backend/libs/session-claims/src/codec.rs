//! Claims codec: signs and verifies session credentials
//!
//! Every Coursegate credential is a compact JWS signed with HS256 under a
//! single server-held secret.
//!
//! ## Security Design
//!
//! - **HS256 ONLY**: the header algorithm is read and compared before any
//!   signature work, so tokens announcing `none`, `HS512` or an asymmetric
//!   algorithm are rejected outright
//! - **No leeway**: expired claims are invalid the second they expire
//! - **Issuer pinned**: tokens must carry the Coursegate issuer
//! - **Constant-time**: HMAC tags are compared with ring's
//!   `verify_slices_are_equal` inside jsonwebtoken
//!
//! ## Usage
//!
//! ```rust
//! use chrono::Duration;
//! use session_claims::{Claims, ClaimsCodec};
//!
//! let codec = ClaimsCodec::new("a-long-random-server-secret-0123456789abcdef");
//! let claims = Claims::issue(7, false, [], [], Duration::minutes(15));
//!
//! let token = codec.issue(&claims).expect("secret configured");
//! assert_eq!(codec.parse(&token).expect("valid token"), claims);
//! ```
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use tracing::debug;

use crate::claims::{Claims, ISSUER};

// ============================================================================
// Constants
// ============================================================================

/// The only algorithm Coursegate signs with or accepts.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

const SIGNING_ALGORITHM_NAME: &str = "HS256";

// ============================================================================
// Errors
// ============================================================================

/// Why a presented token was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenRejection {
    #[error("malformed token")]
    Malformed,

    #[error("signature mismatch")]
    BadSignature,

    #[error("unexpected signing algorithm {0:?}")]
    UnexpectedAlgorithm(String),

    #[error("unexpected issuer")]
    WrongIssuer,

    #[error("token expired")]
    Expired,

    #[error("no verification secret configured")]
    Unverifiable,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to sign claims: {0}")]
    Signing(String),

    #[error("invalid token: {0}")]
    InvalidToken(#[from] TokenRejection),
}

impl CodecError {
    pub fn is_expired(&self) -> bool {
        matches!(self, CodecError::InvalidToken(TokenRejection::Expired))
    }
}

// ============================================================================
// Codec
// ============================================================================

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Encodes and decodes signed claims.
///
/// Cheap to share behind an `Arc`; holds no mutable state.
pub struct ClaimsCodec {
    keys: Option<Keys>,
    validation: Validation,
}

impl ClaimsCodec {
    /// Build a codec for `secret`.
    ///
    /// An empty secret yields a codec that refuses to sign
    /// (`CodecError::Signing`) and refuses every token
    /// (`TokenRejection::Unverifiable`).
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        let keys = (!secret.is_empty()).then(|| Keys {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        });

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        Self { keys, validation }
    }

    /// Serialize and sign `claims`.
    ///
    /// ## Errors
    ///
    /// `CodecError::Signing` if no secret is configured or encoding fails.
    pub fn issue(&self, claims: &Claims) -> Result<String, CodecError> {
        let keys = self
            .keys
            .as_ref()
            .ok_or_else(|| CodecError::Signing("signing secret unavailable".to_string()))?;

        encode(&Header::new(SIGNING_ALGORITHM), claims, &keys.encoding)
            .map_err(|e| CodecError::Signing(e.to_string()))
    }

    /// Verify `token` and return its claims.
    ///
    /// ## Errors
    ///
    /// `CodecError::InvalidToken` if the token:
    /// - is not three base64url segments with a JSON header
    /// - names any algorithm other than HS256
    /// - has a signature that does not match
    /// - has a foreign issuer
    /// - is expired
    pub fn parse(&self, token: &str) -> Result<Claims, CodecError> {
        let keys = self.keys.as_ref().ok_or(TokenRejection::Unverifiable)?;

        let algorithm = header_algorithm(token)?;
        if algorithm != SIGNING_ALGORITHM_NAME {
            debug!(algorithm = %algorithm, "Rejecting token with unexpected algorithm");
            return Err(TokenRejection::UnexpectedAlgorithm(algorithm).into());
        }

        let data = decode::<Claims>(token, &keys.decoding, &self.validation)
            .map_err(|e| rejection_for(e.kind()))?;

        Ok(data.claims)
    }
}

/// Read the `alg` header field without trusting anything else in the token.
fn header_algorithm(token: &str) -> Result<String, TokenRejection> {
    let mut parts = token.split('.');
    let (Some(header), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenRejection::Malformed);
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| TokenRejection::Malformed)?;
    let value: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|_| TokenRejection::Malformed)?;

    value
        .get("alg")
        .and_then(|alg| alg.as_str())
        .map(str::to_owned)
        .ok_or(TokenRejection::Malformed)
}

fn rejection_for(kind: &ErrorKind) -> TokenRejection {
    match kind {
        ErrorKind::ExpiredSignature => TokenRejection::Expired,
        ErrorKind::InvalidSignature => TokenRejection::BadSignature,
        ErrorKind::InvalidIssuer => TokenRejection::WrongIssuer,
        ErrorKind::InvalidAlgorithm => {
            TokenRejection::UnexpectedAlgorithm("mismatched key family".to_string())
        }
        _ => TokenRejection::Malformed,
    }
}

// ============================================================================
// Tests
// ============================================================================
