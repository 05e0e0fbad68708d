use std::time::Duration;

use grpc_access_control::PolicyError;
use session_claims::{CodecError, TokenRejection};
use thiserror::Error;
use tonic::{Code, Status};

use crate::external::ResolveError;
use crate::repository::RepositoryError;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] TokenRejection),

    #[error("invalid token format")]
    InvalidTokenFormat,

    #[error("External identity error: {0}")]
    ExternalIdentity(#[from] ResolveError),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Convert to gRPC Status for wire protocol
    pub fn to_status(&self) -> Status {
        match self {
            GatewayError::Unauthenticated(msg) => Status::new(Code::Unauthenticated, msg.clone()),
            GatewayError::InvalidToken(_) => {
                Status::new(Code::Unauthenticated, "Invalid or expired credential")
            }
            GatewayError::InvalidTokenFormat => {
                Status::new(Code::Unauthenticated, "invalid token format")
            }
            GatewayError::ExternalIdentity(_) => {
                Status::new(Code::Unauthenticated, "External token not recognised")
            }
            GatewayError::PermissionDenied(msg) => {
                Status::new(Code::PermissionDenied, msg.clone())
            }
            GatewayError::InvalidArgument(msg) => Status::new(Code::InvalidArgument, msg.clone()),
            GatewayError::DeadlineExceeded(limit) => Status::new(
                Code::DeadlineExceeded,
                format!("call exceeded deadline of {}s", limit.as_secs()),
            ),
            GatewayError::Repository(_)
            | GatewayError::Signing(_)
            | GatewayError::Configuration(_)
            | GatewayError::Internal(_) => {
                // Don't leak internal details
                tracing::error!(error = %self, "Internal gateway error");
                Status::new(Code::Internal, "Internal server error")
            }
        }
    }
}

impl From<CodecError> for GatewayError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Signing(msg) => GatewayError::Signing(msg),
            CodecError::InvalidToken(rejection) => GatewayError::InvalidToken(rejection),
        }
    }
}

impl From<PolicyError> for GatewayError {
    fn from(err: PolicyError) -> Self {
        GatewayError::Internal(err.to_string())
    }
}

// gRPC Status conversion
impl From<GatewayError> for Status {
    fn from(err: GatewayError) -> Self {
        err.to_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (
                GatewayError::Unauthenticated("missing credential".into()),
                Code::Unauthenticated,
            ),
            (
                GatewayError::InvalidToken(TokenRejection::Expired),
                Code::Unauthenticated,
            ),
            (GatewayError::InvalidTokenFormat, Code::Unauthenticated),
            (
                GatewayError::PermissionDenied("no".into()),
                Code::PermissionDenied,
            ),
            (
                GatewayError::InvalidArgument("invalid payload".into()),
                Code::InvalidArgument,
            ),
            (
                GatewayError::DeadlineExceeded(Duration::from_secs(120)),
                Code::DeadlineExceeded,
            ),
            (GatewayError::Signing("no secret".into()), Code::Internal),
            (
                GatewayError::Configuration("token validity out of range".into()),
                Code::Internal,
            ),
        ];

        for (err, code) in cases {
            assert_eq!(err.to_status().code(), code, "{err}");
        }
    }

    #[test]
    fn test_internal_details_not_leaked() {
        let status = GatewayError::Repository(RepositoryError::Database(
            "relation users does not exist".into(),
        ))
        .to_status();
        assert_eq!(status.message(), "Internal server error");
    }

    #[test]
    fn test_invalid_token_format_message() {
        assert_eq!(
            GatewayError::InvalidTokenFormat.to_status().message(),
            "invalid token format"
        );
    }

    #[test]
    fn test_codec_error_conversion() {
        let err: GatewayError = CodecError::Signing("secret missing".into()).into();
        assert!(matches!(err, GatewayError::Signing(_)));
    }
}
