use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("ownership lookup failed: {0}")]
    Ownership(String),

    #[error("submission lookup failed: {0}")]
    SubmissionLookup(String),
}
