//! User store access needed to compute claims, track refresh state and
//! resolve the course a submission belongs to.

mod memory;
mod postgres;

pub use memory::InMemoryUserRepository;
pub use postgres::PgUserRepository;

use async_trait::async_trait;
use session_claims::EnrollmentStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("user {0} not found")]
    UserNotFound(u64),

    #[error("no user linked to {provider} identity {remote_id}")]
    RemoteIdentityNotFound { provider: String, remote_id: u64 },

    #[error("group {0} not found")]
    GroupNotFound(u64),

    #[error("submission {0} not found")]
    SubmissionNotFound(u64),

    #[error("id {0} is outside the stored id range")]
    IdOutOfRange(i128),

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);
        RepositoryError::Database(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: u64,
    pub is_admin: bool,
    pub needs_refresh: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enrollment {
    pub course_id: u64,
    pub status: EnrollmentStatus,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, user_id: u64) -> Result<UserRecord, RepositoryError>;

    async fn get_user_enrollments(&self, user_id: u64) -> Result<Vec<Enrollment>, RepositoryError>;

    /// Ids of the groups `user_id` belongs to.
    async fn get_user_groups(&self, user_id: u64) -> Result<Vec<u64>, RepositoryError>;

    /// Persist the "needs fresh claims" flag.
    async fn set_needs_refresh(&self, user_id: u64, needs_refresh: bool) -> Result<(), RepositoryError>;

    async fn get_user_by_remote_identity(
        &self,
        provider: &str,
        remote_id: u64,
    ) -> Result<UserRecord, RepositoryError>;

    /// Every user whose flag is currently set.
    async fn users_needing_refresh(&self) -> Result<Vec<u64>, RepositoryError>;

    /// Members of an existing group, possibly none.
    ///
    /// `GroupNotFound` only if the group itself does not exist.
    async fn get_group_members(&self, group_id: u64) -> Result<Vec<u64>, RepositoryError>;

    /// Course of the assignment `submission_id` was handed in for.
    async fn get_submission_course(&self, submission_id: u64) -> Result<u64, RepositoryError>;
}
