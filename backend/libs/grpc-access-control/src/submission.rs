//! Submission lookup for the `grader` role.

use async_trait::async_trait;

use crate::error::PolicyError;

/// Maps a submission to the course it was handed in for.
#[async_trait]
pub trait SubmissionCourses: Send + Sync {
    /// `None` if no such submission exists.
    async fn course_of(&self, submission_id: u64) -> Result<Option<u64>, PolicyError>;
}

/// Lookup that knows no submissions, so the `grader` role never matches.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSubmissions;

#[async_trait]
impl SubmissionCourses for NoSubmissions {
    async fn course_of(&self, _submission_id: u64) -> Result<Option<u64>, PolicyError> {
        Ok(None)
    }
}
