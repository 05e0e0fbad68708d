//! Submission lookups for the access policy, served from the user store.

use std::sync::Arc;

use async_trait::async_trait;
use grpc_access_control::{PolicyError, SubmissionCourses};

use crate::repository::{RepositoryError, UserRepository};

pub struct StoreSubmissions {
    repository: Arc<dyn UserRepository>,
}

impl StoreSubmissions {
    pub fn new(repository: Arc<dyn UserRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl SubmissionCourses for StoreSubmissions {
    async fn course_of(&self, submission_id: u64) -> Result<Option<u64>, PolicyError> {
        match self.repository.get_submission_course(submission_id).await {
            Ok(course_id) => Ok(Some(course_id)),
            Err(RepositoryError::SubmissionNotFound(_)) => Ok(None),
            Err(e) => Err(PolicyError::SubmissionLookup(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryUserRepository;

    #[tokio::test]
    async fn test_known_and_unknown_submissions() {
        let repo = Arc::new(InMemoryUserRepository::new());
        repo.add_submission(300, 10).await;
        let lookup = StoreSubmissions::new(repo);

        assert_eq!(lookup.course_of(300).await.unwrap(), Some(10));
        assert_eq!(lookup.course_of(301).await.unwrap(), None);
    }
}
