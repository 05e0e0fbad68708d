//! Users whose next request must receive freshly computed claims.
//!
//! The set mirrors the persisted `needs_refresh` flag. Every change writes the
//! flag first and touches memory only once the write succeeded, with the lock
//! held across both steps so concurrent marks and clears cannot interleave.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::repository::{RepositoryError, UserRepository};

pub struct RefreshSet {
    users: Mutex<HashSet<u64>>,
    repository: Arc<dyn UserRepository>,
}

impl RefreshSet {
    /// Load the flagged users from the store.
    pub async fn load(repository: Arc<dyn UserRepository>) -> Result<Self, RepositoryError> {
        let users: HashSet<u64> = repository.users_needing_refresh().await?.into_iter().collect();
        info!(count = users.len(), "Loaded users pending claims refresh");

        Ok(Self {
            users: Mutex::new(users),
            repository,
        })
    }

    pub async fn contains(&self, user_id: u64) -> bool {
        self.users.lock().await.contains(&user_id)
    }

    /// Flag `user_id`. Idempotent; a failed write leaves the set unchanged.
    pub async fn mark(&self, user_id: u64) -> Result<(), RepositoryError> {
        let mut users = self.users.lock().await;
        if users.contains(&user_id) {
            return Ok(());
        }

        self.repository.set_needs_refresh(user_id, true).await?;
        users.insert(user_id);
        debug!(user_id, "User marked for claims refresh");
        Ok(())
    }

    /// Unflag `user_id`. Idempotent; a failed write leaves the set unchanged.
    pub async fn clear(&self, user_id: u64) -> Result<(), RepositoryError> {
        let mut users = self.users.lock().await;
        if !users.contains(&user_id) {
            return Ok(());
        }

        self.repository.set_needs_refresh(user_id, false).await?;
        users.remove(&user_id);
        debug!(user_id, "User claims refresh cleared");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.lock().await.is_empty()
    }
}
