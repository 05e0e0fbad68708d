use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use session_claims::EnrollmentStatus;
use tokio::sync::RwLock;

use super::{Enrollment, RepositoryError, UserRecord, UserRepository};

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<u64, UserRecord>,
    enrollments: HashMap<u64, BTreeMap<u64, EnrollmentStatus>>,
    groups: BTreeMap<u64, BTreeSet<u64>>,
    remote_identities: HashMap<(String, u64), u64>,
    submissions: HashMap<u64, u64>,
}

/// In-process user store for development and tests.
///
/// `fail_writes(true)` makes every `set_needs_refresh` fail, which lets tests
/// exercise the refresh set's rollback path.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    state: RwLock<State>,
    fail_writes: AtomicBool,
    lookups: AtomicUsize,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user_id: u64, is_admin: bool) {
        self.state.write().await.users.insert(
            user_id,
            UserRecord {
                id: user_id,
                is_admin,
                needs_refresh: false,
            },
        );
    }

    pub async fn set_admin(&self, user_id: u64, is_admin: bool) {
        if let Some(user) = self.state.write().await.users.get_mut(&user_id) {
            user.is_admin = is_admin;
        }
    }

    pub async fn enroll(&self, user_id: u64, course_id: u64, status: EnrollmentStatus) {
        self.state
            .write()
            .await
            .enrollments
            .entry(user_id)
            .or_default()
            .insert(course_id, status);
    }

    /// Register a group with no members yet.
    pub async fn add_group(&self, group_id: u64) {
        self.state.write().await.groups.entry(group_id).or_default();
    }

    pub async fn add_group_member(&self, group_id: u64, user_id: u64) {
        self.state
            .write()
            .await
            .groups
            .entry(group_id)
            .or_default()
            .insert(user_id);
    }

    pub async fn add_submission(&self, submission_id: u64, course_id: u64) {
        self.state
            .write()
            .await
            .submissions
            .insert(submission_id, course_id);
    }

    pub async fn link_remote_identity(&self, provider: &str, remote_id: u64, user_id: u64) {
        self.state
            .write()
            .await
            .remote_identities
            .insert((provider.to_string(), remote_id), user_id);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of remote identity lookups served.
    pub fn remote_lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn get_user(&self, user_id: u64) -> Result<UserRecord, RepositoryError> {
        self.state
            .read()
            .await
            .users
            .get(&user_id)
            .cloned()
            .ok_or(RepositoryError::UserNotFound(user_id))
    }

    async fn get_user_enrollments(&self, user_id: u64) -> Result<Vec<Enrollment>, RepositoryError> {
        let state = self.state.read().await;
        if !state.users.contains_key(&user_id) {
            return Err(RepositoryError::UserNotFound(user_id));
        }

        Ok(state
            .enrollments
            .get(&user_id)
            .map(|courses| {
                courses
                    .iter()
                    .map(|(course_id, status)| Enrollment {
                        course_id: *course_id,
                        status: *status,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_user_groups(&self, user_id: u64) -> Result<Vec<u64>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .groups
            .iter()
            .filter(|(_, members)| members.contains(&user_id))
            .map(|(group_id, _)| *group_id)
            .collect())
    }

    async fn set_needs_refresh(&self, user_id: u64, needs_refresh: bool) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database("write rejected".to_string()));
        }

        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or(RepositoryError::UserNotFound(user_id))?;
        user.needs_refresh = needs_refresh;
        Ok(())
    }

    async fn get_user_by_remote_identity(
        &self,
        provider: &str,
        remote_id: u64,
    ) -> Result<UserRecord, RepositoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let state = self.state.read().await;
        state
            .remote_identities
            .get(&(provider.to_string(), remote_id))
            .and_then(|user_id| state.users.get(user_id))
            .cloned()
            .ok_or_else(|| RepositoryError::RemoteIdentityNotFound {
                provider: provider.to_string(),
                remote_id,
            })
    }

    async fn users_needing_refresh(&self) -> Result<Vec<u64>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .filter(|user| user.needs_refresh)
            .map(|user| user.id)
            .collect())
    }

    async fn get_group_members(&self, group_id: u64) -> Result<Vec<u64>, RepositoryError> {
        self.state
            .read()
            .await
            .groups
            .get(&group_id)
            .map(|members| members.iter().copied().collect())
            .ok_or(RepositoryError::GroupNotFound(group_id))
    }

    async fn get_submission_course(&self, submission_id: u64) -> Result<u64, RepositoryError> {
        self.state
            .read()
            .await
            .submissions
            .get(&submission_id)
            .copied()
            .ok_or(RepositoryError::SubmissionNotFound(submission_id))
    }
}
