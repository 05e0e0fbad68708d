//! PostgreSQL user store
//!
//! Ids are `BIGINT` columns. Ids that do not fit either side of the
//! conversion fail with `IdOutOfRange` instead of wrapping.
use async_trait::async_trait;
use session_claims::EnrollmentStatus;
use sqlx::PgPool;

use super::{Enrollment, RepositoryError, UserRecord, UserRepository};

#[derive(Debug, Clone, sqlx::FromRow)]
struct UserRow {
    id: i64,
    is_admin: bool,
    needs_refresh: bool,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(UserRecord {
            id: from_db_id(row.id)?,
            is_admin: row.is_admin,
            needs_refresh: row.needs_refresh,
        })
    }
}

fn to_db_id(id: u64) -> Result<i64, RepositoryError> {
    i64::try_from(id).map_err(|_| RepositoryError::IdOutOfRange(i128::from(id)))
}

fn from_db_id(id: i64) -> Result<u64, RepositoryError> {
    u64::try_from(id).map_err(|_| RepositoryError::IdOutOfRange(i128::from(id)))
}

fn from_db_ids(ids: Vec<i64>) -> Result<Vec<u64>, RepositoryError> {
    ids.into_iter().map(from_db_id).collect()
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct EnrollmentRow {
    course_id: i64,
    status: String,
}

fn parse_status(status: &str) -> EnrollmentStatus {
    match status {
        "student" => EnrollmentStatus::Student,
        "teacher" => EnrollmentStatus::Teacher,
        "pending" => EnrollmentStatus::Pending,
        _ => EnrollmentStatus::None,
    }
}

#[derive(Debug, Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the gateway's migrations.
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn get_user(&self, user_id: u64) -> Result<UserRecord, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, is_admin, needs_refresh FROM users WHERE id = $1",
        )
        .bind(to_db_id(user_id)?)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RepositoryError::UserNotFound(user_id))?
            .try_into()
    }

    async fn get_user_enrollments(&self, user_id: u64) -> Result<Vec<Enrollment>, RepositoryError> {
        let rows = sqlx::query_as::<_, EnrollmentRow>(
            r#"
            SELECT course_id, status
            FROM enrollments
            WHERE user_id = $1
            ORDER BY course_id
            "#,
        )
        .bind(to_db_id(user_id)?)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Enrollment {
                    course_id: from_db_id(row.course_id)?,
                    status: parse_status(&row.status),
                })
            })
            .collect()
    }

    async fn get_user_groups(&self, user_id: u64) -> Result<Vec<u64>, RepositoryError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT group_id FROM group_members WHERE user_id = $1 ORDER BY group_id",
        )
        .bind(to_db_id(user_id)?)
        .fetch_all(&self.pool)
        .await?;

        from_db_ids(ids)
    }

    async fn set_needs_refresh(&self, user_id: u64, needs_refresh: bool) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET needs_refresh = $2 WHERE id = $1")
            .bind(to_db_id(user_id)?)
            .bind(needs_refresh)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::UserNotFound(user_id));
        }
        Ok(())
    }

    async fn get_user_by_remote_identity(
        &self,
        provider: &str,
        remote_id: u64,
    ) -> Result<UserRecord, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.is_admin, u.needs_refresh
            FROM users u
            JOIN remote_identities r ON r.user_id = u.id
            WHERE r.provider = $1 AND r.remote_id = $2
            "#,
        )
        .bind(provider)
        .bind(to_db_id(remote_id)?)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| RepositoryError::RemoteIdentityNotFound {
            provider: provider.to_string(),
            remote_id,
        })?
        .try_into()
    }

    async fn users_needing_refresh(&self) -> Result<Vec<u64>, RepositoryError> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM users WHERE needs_refresh")
            .fetch_all(&self.pool)
            .await?;

        from_db_ids(ids)
    }

    async fn get_group_members(&self, group_id: u64) -> Result<Vec<u64>, RepositoryError> {
        let db_group_id = to_db_id(group_id)?;
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM groups WHERE id = $1)")
            .bind(db_group_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(RepositoryError::GroupNotFound(group_id));
        }

        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT user_id FROM group_members WHERE group_id = $1 ORDER BY user_id",
        )
        .bind(db_group_id)
        .fetch_all(&self.pool)
        .await?;

        from_db_ids(ids)
    }

    async fn get_submission_course(&self, submission_id: u64) -> Result<u64, RepositoryError> {
        let course_id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT a.course_id
            FROM submissions s
            JOIN assignments a ON a.id = s.assignment_id
            WHERE s.id = $1
            "#,
        )
        .bind(to_db_id(submission_id)?)
        .fetch_optional(&self.pool)
        .await?;

        from_db_id(course_id.ok_or(RepositoryError::SubmissionNotFound(submission_id))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("teacher"), EnrollmentStatus::Teacher);
        assert_eq!(parse_status("student"), EnrollmentStatus::Student);
        assert_eq!(parse_status("pending"), EnrollmentStatus::Pending);
        assert_eq!(parse_status("rejected"), EnrollmentStatus::None);
    }

    #[test]
    fn test_user_row_conversion() {
        let record = UserRecord::try_from(UserRow {
            id: 12,
            is_admin: true,
            needs_refresh: false,
        })
        .unwrap();
        assert_eq!(
            record,
            UserRecord {
                id: 12,
                is_admin: true,
                needs_refresh: false
            }
        );
    }

    #[test]
    fn test_negative_row_id_is_rejected() {
        let result = UserRecord::try_from(UserRow {
            id: -1,
            is_admin: false,
            needs_refresh: false,
        });
        assert!(matches!(result, Err(RepositoryError::IdOutOfRange(-1))));
    }

    #[test]
    fn test_id_conversion_does_not_wrap() {
        assert_eq!(to_db_id(i64::MAX as u64).unwrap(), i64::MAX);
        assert!(matches!(
            to_db_id(u64::MAX),
            Err(RepositoryError::IdOutOfRange(id)) if id == i128::from(u64::MAX)
        ));
        assert!(matches!(
            from_db_ids(vec![3, i64::MIN]),
            Err(RepositoryError::IdOutOfRange(id)) if id == i128::from(i64::MIN)
        ));
        assert_eq!(from_db_ids(vec![3, 4]).unwrap(), vec![3, 4]);
    }
}
