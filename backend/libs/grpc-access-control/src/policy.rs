//! Per-method access policy
//!
//! ## Evaluation
//!
//! 1. Admin claims are allowed everywhere
//! 2. Methods absent from the table follow [`UnlistedMethods`]
//! 3. Methods listed with no roles only need an authenticated caller
//! 4. Otherwise roles are tried in order and the first match allows the call
//!
//! Identifiers a payload does not expose read as `0`, which never matches a
//! user, course, group or submission.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use session_claims::Claims;
use tracing::{debug, warn};

use crate::capability::{
    course_id_of, group_id_of, lists_member, submission_id_of, user_id_of, RequestMessage,
};
use crate::error::PolicyError;
use crate::ownership::{DenyOwnership, OwnershipResolver};
use crate::role::Role;
use crate::submission::{NoSubmissions, SubmissionCourses};

// ============================================================================
// Decision
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// A role in the method's entry (or the admin flag) matched
    Allow,
    /// The method has no role requirements
    Unrestricted,
    Deny { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Deny { .. })
    }
}

/// What to do with methods the table does not mention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnlistedMethods {
    #[default]
    Allow,
    Deny,
}

impl std::str::FromStr for UnlistedMethods {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(UnlistedMethods::Allow),
            "deny" => Ok(UnlistedMethods::Deny),
            other => Err(format!("expected allow or deny, got {other:?}")),
        }
    }
}

// ============================================================================
// Table
// ============================================================================

/// Method name to accepted roles. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    entries: HashMap<String, Vec<Role>>,
}

impl PolicyTable {
    pub fn builder() -> PolicyTableBuilder {
        PolicyTableBuilder::default()
    }

    /// Roles for `method`, or `None` if the method is not listed.
    pub fn roles(&self, method: &str) -> Option<&[Role]> {
        self.entries.get(method).map(Vec::as_slice)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &[Role])> {
        self.entries
            .iter()
            .map(|(method, roles)| (method.as_str(), roles.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct PolicyTableBuilder {
    entries: HashMap<String, Vec<Role>>,
}

impl PolicyTableBuilder {
    /// Accept callers holding any of `roles`.
    ///
    /// List the least privileged role first.
    pub fn allow(mut self, method: &str, roles: impl IntoIterator<Item = Role>) -> Self {
        let roles: Vec<Role> = roles.into_iter().collect();
        if self.entries.insert(method.to_string(), roles).is_some() {
            warn!(method = %method, "Policy entry replaced");
        }
        self
    }

    /// Accept any authenticated caller.
    pub fn authenticated(self, method: &str) -> Self {
        self.allow(method, [])
    }

    pub fn build(self) -> PolicyTable {
        PolicyTable {
            entries: self.entries,
        }
    }
}

/// Course service policy.
pub const COURSE_SERVICE_POLICY: &[(&str, &[Role])] = &[
    ("GetUser", &[]),
    ("GetCourse", &[]),
    ("GetCourses", &[]),
    ("SubmissionStream", &[]),
    ("CreateEnrollment", &[Role::User]),
    ("UpdateCourseVisibility", &[Role::User]),
    ("UpdateUser", &[Role::User, Role::Admin]),
    ("GetEnrollmentsByUser", &[Role::User, Role::Admin]),
    (
        "GetEnrollments",
        &[Role::User, Role::Student, Role::Teacher, Role::Admin],
    ),
    ("GetEnrollmentsByCourse", &[Role::Student, Role::Teacher]),
    ("GetSubmissions", &[Role::Submitter, Role::Group, Role::Teacher]),
    ("GetSubmission", &[Role::Teacher]),
    ("CreateGroup", &[Role::Group, Role::Teacher]),
    ("GetGroup", &[Role::Group, Role::Teacher]),
    ("GetGroupByUserAndCourse", &[Role::Group, Role::Teacher]),
    ("GetAssignments", &[Role::Student, Role::Teacher]),
    ("GetRepositories", &[Role::Student, Role::Teacher]),
    ("CreateAssignmentFeedback", &[Role::Student, Role::Teacher]),
    ("GetAssignmentFeedback", &[Role::Teacher]),
    ("UpdateGroup", &[Role::Teacher]),
    ("DeleteGroup", &[Role::Teacher]),
    ("GetGroupsByCourse", &[Role::Teacher]),
    ("UpdateCourse", &[Role::Teacher]),
    ("UpdateEnrollments", &[Role::Teacher]),
    ("UpdateAssignments", &[Role::Teacher]),
    ("UpdateSubmission", &[Role::Grader]),
    ("UpdateSubmissions", &[Role::Teacher]),
    ("RebuildSubmissions", &[Role::Teacher]),
    ("GetSubmissionsByCourse", &[Role::Teacher]),
    ("IsEmptyRepo", &[Role::Teacher]),
    ("CreateBenchmark", &[Role::Teacher]),
    ("UpdateBenchmark", &[Role::Teacher]),
    ("DeleteBenchmark", &[Role::Teacher]),
    ("CreateCriterion", &[Role::Teacher]),
    ("UpdateCriterion", &[Role::Teacher]),
    ("DeleteCriterion", &[Role::Teacher]),
    ("CreateReview", &[Role::Teacher]),
    ("UpdateReview", &[Role::Teacher, Role::Owner]),
    ("GetReviewers", &[Role::Teacher]),
    ("GetUserByCourse", &[Role::Teacher, Role::Admin]),
    ("GetUsers", &[Role::Admin]),
    ("GetOrganization", &[Role::Admin]),
    ("CreateCourse", &[Role::Admin]),
];

static DEFAULT_TABLE: Lazy<PolicyTable> = Lazy::new(|| {
    COURSE_SERVICE_POLICY
        .iter()
        .fold(PolicyTable::builder(), |builder, (method, roles)| {
            builder.allow(method, roles.iter().copied())
        })
        .build()
});

/// The course service table, built on first use.
pub fn default_table() -> &'static PolicyTable {
    &DEFAULT_TABLE
}

// ============================================================================
// Policy
// ============================================================================

/// Evaluates calls against a [`PolicyTable`].
#[derive(Clone)]
pub struct AccessPolicy {
    table: Arc<PolicyTable>,
    unlisted: UnlistedMethods,
    ownership: Arc<dyn OwnershipResolver>,
    submissions: Arc<dyn SubmissionCourses>,
}

impl fmt::Debug for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPolicy")
            .field("methods", &self.table.len())
            .field("unlisted", &self.unlisted)
            .finish()
    }
}

impl AccessPolicy {
    pub fn new(table: PolicyTable) -> Self {
        Self {
            table: Arc::new(table),
            unlisted: UnlistedMethods::default(),
            ownership: Arc::new(DenyOwnership),
            submissions: Arc::new(NoSubmissions),
        }
    }

    pub fn with_unlisted(mut self, unlisted: UnlistedMethods) -> Self {
        self.unlisted = unlisted;
        self
    }

    pub fn with_ownership(mut self, resolver: Arc<dyn OwnershipResolver>) -> Self {
        self.ownership = resolver;
        self
    }

    pub fn with_submissions(mut self, lookup: Arc<dyn SubmissionCourses>) -> Self {
        self.submissions = lookup;
        self
    }

    pub fn table(&self) -> &PolicyTable {
        &self.table
    }

    /// Decide whether `claims` may call `method` with `request`.
    ///
    /// ## Errors
    ///
    /// Only the ownership and submission lookups can fail; role checks
    /// themselves are pure.
    pub async fn check(
        &self,
        method: &str,
        claims: &Claims,
        request: &dyn RequestMessage,
    ) -> Result<Decision, PolicyError> {
        if claims.is_admin() {
            return Ok(Decision::Allow);
        }

        let Some(roles) = self.table.roles(method) else {
            return Ok(match self.unlisted {
                UnlistedMethods::Allow => Decision::Unrestricted,
                UnlistedMethods::Deny => Decision::Deny {
                    reason: "unknown method".to_string(),
                },
            });
        };

        if roles.is_empty() {
            return Ok(Decision::Unrestricted);
        }

        let mut reason = None;
        for role in roles {
            match self.satisfies(*role, method, claims, request).await? {
                Ok(()) => {
                    debug!(user_id = claims.user_id(), method = %method, role = %role, "Access granted");
                    return Ok(Decision::Allow);
                }
                Err(why) => {
                    if reason.is_none() {
                        reason = why;
                    }
                }
            }
        }

        let reason = reason.unwrap_or_else(|| {
            let names: Vec<&str> = roles.iter().map(Role::as_str).collect();
            format!("requires {}", names.join(" or "))
        });
        Ok(Decision::Deny { reason })
    }

    /// `Ok(Err(Some(reason)))` carries a denial more specific than "role missing".
    async fn satisfies(
        &self,
        role: Role,
        method: &str,
        claims: &Claims,
        request: &dyn RequestMessage,
    ) -> Result<Result<(), Option<String>>, PolicyError> {
        let granted = match role {
            Role::Admin => claims.is_admin(),
            Role::User => {
                if !claims.same_user(user_id_of(request)) {
                    false
                } else if grants_admin(request) && !claims.is_admin() {
                    return Ok(Err(Some(format!(
                        "non-admin user {} attempted to grant admin privileges",
                        claims.user_id()
                    ))));
                } else {
                    true
                }
            }
            Role::Student => claims.is_course_student(course_id_of(request)),
            Role::Submitter => {
                if group_id_of(request) != 0 {
                    false
                } else if !claims.same_user(user_id_of(request)) {
                    return Ok(Err(Some(format!(
                        "user {} may only read its own submissions",
                        claims.user_id()
                    ))));
                } else {
                    claims.is_course_student(course_id_of(request))
                }
            }
            Role::Teacher => claims.is_course_teacher(course_id_of(request)),
            Role::Group => {
                claims.in_group(group_id_of(request))
                    || lists_member(request, claims.user_id())
                    || claims.is_course_teacher(course_id_of(request))
            }
            Role::Owner => self.ownership.is_owner(method, claims, request).await?,
            Role::Grader => return self.grades(claims, request).await,
        };

        Ok(if granted { Ok(()) } else { Err(None) })
    }

    /// The submission must exist, and a course named by the request must be
    /// the one it belongs to.
    async fn grades(
        &self,
        claims: &Claims,
        request: &dyn RequestMessage,
    ) -> Result<Result<(), Option<String>>, PolicyError> {
        let submission_id = submission_id_of(request);
        if submission_id == 0 {
            return Ok(Err(Some("invalid submission".to_string())));
        }
        let Some(course_id) = self.submissions.course_of(submission_id).await? else {
            return Ok(Err(Some("invalid submission".to_string())));
        };

        let claimed = course_id_of(request);
        if claimed != 0 && claimed != course_id {
            return Ok(Err(Some(format!(
                "submission {submission_id} does not belong to course {claimed}"
            ))));
        }

        Ok(if claims.is_course_teacher(course_id) {
            Ok(())
        } else {
            Err(None)
        })
    }
}

fn grants_admin(request: &dyn RequestMessage) -> bool {
    request.as_grants_admin().is_some_and(|r| r.grants_admin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{GrantsAdmin, HasCourseId, HasUserId};
    use chrono::Duration;
    use session_claims::EnrollmentStatus;

    #[derive(Debug)]
    struct UserRequest {
        user_id: u64,
        admin: bool,
    }

    impl HasUserId for UserRequest {
        fn user_id(&self) -> u64 {
            self.user_id
        }
    }

    impl GrantsAdmin for UserRequest {
        fn grants_admin(&self) -> bool {
            self.admin
        }
    }

    impl RequestMessage for UserRequest {
        fn as_user_id(&self) -> Option<&dyn HasUserId> {
            Some(self)
        }

        fn as_grants_admin(&self) -> Option<&dyn GrantsAdmin> {
            Some(self)
        }
    }

    #[derive(Debug)]
    struct CourseRequest(u64);

    impl HasCourseId for CourseRequest {
        fn course_id(&self) -> u64 {
            self.0
        }
    }

    impl RequestMessage for CourseRequest {
        fn as_course_id(&self) -> Option<&dyn HasCourseId> {
            Some(self)
        }
    }

    fn user(id: u64) -> Claims {
        Claims::issue(id, false, [], [], Duration::minutes(5))
    }

    #[tokio::test]
    async fn test_user_may_not_grant_itself_admin() {
        let policy = AccessPolicy::new(default_table().clone());
        let request = UserRequest {
            user_id: 3,
            admin: true,
        };

        let decision = policy.check("UpdateUser", &user(3), &request).await.unwrap();
        assert_eq!(
            decision,
            Decision::Deny {
                reason: "non-admin user 3 attempted to grant admin privileges".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_user_may_update_itself() {
        let policy = AccessPolicy::new(default_table().clone());
        let request = UserRequest {
            user_id: 3,
            admin: false,
        };

        let decision = policy.check("UpdateUser", &user(3), &request).await.unwrap();
        assert_eq!(decision, Decision::Allow);
    }

    #[tokio::test]
    async fn test_unlisted_method_modes() {
        let table = PolicyTable::builder().allow("CreateCourse", [Role::Admin]).build();
        let open = AccessPolicy::new(table.clone());
        let closed = AccessPolicy::new(table).with_unlisted(UnlistedMethods::Deny);

        assert_eq!(
            open.check("Ping", &user(1), &()).await.unwrap(),
            Decision::Unrestricted
        );
        assert!(!closed.check("Ping", &user(1), &()).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_authenticated_entry_is_unrestricted() {
        let policy = AccessPolicy::new(default_table().clone()).with_unlisted(UnlistedMethods::Deny);
        assert_eq!(
            policy.check("GetCourses", &user(1), &()).await.unwrap(),
            Decision::Unrestricted
        );
    }

    #[tokio::test]
    async fn test_denial_names_required_roles() {
        let policy = AccessPolicy::new(default_table().clone());
        let claims = Claims::issue(
            1,
            false,
            [(4, EnrollmentStatus::Pending)],
            [],
            Duration::minutes(5),
        );

        let decision = policy
            .check("GetEnrollmentsByCourse", &claims, &CourseRequest(4))
            .await
            .unwrap();
        assert_eq!(
            decision,
            Decision::Deny {
                reason: "requires student or teacher".to_string()
            }
        );
    }

    #[test]
    fn test_default_table_has_unique_methods() {
        assert_eq!(default_table().len(), COURSE_SERVICE_POLICY.len());
    }

    #[test]
    fn test_unlisted_methods_from_str() {
        assert_eq!("DENY".parse::<UnlistedMethods>(), Ok(UnlistedMethods::Deny));
        assert!("maybe".parse::<UnlistedMethods>().is_err());
    }
}
