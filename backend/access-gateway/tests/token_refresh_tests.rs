//! Claims refresh integration tests
//!
//! Role changing calls flag the affected users; their next call carries a
//! reissued credential with claims computed from the store.

use std::sync::Arc;

use access_gateway::repository::{InMemoryUserRepository, UserRepository};
use access_gateway::{
    handler_fn, Body, Call, ChainBuilder, InterceptorChain, RefreshSet, TokenManager,
    TokenSettings,
};
use cookie::Cookie;
use grpc_access_control::{
    default_table, AccessPolicy, AffectsUsers, GrantsAdmin, HasCourseId, HasGroupId, HasUserId,
    RequestMessage,
};
use session_claims::{ClaimsCodec, EnrollmentStatus};
use tonic::{Code, Response, Status};

const SECRET: &str = "token-refresh-secret-Hd4Rn9Ws2Kx7Bq5M";
const ADMIN: u64 = 1;
const TEACHER: u64 = 5;
const STUDENT: u64 = 6;
const PARTNER: u64 = 8;
const COURSE: u64 = 10;
const GROUP: u64 = 20;

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
struct EnrollmentsUpdate {
    course_id: u64,
    user_ids: Vec<u64>,
}

impl HasCourseId for EnrollmentsUpdate {
    fn course_id(&self) -> u64 {
        self.course_id
    }
}

impl AffectsUsers for EnrollmentsUpdate {
    fn affected_user_ids(&self) -> Vec<u64> {
        self.user_ids.clone()
    }
}

impl RequestMessage for EnrollmentsUpdate {
    fn as_course_id(&self) -> Option<&dyn HasCourseId> {
        Some(self)
    }

    fn as_affects_users(&self) -> Option<&dyn AffectsUsers> {
        Some(self)
    }
}

#[derive(Debug)]
struct GroupRef {
    course_id: u64,
    group_id: u64,
}

impl HasCourseId for GroupRef {
    fn course_id(&self) -> u64 {
        self.course_id
    }
}

impl HasGroupId for GroupRef {
    fn group_id(&self) -> u64 {
        self.group_id
    }
}

impl RequestMessage for GroupRef {
    fn as_course_id(&self) -> Option<&dyn HasCourseId> {
        Some(self)
    }

    fn as_group_id(&self) -> Option<&dyn HasGroupId> {
        if self.group_id == 0 {
            None
        } else {
            Some(self)
        }
    }
}

#[derive(Debug)]
struct UserUpdate {
    user_id: u64,
    is_admin: bool,
}

impl HasUserId for UserUpdate {
    fn user_id(&self) -> u64 {
        self.user_id
    }
}

impl GrantsAdmin for UserUpdate {
    fn grants_admin(&self) -> bool {
        self.is_admin
    }
}

impl AffectsUsers for UserUpdate {
    fn affected_user_ids(&self) -> Vec<u64> {
        vec![self.user_id]
    }
}

impl RequestMessage for UserUpdate {
    fn as_user_id(&self) -> Option<&dyn HasUserId> {
        Some(self)
    }

    fn as_grants_admin(&self) -> Option<&dyn GrantsAdmin> {
        Some(self)
    }

    fn as_affects_users(&self) -> Option<&dyn AffectsUsers> {
        Some(self)
    }
}

/// A user update whose generated type lists no affected users.
#[derive(Debug)]
struct OpaqueUserUpdate {
    user_id: u64,
}

impl HasUserId for OpaqueUserUpdate {
    fn user_id(&self) -> u64 {
        self.user_id
    }
}

impl RequestMessage for OpaqueUserUpdate {
    fn as_user_id(&self) -> Option<&dyn HasUserId> {
        Some(self)
    }
}

#[derive(Debug)]
struct CourseRequest {
    course_id: u64,
}

impl HasCourseId for CourseRequest {
    fn course_id(&self) -> u64 {
        self.course_id
    }
}

impl RequestMessage for CourseRequest {
    fn as_course_id(&self) -> Option<&dyn HasCourseId> {
        Some(self)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

async fn seeded_repo() -> Arc<InMemoryUserRepository> {
    let repo = Arc::new(InMemoryUserRepository::new());
    repo.add_user(ADMIN, true).await;
    repo.add_user(TEACHER, false).await;
    repo.add_user(STUDENT, false).await;
    repo.add_user(PARTNER, false).await;
    repo.enroll(TEACHER, COURSE, EnrollmentStatus::Teacher).await;
    repo.enroll(STUDENT, COURSE, EnrollmentStatus::Student).await;
    repo.enroll(PARTNER, COURSE, EnrollmentStatus::Student).await;
    repo.add_group_member(GROUP, STUDENT).await;
    repo.add_group_member(GROUP, PARTNER).await;
    repo
}

async fn manager(repo: &Arc<InMemoryUserRepository>, settings: TokenSettings) -> Arc<TokenManager> {
    Arc::new(
        TokenManager::new(repo.clone(), ClaimsCodec::new(SECRET), settings)
            .await
            .unwrap(),
    )
}

fn chain(tokens: &Arc<TokenManager>) -> InterceptorChain {
    ChainBuilder::new(tokens.clone(), AccessPolicy::new(default_table().clone()))
        .build(handler_fn(|_call: Call| async move { Ok(Response::new(Body::unary(()))) }))
}

fn failing_chain(tokens: &Arc<TokenManager>) -> InterceptorChain {
    ChainBuilder::new(tokens.clone(), AccessPolicy::new(default_table().clone())).build(
        handler_fn(|_call: Call| async move {
            Err::<Response<Body>, _>(Status::failed_precondition("enrollment is locked"))
        }),
    )
}

async fn cookie_for(tokens: &TokenManager, user_id: u64) -> String {
    let (_, cookie) = tokens.new_credential(user_id).await.unwrap();
    format!("{}={}", cookie.name(), cookie.value())
}

fn call(method: &str, message: impl RequestMessage, cookie: &str) -> Call {
    Call::unary(format!("/coursegate.CourseService/{method}"), message)
        .with_metadata("cookie", cookie)
        .unwrap()
}

fn rotated(response: &Response<Body>) -> Option<Cookie<'static>> {
    response
        .metadata()
        .get("set-cookie")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Cookie::parse(value.to_string()).ok())
}

// ============================================================================
// Refresh set
// ============================================================================

#[tokio::test]
async fn test_mark_and_clear_are_idempotent() {
    let repo = seeded_repo().await;
    let tokens = manager(&repo, TokenSettings::default()).await;

    tokens.mark(STUDENT).await.unwrap();
    tokens.mark(STUDENT).await.unwrap();
    assert!(tokens.is_marked(STUDENT).await);
    assert!(repo.get_user(STUDENT).await.unwrap().needs_refresh);

    tokens.clear(STUDENT).await.unwrap();
    tokens.clear(STUDENT).await.unwrap();
    assert!(!tokens.is_marked(STUDENT).await);
    assert!(!repo.get_user(STUDENT).await.unwrap().needs_refresh);
}

#[tokio::test]
async fn test_failed_write_leaves_set_unchanged() {
    let repo = seeded_repo().await;
    let tokens = manager(&repo, TokenSettings::default()).await;

    repo.fail_writes(true);
    assert!(tokens.mark(STUDENT).await.is_err());
    assert!(!tokens.is_marked(STUDENT).await);

    repo.fail_writes(false);
    tokens.mark(STUDENT).await.unwrap();

    repo.fail_writes(true);
    assert!(tokens.clear(STUDENT).await.is_err());
    assert!(tokens.is_marked(STUDENT).await);
}

#[tokio::test]
async fn test_marks_survive_restart() {
    let repo = seeded_repo().await;
    let tokens = manager(&repo, TokenSettings::default()).await;
    tokens.mark(PARTNER).await.unwrap();

    let set = RefreshSet::load(repo.clone()).await.unwrap();
    assert!(set.contains(PARTNER).await);
    assert!(!set.contains(STUDENT).await);
    assert_eq!(set.len().await, 1);
}

// ============================================================================
// Refresh on the next call
// ============================================================================

#[tokio::test]
async fn test_marked_user_is_refreshed_once() {
    let repo = seeded_repo().await;
    let tokens = manager(&repo, TokenSettings::default()).await;
    let chain = chain(&tokens);
    let cookie = cookie_for(&tokens, STUDENT).await;

    repo.enroll(STUDENT, 11, EnrollmentStatus::Student).await;
    tokens.mark(STUDENT).await.unwrap();

    let response = chain
        .call(call("GetCourse", CourseRequest { course_id: COURSE }, &cookie))
        .await
        .unwrap();
    let fresh = rotated(&response).expect("rotated credential");
    assert!(tokens
        .claims_from_token(fresh.value())
        .unwrap()
        .is_course_student(11));
    assert!(!tokens.is_marked(STUDENT).await);

    let fresh_cookie = format!("auth={}", fresh.value());
    let response = chain
        .call(call("GetCourse", CourseRequest { course_id: COURSE }, &fresh_cookie))
        .await
        .unwrap();
    assert!(rotated(&response).is_none());
}

#[tokio::test]
async fn test_credential_inside_refresh_window_is_reissued() {
    let repo = seeded_repo().await;
    let settings = TokenSettings {
        validity: chrono::Duration::seconds(30),
        refresh_window: chrono::Duration::seconds(60),
        ..TokenSettings::default()
    };
    let tokens = manager(&repo, settings).await;
    let chain = chain(&tokens);
    let cookie = cookie_for(&tokens, TEACHER).await;

    let response = chain
        .call(call("GetCourse", CourseRequest { course_id: COURSE }, &cookie))
        .await
        .unwrap();

    assert!(rotated(&response).is_some());
}

#[tokio::test]
async fn test_failed_call_still_delivers_rotated_cookie() {
    let repo = seeded_repo().await;
    let tokens = manager(&repo, TokenSettings::default()).await;
    let chain = failing_chain(&tokens);
    let cookie = cookie_for(&tokens, STUDENT).await;
    tokens.mark(STUDENT).await.unwrap();

    let status = chain
        .call(call("GetCourse", CourseRequest { course_id: COURSE }, &cookie))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::FailedPrecondition);
    assert!(!tokens.is_marked(STUDENT).await);

    let header = status
        .metadata()
        .get("set-cookie")
        .and_then(|value| value.to_str().ok())
        .expect("rotated credential on the error");
    let fresh = Cookie::parse(header.to_string()).unwrap();
    assert_eq!(tokens.claims_from_token(fresh.value()).unwrap().user_id(), STUDENT);
}

// ============================================================================
// Role changing methods
// ============================================================================

#[tokio::test]
async fn test_update_enrollments_marks_affected_users() {
    let repo = seeded_repo().await;
    let tokens = manager(&repo, TokenSettings::default()).await;
    let chain = chain(&tokens);
    let cookie = cookie_for(&tokens, TEACHER).await;

    let update = EnrollmentsUpdate {
        course_id: COURSE,
        user_ids: vec![STUDENT, PARTNER],
    };
    chain
        .call(call("UpdateEnrollments", update, &cookie))
        .await
        .unwrap();

    assert!(tokens.is_marked(STUDENT).await);
    assert!(tokens.is_marked(PARTNER).await);
    assert!(!tokens.is_marked(TEACHER).await);
}

#[tokio::test]
async fn test_failed_handler_marks_nobody() {
    let repo = seeded_repo().await;
    let tokens = manager(&repo, TokenSettings::default()).await;
    let chain = failing_chain(&tokens);
    let cookie = cookie_for(&tokens, TEACHER).await;

    let update = EnrollmentsUpdate {
        course_id: COURSE,
        user_ids: vec![STUDENT],
    };
    let status = chain
        .call(call("UpdateEnrollments", update, &cookie))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::FailedPrecondition);
    assert!(!tokens.is_marked(STUDENT).await);
}

#[tokio::test]
async fn test_mark_failure_does_not_fail_the_call() {
    let repo = seeded_repo().await;
    let tokens = manager(&repo, TokenSettings::default()).await;
    let chain = chain(&tokens);
    let cookie = cookie_for(&tokens, TEACHER).await;

    repo.fail_writes(true);
    let update = EnrollmentsUpdate {
        course_id: COURSE,
        user_ids: vec![STUDENT],
    };
    chain
        .call(call("UpdateEnrollments", update, &cookie))
        .await
        .unwrap();

    assert!(!tokens.is_marked(STUDENT).await);
}

#[tokio::test]
async fn test_delete_group_marks_former_members() {
    let repo = seeded_repo().await;
    let tokens = manager(&repo, TokenSettings::default()).await;
    let chain = chain(&tokens);
    let cookie = cookie_for(&tokens, TEACHER).await;

    let group = GroupRef {
        course_id: COURSE,
        group_id: GROUP,
    };
    chain.call(call("DeleteGroup", group, &cookie)).await.unwrap();

    assert!(tokens.is_marked(STUDENT).await);
    assert!(tokens.is_marked(PARTNER).await);
    assert!(!tokens.is_marked(TEACHER).await);
}

#[tokio::test]
async fn test_delete_unknown_group_is_not_found() {
    let repo = seeded_repo().await;
    let tokens = manager(&repo, TokenSettings::default()).await;
    let chain = chain(&tokens);
    let cookie = cookie_for(&tokens, TEACHER).await;

    let group = GroupRef {
        course_id: COURSE,
        group_id: 404,
    };
    let status = chain
        .call(call("DeleteGroup", group, &cookie))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::NotFound);
}

#[tokio::test]
async fn test_delete_empty_group_marks_nobody() {
    let repo = seeded_repo().await;
    repo.add_group(21).await;
    let tokens = manager(&repo, TokenSettings::default()).await;
    let chain = chain(&tokens);
    let cookie = cookie_for(&tokens, TEACHER).await;

    let group = GroupRef {
        course_id: COURSE,
        group_id: 21,
    };
    chain.call(call("DeleteGroup", group, &cookie)).await.unwrap();

    assert!(repo.users_needing_refresh().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_group_without_group_is_unimplemented() {
    let repo = seeded_repo().await;
    let tokens = manager(&repo, TokenSettings::default()).await;
    let chain = chain(&tokens);
    let cookie = cookie_for(&tokens, TEACHER).await;

    let group = GroupRef {
        course_id: COURSE,
        group_id: 0,
    };
    let status = chain
        .call(call("DeleteGroup", group, &cookie))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Unimplemented);
}

#[tokio::test]
async fn test_update_user_without_affected_users_is_unimplemented() {
    let repo = seeded_repo().await;
    let tokens = manager(&repo, TokenSettings::default()).await;
    let chain = chain(&tokens);
    let cookie = cookie_for(&tokens, STUDENT).await;

    let status = chain
        .call(call("UpdateUser", OpaqueUserUpdate { user_id: STUDENT }, &cookie))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Unimplemented);
    assert!(status.message().contains("UpdateUser"));
}

#[tokio::test]
async fn test_admin_promotion_marks_promoted_user() {
    let repo = seeded_repo().await;
    let tokens = manager(&repo, TokenSettings::default()).await;
    let chain = chain(&tokens);
    let cookie = cookie_for(&tokens, ADMIN).await;

    let update = UserUpdate {
        user_id: TEACHER,
        is_admin: true,
    };
    chain.call(call("UpdateUser", update, &cookie)).await.unwrap();

    assert!(tokens.is_marked(TEACHER).await);
}

#[tokio::test]
async fn test_self_promotion_is_denied_and_marks_nobody() {
    let repo = seeded_repo().await;
    let tokens = manager(&repo, TokenSettings::default()).await;
    let chain = chain(&tokens);
    let cookie = cookie_for(&tokens, STUDENT).await;

    let update = UserUpdate {
        user_id: STUDENT,
        is_admin: true,
    };
    let status = chain
        .call(call("UpdateUser", update, &cookie))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::PermissionDenied);
    assert!(status.message().contains("grant admin"));
    assert!(!tokens.is_marked(STUDENT).await);
}

#[tokio::test]
async fn test_create_course_marks_caller() {
    let repo = seeded_repo().await;
    let tokens = manager(&repo, TokenSettings::default()).await;
    let chain = chain(&tokens);
    let cookie = cookie_for(&tokens, ADMIN).await;

    chain
        .call(call("CreateCourse", CourseRequest { course_id: 0 }, &cookie))
        .await
        .unwrap();

    assert!(tokens.is_marked(ADMIN).await);
}

#[tokio::test]
async fn test_tracking_disabled_marks_nobody() {
    let repo = seeded_repo().await;
    let tokens = manager(&repo, TokenSettings::default()).await;
    let chain = ChainBuilder::new(tokens.clone(), AccessPolicy::new(default_table().clone()))
        .with_role_change_tracking(false)
        .build(handler_fn(|_call: Call| async move { Ok(Response::new(Body::unary(()))) }));
    let cookie = cookie_for(&tokens, TEACHER).await;

    let update = EnrollmentsUpdate {
        course_id: COURSE,
        user_ids: vec![STUDENT],
    };
    chain
        .call(call("UpdateEnrollments", update, &cookie))
        .await
        .unwrap();

    assert!(!tokens.is_marked(STUDENT).await);
}
