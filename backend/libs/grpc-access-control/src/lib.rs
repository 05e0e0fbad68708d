//! Per-method access control for Coursegate gRPC services
//!
//! ## Core Components
//!
//! - **PolicyTable**: method name to an ordered list of accepted roles
//! - **AccessPolicy**: evaluates a call's claims and payload against the table
//! - **RequestMessage**: payload trait exposing optional capabilities
//!   (user, course, group and submission ids, member lists, validation,
//!   affected users)
//! - **OwnershipResolver**: pluggable lookup backing the `owner` role
//! - **SubmissionCourses**: pluggable lookup backing the `grader` role
//!
//! ## Usage
//!
//! ```rust
//! use chrono::Duration;
//! use grpc_access_control::{default_table, AccessPolicy, Decision};
//! use session_claims::Claims;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let policy = AccessPolicy::new(default_table().clone());
//! let claims = Claims::issue(5, false, [], [], Duration::minutes(15));
//!
//! let decision = policy.check("CreateCourse", &claims, &()).await.unwrap();
//! assert!(matches!(decision, Decision::Deny { .. }));
//! # }
//! ```

pub mod capability;
pub mod error;
pub mod ownership;
pub mod policy;
pub mod role;
pub mod submission;

pub use capability::{
    course_id_of, group_id_of, lists_member, submission_id_of, user_id_of, AffectsUsers,
    GrantsAdmin, HasCourseId, HasGroupId, HasMemberIds, HasSubmissionId, HasUserId,
    RequestMessage, ResponseMessage, Validate,
};
pub use error::PolicyError;
pub use ownership::{DenyOwnership, OwnershipResolver};
pub use policy::{
    default_table, AccessPolicy, Decision, PolicyTable, PolicyTableBuilder, UnlistedMethods,
    COURSE_SERVICE_POLICY,
};
pub use role::Role;
pub use submission::{NoSubmissions, SubmissionCourses};
