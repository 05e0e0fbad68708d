//! Request capabilities
//!
//! Request payloads are plain generated message types. A payload opts into
//! policy checks by exposing identifiers through small capability traits and
//! returning itself from the matching `as_*` accessor on [`RequestMessage`].
//!
//! ```rust
//! use grpc_access_control::{course_id_of, HasCourseId, RequestMessage};
//!
//! #[derive(Debug)]
//! struct GetAssignmentsRequest {
//!     course_id: u64,
//! }
//!
//! impl HasCourseId for GetAssignmentsRequest {
//!     fn course_id(&self) -> u64 {
//!         self.course_id
//!     }
//! }
//!
//! impl RequestMessage for GetAssignmentsRequest {
//!     fn as_course_id(&self) -> Option<&dyn HasCourseId> {
//!         Some(self)
//!     }
//! }
//!
//! assert_eq!(course_id_of(&GetAssignmentsRequest { course_id: 3 }), 3);
//! ```

use std::any::Any;
use std::fmt::Debug;

pub trait HasUserId {
    fn user_id(&self) -> u64;
}

pub trait HasCourseId {
    fn course_id(&self) -> u64;
}

pub trait HasGroupId {
    fn group_id(&self) -> u64;
}

pub trait HasSubmissionId {
    fn submission_id(&self) -> u64;
}

/// Members listed in the payload itself, such as a group being created.
pub trait HasMemberIds {
    fn member_ids(&self) -> Vec<u64>;
}

/// Structural validity of a payload, checked before any handler runs.
pub trait Validate {
    fn is_valid(&self) -> bool;
}

/// Users whose roles change when the request succeeds.
pub trait AffectsUsers {
    fn affected_user_ids(&self) -> Vec<u64>;
}

/// Requests that can grant the admin flag.
pub trait GrantsAdmin {
    fn grants_admin(&self) -> bool;
}

/// An incoming request payload.
///
/// Every accessor defaults to `None`; payloads override the ones they support.
pub trait RequestMessage: Any + Debug + Send + Sync {
    fn as_user_id(&self) -> Option<&dyn HasUserId> {
        None
    }

    fn as_course_id(&self) -> Option<&dyn HasCourseId> {
        None
    }

    fn as_group_id(&self) -> Option<&dyn HasGroupId> {
        None
    }

    fn as_submission_id(&self) -> Option<&dyn HasSubmissionId> {
        None
    }

    fn as_member_ids(&self) -> Option<&dyn HasMemberIds> {
        None
    }

    fn as_validate(&self) -> Option<&dyn Validate> {
        None
    }

    fn as_affects_users(&self) -> Option<&dyn AffectsUsers> {
        None
    }

    fn as_grants_admin(&self) -> Option<&dyn GrantsAdmin> {
        None
    }

    /// Short type name for logs.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or("unknown")
    }
}

/// An outgoing response payload.
pub trait ResponseMessage: Any + Debug + Send + Sync {
    /// Strip remote provider identities before the response leaves the server.
    fn remove_remote_id(&mut self) {}
}

impl RequestMessage for () {}

impl ResponseMessage for () {}

pub fn user_id_of(request: &dyn RequestMessage) -> u64 {
    request.as_user_id().map_or(0, |r| r.user_id())
}

pub fn course_id_of(request: &dyn RequestMessage) -> u64 {
    request.as_course_id().map_or(0, |r| r.course_id())
}

pub fn group_id_of(request: &dyn RequestMessage) -> u64 {
    request.as_group_id().map_or(0, |r| r.group_id())
}

pub fn submission_id_of(request: &dyn RequestMessage) -> u64 {
    request.as_submission_id().map_or(0, |r| r.submission_id())
}

/// True if the payload lists `user_id` among its members.
pub fn lists_member(request: &dyn RequestMessage, user_id: u64) -> bool {
    user_id != 0
        && request
            .as_member_ids()
            .is_some_and(|r| r.member_ids().contains(&user_id))
}
