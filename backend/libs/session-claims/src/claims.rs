//! Session Claims
//!
//! The identity and role payload carried inside a session credential.
//! Claims are recomputed from the user store whenever a credential is issued
//! and are never edited afterwards: a refresh always produces a new value.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Issuer written into every credential and required when parsing one.
pub const ISSUER: &str = "Coursegate";

/// A user's status in a single course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    None,
    Pending,
    Student,
    Teacher,
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnrollmentStatus::None => "none",
            EnrollmentStatus::Pending => "pending",
            EnrollmentStatus::Student => "student",
            EnrollmentStatus::Teacher => "teacher",
        };
        f.write_str(s)
    }
}

/// Claims embedded in a signed session credential
///
/// ## Design Notes
///
/// - Fields are private; the only way to build claims for signing is
///   [`Claims::issue`], which stamps `iat` and derives `exp` from it
/// - Course and group collections are ordered so two claims built from the
///   same store state compare equal regardless of query order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    user_id: u64,
    admin: bool,
    #[serde(default)]
    courses: BTreeMap<u64, EnrollmentStatus>,
    #[serde(default)]
    groups: BTreeSet<u64>,
    iss: String,
    iat: i64,
    exp: i64,
}

impl Claims {
    /// Issue claims valid for `validity`, starting now.
    pub fn issue(
        user_id: u64,
        admin: bool,
        courses: impl IntoIterator<Item = (u64, EnrollmentStatus)>,
        groups: impl IntoIterator<Item = u64>,
        validity: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            admin,
            courses: courses.into_iter().collect(),
            groups: groups.into_iter().filter(|id| *id != 0).collect(),
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + validity).timestamp(),
        }
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn courses(&self) -> &BTreeMap<u64, EnrollmentStatus> {
        &self.courses
    }

    pub fn groups(&self) -> &BTreeSet<u64> {
        &self.groups
    }

    pub fn issuer(&self) -> &str {
        &self.iss
    }

    /// Issued-at as a Unix timestamp.
    pub fn issued_at(&self) -> i64 {
        self.iat
    }

    /// Expiry as a Unix timestamp.
    pub fn expires_at(&self) -> i64 {
        self.exp
    }

    /// Expiry as a UTC date-time (falls back to the epoch for out-of-range values).
    pub fn expires_at_utc(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or_default()
    }

    /// Time left before expiry, negative once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        Duration::seconds(self.exp - now.timestamp())
    }

    /// Enrollment status in `course_id`; course `0` is never enrolled.
    pub fn enrollment(&self, course_id: u64) -> Option<EnrollmentStatus> {
        if course_id == 0 {
            return None;
        }
        self.courses.get(&course_id).copied()
    }

    pub fn is_course_student(&self, course_id: u64) -> bool {
        self.enrollment(course_id) == Some(EnrollmentStatus::Student)
    }

    pub fn is_course_teacher(&self, course_id: u64) -> bool {
        self.enrollment(course_id) == Some(EnrollmentStatus::Teacher)
    }

    /// True if the claims' user is the subject `user_id` (never for `0`).
    pub fn same_user(&self, user_id: u64) -> bool {
        user_id != 0 && self.user_id == user_id
    }

    /// True if the claims' user belongs to `group_id` (never for `0`).
    pub fn in_group(&self, group_id: u64) -> bool {
        group_id != 0 && self.groups.contains(&group_id)
    }
}

impl fmt::Display for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserID: {}", self.user_id)?;
        if self.admin {
            f.write_str(" (admin)")?;
        }
        write!(f, ": Courses: {{")?;
        for (i, (course, status)) in self.courses.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{course}: {status}")?;
        }
        write!(f, "}}, Groups: {:?}", self.groups)
    }
}
