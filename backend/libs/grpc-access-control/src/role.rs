//! Roles a policy entry may accept.

use std::fmt;
use std::str::FromStr;

use crate::error::PolicyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Caller holds the admin flag
    Admin,
    /// Caller is the subject user of the request
    User,
    /// Caller is enrolled as a student in the request's course
    Student,
    /// Caller asks for its own work as a student of the request's course,
    /// and the request names no group
    Submitter,
    /// Caller is enrolled as a teacher in the request's course
    Teacher,
    /// Caller belongs to the request's group, is listed among the payload's
    /// members, or teaches the request's course
    Group,
    /// Caller created the resource the request refers to
    Owner,
    /// Caller teaches the course the request's submission belongs to
    Grader,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Student => "student",
            Role::Submitter => "submitter",
            Role::Teacher => "teacher",
            Role::Group => "group",
            Role::Owner => "owner",
            Role::Grader => "grader",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            "student" => Ok(Role::Student),
            "submitter" => Ok(Role::Submitter),
            "teacher" => Ok(Role::Teacher),
            "group" => Ok(Role::Group),
            "owner" => Ok(Role::Owner),
            "grader" => Ok(Role::Grader),
            other => Err(PolicyError::UnknownRole(other.to_string())),
        }
    }
}
