//! Identity and role context supplied with every call
//!
//! Authentication happens outside the core; callers hand in an already
//! resolved [`Actor`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Role of a user within the organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Inspector,
    Staff,
}

impl Role {
    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "manager" => Some(Self::Manager),
            "inspector" => Some(Self::Inspector),
            "staff" => Some(Self::Staff),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Inspector => "inspector",
            Self::Staff => "staff",
        }
    }

    /// Roles that receive supervisory notifications
    pub fn is_supervisor(&self) -> bool {
        matches!(self, Self::Admin | Self::Manager)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The caller of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
    pub department: Option<String>,
}

impl Actor {
    pub fn new(id: Uuid, role: Role, department: Option<String>) -> Self {
        Self {
            id,
            role,
            department,
        }
    }

    pub fn admin(id: Uuid) -> Self {
        Self::new(id, Role::Admin, None)
    }

    pub fn inspector(id: Uuid, department: impl Into<String>) -> Self {
        Self::new(id, Role::Inspector, Some(department.into()))
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Case-insensitive department membership
    pub fn belongs_to(&self, department: &str) -> bool {
        self.department
            .as_deref()
            .is_some_and(|own| own.trim().eq_ignore_ascii_case(department.trim()))
    }
}
