//! Inspector directory and work-schedule lookup
//!
//! The core only talks to these collaborators through the [`Directory`] and
//! [`WorkSchedule`] traits. [`SqliteDirectory`] is the bundled implementation
//! backed by the `users` and `schedule_assignments` tables.

pub mod repository;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::actor::{Actor, Role};
use crate::error::Result;

pub use repository::SqliteDirectory;

/// A person known to the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub department: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: impl Into<String>, role: Role, department: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            role,
            department,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Identity context for calls made by this user
    pub fn actor(&self) -> Actor {
        Actor::new(self.id, self.role, self.department.clone())
    }
}

/// Lookup of users by id, department or role
#[async_trait]
pub trait Directory: Send + Sync {
    /// Get a user by ID, active or not
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;

    /// Active users of a department (case-insensitive match)
    async fn list_by_department(&self, department: &str) -> Result<Vec<User>>;

    /// Active users holding any of the given roles
    async fn list_by_roles(&self, roles: &[Role]) -> Result<Vec<User>>;
}

/// Who works on which date
#[async_trait]
pub trait WorkSchedule: Send + Sync {
    /// Active users of a department scheduled to work on the date
    async fn scheduled_on(&self, department: &str, date: NaiveDate) -> Result<Vec<Uuid>>;
}
