//! Notification intents produced by transitions

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SessionCreated,
    SessionDeleted,
    SessionCompleted,
    DayFullyAssigned,
    SlotReleased,
    ClaimRevoked,
    AssignedBySupervisor,
    ExecutionDay,
    DispatchUnavailable,
    DayCompleted,
    DayUnstaffed,
}

impl NotificationKind {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionCreated => "session_created",
            Self::SessionDeleted => "session_deleted",
            Self::SessionCompleted => "session_completed",
            Self::DayFullyAssigned => "day_fully_assigned",
            Self::SlotReleased => "slot_released",
            Self::ClaimRevoked => "claim_revoked",
            Self::AssignedBySupervisor => "assigned_by_supervisor",
            Self::ExecutionDay => "execution_day",
            Self::DispatchUnavailable => "dispatch_unavailable",
            Self::DayCompleted => "day_completed",
            Self::DayUnstaffed => "day_unstaffed",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who should receive a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum Audience {
    /// Specific users
    Users(Vec<Uuid>),
    /// Active members of the inspector department
    InspectorPool,
    /// Active administrators and managers
    Supervisors,
    /// Dispatch department personnel scheduled on the date
    DispatchOn(NaiveDate),
}

/// A notification to deliver once the transition that produced it is committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub audience: Audience,
    /// Users removed from the resolved audience
    pub exclude: Vec<Uuid>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
}

impl NotificationIntent {
    pub fn new(
        audience: Audience,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            audience,
            exclude: Vec::new(),
            kind,
            title: title.into(),
            message: message.into(),
            data,
        }
    }

    /// Drop a user from the resolved audience
    pub fn excluding(mut self, user_id: Uuid) -> Self {
        if !self.exclude.contains(&user_id) {
            self.exclude.push(user_id);
        }
        self
    }

    pub fn to_users(
        users: Vec<Uuid>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self::new(Audience::Users(users), kind, title, message, data)
    }

    pub fn to_supervisors(
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self::new(Audience::Supervisors, kind, title, message, data)
    }
}
