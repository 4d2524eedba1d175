//! History entry types for the audit trail
//!
//! Every mutating operation appends one entry. Entries are never updated or
//! deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of entity a history entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Session,
    Day,
}

impl EntityType {
    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "session" => Some(Self::Session),
            "day" => Some(Self::Day),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Day => "day",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What happened to the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    /// Session was created with its days
    Created,
    /// Session metadata or day set was changed
    Updated,
    /// Session was deleted (recorded before removal)
    Deleted,
    /// Cached session status was recomputed to a new value
    StatusChanged,
    /// Inspector claimed a slot
    Claimed,
    /// A slot was released
    Unclaimed,
    /// Administrator placed an inspector in a slot
    AdminAssigned,
    /// Day moved into execution on its display date
    Promoted,
    /// Day completed after execution
    Completed,
    /// Administrator completed a day that never entered execution
    CompleteOverride,
    /// Day reached its display date without two inspectors
    UnstaffedFlagged,
}

impl HistoryAction {
    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "deleted" => Some(Self::Deleted),
            "status_changed" => Some(Self::StatusChanged),
            "claimed" => Some(Self::Claimed),
            "unclaimed" => Some(Self::Unclaimed),
            "admin_assigned" => Some(Self::AdminAssigned),
            "promoted" => Some(Self::Promoted),
            "completed" => Some(Self::Completed),
            "complete_override" => Some(Self::CompleteOverride),
            "unstaffed_flagged" => Some(Self::UnstaffedFlagged),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::StatusChanged => "status_changed",
            Self::Claimed => "claimed",
            Self::Unclaimed => "unclaimed",
            Self::AdminAssigned => "admin_assigned",
            Self::Promoted => "promoted",
            Self::Completed => "completed",
            Self::CompleteOverride => "complete_override",
            Self::UnstaffedFlagged => "unstaffed_flagged",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One audit trail record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique entry identifier
    pub id: Uuid,

    pub entity_type: EntityType,

    pub entity_id: Uuid,

    pub action: HistoryAction,

    /// Acting user; `None` for the daily transition process
    pub actor_id: Option<Uuid>,

    /// Before/after values or other context (JSON object)
    pub changes: serde_json::Value,

    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Create a new history entry
    pub fn new(
        entity_type: EntityType,
        entity_id: Uuid,
        action: HistoryAction,
        actor_id: Option<Uuid>,
        changes: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type,
            entity_id,
            action,
            actor_id,
            changes,
            created_at: Utc::now(),
        }
    }

    /// Entry describing a day
    pub fn for_day(
        day_id: Uuid,
        action: HistoryAction,
        actor_id: Option<Uuid>,
        changes: serde_json::Value,
    ) -> Self {
        Self::new(EntityType::Day, day_id, action, actor_id, changes)
    }

    /// Entry describing a session
    pub fn for_session(
        session_id: Uuid,
        action: HistoryAction,
        actor_id: Option<Uuid>,
        changes: serde_json::Value,
    ) -> Self {
        Self::new(EntityType::Session, session_id, action, actor_id, changes)
    }
}
