//! Display day and its lifecycle
//!
//! A day moves `Open -> Assigned -> InProgress -> Completed` and never back
//! once it is in progress. Every transition here is pure: it mutates the
//! in-memory day and returns a [`DayTransition`] describing the history entry
//! and the notifications to emit once the change is persisted.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::slot::{Occupant, SlotIndex, Slots};
use crate::domain::actor::Actor;
use crate::domain::history::HistoryAction;
use crate::domain::notification::{Audience, NotificationIntent, NotificationKind};
use crate::error::{Error, Result};

/// Status of a display day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    /// Zero or one slot occupied
    Open,
    /// Both slots occupied
    Assigned,
    /// Display date reached with both inspectors
    InProgress,
    /// Terminal
    Completed,
}

impl DayStatus {
    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "assigned" => Some(Self::Assigned),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for DayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who completed a day, when, and how
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub completed_by: Uuid,
    pub completed_at: DateTime<Utc>,
    pub observations: Option<String>,
    /// Completed by an administrator straight from `Assigned`
    pub via_override: bool,
}

/// Lifecycle state; only the terminal state carries completion data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DayState {
    Open,
    Assigned,
    InProgress {
        started_at: DateTime<Utc>,
    },
    Completed {
        started_at: Option<DateTime<Utc>>,
        completion: Completion,
    },
}

impl DayState {
    pub fn status(&self) -> DayStatus {
        match self {
            Self::Open => DayStatus::Open,
            Self::Assigned => DayStatus::Assigned,
            Self::InProgress { .. } => DayStatus::InProgress,
            Self::Completed { .. } => DayStatus::Completed,
        }
    }
}

/// Opaque bookkeeping about the notices posted on a day
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeSeries {
    pub series: Option<String>,
    pub first_notice: Option<String>,
    pub last_notice: Option<String>,
    pub notices_from: Option<NaiveDate>,
    pub notices_to: Option<NaiveDate>,
}

/// Input describing one day of a new or updated session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDay {
    pub display_date: NaiveDate,
    pub day_order: u32,
    pub notice_count: u32,
    #[serde(default)]
    pub notices: NoticeSeries,
}

impl NewDay {
    pub fn new(display_date: NaiveDate, day_order: u32, notice_count: u32) -> Self {
        Self {
            display_date,
            day_order,
            notice_count,
            notices: NoticeSeries::default(),
        }
    }

    pub fn with_notices(mut self, notices: NoticeSeries) -> Self {
        self.notices = notices;
        self
    }

    /// Check the fields that do not depend on sibling days
    pub fn validate(&self) -> Result<()> {
        if self.day_order == 0 {
            return Err(Error::InvalidArgument(
                "Day order must be a positive number".to_string(),
            ));
        }
        if self.notice_count < 1 {
            return Err(Error::InvalidArgument(format!(
                "Day {} must post at least one notice",
                self.day_order
            )));
        }
        if let (Some(from), Some(to)) = (self.notices.notices_from, self.notices.notices_to) {
            if from > to {
                return Err(Error::InvalidArgument(format!(
                    "Day {}: notice range starts {} after it ends {}",
                    self.day_order, from, to
                )));
            }
        }
        Ok(())
    }
}

/// Result of applying a transition to a day
#[derive(Debug, Clone)]
pub struct DayTransition {
    pub action: HistoryAction,
    pub changes: serde_json::Value,
    pub intents: Vec<NotificationIntent>,
}

/// One calendar date of a session, staffed by two inspectors
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Day {
    pub id: Uuid,
    pub session_id: Uuid,
    pub display_date: NaiveDate,
    pub day_order: u32,
    pub notice_count: u32,
    pub notices: NoticeSeries,
    pub(crate) slots: Slots,
    #[serde(flatten)]
    pub(crate) state: DayState,
    /// Check-and-set token, bumped on every persisted transition
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Day {
    /// A fresh open day with both slots empty
    pub fn new(session_id: Uuid, spec: &NewDay, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            display_date: spec.display_date,
            day_order: spec.day_order,
            notice_count: spec.notice_count,
            notices: spec.notices.clone(),
            slots: Slots::empty(),
            state: DayState::Open,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> DayStatus {
        self.state.status()
    }

    pub fn state(&self) -> &DayState {
        &self.state
    }

    pub fn slots(&self) -> &Slots {
        &self.slots
    }

    pub fn completion(&self) -> Option<&Completion> {
        match &self.state {
            DayState::Completed { completion, .. } => Some(completion),
            _ => None,
        }
    }

    /// Whether the inspector holds either slot
    pub fn is_occupant(&self, inspector_id: Uuid) -> bool {
        self.slots.held_by(inspector_id).is_some()
    }

    // ========== Transitions ==========

    /// Take the first free slot
    pub fn claim(&mut self, inspector_id: Uuid, now: DateTime<Utc>) -> Result<DayTransition> {
        match self.state {
            DayState::Open => {}
            DayState::Assigned => {
                return Err(Error::Conflict(format!(
                    "Day {} already has two inspectors",
                    self.display_date
                )));
            }
            _ => return Err(Error::illegal("claim", self.status())),
        }

        if let Some(held) = self.slots.held_by(inspector_id) {
            return Err(Error::Conflict(format!(
                "Inspector already holds {} on {}",
                held, self.display_date
            )));
        }

        let slot = self.slots.first_empty().ok_or_else(|| {
            Error::Conflict(format!("Day {} has no free slot", self.display_date))
        })?;

        let from = self.status();
        self.slots.occupy(slot, Occupant::new(inspector_id, now));
        let mut intents = Vec::new();
        if self.slots.is_full() {
            self.state = DayState::Assigned;
            intents.extend(self.fully_assigned_intents());
        }
        self.updated_at = now;

        Ok(DayTransition {
            action: HistoryAction::Claimed,
            changes: self.slot_changes(slot, inspector_id, from),
            intents,
        })
    }

    /// Release a slot.
    ///
    /// Inspectors may only release their own slot. Administrators may release
    /// either; without a target they release slot 2 before slot 1.
    pub fn unclaim(
        &mut self,
        actor: &Actor,
        target: Option<SlotIndex>,
        now: DateTime<Utc>,
    ) -> Result<DayTransition> {
        if !matches!(self.state, DayState::Open | DayState::Assigned) {
            return Err(Error::illegal("unclaim", self.status()));
        }

        let slot = if actor.is_admin() {
            match target {
                Some(index) if self.slots.is_occupied(index) => index,
                Some(index) => {
                    return Err(Error::Conflict(format!(
                        "{} on {} is already empty",
                        index, self.display_date
                    )));
                }
                None => self.slots.last_occupied().ok_or_else(|| {
                    Error::Conflict(format!("Day {} has no occupied slot", self.display_date))
                })?,
            }
        } else {
            let own = self.slots.held_by(actor.id).ok_or_else(|| {
                Error::Forbidden(
                    "Only the inspector holding a slot or an administrator can release it"
                        .to_string(),
                )
            })?;
            if target.is_some_and(|index| index != own) {
                return Err(Error::Forbidden(
                    "Inspectors can only release their own slot".to_string(),
                ));
            }
            own
        };

        let from = self.status();
        let released = self.slots.vacate(slot).ok_or_else(|| {
            Error::Conflict(format!("{} on {} is already empty", slot, self.display_date))
        })?;
        self.state = DayState::Open;
        self.updated_at = now;

        let mut intents = Vec::new();
        if from == DayStatus::Assigned {
            intents.push(
                NotificationIntent::to_supervisors(
                    NotificationKind::SlotReleased,
                    "Slot released",
                    format!(
                        "A slot on {} was released and the day needs another inspector",
                        self.display_date
                    ),
                    self.data(),
                )
                .excluding(actor.id),
            );
        }
        if released.inspector_id != actor.id {
            intents.push(NotificationIntent::to_users(
                vec![released.inspector_id],
                NotificationKind::ClaimRevoked,
                "Claim removed",
                format!(
                    "An administrator removed you from {} on {}",
                    slot, self.display_date
                ),
                self.data(),
            ));
        }

        Ok(DayTransition {
            action: HistoryAction::Unclaimed,
            changes: self.slot_changes(slot, released.inspector_id, from),
            intents,
        })
    }

    /// Place an inspector into a named slot. Authorization is checked by the caller.
    pub fn admin_assign(
        &mut self,
        inspector_id: Uuid,
        slot: SlotIndex,
        now: DateTime<Utc>,
    ) -> Result<DayTransition> {
        match self.state {
            DayState::Open => {}
            DayState::Assigned => {
                return Err(Error::Conflict(format!(
                    "Day {} already has two inspectors",
                    self.display_date
                )));
            }
            _ => return Err(Error::illegal("assign", self.status())),
        }

        if self.slots.is_occupied(slot) {
            return Err(Error::Conflict(format!(
                "{} on {} is already occupied",
                slot, self.display_date
            )));
        }
        if let Some(held) = self.slots.held_by(inspector_id) {
            return Err(Error::Conflict(format!(
                "Inspector already holds {} on {}",
                held, self.display_date
            )));
        }

        let from = self.status();
        self.slots.occupy(slot, Occupant::new(inspector_id, now));
        let mut intents = vec![NotificationIntent::to_users(
            vec![inspector_id],
            NotificationKind::AssignedBySupervisor,
            "You were assigned",
            format!("You were assigned to {} on {}", slot, self.display_date),
            self.data(),
        )];
        if self.slots.is_full() {
            self.state = DayState::Assigned;
            intents.extend(self.fully_assigned_intents());
        }
        self.updated_at = now;

        Ok(DayTransition {
            action: HistoryAction::AdminAssigned,
            changes: self.slot_changes(slot, inspector_id, from),
            intents,
        })
    }

    /// Move a fully staffed day into execution on its display date
    pub fn promote(&mut self, today: NaiveDate, now: DateTime<Utc>) -> Result<DayTransition> {
        if self.state != DayState::Assigned {
            return Err(Error::illegal("promote", self.status()));
        }
        if self.display_date != today {
            return Err(Error::InvalidArgument(format!(
                "Day is displayed on {}, not {}",
                self.display_date, today
            )));
        }

        self.state = DayState::InProgress { started_at: now };
        self.updated_at = now;

        let intents = vec![
            NotificationIntent::to_users(
                self.slots.inspector_ids(),
                NotificationKind::ExecutionDay,
                "Your display day has arrived",
                format!(
                    "Today ({}) you post {} notice(s)",
                    self.display_date, self.notice_count
                ),
                self.data(),
            ),
            NotificationIntent::new(
                Audience::DispatchOn(self.display_date),
                NotificationKind::DispatchUnavailable,
                "Vehicle unavailable",
                format!(
                    "A vehicle is reserved for notice display on {}",
                    self.display_date
                ),
                self.data(),
            ),
        ];

        Ok(DayTransition {
            action: HistoryAction::Promoted,
            changes: serde_json::json!({
                "status": { "from": DayStatus::Assigned, "to": DayStatus::InProgress },
                "started_at": now,
            }),
            intents,
        })
    }

    /// Close the day. Administrators may also complete an assigned day.
    pub fn complete(
        &mut self,
        actor: &Actor,
        observations: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<DayTransition> {
        if let DayState::Completed { .. } = self.state {
            return Err(Error::illegal("complete", self.status()));
        }
        if !self.is_occupant(actor.id) && !actor.is_admin() {
            return Err(Error::Forbidden(
                "Only an assigned inspector or an administrator can complete a day".to_string(),
            ));
        }

        let from = self.status();
        let (started_at, via_override) = match self.state {
            DayState::InProgress { started_at } => (Some(started_at), false),
            DayState::Assigned if actor.is_admin() => (None, true),
            _ => return Err(Error::illegal("complete", from)),
        };

        let observations = observations
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty());
        let completion = Completion {
            completed_by: actor.id,
            completed_at: now,
            observations,
            via_override,
        };
        let changes = serde_json::json!({
            "status": { "from": from, "to": DayStatus::Completed },
            "observations": completion.observations,
            "via_override": via_override,
        });
        self.state = DayState::Completed {
            started_at,
            completion,
        };
        self.updated_at = now;

        let intents = vec![
            NotificationIntent::to_supervisors(
                NotificationKind::DayCompleted,
                "Display day completed",
                format!("Display on {} was completed", self.display_date),
                self.data(),
            )
            .excluding(actor.id),
        ];

        Ok(DayTransition {
            action: if via_override {
                HistoryAction::CompleteOverride
            } else {
                HistoryAction::Completed
            },
            changes,
            intents,
        })
    }

    // ========== Helpers ==========

    /// Notification payload identifying this day
    pub fn data(&self) -> serde_json::Value {
        serde_json::json!({
            "day_id": self.id,
            "session_id": self.session_id,
            "display_date": self.display_date,
            "day_order": self.day_order,
        })
    }

    fn fully_assigned_intents(&self) -> Vec<NotificationIntent> {
        let occupants = self.slots.inspector_ids();
        let message = format!("Both slots on {} are now taken", self.display_date);
        let supervisors = occupants.iter().fold(
            NotificationIntent::to_supervisors(
                NotificationKind::DayFullyAssigned,
                "Day fully assigned",
                message.clone(),
                self.data(),
            ),
            |intent, id| intent.excluding(*id),
        );

        vec![
            NotificationIntent::to_users(
                occupants,
                NotificationKind::DayFullyAssigned,
                "Day fully assigned",
                message,
                self.data(),
            ),
            supervisors,
        ]
    }

    fn slot_changes(&self, slot: SlotIndex, inspector_id: Uuid, from: DayStatus) -> serde_json::Value {
        serde_json::json!({
            "slot": slot.number(),
            "inspector_id": inspector_id,
            "status": { "from": from, "to": self.status() },
        })
    }
}
