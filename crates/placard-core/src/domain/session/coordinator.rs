//! Runs a day transition as one logical unit
//!
//! Load the day, apply the pure transition, commit it together with the
//! session status, then audit and notify. If the commit fails nothing else
//! happens; once it succeeds, audit and notification failures are logged and
//! never undo it.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::day::{Day, DayTransition};
use super::repository::{SessionRepository, StatusChange};
use super::session::SessionStatus;
use crate::domain::history::{HistoryAction, HistoryEntry, HistoryRepository};
use crate::domain::notification::{
    DispatchReport, NotificationDispatcher, NotificationIntent, NotificationKind,
};
use crate::error::{Error, Result};

/// A committed day transition
#[derive(Debug, Clone)]
pub struct Applied {
    /// The day as persisted
    pub day: Day,
    pub action: HistoryAction,
    pub status: StatusChange,
    pub notifications: DispatchReport,
}

/// Applies day transitions with check-and-set persistence
#[derive(Clone)]
pub struct TransitionCoordinator {
    repository: SessionRepository,
    history: HistoryRepository,
    dispatcher: NotificationDispatcher,
}

impl TransitionCoordinator {
    pub fn new(
        repository: SessionRepository,
        history: HistoryRepository,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            repository,
            history,
            dispatcher,
        }
    }

    pub fn repository(&self) -> &SessionRepository {
        &self.repository
    }

    pub fn history(&self) -> &HistoryRepository {
        &self.history
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Load a day and apply a transition to it
    pub async fn apply<F>(&self, day_id: Uuid, actor_id: Option<Uuid>, transition: F) -> Result<Applied>
    where
        F: FnOnce(&mut Day) -> Result<DayTransition> + Send,
    {
        let day = self
            .repository
            .get_day(day_id)
            .await?
            .ok_or(Error::DayNotFound(day_id))?;
        self.apply_to(day, actor_id, transition).await
    }

    /// Apply a transition to an already loaded snapshot.
    ///
    /// The snapshot's version is the check-and-set precondition, so a stale
    /// snapshot yields `Conflict`.
    pub async fn apply_to<F>(&self, mut day: Day, actor_id: Option<Uuid>, transition: F) -> Result<Applied>
    where
        F: FnOnce(&mut Day) -> Result<DayTransition> + Send,
    {
        let expected = day.status();
        let DayTransition {
            action,
            changes,
            mut intents,
        } = transition(&mut day)?;

        let status = self
            .repository
            .commit_day_transition(&mut day, expected, actor_id)
            .await?;

        self.history
            .record(HistoryEntry::for_day(day.id, action, actor_id, changes))
            .await;

        if status.changed() {
            self.history
                .record(HistoryEntry::for_session(
                    status.session_id,
                    HistoryAction::StatusChanged,
                    actor_id,
                    serde_json::json!({
                        "status": { "from": status.previous, "to": status.current },
                        "day_id": day.id,
                    }),
                ))
                .await;

            if status.current == SessionStatus::Completed {
                intents.push(NotificationIntent::to_supervisors(
                    NotificationKind::SessionCompleted,
                    "Display session completed",
                    "Every day of the display session has been completed",
                    serde_json::json!({
                        "session_id": status.session_id,
                        "completed_at": Utc::now(),
                    }),
                ));
            }
        }

        let notifications = self.dispatcher.dispatch(intents).await;

        info!(
            day_id = %day.id,
            session_id = %day.session_id,
            action = %action,
            day_status = %day.status(),
            session_status = %status.current,
            version = day.version,
            "Day transition committed"
        );

        Ok(Applied {
            day,
            action,
            status,
            notifications,
        })
    }
}
