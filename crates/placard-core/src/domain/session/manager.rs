//! Session manager for orchestrating session lifecycle
//!
//! Create, update and delete display sessions. Day-level changes go through
//! the [`ClaimMarketplace`](crate::domain::marketplace::ClaimMarketplace).

use super::coordinator::TransitionCoordinator;
use super::repository::{SessionRepository, SessionUpdateOutcome};
use super::session::{NewSession, Session, SessionStatus, SessionUpdate};
use crate::config::OrganizationConfig;
use crate::domain::actor::Actor;
use crate::domain::history::{HistoryAction, HistoryEntry};
use crate::domain::notification::{Audience, NotificationIntent, NotificationKind};
use crate::error::{Error, Result};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

/// Manager for session lifecycle operations
#[derive(Clone)]
pub struct SessionManager {
    coordinator: TransitionCoordinator,
    organization: OrganizationConfig,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(coordinator: TransitionCoordinator, organization: OrganizationConfig) -> Self {
        Self {
            coordinator,
            organization,
        }
    }

    /// Get the underlying repository
    pub fn repository(&self) -> &SessionRepository {
        self.coordinator.repository()
    }

    // ========== Session Lifecycle ==========

    /// Create a draft session with open days.
    ///
    /// Allowed for administrators and members of the configured creating
    /// department.
    pub async fn create(&self, actor: &Actor, spec: NewSession) -> Result<Session> {
        if !actor.is_admin() && !actor.belongs_to(&self.organization.creator_department) {
            return Err(Error::Forbidden(format!(
                "Only administrators or the {} department can create display sessions",
                self.organization.creator_department
            )));
        }
        spec.validate()?;

        let session = Session::new(actor.id, &spec, Utc::now());
        self.repository().insert(&session).await?;

        self.coordinator
            .history()
            .record(HistoryEntry::for_session(
                session.id,
                HistoryAction::Created,
                Some(actor.id),
                serde_json::json!({
                    "period": session.period,
                    "description": session.description,
                    "days": session.days.iter().map(|d| serde_json::json!({
                        "day_id": d.id,
                        "display_date": d.display_date,
                        "day_order": d.day_order,
                    })).collect::<Vec<_>>(),
                }),
            ))
            .await;

        let data = serde_json::json!({
            "session_id": session.id,
            "period": session.period,
            "days": session.days.len(),
        });
        let message = format!(
            "Display session for {} with {} day(s) is open for claims",
            session.period,
            session.days.len()
        );
        self.coordinator
            .dispatcher()
            .dispatch(vec![
                NotificationIntent::new(
                    Audience::InspectorPool,
                    NotificationKind::SessionCreated,
                    "New display session",
                    message.clone(),
                    data.clone(),
                )
                .excluding(actor.id),
                NotificationIntent::to_supervisors(
                    NotificationKind::SessionCreated,
                    "New display session",
                    message,
                    data,
                )
                .excluding(actor.id),
            ])
            .await;

        info!(
            session_id = %session.id,
            period = %session.period,
            days = session.days.len(),
            created_by = %actor.id,
            "Created display session"
        );

        Ok(session)
    }

    /// Get a session with its days
    pub async fn get(&self, session_id: Uuid) -> Result<Session> {
        self.repository()
            .get(session_id)
            .await?
            .ok_or(Error::SessionNotFound(session_id))
    }

    /// List sessions, most recent first
    pub async fn list(&self, status: Option<SessionStatus>, limit: Option<i32>) -> Result<Vec<Session>> {
        self.repository().list(status, limit).await
    }

    /// Change metadata or replace unclaimed days (administrators only)
    pub async fn update(
        &self,
        actor: &Actor,
        session_id: Uuid,
        update: SessionUpdate,
    ) -> Result<Session> {
        if !actor.is_admin() {
            return Err(Error::Forbidden(
                "Only administrators can update display sessions".to_string(),
            ));
        }
        if update.is_empty() {
            return Err(Error::InvalidArgument("Nothing to update".to_string()));
        }

        let SessionUpdateOutcome {
            session,
            status,
            kept_days,
            removed_days,
            added_days,
        } = self
            .repository()
            .update(session_id, &update, actor.id, Utc::now())
            .await?;

        let history = self.coordinator.history();
        history
            .record(HistoryEntry::for_session(
                session.id,
                HistoryAction::Updated,
                Some(actor.id),
                serde_json::json!({
                    "period": update.period,
                    "description": update.description,
                    "days": {
                        "kept": kept_days,
                        "removed": removed_days,
                        "added": added_days,
                    },
                }),
            ))
            .await;
        if status.changed() {
            history
                .record(HistoryEntry::for_session(
                    session.id,
                    HistoryAction::StatusChanged,
                    Some(actor.id),
                    serde_json::json!({
                        "status": { "from": status.previous, "to": status.current },
                    }),
                ))
                .await;
        }

        info!(
            session_id = %session.id,
            kept_days,
            removed_days,
            added_days,
            status = %session.status,
            "Updated display session"
        );

        Ok(session)
    }

    /// Delete a session and its days (administrators only).
    ///
    /// The deletion is audited before the rows are removed; if the audit
    /// write fails, nothing is deleted.
    pub async fn delete(&self, actor: &Actor, session_id: Uuid) -> Result<()> {
        if !actor.is_admin() {
            return Err(Error::Forbidden(
                "Only administrators can delete display sessions".to_string(),
            ));
        }

        let session = self.get(session_id).await?;
        let claimants = session.claimants();

        self.coordinator
            .history()
            .append(&HistoryEntry::for_session(
                session.id,
                HistoryAction::Deleted,
                Some(actor.id),
                serde_json::json!({
                    "period": session.period,
                    "status": session.status,
                    "days": session.days.len(),
                    "claimants": claimants,
                }),
            ))
            .await?;

        if !self.repository().delete(session_id).await? {
            return Err(Error::SessionNotFound(session_id));
        }

        self.coordinator
            .dispatcher()
            .dispatch(vec![
                NotificationIntent::to_users(
                    claimants,
                    NotificationKind::SessionDeleted,
                    "Display session cancelled",
                    format!(
                        "The display session for {} was deleted and your claims were removed",
                        session.period
                    ),
                    serde_json::json!({ "session_id": session.id, "period": session.period }),
                )
                .excluding(actor.id),
            ])
            .await;

        info!(session_id = %session_id, deleted_by = %actor.id, "Deleted display session");
        Ok(())
    }
}
