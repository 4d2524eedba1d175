//! Resolves intent audiences and hands messages to the sink
//!
//! Dispatch happens after the producing transition is committed. Failures are
//! logged and counted, never returned.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use super::intent::{Audience, NotificationIntent};
use super::sink::NotificationSink;
use crate::config::OrganizationConfig;
use crate::domain::actor::Role;
use crate::domain::directory::{Directory, WorkSchedule};
use crate::error::Result;

/// Outcome of dispatching a batch of intents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Intents handed to the sink
    pub delivered: usize,
    /// Intents skipped because nobody was left to notify
    pub empty: usize,
    /// Intents whose audience lookup or delivery failed
    pub failed: usize,
}

impl DispatchReport {
    pub fn merge(&mut self, other: DispatchReport) {
        self.delivered += other.delivered;
        self.empty += other.empty;
        self.failed += other.failed;
    }
}

/// Delivers notification intents
#[derive(Clone)]
pub struct NotificationDispatcher {
    sink: Arc<dyn NotificationSink>,
    directory: Arc<dyn Directory>,
    schedule: Arc<dyn WorkSchedule>,
    organization: OrganizationConfig,
}

impl NotificationDispatcher {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        directory: Arc<dyn Directory>,
        schedule: Arc<dyn WorkSchedule>,
        organization: OrganizationConfig,
    ) -> Self {
        Self {
            sink,
            directory,
            schedule,
            organization,
        }
    }

    /// Deliver every intent, in order
    pub async fn dispatch(&self, intents: Vec<NotificationIntent>) -> DispatchReport {
        let mut report = DispatchReport::default();

        for intent in intents {
            let recipients = match self.resolve(&intent).await {
                Ok(recipients) => recipients,
                Err(e) => {
                    warn!(kind = %intent.kind, error = %e, "Failed to resolve notification audience");
                    report.failed += 1;
                    continue;
                }
            };

            if recipients.is_empty() {
                debug!(kind = %intent.kind, "No recipients left for notification");
                report.empty += 1;
                continue;
            }

            let mut data = intent.data.clone();
            if let Some(object) = data.as_object_mut() {
                object.insert(
                    "kind".to_string(),
                    serde_json::Value::String(intent.kind.as_str().to_string()),
                );
            }

            match self
                .sink
                .notify(&recipients, &intent.title, &intent.message, &data)
                .await
            {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        kind = %intent.kind,
                        recipients = recipients.len(),
                        error = %e,
                        "Notification delivery failed"
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Expand the audience, drop excluded users and duplicates
    async fn resolve(&self, intent: &NotificationIntent) -> Result<Vec<Uuid>> {
        let candidates: Vec<Uuid> = match &intent.audience {
            Audience::Users(users) => users.clone(),
            Audience::InspectorPool => self
                .directory
                .list_by_department(&self.organization.inspector_department)
                .await?
                .into_iter()
                .map(|u| u.id)
                .collect(),
            Audience::Supervisors => self
                .directory
                .list_by_roles(&[Role::Admin, Role::Manager])
                .await?
                .into_iter()
                .map(|u| u.id)
                .collect(),
            Audience::DispatchOn(date) => {
                self.schedule
                    .scheduled_on(&self.organization.dispatch_department, *date)
                    .await?
            }
        };

        let mut seen = HashSet::new();
        Ok(candidates
            .into_iter()
            .filter(|id| !intent.exclude.contains(id))
            .filter(|id| seen.insert(*id))
            .collect())
    }
}
