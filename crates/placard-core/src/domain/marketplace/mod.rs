//! Claim marketplace
//!
//! Inspectors browse claimable days and take or release slots;
//! administrators place inspectors directly. Every mutation goes through the
//! [`TransitionCoordinator`], so concurrent claims on the same day resolve to
//! exactly one winner and the loser gets `Conflict`.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::config::OrganizationConfig;
use crate::domain::actor::{Actor, Role};
use crate::domain::directory::{Directory, User};
use crate::domain::session::{Applied, Day, SlotIndex, TransitionCoordinator};
use crate::error::{Error, Result};

/// Slot-claim operations on display days
#[derive(Clone)]
pub struct ClaimMarketplace {
    coordinator: TransitionCoordinator,
    directory: Arc<dyn Directory>,
    organization: OrganizationConfig,
}

impl ClaimMarketplace {
    pub fn new(
        coordinator: TransitionCoordinator,
        directory: Arc<dyn Directory>,
        organization: OrganizationConfig,
    ) -> Self {
        Self {
            coordinator,
            directory,
            organization,
        }
    }

    // ========== Queries ==========

    /// Days still open for claims from `today` on
    pub async fn list_available(&self, today: NaiveDate) -> Result<Vec<Day>> {
        self.coordinator.repository().list_available(today).await
    }

    /// Every day the inspector holds a slot on, latest first
    pub async fn list_mine(&self, inspector_id: Uuid) -> Result<Vec<Day>> {
        self.coordinator
            .repository()
            .list_for_inspector(inspector_id)
            .await
    }

    pub async fn get_day(&self, day_id: Uuid) -> Result<Day> {
        self.coordinator
            .repository()
            .get_day(day_id)
            .await?
            .ok_or(Error::DayNotFound(day_id))
    }

    /// Active members of a department, the inspector department by default
    pub async fn list_control_users(&self, department: Option<&str>) -> Result<Vec<User>> {
        let department = department.unwrap_or(&self.organization.inspector_department);
        self.directory.list_by_department(department).await
    }

    // ========== Mutations ==========

    /// Take the first free slot on a day
    pub async fn claim(&self, day_id: Uuid, actor: &Actor) -> Result<Applied> {
        debug!(day_id = %day_id, inspector_id = %actor.id, "Claiming slot");
        let inspector_id = actor.id;
        self.coordinator
            .apply(day_id, Some(actor.id), move |day| {
                day.claim(inspector_id, Utc::now())
            })
            .await
    }

    /// Release a slot; administrators may name which one
    pub async fn unclaim(
        &self,
        day_id: Uuid,
        actor: &Actor,
        target: Option<SlotIndex>,
    ) -> Result<Applied> {
        debug!(day_id = %day_id, actor_id = %actor.id, ?target, "Releasing slot");
        self.coordinator
            .apply(day_id, Some(actor.id), |day| {
                day.unclaim(actor, target, Utc::now())
            })
            .await
    }

    /// Place an inspector into a named slot (administrators only)
    pub async fn admin_assign(
        &self,
        day_id: Uuid,
        actor: &Actor,
        inspector_id: Uuid,
        slot: SlotIndex,
    ) -> Result<Applied> {
        if !actor.is_admin() {
            return Err(Error::Forbidden(
                "Only administrators can assign inspectors".to_string(),
            ));
        }

        match self.directory.get_user(inspector_id).await? {
            Some(user) if user.active => {
                if user.role != Role::Inspector {
                    debug!(inspector_id = %inspector_id, role = %user.role, "Assigning a non-inspector user");
                }
            }
            Some(_) => {
                return Err(Error::Conflict(format!(
                    "User {} is inactive and cannot be assigned",
                    inspector_id
                )));
            }
            None => {
                return Err(Error::Conflict(format!(
                    "Inspector {} does not exist in the directory",
                    inspector_id
                )));
            }
        }

        self.coordinator
            .apply(day_id, Some(actor.id), move |day| {
                day.admin_assign(inspector_id, slot, Utc::now())
            })
            .await
    }

    /// Mark a day as completed with optional observations
    pub async fn complete(
        &self,
        day_id: Uuid,
        actor: &Actor,
        observations: Option<String>,
    ) -> Result<Applied> {
        self.coordinator
            .apply(day_id, Some(actor.id), move |day| {
                day.complete(actor, observations, Utc::now())
            })
            .await
    }
}
