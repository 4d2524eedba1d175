//! The daily transition run
//!
//! Promotes fully staffed days displayed today and flags the ones that are
//! still open. Running it twice for the same date changes nothing the second
//! time.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::history::{EntityType, HistoryAction, HistoryEntry};
use crate::domain::notification::{DispatchReport, NotificationIntent, NotificationKind};
use crate::domain::session::{Day, DayStatus, TransitionCoordinator};
use crate::error::{Error, Result};

/// A day the run could not process
#[derive(Debug, Clone, Serialize)]
pub struct DayFailure {
    pub day_id: Uuid,
    pub error: String,
}

/// Outcome of one run
#[derive(Debug, Clone, Serialize)]
pub struct TransitionReport {
    pub date: NaiveDate,
    /// Days moved to in progress by this run
    pub promoted: Vec<Uuid>,
    /// Days another writer changed first
    pub skipped: Vec<Uuid>,
    /// Days displayed today without two inspectors
    pub unstaffed: Vec<Uuid>,
    pub failures: Vec<DayFailure>,
    #[serde(skip)]
    pub notifications: DispatchReport,
}

impl TransitionReport {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            promoted: Vec::new(),
            skipped: Vec::new(),
            unstaffed: Vec::new(),
            failures: Vec::new(),
            notifications: DispatchReport::default(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Promotes the days due on a date
#[derive(Clone)]
pub struct DailyTransitionJob {
    coordinator: TransitionCoordinator,
}

impl DailyTransitionJob {
    pub fn new(coordinator: TransitionCoordinator) -> Self {
        Self { coordinator }
    }

    /// Run for the given civil date
    pub async fn run(&self, today: NaiveDate) -> Result<TransitionReport> {
        let due = self
            .coordinator
            .repository()
            .list_due(today, DayStatus::Assigned)
            .await?;
        self.run_with(today, due).await
    }

    /// Promote the given snapshots, then flag whatever is open on the date
    pub(crate) async fn run_with(&self, today: NaiveDate, due: Vec<Day>) -> Result<TransitionReport> {
        let repository = self.coordinator.repository();
        let mut report = TransitionReport::new(today);

        for day in due {
            let day_id = day.id;
            match self
                .coordinator
                .apply_to(day, None, |d| d.promote(today, Utc::now()))
                .await
            {
                Ok(applied) => {
                    report.promoted.push(day_id);
                    report.notifications.merge(applied.notifications);
                }
                Err(Error::Conflict(_)) | Err(Error::IllegalStateTransition { .. }) => {
                    info!(day_id = %day_id, "Day changed before promotion, skipping");
                    report.skipped.push(day_id);
                }
                Err(e) => {
                    error!(day_id = %day_id, error = %e, "Failed to promote day");
                    report.failures.push(DayFailure {
                        day_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        // Listed after promotion so days unclaimed mid-run are still flagged
        let open = repository.list_due(today, DayStatus::Open).await?;
        for day in open {
            report.unstaffed.push(day.id);
            if let Err(e) = self.flag_unstaffed(&day, &mut report.notifications).await {
                error!(day_id = %day.id, error = %e, "Failed to flag unstaffed day");
                report.failures.push(DayFailure {
                    day_id: day.id,
                    error: e.to_string(),
                });
            }
        }

        info!(
            date = %today,
            promoted = report.promoted.len(),
            skipped = report.skipped.len(),
            unstaffed = report.unstaffed.len(),
            failures = report.failures.len(),
            "Daily transition run finished"
        );

        Ok(report)
    }

    /// Warn about an open day on its date, once per day
    async fn flag_unstaffed(&self, day: &Day, notifications: &mut DispatchReport) -> Result<()> {
        let history = self.coordinator.history();
        if history
            .exists(EntityType::Day, day.id, HistoryAction::UnstaffedFlagged)
            .await?
        {
            return Ok(());
        }

        let occupied = day.slots().occupied_count();
        warn!(
            day_id = %day.id,
            session_id = %day.session_id,
            display_date = %day.display_date,
            occupied,
            "Display day reached its date without two inspectors"
        );

        history
            .append(&HistoryEntry::for_day(
                day.id,
                HistoryAction::UnstaffedFlagged,
                None,
                serde_json::json!({ "display_date": day.display_date, "occupied": occupied }),
            ))
            .await?;

        let report = self
            .coordinator
            .dispatcher()
            .dispatch(vec![NotificationIntent::to_supervisors(
                NotificationKind::DayUnstaffed,
                "Display day not staffed",
                format!(
                    "The display on {} has {} of 2 inspectors and was not started",
                    day.display_date, occupied
                ),
                day.data(),
            )])
            .await;
        notifications.merge(report);

        Ok(())
    }
}
