//! Background loop firing the daily transition once per civil day

use chrono::{NaiveTime, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::calendar::CivilCalendar;
use super::job::{DailyTransitionJob, TransitionReport};
use crate::config::SchedulerConfig;
use crate::error::{Error, Result};

/// Runs [`DailyTransitionJob`] at a fixed civil time each day
#[derive(Clone)]
pub struct DailyScheduler {
    job: DailyTransitionJob,
    calendar: CivilCalendar,
    run_at: NaiveTime,
    run_on_startup: bool,
}

impl DailyScheduler {
    pub fn new(
        job: DailyTransitionJob,
        calendar: CivilCalendar,
        run_at: NaiveTime,
        run_on_startup: bool,
    ) -> Self {
        Self {
            job,
            calendar,
            run_at,
            run_on_startup,
        }
    }

    /// Build from the `[scheduler]` config section
    pub fn from_config(job: DailyTransitionJob, config: &SchedulerConfig) -> Result<Self> {
        let offset = config
            .offset()
            .map_err(|e| Error::ConfigError(e.to_string()))?;
        let run_at = config
            .run_time()
            .map_err(|e| Error::ConfigError(e.to_string()))?;
        Ok(Self::new(
            job,
            CivilCalendar::new(offset),
            run_at,
            config.run_on_startup,
        ))
    }

    pub fn calendar(&self) -> &CivilCalendar {
        &self.calendar
    }

    /// Run once for the calendar's current date
    pub async fn run_once(&self) -> Result<TransitionReport> {
        self.job.run(self.calendar.today()).await
    }

    /// Loop until cancelled
    pub async fn run(&self, cancel: CancellationToken) {
        if self.run_on_startup {
            info!("Running catch-up daily transition at startup");
            self.run_logged().await;
        }

        loop {
            let now = Utc::now();
            let next = self.calendar.next_run_after(now, self.run_at);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(next_run = %next, "Daily transition scheduled");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Daily transition scheduler stopped");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    self.run_logged().await;
                }
            }
        }
    }

    /// Run the loop on a background task
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run_logged(&self) {
        if let Err(e) = self.run_once().await {
            error!(error = %e, "Daily transition run failed");
        }
    }
}
