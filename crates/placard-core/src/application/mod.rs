//! Application service layer
//!
//! Wires the domain services together over one database so callers (the CLI,
//! tests) get a ready-to-use set of services.

use std::sync::Arc;

use crate::config::Config;
use crate::domain::directory::SqliteDirectory;
use crate::domain::history::HistoryRepository;
use crate::domain::marketplace::ClaimMarketplace;
use crate::domain::notification::{
    NotificationDispatcher, NotificationSink, SqliteNotificationSink,
};
use crate::domain::scheduler::{DailyScheduler, DailyTransitionJob};
use crate::domain::session::{SessionManager, SessionRepository, TransitionCoordinator};
use crate::error::Result;
use crate::storage::Database;

/// All services sharing one connection pool
#[derive(Clone)]
pub struct Services {
    pub sessions: SessionManager,
    pub marketplace: ClaimMarketplace,
    pub directory: SqliteDirectory,
    pub history: HistoryRepository,
    pub outbox: SqliteNotificationSink,
    pub job: DailyTransitionJob,
    config: Config,
}

impl Services {
    /// Services delivering notifications to the SQLite outbox
    pub fn new(db: &Database, config: Config) -> Self {
        let outbox = SqliteNotificationSink::new(db.pool().clone());
        Self::with_sink(db, config, Arc::new(outbox))
    }

    /// Services delivering notifications to the given sink
    pub fn with_sink(db: &Database, config: Config, sink: Arc<dyn NotificationSink>) -> Self {
        let pool = db.pool().clone();
        let directory = SqliteDirectory::new(pool.clone());
        let history = HistoryRepository::new(pool.clone());
        let dispatcher = NotificationDispatcher::new(
            sink,
            Arc::new(directory.clone()),
            Arc::new(directory.clone()),
            config.organization.clone(),
        );
        let coordinator = TransitionCoordinator::new(
            SessionRepository::new(pool.clone()),
            history.clone(),
            dispatcher,
        );

        Self {
            sessions: SessionManager::new(coordinator.clone(), config.organization.clone()),
            marketplace: ClaimMarketplace::new(
                coordinator.clone(),
                Arc::new(directory.clone()),
                config.organization.clone(),
            ),
            directory,
            history,
            outbox: SqliteNotificationSink::new(pool),
            job: DailyTransitionJob::new(coordinator),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Scheduler configured from the `[scheduler]` section
    pub fn scheduler(&self) -> Result<DailyScheduler> {
        DailyScheduler::from_config(self.job.clone(), &self.config.scheduler)
    }
}
