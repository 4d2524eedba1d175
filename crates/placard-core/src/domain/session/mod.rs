//! Session domain module
//!
//! Display sessions group one to five days, each staffed by two inspectors.
//!
//! # Architecture
//!
//! - **Entities**: `Session`, `Day`, `Slots`
//! - **Aggregator**: `aggregate_status`, a pure function over day statuses
//! - **Repository**: `SessionRepository` for check-and-set persistence
//! - **Coordinator**: `TransitionCoordinator` commits a day transition with
//!   its session status, then audits and notifies
//! - **Manager**: `SessionManager` for create, update and delete
//!
//! # Example
//!
//! ```ignore
//! use placard_core::domain::session::{NewDay, NewSession};
//!
//! let spec = NewSession::new("2026-03", vec![NewDay::new(date, 1, 40)]);
//! let session = manager.create(&actor, spec).await?;
//! ```

pub mod coordinator;
pub mod day;
pub mod manager;
pub mod repository;
pub mod session;
pub mod slot;

// Re-export main types
pub use coordinator::{Applied, TransitionCoordinator};
pub use day::{Completion, Day, DayState, DayStatus, DayTransition, NewDay, NoticeSeries};
pub use manager::SessionManager;
pub use repository::{SessionRepository, SessionUpdateOutcome, StatusChange};
pub use session::{
    MAX_DAYS, MIN_DAYS, NewSession, Session, SessionStatus, SessionUpdate, aggregate_status,
    validate_day_set, validate_period,
};
pub use slot::{Occupant, SlotIndex, Slots};
