//! Daily transition process
//!
//! - `CivilCalendar` converts wall-clock time to a civil date
//! - `DailyTransitionJob` promotes the days due on a date
//! - `DailyScheduler` runs the job once a day until cancelled

pub mod calendar;
pub mod job;
pub mod runner;

pub use calendar::CivilCalendar;
pub use job::{DailyTransitionJob, DayFailure, TransitionReport};
pub use runner::DailyScheduler;
