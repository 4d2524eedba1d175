//! Placard Core Library
//!
//! This crate provides the core functionality for Placard, including:
//! - Display sessions of one to five days, two inspector slots per day
//! - The claim marketplace with check-and-set slot allocation
//! - Session status aggregation from day statuses
//! - The daily transition process promoting staffed days on their date
//! - Audit history and notification fan-out
//! - Storage (SQLite with versioned migrations)

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::application::Services;
    pub use crate::config::Config;
    pub use crate::domain::actor::{Actor, Role};
    pub use crate::domain::session::{
        Day, DayStatus, NewDay, NewSession, Session, SessionStatus, SessionUpdate, SlotIndex,
    };
    pub use crate::error::{Error, Result};
    pub use crate::storage::Database;
}
