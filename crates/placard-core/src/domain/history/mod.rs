//! Audit trail of session and day changes

pub mod entry;
pub mod repository;

pub use entry::{EntityType, HistoryAction, HistoryEntry};
pub use repository::HistoryRepository;
