//! Domain layer
//!
//! Contains the core business logic and domain models.

pub mod actor;
pub mod directory;
pub mod history;
pub mod marketplace;
pub mod notification;
pub mod scheduler;
pub mod session;
