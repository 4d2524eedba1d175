//! Error types for Placard

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using Placard's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], used by callers to map failures
/// onto their own responses without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidArgument,
    Conflict,
    IllegalStateTransition,
    Internal,
}

/// Placard error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Entity errors (E001-E099)
    #[error("Session '{0}' not found. Run `placard session list` to see all sessions.")]
    SessionNotFound(Uuid),

    #[error("Day '{0}' not found. Run `placard day available` to see open days.")]
    DayNotFound(Uuid),

    #[error("User '{0}' not found in the directory.")]
    UserNotFound(Uuid),

    // Authorization errors (E100-E199)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    // Input errors (E200-E299)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Contention errors (E300-E399)
    #[error("Conflict: {0}")]
    Conflict(String),

    // Lifecycle errors (E400-E499)
    #[error("Cannot {operation} a day in status {status}")]
    IllegalStateTransition {
        operation: &'static str,
        status: String,
    },

    // Database errors (E500-E599)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Failed to decode stored record: {0}")]
    Parse(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "E001",
            Self::DayNotFound(_) => "E002",
            Self::UserNotFound(_) => "E003",
            Self::Forbidden(_) => "E100",
            Self::InvalidArgument(_) => "E200",
            Self::Conflict(_) => "E300",
            Self::IllegalStateTransition { .. } => "E400",
            Self::DatabaseError(_) => "E500",
            Self::Parse(_) => "E501",
            Self::ConfigError(_) => "E600",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get the coarse kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SessionNotFound(_) | Self::DayNotFound(_) | Self::UserNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::IllegalStateTransition { .. } => ErrorKind::IllegalStateTransition,
            Self::DatabaseError(_)
            | Self::Parse(_)
            | Self::ConfigError(_)
            | Self::Other(_)
            | Self::Io(_) => ErrorKind::Internal,
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::SessionNotFound(_) => Some("placard session list".to_string()),
            Self::DayNotFound(_) => Some("placard day available".to_string()),
            Self::UserNotFound(_) => Some("placard user list".to_string()),
            Self::Conflict(_) => Some("placard day show <day-id>".to_string()),
            Self::ConfigError(_) => Some("placard config list".to_string()),
            _ => None,
        }
    }

    pub(crate) fn illegal(operation: &'static str, status: impl std::fmt::Display) -> Self {
        Self::IllegalStateTransition {
            operation,
            status: status.to_string(),
        }
    }
}
