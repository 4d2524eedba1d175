//! Display session entity and the status aggregator

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use super::day::{Day, DayStatus, NewDay};
use crate::error::{Error, Result};

/// Fewest days a session may hold
pub const MIN_DAYS: usize = 1;

/// Most days a session may hold
pub const MAX_DAYS: usize = 5;

/// Status of a session, derived from its days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Some day still needs inspectors
    Draft,
    /// Every day is staffed
    Ready,
    /// At least one day is being executed
    InProgress,
    /// Every day is completed
    Completed,
}

impl SessionStatus {
    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "ready" => Some(Self::Ready),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Ready => "ready",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derive a session's status from its days' statuses.
///
/// First match wins: all completed, any in progress, none open, otherwise
/// draft. An empty slice yields `Draft`.
pub fn aggregate_status(days: &[DayStatus]) -> SessionStatus {
    if days.is_empty() {
        return SessionStatus::Draft;
    }
    if days.iter().all(|s| *s == DayStatus::Completed) {
        SessionStatus::Completed
    } else if days.contains(&DayStatus::InProgress) {
        SessionStatus::InProgress
    } else if !days.contains(&DayStatus::Open) {
        SessionStatus::Ready
    } else {
        SessionStatus::Draft
    }
}

/// Check that a period key has the form `YYYY-MM`
pub fn validate_period(period: &str) -> Result<()> {
    let period = period.trim();
    if period.len() != 7 {
        return Err(Error::InvalidArgument(format!(
            "Period '{}' must have the form YYYY-MM",
            period
        )));
    }
    NaiveDate::parse_from_str(&format!("{}-01", period), "%Y-%m-%d").map_err(|_| {
        Error::InvalidArgument(format!("Period '{}' must have the form YYYY-MM", period))
    })?;
    Ok(())
}

/// Check a full day set: 1 to 5 days, each valid, day orders unique
pub fn validate_day_set(days: &[NewDay]) -> Result<()> {
    if days.len() < MIN_DAYS || days.len() > MAX_DAYS {
        return Err(Error::InvalidArgument(format!(
            "A session needs between {} and {} days, got {}",
            MIN_DAYS,
            MAX_DAYS,
            days.len()
        )));
    }

    let mut orders = HashSet::new();
    for day in days {
        day.validate()?;
        if !orders.insert(day.day_order) {
            return Err(Error::InvalidArgument(format!(
                "Day order {} appears more than once",
                day.day_order
            )));
        }
    }
    Ok(())
}

/// A batch of display days for one period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: Uuid,
    /// Period key, `YYYY-MM`
    pub period: String,
    pub description: Option<String>,
    /// Cached aggregation of the day statuses
    pub status: SessionStatus,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Days ordered by `day_order`
    pub days: Vec<Day>,
}

impl Session {
    /// Build a draft session with open days
    pub fn new(created_by: Uuid, spec: &NewSession, now: DateTime<Utc>) -> Self {
        let id = Uuid::new_v4();
        let mut days: Vec<Day> = spec.days.iter().map(|d| Day::new(id, d, now)).collect();
        days.sort_by_key(|d| d.day_order);

        Self {
            id,
            period: spec.period.trim().to_string(),
            description: normalize_description(spec.description.clone()),
            status: SessionStatus::Draft,
            created_by,
            updated_by: created_by,
            created_at: now,
            updated_at: now,
            days,
        }
    }

    /// Status the days currently aggregate to
    pub fn derived_status(&self) -> SessionStatus {
        let statuses: Vec<DayStatus> = self.days.iter().map(|d| d.status()).collect();
        aggregate_status(&statuses)
    }

    pub fn day(&self, day_id: Uuid) -> Option<&Day> {
        self.days.iter().find(|d| d.id == day_id)
    }

    /// Inspectors holding a slot on any day
    pub fn claimants(&self) -> Vec<Uuid> {
        let mut seen = HashSet::new();
        self.days
            .iter()
            .flat_map(|d| d.slots().inspector_ids())
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

/// Input for creating a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    pub period: String,
    #[serde(default)]
    pub description: Option<String>,
    pub days: Vec<NewDay>,
}

impl NewSession {
    pub fn new(period: impl Into<String>, days: Vec<NewDay>) -> Self {
        Self {
            period: period.into(),
            description: None,
            days,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_period(&self.period)?;
        validate_day_set(&self.days)
    }
}

/// Changes to apply to an existing session. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub period: Option<String>,
    /// `Some(None)` clears the description
    pub description: Option<Option<String>>,
    /// Replacement day set. Claimed days are kept as they are; unclaimed
    /// days are replaced by the entries given here.
    pub days: Option<Vec<NewDay>>,
}

impl SessionUpdate {
    pub fn is_empty(&self) -> bool {
        self.period.is_none() && self.description.is_none() && self.days.is_none()
    }
}

pub(crate) fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}
