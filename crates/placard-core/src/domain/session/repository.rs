//! Session repository for database operations
//!
//! Handles sessions and their days. Every day write is a check-and-set on the
//! day's `version` and status, and runs in the same transaction as the
//! session status recomputation.

use super::day::{Completion, Day, DayState, DayStatus, NewDay, NoticeSeries};
use super::session::{
    MAX_DAYS, MIN_DAYS, Session, SessionStatus, SessionUpdate, aggregate_status,
    normalize_description, validate_period,
};
use super::slot::{Occupant, SlotIndex, Slots};
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;
use uuid::Uuid;

const DAY_COLUMNS: &str = r#"
    d.id, d.session_id, d.status, d.display_date, d.day_order, d.notice_count,
    d.notice_series, d.first_notice, d.last_notice, d.notices_from, d.notices_to,
    d.slot1_inspector_id, d.slot1_claimed_at, d.slot2_inspector_id, d.slot2_claimed_at,
    d.started_at, d.observations, d.completed_at, d.completed_by, d.completed_via_override,
    d.version, d.created_at, d.updated_at
"#;

/// Cached session status before and after a recomputation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub session_id: Uuid,
    pub previous: SessionStatus,
    pub current: SessionStatus,
}

impl StatusChange {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Result of updating a session
#[derive(Debug, Clone)]
pub struct SessionUpdateOutcome {
    pub session: Session,
    pub status: StatusChange,
    /// Days that were claimed and therefore left as they were
    pub kept_days: usize,
    pub removed_days: usize,
    pub added_days: usize,
}

/// Repository for session and day database operations
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========== Session CRUD ==========

    /// Save a new session and all of its days atomically
    pub async fn insert(&self, session: &Session) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::DatabaseError)?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, period, description, status, created_by, updated_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.id.to_string())
        .bind(&session.period)
        .bind(&session.description)
        .bind(session.status.as_str())
        .bind(session.created_by.to_string())
        .bind(session.updated_by.to_string())
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(Error::DatabaseError)?;

        for day in &session.days {
            insert_day(&mut tx, day).await?;
        }

        tx.commit().await.map_err(Error::DatabaseError)?;
        Ok(())
    }

    /// Get a session with its days
    pub async fn get(&self, session_id: Uuid) -> Result<Option<Session>> {
        let mut conn = self.pool.acquire().await.map_err(Error::DatabaseError)?;
        load_session(&mut conn, session_id).await
    }

    /// List sessions, most recently created first
    pub async fn list(&self, status: Option<SessionStatus>, limit: Option<i32>) -> Result<Vec<Session>> {
        let limit = limit.unwrap_or(50);
        let mut conn = self.pool.acquire().await.map_err(Error::DatabaseError)?;

        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, period, description, status, created_by, updated_by, created_at, updated_at
            FROM sessions
            WHERE ? IS NULL OR status = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&mut *conn)
        .await
        .map_err(Error::DatabaseError)?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            let mut session = row.into_session()?;
            session.days = load_days(&mut conn, session.id).await?;
            sessions.push(session);
        }
        Ok(sessions)
    }

    /// Delete a session; its days go with it
    pub async fn delete(&self, session_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        Ok(result.rows_affected() > 0)
    }

    /// Apply metadata changes and replace unclaimed days in one transaction
    pub async fn update(
        &self,
        session_id: Uuid,
        update: &SessionUpdate,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SessionUpdateOutcome> {
        if let Some(period) = &update.period {
            validate_period(period)?;
        }

        let mut tx = self.pool.begin().await.map_err(Error::DatabaseError)?;
        lock_session(&mut tx, session_id).await?;
        let existing = load_session(&mut tx, session_id)
            .await?
            .ok_or(Error::SessionNotFound(session_id))?;

        let mut kept_days = existing.days.len();
        let mut removed_days = 0;
        let mut added_days = 0;

        if let Some(specs) = &update.days {
            let (claimed, unclaimed): (Vec<&Day>, Vec<&Day>) =
                existing.days.iter().partition(|d| !d.slots().is_empty());
            let claimed_orders: HashSet<u32> = claimed.iter().map(|d| d.day_order).collect();
            let additions = replacement_days(specs, &claimed_orders, claimed.len())?;

            for day in &unclaimed {
                let result = sqlx::query(
                    r#"
                    DELETE FROM days
                    WHERE id = ? AND version = ?
                      AND slot1_inspector_id IS NULL AND slot2_inspector_id IS NULL
                    "#,
                )
                .bind(day.id.to_string())
                .bind(day.version)
                .execute(&mut *tx)
                .await
                .map_err(Error::DatabaseError)?;

                if result.rows_affected() == 0 {
                    return Err(Error::Conflict(format!(
                        "Day {} was claimed while the session was being updated",
                        day.display_date
                    )));
                }
            }

            for spec in &additions {
                insert_day(&mut tx, &Day::new(session_id, spec, now)).await?;
            }

            kept_days = claimed.len();
            removed_days = unclaimed.len();
            added_days = additions.len();
        }

        let period = update
            .period
            .as_deref()
            .map(str::trim)
            .unwrap_or(&existing.period)
            .to_string();
        let description = match &update.description {
            Some(d) => normalize_description(d.clone()),
            None => existing.description.clone(),
        };

        sqlx::query(
            r#"
            UPDATE sessions SET period = ?, description = ?, updated_by = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&period)
        .bind(&description)
        .bind(actor_id.to_string())
        .bind(now)
        .bind(session_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(Error::DatabaseError)?;

        let status = refresh_status(&mut tx, session_id, Some(actor_id), now).await?;
        let session = load_session(&mut tx, session_id)
            .await?
            .ok_or(Error::SessionNotFound(session_id))?;

        tx.commit().await.map_err(Error::DatabaseError)?;

        Ok(SessionUpdateOutcome {
            session,
            status,
            kept_days,
            removed_days,
            added_days,
        })
    }

    /// Recompute and persist the cached status of a session
    pub async fn recompute_status(&self, session_id: Uuid, actor_id: Option<Uuid>) -> Result<StatusChange> {
        let mut tx = self.pool.begin().await.map_err(Error::DatabaseError)?;
        lock_session(&mut tx, session_id).await?;
        let change = refresh_status(&mut tx, session_id, actor_id, Utc::now()).await?;
        tx.commit().await.map_err(Error::DatabaseError)?;
        Ok(change)
    }

    // ========== Days ==========

    /// Get a day by ID
    pub async fn get_day(&self, day_id: Uuid) -> Result<Option<Day>> {
        let sql = format!("SELECT {} FROM days d WHERE d.id = ?", DAY_COLUMNS);
        let row: Option<DayRow> = sqlx::query_as(&sql)
            .bind(day_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        row.map(|r| r.into_day()).transpose()
    }

    /// Claimable days: open or assigned, in draft or ready sessions, not in the past
    pub async fn list_available(&self, today: NaiveDate) -> Result<Vec<Day>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM days d
            JOIN sessions s ON s.id = d.session_id
            WHERE s.status IN ('draft', 'ready')
              AND d.status IN ('open', 'assigned')
              AND d.display_date >= ?
            ORDER BY d.display_date ASC, d.day_order ASC
            "#,
            DAY_COLUMNS
        );
        let rows: Vec<DayRow> = sqlx::query_as(&sql)
            .bind(today)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        rows.into_iter().map(|r| r.into_day()).collect()
    }

    /// Days where the inspector holds a slot, latest display date first
    pub async fn list_for_inspector(&self, inspector_id: Uuid) -> Result<Vec<Day>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM days d
            WHERE d.slot1_inspector_id = ? OR d.slot2_inspector_id = ?
            ORDER BY d.display_date DESC, d.day_order DESC
            "#,
            DAY_COLUMNS
        );
        let id = inspector_id.to_string();
        let rows: Vec<DayRow> = sqlx::query_as(&sql)
            .bind(&id)
            .bind(&id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        rows.into_iter().map(|r| r.into_day()).collect()
    }

    /// Days displayed on the date with the given status
    pub async fn list_due(&self, date: NaiveDate, status: DayStatus) -> Result<Vec<Day>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM days d
            WHERE d.display_date = ? AND d.status = ?
            ORDER BY d.session_id, d.day_order
            "#,
            DAY_COLUMNS
        );
        let rows: Vec<DayRow> = sqlx::query_as(&sql)
            .bind(date)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        rows.into_iter().map(|r| r.into_day()).collect()
    }

    /// Persist a transitioned day and recompute its session, atomically.
    ///
    /// `day.version` must still be the version the snapshot was read at and
    /// `expected_status` the status before the transition. If either no
    /// longer matches the stored row the write is rejected with `Conflict`.
    /// On success `day.version` is advanced.
    pub async fn commit_day_transition(
        &self,
        day: &mut Day,
        expected_status: DayStatus,
        actor_id: Option<Uuid>,
    ) -> Result<StatusChange> {
        let mut tx = self.pool.begin().await.map_err(Error::DatabaseError)?;
        let columns = StateColumns::from_day(day);
        let first = day.slots().get(SlotIndex::First).copied();
        let second = day.slots().get(SlotIndex::Second).copied();

        let result = sqlx::query(
            r#"
            UPDATE days SET
                status = ?,
                slot1_inspector_id = ?, slot1_claimed_at = ?,
                slot2_inspector_id = ?, slot2_claimed_at = ?,
                started_at = ?, observations = ?, completed_at = ?, completed_by = ?,
                completed_via_override = ?,
                updated_at = ?,
                version = version + 1
            WHERE id = ? AND version = ? AND status = ?
            "#,
        )
        .bind(day.status().as_str())
        .bind(first.map(|o| o.inspector_id.to_string()))
        .bind(first.map(|o| o.claimed_at))
        .bind(second.map(|o| o.inspector_id.to_string()))
        .bind(second.map(|o| o.claimed_at))
        .bind(columns.started_at)
        .bind(columns.observations)
        .bind(columns.completed_at)
        .bind(columns.completed_by)
        .bind(columns.via_override)
        .bind(day.updated_at)
        .bind(day.id.to_string())
        .bind(day.version)
        .bind(expected_status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(Error::DatabaseError)?;

        if result.rows_affected() == 0 {
            let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM days WHERE id = ?")
                .bind(day.id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(Error::DatabaseError)?;

            return Err(match exists {
                Some(_) => Error::Conflict(format!(
                    "Day {} was changed by someone else; reload and try again",
                    day.display_date
                )),
                None => Error::DayNotFound(day.id),
            });
        }

        let change = refresh_status(&mut tx, day.session_id, actor_id, day.updated_at).await?;
        tx.commit().await.map_err(Error::DatabaseError)?;
        day.version += 1;

        Ok(change)
    }
}

/// Work out which specs become new days when the day set is replaced.
///
/// Claimed days stay as they are, so a spec whose order matches a claimed day
/// is dropped. The resulting set must still hold 1 to 5 distinct orders.
fn replacement_days(
    specs: &[NewDay],
    claimed_orders: &HashSet<u32>,
    claimed: usize,
) -> Result<Vec<NewDay>> {
    let mut orders = HashSet::new();
    let mut additions = Vec::new();

    for spec in specs {
        spec.validate()?;
        if !orders.insert(spec.day_order) {
            return Err(Error::InvalidArgument(format!(
                "Day order {} appears more than once",
                spec.day_order
            )));
        }
        if !claimed_orders.contains(&spec.day_order) {
            additions.push(spec.clone());
        }
    }

    let total = claimed + additions.len();
    if !(MIN_DAYS..=MAX_DAYS).contains(&total) {
        return Err(Error::InvalidArgument(format!(
            "A session needs between {} and {} days, the update would leave {}",
            MIN_DAYS, MAX_DAYS, total
        )));
    }
    Ok(additions)
}

/// Take the write lock for a transaction that reads before it writes.
///
/// Must be the first statement: under WAL a deferred reader cannot upgrade to
/// a writer once another connection has committed, and gets `SQLITE_BUSY`
/// without waiting on the busy timeout.
async fn lock_session(conn: &mut SqliteConnection, session_id: Uuid) -> Result<()> {
    let result = sqlx::query("UPDATE sessions SET status = status WHERE id = ?")
        .bind(session_id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(Error::DatabaseError)?;
    if result.rows_affected() == 0 {
        return Err(Error::SessionNotFound(session_id));
    }
    Ok(())
}

/// The one place a session's cached status is written
async fn refresh_status(
    conn: &mut SqliteConnection,
    session_id: Uuid,
    actor_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<StatusChange> {
    let id = session_id.to_string();

    let current: Option<(String,)> = sqlx::query_as("SELECT status FROM sessions WHERE id = ?")
        .bind(&id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(Error::DatabaseError)?;
    let (current,) = current.ok_or(Error::SessionNotFound(session_id))?;
    let previous = SessionStatus::from_str(&current)
        .ok_or_else(|| Error::Parse(format!("Invalid session status: {}", current)))?;

    let rows: Vec<(String,)> = sqlx::query_as("SELECT status FROM days WHERE session_id = ?")
        .bind(&id)
        .fetch_all(&mut *conn)
        .await
        .map_err(Error::DatabaseError)?;
    let statuses = rows
        .iter()
        .map(|(s,)| {
            DayStatus::from_str(s).ok_or_else(|| Error::Parse(format!("Invalid day status: {}", s)))
        })
        .collect::<Result<Vec<_>>>()?;

    let derived = aggregate_status(&statuses);
    if derived != previous {
        sqlx::query(
            r#"
            UPDATE sessions SET status = ?, updated_at = ?, updated_by = COALESCE(?, updated_by)
            WHERE id = ?
            "#,
        )
        .bind(derived.as_str())
        .bind(now)
        .bind(actor_id.map(|a| a.to_string()))
        .bind(&id)
        .execute(&mut *conn)
        .await
        .map_err(Error::DatabaseError)?;
    }

    Ok(StatusChange {
        session_id,
        previous,
        current: derived,
    })
}

async fn insert_day(conn: &mut SqliteConnection, day: &Day) -> Result<()> {
    let columns = StateColumns::from_day(day);
    let first = day.slots().get(SlotIndex::First).copied();
    let second = day.slots().get(SlotIndex::Second).copied();

    sqlx::query(
        r#"
        INSERT INTO days (
            id, session_id, status, display_date, day_order, notice_count,
            notice_series, first_notice, last_notice, notices_from, notices_to,
            slot1_inspector_id, slot1_claimed_at, slot2_inspector_id, slot2_claimed_at,
            started_at, observations, completed_at, completed_by, completed_via_override,
            version, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(day.id.to_string())
    .bind(day.session_id.to_string())
    .bind(day.status().as_str())
    .bind(day.display_date)
    .bind(i64::from(day.day_order))
    .bind(i64::from(day.notice_count))
    .bind(&day.notices.series)
    .bind(&day.notices.first_notice)
    .bind(&day.notices.last_notice)
    .bind(day.notices.notices_from)
    .bind(day.notices.notices_to)
    .bind(first.map(|o| o.inspector_id.to_string()))
    .bind(first.map(|o| o.claimed_at))
    .bind(second.map(|o| o.inspector_id.to_string()))
    .bind(second.map(|o| o.claimed_at))
    .bind(columns.started_at)
    .bind(columns.observations)
    .bind(columns.completed_at)
    .bind(columns.completed_by)
    .bind(columns.via_override)
    .bind(day.version)
    .bind(day.created_at)
    .bind(day.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(Error::DatabaseError)?;

    Ok(())
}

async fn load_session(conn: &mut SqliteConnection, session_id: Uuid) -> Result<Option<Session>> {
    let row: Option<SessionRow> = sqlx::query_as(
        r#"
        SELECT id, period, description, status, created_by, updated_by, created_at, updated_at
        FROM sessions
        WHERE id = ?
        "#,
    )
    .bind(session_id.to_string())
    .fetch_optional(&mut *conn)
    .await
    .map_err(Error::DatabaseError)?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut session = row.into_session()?;
    session.days = load_days(conn, session_id).await?;
    Ok(Some(session))
}

async fn load_days(conn: &mut SqliteConnection, session_id: Uuid) -> Result<Vec<Day>> {
    let sql = format!(
        "SELECT {} FROM days d WHERE d.session_id = ? ORDER BY d.day_order ASC",
        DAY_COLUMNS
    );
    let rows: Vec<DayRow> = sqlx::query_as(&sql)
        .bind(session_id.to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(Error::DatabaseError)?;

    rows.into_iter().map(|r| r.into_day()).collect()
}

/// Lifecycle columns flattened out of [`DayState`]
struct StateColumns {
    started_at: Option<DateTime<Utc>>,
    observations: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    completed_by: Option<String>,
    via_override: bool,
}

impl StateColumns {
    fn from_day(day: &Day) -> Self {
        match day.state() {
            DayState::Open | DayState::Assigned => Self {
                started_at: None,
                observations: None,
                completed_at: None,
                completed_by: None,
                via_override: false,
            },
            DayState::InProgress { started_at } => Self {
                started_at: Some(*started_at),
                observations: None,
                completed_at: None,
                completed_by: None,
                via_override: false,
            },
            DayState::Completed {
                started_at,
                completion,
            } => Self {
                started_at: *started_at,
                observations: completion.observations.clone(),
                completed_at: Some(completion.completed_at),
                completed_by: Some(completion.completed_by.to_string()),
                via_override: completion.via_override,
            },
        }
    }
}

/// Internal row type for SQLx
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    period: String,
    description: Option<String>,
    status: String,
    created_by: String,
    updated_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SessionRow {
    fn into_session(self) -> Result<Session> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| Error::Parse(format!("Invalid session ID: {}", e)))?;
        let status = SessionStatus::from_str(&self.status)
            .ok_or_else(|| Error::Parse(format!("Invalid session status: {}", self.status)))?;
        let created_by = Uuid::parse_str(&self.created_by)
            .map_err(|e| Error::Parse(format!("Invalid creator ID: {}", e)))?;
        let updated_by = Uuid::parse_str(&self.updated_by)
            .map_err(|e| Error::Parse(format!("Invalid modifier ID: {}", e)))?;

        Ok(Session {
            id,
            period: self.period,
            description: self.description,
            status,
            created_by,
            updated_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
            days: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct DayRow {
    id: String,
    session_id: String,
    status: String,
    display_date: NaiveDate,
    day_order: i64,
    notice_count: i64,
    notice_series: Option<String>,
    first_notice: Option<String>,
    last_notice: Option<String>,
    notices_from: Option<NaiveDate>,
    notices_to: Option<NaiveDate>,
    slot1_inspector_id: Option<String>,
    slot1_claimed_at: Option<DateTime<Utc>>,
    slot2_inspector_id: Option<String>,
    slot2_claimed_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    observations: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    completed_by: Option<String>,
    completed_via_override: bool,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn occupant(inspector_id: Option<String>, claimed_at: Option<DateTime<Utc>>) -> Result<Option<Occupant>> {
    match (inspector_id, claimed_at) {
        (Some(id), Some(at)) => {
            let id = Uuid::parse_str(&id)
                .map_err(|e| Error::Parse(format!("Invalid inspector ID: {}", e)))?;
            Ok(Some(Occupant::new(id, at)))
        }
        (None, None) => Ok(None),
        _ => Err(Error::Parse(
            "Slot has an inspector without a claim time or the reverse".to_string(),
        )),
    }
}

impl DayRow {
    fn into_day(self) -> Result<Day> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| Error::Parse(format!("Invalid day ID: {}", e)))?;
        let session_id = Uuid::parse_str(&self.session_id)
            .map_err(|e| Error::Parse(format!("Invalid session ID: {}", e)))?;
        let status = DayStatus::from_str(&self.status)
            .ok_or_else(|| Error::Parse(format!("Invalid day status: {}", self.status)))?;
        let day_order = u32::try_from(self.day_order)
            .map_err(|_| Error::Parse(format!("Invalid day order: {}", self.day_order)))?;
        let notice_count = u32::try_from(self.notice_count)
            .map_err(|_| Error::Parse(format!("Invalid notice count: {}", self.notice_count)))?;

        let slots = Slots::from_parts(
            occupant(self.slot1_inspector_id, self.slot1_claimed_at)?,
            occupant(self.slot2_inspector_id, self.slot2_claimed_at)?,
        );

        let state = match status {
            DayStatus::Open => DayState::Open,
            DayStatus::Assigned => DayState::Assigned,
            DayStatus::InProgress => DayState::InProgress {
                started_at: self
                    .started_at
                    .ok_or_else(|| Error::Parse(format!("Day {} in progress without start time", id)))?,
            },
            DayStatus::Completed => {
                let completed_by = self
                    .completed_by
                    .as_deref()
                    .map(Uuid::parse_str)
                    .transpose()
                    .map_err(|e| Error::Parse(format!("Invalid completer ID: {}", e)))?
                    .ok_or_else(|| Error::Parse(format!("Day {} completed without completer", id)))?;
                let completed_at = self
                    .completed_at
                    .ok_or_else(|| Error::Parse(format!("Day {} completed without time", id)))?;
                DayState::Completed {
                    started_at: self.started_at,
                    completion: Completion {
                        completed_by,
                        completed_at,
                        observations: self.observations,
                        via_override: self.completed_via_override,
                    },
                }
            }
        };

        Ok(Day {
            id,
            session_id,
            display_date: self.display_date,
            day_order,
            notice_count,
            notices: NoticeSeries {
                series: self.notice_series,
                first_notice: self.first_notice,
                last_notice: self.last_notice,
                notices_from: self.notices_from,
                notices_to: self.notices_to,
            },
            slots,
            state,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actor::Actor;
    use crate::domain::session::NewSession;
    use crate::storage::Database;

    async fn create_test_repo() -> (Database, SessionRepository) {
        let db = Database::in_memory()
            .await
            .expect("Failed to create test database");
        let repo = SessionRepository::new(db.pool().clone());
        (db, repo)
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn new_session(days: u32) -> Session {
        let specs = (1..=days).map(|i| NewDay::new(date(i), i, 5)).collect();
        Session::new(Uuid::new_v4(), &NewSession::new("2026-03", specs), Utc::now())
    }

    async fn claim(repo: &SessionRepository, day_id: Uuid, inspector: Uuid) -> StatusChange {
        let mut day = repo.get_day(day_id).await.unwrap().unwrap();
        let before = day.status();
        day.claim(inspector, Utc::now()).unwrap();
        repo.commit_day_transition(&mut day, before, Some(inspector))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (_db, repo) = create_test_repo().await;
        let session = new_session(3);
        repo.insert(&session).await.unwrap();

        let loaded = repo.get(session.id).await.unwrap().unwrap();
        assert_eq!(loaded.period, "2026-03");
        assert_eq!(loaded.status, SessionStatus::Draft);
        assert_eq!(loaded.days.len(), 3);
        assert_eq!(loaded.days[0].day_order, 1);
        assert_eq!(loaded.days[2].display_date, date(3));
        assert!(loaded.days.iter().all(|d| d.status() == DayStatus::Open));

        assert!(repo.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_notice_series_roundtrip() {
        let (_db, repo) = create_test_repo().await;
        let notices = NoticeSeries {
            series: Some("B".to_string()),
            first_notice: Some("B-100".to_string()),
            last_notice: Some("B-140".to_string()),
            notices_from: Some(date(1)),
            notices_to: Some(date(20)),
        };
        let spec = NewDay::new(date(4), 1, 41).with_notices(notices.clone());
        let session = Session::new(Uuid::new_v4(), &NewSession::new("2026-03", vec![spec]), Utc::now());
        repo.insert(&session).await.unwrap();

        let day = repo.get_day(session.days[0].id).await.unwrap().unwrap();
        assert_eq!(day.notices, notices);
        assert_eq!(day.notice_count, 41);
    }

    #[tokio::test]
    async fn test_commit_advances_version_and_status() {
        let (_db, repo) = create_test_repo().await;
        let session = new_session(1);
        repo.insert(&session).await.unwrap();
        let day_id = session.days[0].id;

        let change = claim(&repo, day_id, Uuid::new_v4()).await;
        assert!(!change.changed());

        let change = claim(&repo, day_id, Uuid::new_v4()).await;
        assert_eq!(change.previous, SessionStatus::Draft);
        assert_eq!(change.current, SessionStatus::Ready);

        let day = repo.get_day(day_id).await.unwrap().unwrap();
        assert_eq!(day.version, 2);
        assert_eq!(day.status(), DayStatus::Assigned);
        assert_eq!(
            repo.get(session.id).await.unwrap().unwrap().status,
            SessionStatus::Ready
        );
    }

    #[tokio::test]
    async fn test_stale_snapshot_conflicts() {
        let (_db, repo) = create_test_repo().await;
        let session = new_session(1);
        repo.insert(&session).await.unwrap();
        let day_id = session.days[0].id;

        let snapshot = repo.get_day(day_id).await.unwrap().unwrap();
        let mut first = snapshot.clone();
        let mut second = snapshot.clone();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        first.claim(a, Utc::now()).unwrap();
        second.claim(b, Utc::now()).unwrap();

        repo.commit_day_transition(&mut first, DayStatus::Open, Some(a))
            .await
            .unwrap();
        let result = repo
            .commit_day_transition(&mut second, DayStatus::Open, Some(b))
            .await;
        assert!(matches!(result, Err(Error::Conflict(_))));

        let stored = repo.get_day(day_id).await.unwrap().unwrap();
        assert_eq!(stored.slots().inspector_ids(), vec![a]);
    }

    #[tokio::test]
    async fn test_commit_on_deleted_day_is_not_found() {
        let (_db, repo) = create_test_repo().await;
        let session = new_session(1);
        repo.insert(&session).await.unwrap();
        let mut day = repo.get_day(session.days[0].id).await.unwrap().unwrap();
        repo.delete(session.id).await.unwrap();

        day.claim(Uuid::new_v4(), Utc::now()).unwrap();
        let result = repo
            .commit_day_transition(&mut day, DayStatus::Open, None)
            .await;
        assert!(matches!(result, Err(Error::DayNotFound(_))));
    }

    #[tokio::test]
    async fn test_completed_day_roundtrip() {
        let (_db, repo) = create_test_repo().await;
        let session = new_session(1);
        repo.insert(&session).await.unwrap();
        let day_id = session.days[0].id;
        let a = Uuid::new_v4();
        claim(&repo, day_id, a).await;
        claim(&repo, day_id, Uuid::new_v4()).await;

        let mut day = repo.get_day(day_id).await.unwrap().unwrap();
        day.promote(date(1), Utc::now()).unwrap();
        let change = repo
            .commit_day_transition(&mut day, DayStatus::Assigned, None)
            .await
            .unwrap();
        assert_eq!(change.current, SessionStatus::InProgress);

        let mut day = repo.get_day(day_id).await.unwrap().unwrap();
        day.complete(&Actor::inspector(a, "control"), Some("ok".to_string()), Utc::now())
            .unwrap();
        let change = repo
            .commit_day_transition(&mut day, DayStatus::InProgress, Some(a))
            .await
            .unwrap();
        assert_eq!(change.current, SessionStatus::Completed);

        let stored = repo.get_day(day_id).await.unwrap().unwrap();
        let completion = stored.completion().unwrap();
        assert_eq!(completion.completed_by, a);
        assert_eq!(completion.observations.as_deref(), Some("ok"));
        assert!(matches!(
            stored.state(),
            DayState::Completed {
                started_at: Some(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_list_available_filters() {
        let (_db, repo) = create_test_repo().await;
        let session = new_session(3);
        repo.insert(&session).await.unwrap();

        let available = repo.list_available(date(2)).await.unwrap();
        let dates: Vec<NaiveDate> = available.iter().map(|d| d.display_date).collect();
        assert_eq!(dates, vec![date(2), date(3)]);
    }

    #[tokio::test]
    async fn test_list_for_inspector_newest_first() {
        let (_db, repo) = create_test_repo().await;
        let session = new_session(3);
        repo.insert(&session).await.unwrap();
        let inspector = Uuid::new_v4();
        claim(&repo, session.days[0].id, inspector).await;
        claim(&repo, session.days[2].id, Uuid::new_v4()).await;
        claim(&repo, session.days[2].id, inspector).await;

        let mine = repo.list_for_inspector(inspector).await.unwrap();
        let dates: Vec<NaiveDate> = mine.iter().map(|d| d.display_date).collect();
        assert_eq!(dates, vec![date(3), date(1)]);
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let (_db, repo) = create_test_repo().await;
        let one = new_session(1);
        let two = new_session(1);
        repo.insert(&one).await.unwrap();
        repo.insert(&two).await.unwrap();
        claim(&repo, two.days[0].id, Uuid::new_v4()).await;
        claim(&repo, two.days[0].id, Uuid::new_v4()).await;

        assert_eq!(repo.list(None, None).await.unwrap().len(), 2);
        let ready = repo.list(Some(SessionStatus::Ready), None).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, two.id);
        assert_eq!(ready[0].days.len(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_claimed_days() {
        let (_db, repo) = create_test_repo().await;
        let session = new_session(3);
        repo.insert(&session).await.unwrap();
        let inspector = Uuid::new_v4();
        claim(&repo, session.days[1].id, inspector).await;

        let admin = Uuid::new_v4();
        let update = SessionUpdate {
            description: Some(Some("revised".to_string())),
            days: Some(vec![
                NewDay::new(date(10), 1, 3),
                NewDay::new(date(11), 2, 3),
                NewDay::new(date(12), 4, 3),
            ]),
            ..Default::default()
        };
        let outcome = repo.update(session.id, &update, admin, Utc::now()).await.unwrap();

        assert_eq!(outcome.kept_days, 1);
        assert_eq!(outcome.removed_days, 2);
        assert_eq!(outcome.added_days, 2);
        let orders: Vec<u32> = outcome.session.days.iter().map(|d| d.day_order).collect();
        assert_eq!(orders, vec![1, 2, 4]);
        // Claimed day 2 kept its original date
        assert_eq!(outcome.session.days[1].id, session.days[1].id);
        assert_eq!(outcome.session.days[1].display_date, date(2));
        assert_eq!(outcome.session.description.as_deref(), Some("revised"));
        assert_eq!(outcome.session.updated_by, admin);
    }

    #[tokio::test]
    async fn test_update_rejects_too_many_days() {
        let (_db, repo) = create_test_repo().await;
        let session = new_session(2);
        repo.insert(&session).await.unwrap();
        claim(&repo, session.days[0].id, Uuid::new_v4()).await;

        let update = SessionUpdate {
            days: Some((2..=6).map(|i| NewDay::new(date(i), i, 1)).collect()),
            ..Default::default()
        };
        let result = repo.update(session.id, &update, Uuid::new_v4(), Utc::now()).await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));

        // Nothing changed
        assert_eq!(repo.get(session.id).await.unwrap().unwrap().days.len(), 2);
    }

    #[tokio::test]
    async fn test_update_recomputes_status() {
        let (_db, repo) = create_test_repo().await;
        let session = new_session(2);
        repo.insert(&session).await.unwrap();
        claim(&repo, session.days[0].id, Uuid::new_v4()).await;
        claim(&repo, session.days[0].id, Uuid::new_v4()).await;

        // Dropping the open day leaves only the assigned one
        let update = SessionUpdate {
            days: Some(vec![]),
            ..Default::default()
        };
        let outcome = repo.update(session.id, &update, Uuid::new_v4(), Utc::now()).await.unwrap();
        assert_eq!(outcome.session.days.len(), 1);
        assert_eq!(outcome.status.current, SessionStatus::Ready);
        assert!(outcome.status.changed());
    }

    #[tokio::test]
    async fn test_update_unknown_session() {
        let (_db, repo) = create_test_repo().await;
        let result = repo
            .update(Uuid::new_v4(), &SessionUpdate::default(), Uuid::new_v4(), Utc::now())
            .await;
        assert!(matches!(result, Err(Error::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_recompute_status_is_idempotent() {
        let (_db, repo) = create_test_repo().await;
        let session = new_session(1);
        repo.insert(&session).await.unwrap();

        let change = repo.recompute_status(session.id, None).await.unwrap();
        assert!(!change.changed());
        let change = repo.recompute_status(session.id, None).await.unwrap();
        assert_eq!(change.current, SessionStatus::Draft);
    }
}
