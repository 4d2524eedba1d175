//! Append-only history store

use super::entry::{EntityType, HistoryAction, HistoryEntry};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::error;
use uuid::Uuid;

/// Repository for the audit trail
#[derive(Debug, Clone)]
pub struct HistoryRepository {
    pool: SqlitePool,
}

impl HistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one entry
    pub async fn append(&self, entry: &HistoryEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO history_entries (id, entity_type, entity_id, action, actor_id, changes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.entity_type.as_str())
        .bind(entry.entity_id.to_string())
        .bind(entry.action.as_str())
        .bind(entry.actor_id.map(|a| a.to_string()))
        .bind(entry.changes.to_string())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        Ok(())
    }

    /// Append an entry for a state change that is already committed.
    ///
    /// The committed transition stands even if the audit write fails, so the
    /// failure is logged instead of returned.
    pub async fn record(&self, entry: HistoryEntry) {
        if let Err(e) = self.append(&entry).await {
            error!(
                entity_type = %entry.entity_type,
                entity_id = %entry.entity_id,
                action = %entry.action,
                error = %e,
                changes = %entry.changes,
                "Failed to record history entry for a committed transition"
            );
        }
    }

    /// Entries for one entity, newest first
    pub async fn list_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        limit: Option<i32>,
    ) -> Result<Vec<HistoryEntry>> {
        let limit = limit.unwrap_or(100);

        let rows: Vec<HistoryRow> = sqlx::query_as(
            r#"
            SELECT id, entity_type, entity_id, action, actor_id, changes, created_at
            FROM history_entries
            WHERE entity_type = ? AND entity_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(entity_type.as_str())
        .bind(entity_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        rows.into_iter().map(|row| row.into_entry()).collect()
    }

    /// Entries for any entity with the given id, newest first
    pub async fn list_for_id(&self, entity_id: Uuid, limit: Option<i32>) -> Result<Vec<HistoryEntry>> {
        let limit = limit.unwrap_or(100);

        let rows: Vec<HistoryRow> = sqlx::query_as(
            r#"
            SELECT id, entity_type, entity_id, action, actor_id, changes, created_at
            FROM history_entries
            WHERE entity_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(entity_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        rows.into_iter().map(|row| row.into_entry()).collect()
    }

    /// Whether an entry with this action exists for the entity
    pub async fn exists(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        action: HistoryAction,
    ) -> Result<bool> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM history_entries
            WHERE entity_type = ? AND entity_id = ? AND action = ?
            "#,
        )
        .bind(entity_type.as_str())
        .bind(entity_id.to_string())
        .bind(action.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        Ok(count > 0)
    }

    /// Count entries for one entity
    pub async fn count_for_entity(&self, entity_type: EntityType, entity_id: Uuid) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM history_entries WHERE entity_type = ? AND entity_id = ?",
        )
        .bind(entity_type.as_str())
        .bind(entity_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        Ok(count)
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: String,
    entity_type: String,
    entity_id: String,
    action: String,
    actor_id: Option<String>,
    changes: String,
    created_at: DateTime<Utc>,
}

impl HistoryRow {
    fn into_entry(self) -> Result<HistoryEntry> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| Error::Parse(format!("Invalid history entry ID: {}", e)))?;
        let entity_type = EntityType::from_str(&self.entity_type)
            .ok_or_else(|| Error::Parse(format!("Invalid entity type: {}", self.entity_type)))?;
        let entity_id = Uuid::parse_str(&self.entity_id)
            .map_err(|e| Error::Parse(format!("Invalid entity ID: {}", e)))?;
        let action = HistoryAction::from_str(&self.action)
            .ok_or_else(|| Error::Parse(format!("Invalid history action: {}", self.action)))?;
        let actor_id = self
            .actor_id
            .map(|a| Uuid::parse_str(&a))
            .transpose()
            .map_err(|e| Error::Parse(format!("Invalid actor ID: {}", e)))?;
        let changes = serde_json::from_str(&self.changes)
            .map_err(|e| Error::Parse(format!("Invalid history changes JSON: {}", e)))?;

        Ok(HistoryEntry {
            id,
            entity_type,
            entity_id,
            action,
            actor_id,
            changes,
            created_at: self.created_at,
        })
    }
}
