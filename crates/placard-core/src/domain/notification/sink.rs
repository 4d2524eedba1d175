//! Notification delivery sinks

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Delivery transport for notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one message to every recipient
    async fn notify(
        &self,
        recipients: &[Uuid],
        title: &str,
        message: &str,
        data: &serde_json::Value,
    ) -> Result<()>;
}

fn kind_of(data: &serde_json::Value) -> &str {
    data.get("kind")
        .and_then(|k| k.as_str())
        .unwrap_or("general")
}

// ========== Log sink ==========

/// Writes notifications to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(
        &self,
        recipients: &[Uuid],
        title: &str,
        message: &str,
        data: &serde_json::Value,
    ) -> Result<()> {
        info!(
            kind = kind_of(data),
            recipients = recipients.len(),
            title,
            message,
            "Notification"
        );
        Ok(())
    }
}

// ========== SQLite outbox ==========

/// A stored notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredNotification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Writes one outbox row per recipient
#[derive(Debug, Clone)]
pub struct SqliteNotificationSink {
    pool: SqlitePool,
}

impl SqliteNotificationSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Notifications for a recipient, newest first
    pub async fn list_for(&self, recipient_id: Uuid, unread_only: bool) -> Result<Vec<StoredNotification>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            r#"
            SELECT id, recipient_id, kind, title, message, data, read, created_at
            FROM notifications
            WHERE recipient_id = ? AND (? = 0 OR read = 0)
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(recipient_id.to_string())
        .bind(unread_only)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        rows.into_iter().map(|row| row.into_notification()).collect()
    }

    /// Mark every notification of a recipient as read
    pub async fn mark_all_read(&self, recipient_id: Uuid) -> Result<u64> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE recipient_id = ? AND read = 0")
            .bind(recipient_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl NotificationSink for SqliteNotificationSink {
    async fn notify(
        &self,
        recipients: &[Uuid],
        title: &str,
        message: &str,
        data: &serde_json::Value,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::DatabaseError)?;
        let now = Utc::now();
        let kind = kind_of(data);
        let payload = data.to_string();

        for recipient in recipients {
            sqlx::query(
                r#"
                INSERT INTO notifications (id, recipient_id, kind, title, message, data, read, created_at)
                VALUES (?, ?, ?, ?, ?, ?, 0, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(recipient.to_string())
            .bind(kind)
            .bind(title)
            .bind(message)
            .bind(&payload)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::DatabaseError)?;
        }

        tx.commit().await.map_err(Error::DatabaseError)?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    recipient_id: String,
    kind: String,
    title: String,
    message: String,
    data: String,
    read: bool,
    created_at: DateTime<Utc>,
}

impl NotificationRow {
    fn into_notification(self) -> Result<StoredNotification> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| Error::Parse(format!("Invalid notification ID: {}", e)))?;
        let recipient_id = Uuid::parse_str(&self.recipient_id)
            .map_err(|e| Error::Parse(format!("Invalid recipient ID: {}", e)))?;
        let data = serde_json::from_str(&self.data)
            .map_err(|e| Error::Parse(format!("Invalid notification data: {}", e)))?;

        Ok(StoredNotification {
            id,
            recipient_id,
            kind: self.kind,
            title: self.title,
            message: self.message,
            data,
            read: self.read,
            created_at: self.created_at,
        })
    }
}

// ========== In-memory sink ==========

/// One delivery captured by [`MemoryNotificationSink`]
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub recipients: Vec<Uuid>,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
}

impl Delivery {
    pub fn kind(&self) -> &str {
        kind_of(&self.data)
    }
}

/// Keeps deliveries in memory; can be told to fail
#[derive(Debug, Default)]
pub struct MemoryNotificationSink {
    deliveries: Mutex<Vec<Delivery>>,
    failing: std::sync::atomic::AtomicBool,
}

impl MemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent delivery fail
    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// All deliveries so far
    pub fn deliveries(&self) -> Vec<Delivery> {
        match self.deliveries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Deliveries of one kind
    pub fn deliveries_of(&self, kind: &str) -> Vec<Delivery> {
        self.deliveries()
            .into_iter()
            .filter(|d| d.kind() == kind)
            .collect()
    }

    pub fn clear(&self) {
        match self.deliveries.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

#[async_trait]
impl NotificationSink for MemoryNotificationSink {
    async fn notify(
        &self,
        recipients: &[Uuid],
        title: &str,
        message: &str,
        data: &serde_json::Value,
    ) -> Result<()> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::Other("notification transport unavailable".to_string()));
        }

        let delivery = Delivery {
            recipients: recipients.to_vec(),
            title: title.to_string(),
            message: message.to_string(),
            data: data.clone(),
        };
        match self.deliveries.lock() {
            Ok(mut guard) => guard.push(delivery),
            Err(poisoned) => poisoned.into_inner().push(delivery),
        }
        Ok(())
    }
}
