//! SQLite-backed directory and work schedule

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{Directory, User, WorkSchedule};
use crate::domain::actor::Role;
use crate::error::{Error, Result};

/// Directory stored in the `users` and `schedule_assignments` tables
#[derive(Debug, Clone)]
pub struct SqliteDirectory {
    pool: SqlitePool,
}

impl SqliteDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========== Users ==========

    /// Add a user to the directory
    pub async fn add_user(&self, user: &User) -> Result<()> {
        if user.name.trim().is_empty() {
            return Err(Error::InvalidArgument("User name cannot be empty".to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO users (id, name, role, department, active, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(user.name.trim())
        .bind(user.role.as_str())
        .bind(user.department.as_deref().map(str::trim))
        .bind(user.active)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        Ok(())
    }

    /// Activate or deactivate a user
    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE users SET active = ? WHERE id = ?")
            .bind(active)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        if result.rows_affected() == 0 {
            return Err(Error::UserNotFound(id));
        }
        Ok(())
    }

    /// All users, active or not, ordered by name
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT id, name, role, department, active, created_at
            FROM users
            ORDER BY name COLLATE NOCASE
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        rows.into_iter().map(|row| row.into_user()).collect()
    }

    // ========== Schedule ==========

    /// Record that a user works on a date. Re-adding the same pair is a no-op.
    pub async fn add_schedule_assignment(&self, user_id: Uuid, work_date: NaiveDate) -> Result<()> {
        if self.get_user(user_id).await?.is_none() {
            return Err(Error::UserNotFound(user_id));
        }

        sqlx::query(
            r#"
            INSERT INTO schedule_assignments (user_id, work_date, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id, work_date) DO NOTHING
            "#,
        )
        .bind(user_id.to_string())
        .bind(work_date)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        Ok(())
    }
}

#[async_trait]
impl Directory for SqliteDirectory {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, name, role, department, active, created_at FROM users WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        row.map(|r| r.into_user()).transpose()
    }

    async fn list_by_department(&self, department: &str) -> Result<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT id, name, role, department, active, created_at
            FROM users
            WHERE active = 1 AND department = ? COLLATE NOCASE
            ORDER BY name COLLATE NOCASE
            "#,
        )
        .bind(department.trim())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        rows.into_iter().map(|row| row.into_user()).collect()
    }

    async fn list_by_roles(&self, roles: &[Role]) -> Result<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT id, name, role, department, active, created_at
            FROM users
            WHERE active = 1
            ORDER BY name COLLATE NOCASE
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        let users = rows
            .into_iter()
            .map(|row| row.into_user())
            .collect::<Result<Vec<_>>>()?;
        Ok(users.into_iter().filter(|u| roles.contains(&u.role)).collect())
    }
}

#[async_trait]
impl WorkSchedule for SqliteDirectory {
    async fn scheduled_on(&self, department: &str, date: NaiveDate) -> Result<Vec<Uuid>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT u.id
            FROM schedule_assignments s
            JOIN users u ON u.id = s.user_id
            WHERE s.work_date = ? AND u.active = 1 AND u.department = ? COLLATE NOCASE
            ORDER BY u.name COLLATE NOCASE
            "#,
        )
        .bind(date)
        .bind(department.trim())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        rows.into_iter()
            .map(|(id,)| {
                Uuid::parse_str(&id).map_err(|e| Error::Parse(format!("Invalid user ID: {}", e)))
            })
            .collect()
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    role: String,
    department: Option<String>,
    active: bool,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> Result<User> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| Error::Parse(format!("Invalid user ID: {}", e)))?;
        let role = Role::from_str(&self.role)
            .ok_or_else(|| Error::Parse(format!("Invalid role: {}", self.role)))?;

        Ok(User {
            id,
            name: self.name,
            role,
            department: self.department,
            active: self.active,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    async fn create_directory() -> SqliteDirectory {
        let db = Database::in_memory()
            .await
            .expect("Failed to create test database");
        SqliteDirectory::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_add_and_get_user() {
        let dir = create_directory().await;
        let user = User::new("Ana", Role::Inspector, Some("control".to_string()));
        dir.add_user(&user).await.unwrap();

        let loaded = dir.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Ana");
        assert_eq!(loaded.role, Role::Inspector);
        assert!(loaded.active);

        assert!(dir.get_user(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let dir = create_directory().await;
        let user = User::new("  ", Role::Staff, None);
        assert!(matches!(
            dir.add_user(&user).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_list_by_department_skips_inactive() {
        let dir = create_directory().await;
        let a = User::new("Ana", Role::Inspector, Some("Control".to_string()));
        let b = User::new("Bruno", Role::Inspector, Some("control".to_string()));
        let c = User::new("Carla", Role::Staff, Some("notices".to_string()));
        for u in [&a, &b, &c] {
            dir.add_user(u).await.unwrap();
        }
        dir.set_active(b.id, false).await.unwrap();

        let control = dir.list_by_department("CONTROL").await.unwrap();
        assert_eq!(control.len(), 1);
        assert_eq!(control[0].id, a.id);

        assert_eq!(dir.list_users().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_list_by_roles() {
        let dir = create_directory().await;
        let admin = User::new("Root", Role::Admin, None);
        let manager = User::new("Maria", Role::Manager, Some("control".to_string()));
        let inspector = User::new("Ivo", Role::Inspector, Some("control".to_string()));
        for u in [&admin, &manager, &inspector] {
            dir.add_user(u).await.unwrap();
        }

        let supervisors = dir.list_by_roles(&[Role::Admin, Role::Manager]).await.unwrap();
        let ids: Vec<Uuid> = supervisors.iter().map(|u| u.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&admin.id));
        assert!(ids.contains(&manager.id));
    }

    #[tokio::test]
    async fn test_set_active_unknown_user() {
        let dir = create_directory().await;
        assert!(matches!(
            dir.set_active(Uuid::new_v4(), false).await,
            Err(Error::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_scheduled_on() {
        let dir = create_directory().await;
        let date = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let driver = User::new("Dario", Role::Staff, Some("dispatch".to_string()));
        let off_duty = User::new("Olga", Role::Staff, Some("dispatch".to_string()));
        let other = User::new("Pia", Role::Staff, Some("notices".to_string()));
        for u in [&driver, &off_duty, &other] {
            dir.add_user(u).await.unwrap();
        }

        dir.add_schedule_assignment(driver.id, date).await.unwrap();
        // Idempotent
        dir.add_schedule_assignment(driver.id, date).await.unwrap();
        dir.add_schedule_assignment(off_duty.id, date.succ_opt().unwrap())
            .await
            .unwrap();
        dir.add_schedule_assignment(other.id, date).await.unwrap();

        assert_eq!(dir.scheduled_on("dispatch", date).await.unwrap(), vec![driver.id]);
        assert!(matches!(
            dir.add_schedule_assignment(Uuid::new_v4(), date).await,
            Err(Error::UserNotFound(_))
        ));
    }
}
