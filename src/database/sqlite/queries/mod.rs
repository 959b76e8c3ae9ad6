
use super::models::*;
use anyhow::{Context, Result, bail};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::audit::AccessLogEntry;
use crate::auth::hash_password;

pub struct RoleQueries;

impl RoleQueries {
    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Role>> {
        sqlx::query_as::<_, Role>("SELECT id, name FROM roles WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get role by id")
    }

    #[inline]
    pub async fn get_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Role>> {
        sqlx::query_as::<_, Role>("SELECT id, name FROM roles WHERE name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await
            .context("Failed to get role by name")
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Role>> {
        sqlx::query_as::<_, Role>("SELECT id, name FROM roles ORDER BY id ASC")
            .fetch_all(pool)
            .await
            .context("Failed to list roles")
    }

    #[inline]
    pub async fn create(pool: &SqlitePool, name: &str) -> Result<Role> {
        let id = sqlx::query("INSERT INTO roles (name) VALUES (?)")
            .bind(name)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create role {}", name))?
            .last_insert_rowid();

        Ok(Role {
            id,
            name: name.to_string(),
        })
    }
}

pub struct PermissionQueries;

impl PermissionQueries {
    /// Allow `role_id` to see `category`; `false` if it already could
    #[inline]
    pub async fn grant(pool: &SqlitePool, role_id: i64, category: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO permissions (role_id, document_category) VALUES (?, ?)",
        )
        .bind(role_id)
        .bind(category)
        .execute(pool)
        .await
        .context("Failed to grant permission")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn revoke(pool: &SqlitePool, role_id: i64, category: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM permissions WHERE role_id = ? AND document_category = ?")
                .bind(role_id)
                .bind(category)
                .execute(pool)
                .await
                .context("Failed to revoke permission")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn list_for_role(pool: &SqlitePool, role_id: i64) -> Result<Vec<Permission>> {
        sqlx::query_as::<_, Permission>(
            "SELECT id, role_id, document_category FROM permissions WHERE role_id = ? ORDER BY document_category ASC",
        )
        .bind(role_id)
        .fetch_all(pool)
        .await
        .context("Failed to list permissions for role")
    }

    #[inline]
    pub async fn categories_for_role(pool: &SqlitePool, role_id: i64) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT document_category FROM permissions WHERE role_id = ?",
        )
        .bind(role_id)
        .fetch_all(pool)
        .await
        .context("Failed to get permitted categories")
    }
}

pub struct UserQueries;

impl UserQueries {
    /// Create a user with a freshly hashed password.
    ///
    /// Fails if the role does not exist or the username is taken.
    #[inline]
    pub async fn create(pool: &SqlitePool, new_user: NewUser) -> Result<User> {
        let Some(role) = RoleQueries::get_by_name(pool, &new_user.role_name).await? else {
            bail!("Unknown role: {}", new_user.role_name);
        };

        if Self::get_by_username(pool, &new_user.username)
            .await?
            .is_some()
        {
            bail!("Username already exists: {}", new_user.username);
        }

        let password_hash =
            hash_password(&new_user.password).context("Failed to hash password")?;
        let now = Utc::now().naive_utc();
        let id = sqlx::query(
            "INSERT INTO users (username, password_hash, role_id, created_date) VALUES (?, ?, ?, ?)",
        )
        .bind(&new_user.username)
        .bind(&password_hash)
        .bind(role.id)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create user")?
        .last_insert_rowid();

        debug!("Created user {} with role {}", new_user.username, role.name);

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created user"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, role_id, created_date FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by id")
    }

    #[inline]
    pub async fn get_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, role_id, created_date FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by username")
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<User>> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, role_id, created_date FROM users ORDER BY username ASC",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list users")
    }
}

pub struct DocumentQueries;

impl DocumentQueries {
    /// Register a corpus file, or update the category of an existing registration
    #[inline]
    pub async fn register(pool: &SqlitePool, new_document: NewDocument) -> Result<Document> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            INSERT INTO documents (file_path, category, registered_date) VALUES (?, ?, ?)
            ON CONFLICT(file_path) DO UPDATE SET category = excluded.category
            "#,
        )
        .bind(&new_document.file_path)
        .bind(&new_document.category)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to register document")?;

        Self::get_by_path(pool, &new_document.file_path)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve registered document"))
    }

    #[inline]
    pub async fn get_by_path(pool: &SqlitePool, file_path: &str) -> Result<Option<Document>> {
        sqlx::query_as::<_, Document>(
            "SELECT id, file_path, category, registered_date FROM documents WHERE file_path = ?",
        )
        .bind(file_path)
        .fetch_optional(pool)
        .await
        .context("Failed to get document by path")
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Document>> {
        sqlx::query_as::<_, Document>(
            "SELECT id, file_path, category, registered_date FROM documents ORDER BY id ASC",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list documents")
    }
}

pub struct AccessLogQueries;

impl AccessLogQueries {
    #[inline]
    pub async fn insert(pool: &SqlitePool, entry: &AccessLogEntry) -> Result<i64> {
        let id = sqlx::query(
            "INSERT INTO access_logs (user_id, document_id, access_time, access_status) VALUES (?, ?, ?, ?)",
        )
        .bind(entry.user_id)
        .bind(entry.document_id)
        .bind(entry.timestamp)
        .bind(entry.status)
        .execute(pool)
        .await
        .context("Failed to insert access log")?
        .last_insert_rowid();

        Ok(id)
    }

    /// Most recent entries first
    #[inline]
    pub async fn recent(pool: &SqlitePool, limit: i64) -> Result<Vec<AccessLogRecord>> {
        sqlx::query_as::<_, AccessLogRecord>(
            r#"
            SELECT l.id,
                   l.user_id,
                   u.username,
                   l.document_id,
                   d.file_path,
                   l.access_time,
                   l.access_status
            FROM access_logs l
            LEFT JOIN users u ON u.id = l.user_id
            LEFT JOIN documents d ON d.id = l.document_id
            ORDER BY l.access_time DESC, l.id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list recent access logs")
    }

    #[inline]
    pub async fn count_for_user(pool: &SqlitePool, user_id: i64) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM access_logs WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .context("Failed to count access logs")
    }
}
