use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::access::{PermissionStore, PermittedCategories};
use crate::audit::{AccessLogEntry, AuditLog};
use crate::auth::{AuthenticatedUser, CredentialStore, verify_password};
use crate::database::sqlite::models::{
    AccessLogRecord, Document, NewDocument, NewUser, Permission, Role, User, UserSummary,
};
use crate::database::sqlite::queries::{
    AccessLogQueries, DocumentQueries, PermissionQueries, RoleQueries, UserQueries,
};
use crate::loader::{CatalogEntry, DocumentCatalog};
use crate::RagError;


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

fn storage_error(error: anyhow::Error) -> RagError {
    RagError::Database(format!("{:#}", error))
}

impl Database {
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join("metadata.db")).await
    }

    // Role and permission operations
    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        RoleQueries::list_all(&self.pool).await
    }

    pub async fn role_categories(&self, role_id: i64) -> Result<Vec<String>> {
        PermissionQueries::categories_for_role(&self.pool, role_id).await
    }

    pub async fn role_permissions(&self, role_id: i64) -> Result<Vec<Permission>> {
        PermissionQueries::list_for_role(&self.pool, role_id).await
    }

    pub async fn create_role(&self, name: &str) -> Result<Role> {
        if RoleQueries::get_by_name(&self.pool, name).await?.is_some() {
            bail!("Role already exists: {}", name);
        }
        RoleQueries::create(&self.pool, name).await
    }

    async fn require_role(&self, role_name: &str) -> Result<Role> {
        RoleQueries::get_by_name(&self.pool, role_name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Unknown role: {}", role_name))
    }

    pub async fn grant_permission(&self, role_name: &str, category: &str) -> Result<bool> {
        let role = self.require_role(role_name).await?;
        PermissionQueries::grant(&self.pool, role.id, category).await
    }

    pub async fn revoke_permission(&self, role_name: &str, category: &str) -> Result<bool> {
        let role = self.require_role(role_name).await?;
        PermissionQueries::revoke(&self.pool, role.id, category).await
    }

    // User operations
    pub async fn create_user(&self, username: &str, password: &str, role_name: &str) -> Result<User> {
        UserQueries::create(
            &self.pool,
            NewUser {
                username: username.to_string(),
                password: password.to_string(),
                role_name: role_name.to_string(),
            },
        )
        .await
    }

    pub async fn user_summaries(&self) -> Result<Vec<UserSummary>> {
        let users = UserQueries::list_all(&self.pool).await?;

        let mut summaries = Vec::with_capacity(users.len());
        for user in users {
            let role = RoleQueries::get_by_id(&self.pool, user.role_id).await?;
            let access_count = AccessLogQueries::count_for_user(&self.pool, user.id).await?;
            summaries.push(UserSummary {
                id: user.id,
                username: user.username,
                role_name: role.map(|role| role.name),
                access_count,
            });
        }
        Ok(summaries)
    }

    // Document catalog operations
    pub async fn register_document(&self, file_path: &str, category: &str) -> Result<Document> {
        DocumentQueries::register(
            &self.pool,
            NewDocument {
                file_path: file_path.to_string(),
                category: category.to_string(),
            },
        )
        .await
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        DocumentQueries::list_all(&self.pool).await
    }

    // Audit operations
    pub async fn recent_access_logs(&self, limit: i64) -> Result<Vec<AccessLogRecord>> {
        AccessLogQueries::recent(&self.pool, limit).await
    }
}

#[async_trait]
impl CredentialStore for Database {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> crate::Result<Option<AuthenticatedUser>> {
        let user = UserQueries::get_by_username(&self.pool, username)
            .await
            .map_err(storage_error)?;

        let Some(user) = user else {
            debug!("Authentication failed: unknown user {}", username);
            return Ok(None);
        };

        if verify_password(password, &user.password_hash) {
            debug!("Authenticated user {}", username);
            Ok(Some(user.identity()))
        } else {
            debug!("Authentication failed: wrong password for {}", username);
            Ok(None)
        }
    }
}

#[async_trait]
impl PermissionStore for Database {
    async fn permitted_categories(&self, role_id: i64) -> crate::Result<PermittedCategories> {
        let categories = self.role_categories(role_id).await.map_err(storage_error)?;
        Ok(PermittedCategories::new(categories))
    }
}

#[async_trait]
impl AuditLog for Database {
    async fn record(&self, entry: AccessLogEntry) -> crate::Result<()> {
        let id = AccessLogQueries::insert(&self.pool, &entry)
            .await
            .map_err(storage_error)?;
        debug!(
            "Access log {}: user {} document {:?} {}",
            id, entry.user_id, entry.document_id, entry.status
        );
        Ok(())
    }
}

#[async_trait]
impl DocumentCatalog for Database {
    async fn entries(&self) -> crate::Result<Vec<CatalogEntry>> {
        let documents = self.list_documents().await.map_err(storage_error)?;
        Ok(documents.into_iter().map(CatalogEntry::from).collect())
    }
}
