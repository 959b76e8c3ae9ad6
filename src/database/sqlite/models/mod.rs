
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::audit::AccessStatus;
use crate::auth::AuthenticatedUser;
use crate::loader::CatalogEntry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub id: i64,
    pub role_id: i64,
    pub document_category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role_id: i64,
    pub created_date: NaiveDateTime,
}

/// A user with their role name and how many accesses they have logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    /// `None` if the role row has been removed
    pub role_name: Option<String>,
    pub access_count: i64,
}

/// A user to create; `password` is hashed before it is stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub role_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: i64,
    pub file_path: String,
    pub category: String,
    pub registered_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub file_path: String,
    pub category: String,
}

/// Access log row joined with the names it refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AccessLogRecord {
    pub id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub document_id: Option<i64>,
    pub file_path: Option<String>,
    pub access_time: NaiveDateTime,
    pub access_status: AccessStatus,
}

impl User {
    #[inline]
    pub fn identity(&self) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: self.id,
            role_id: self.role_id,
        }
    }
}

impl From<Document> for CatalogEntry {
    #[inline]
    fn from(document: Document) -> Self {
        Self {
            document_id: document.id,
            file_path: document.file_path,
            category: document.category,
        }
    }
}
