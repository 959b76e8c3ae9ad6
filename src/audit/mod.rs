
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use std::fmt;

use crate::Result;

/// Outcome recorded for a document access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum AccessStatus {
    Granted,
    Denied,
}

impl AccessStatus {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            AccessStatus::Granted => "GRANTED",
            AccessStatus::Denied => "DENIED",
        }
    }
}

impl fmt::Display for AccessStatus {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub user_id: i64,
    /// `None` when the surfaced chunk has no registered document
    pub document_id: Option<i64>,
    pub status: AccessStatus,
    pub timestamp: NaiveDateTime,
}

impl AccessLogEntry {
    /// Entry stamped with the current time
    #[inline]
    pub fn now(user_id: i64, document_id: Option<i64>, status: AccessStatus) -> Self {
        Self {
            user_id,
            document_id,
            status,
            timestamp: Utc::now().naive_utc(),
        }
    }
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: AccessLogEntry) -> Result<()>;
}
