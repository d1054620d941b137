//! The ContentStore capability interface.
//!
//! The admin panel edits four content collections (projects, blogs,
//! promotions, talent). Which backend holds them is a startup decision made
//! from `store.backend` config; nothing probes backends at runtime.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod flatfile;
mod sqlite;

pub use flatfile::FlatFileContentStore;
pub use sqlite::SqliteContentStore;

/// Longest id either backend will accept.
pub const MAX_ID_LEN: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Projects,
    Blogs,
    Promotions,
    Talent,
}

impl Collection {
    pub const ALL: [Collection; 4] =
        [Self::Projects, Self::Blogs, Self::Promotions, Self::Talent];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "projects" => Some(Self::Projects),
            "blogs" => Some(Self::Blogs),
            "promotions" => Some(Self::Promotions),
            "talent" => Some(Self::Talent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Blogs => "blogs",
            Self::Promotions => "promotions",
            Self::Talent => "talent",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One admin-editable content document. The body is opaque JSON; the admin
/// panel owns its shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub collection: Collection,
    pub id: String,
    pub body: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid content id `{id}`")]
    InvalidId { id: String },
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<ContentRecord>, StoreError>;

    /// All records in a collection, ordered by id.
    async fn list(&self, collection: Collection) -> Result<Vec<ContentRecord>, StoreError>;

    /// Insert or replace a record verbatim. Callers own the timestamps.
    async fn put(&self, record: ContentRecord) -> Result<(), StoreError>;

    /// Returns whether a record existed to delete.
    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError>;

    /// Cheap liveness probe used by the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Ids are constrained before they reach either backend: they become file
/// names in the flat-file layout and primary-key halves in sqlite.
pub(crate) fn validate_id(id: &str) -> Result<(), StoreError> {
    let well_formed = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id.bytes().all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_');
    if well_formed {
        Ok(())
    } else {
        Err(StoreError::InvalidId { id: id.to_string() })
    }
}
