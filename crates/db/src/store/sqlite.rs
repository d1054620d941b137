use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use super::{validate_id, Collection, ContentRecord, ContentStore, StoreError};
use crate::DbPool;

/// Migration-managed `content_record` table behind the ContentStore interface.
pub struct SqliteContentStore {
    pool: DbPool,
}

impl SqliteContentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<ContentRecord>, StoreError> {
        validate_id(id)?;

        let row = sqlx::query(
            "SELECT collection, id, body, created_at, updated_at
             FROM content_record
             WHERE collection = ? AND id = ?",
        )
        .bind(collection.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_row).transpose()
    }

    async fn list(&self, collection: Collection) -> Result<Vec<ContentRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT collection, id, body, created_at, updated_at
             FROM content_record
             WHERE collection = ?
             ORDER BY id",
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_row).collect()
    }

    async fn put(&self, record: ContentRecord) -> Result<(), StoreError> {
        validate_id(&record.id)?;

        sqlx::query(
            "INSERT INTO content_record (collection, id, body, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(collection, id) DO UPDATE SET
                body = excluded.body,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
        )
        .bind(record.collection.as_str())
        .bind(&record.id)
        .bind(record.body.to_string())
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        validate_id(id)?;

        let result = sqlx::query("DELETE FROM content_record WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn decode_row(row: SqliteRow) -> Result<ContentRecord, StoreError> {
    let collection_raw = row.get::<String, _>("collection");
    let collection = Collection::parse(&collection_raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown collection `{collection_raw}`")))?;

    let body = serde_json::from_str(&row.get::<String, _>("body"))
        .map_err(|error| StoreError::Decode(format!("record body is not valid JSON: {error}")))?;

    Ok(ContentRecord {
        collection,
        id: row.get("id"),
        body,
        created_at: decode_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: decode_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| StoreError::Decode(format!("invalid timestamp `{raw}`: {error}")))
}
