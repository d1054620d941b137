use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::{validate_id, Collection, ContentRecord, ContentStore, StoreError};

/// `<data_dir>/<collection>/<id>.json`, one record per file.
///
/// Writes go through a temp file and a rename so a crashed write never leaves
/// a half-serialized record behind. Id validation (see [`validate_id`]) is
/// what keeps the file name honest.
pub struct FlatFileContentStore {
    data_dir: PathBuf,
}

impl FlatFileContentStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    fn record_path(&self, collection: Collection, id: &str) -> PathBuf {
        self.data_dir.join(collection.as_str()).join(format!("{id}.json"))
    }
}

#[async_trait]
impl ContentStore for FlatFileContentStore {
    async fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<ContentRecord>, StoreError> {
        validate_id(id)?;
        read_record(&self.record_path(collection, id)).await
    }

    async fn list(&self, collection: Collection) -> Result<Vec<ContentRecord>, StoreError> {
        let dir = self.data_dir.join(collection.as_str());
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(record) = read_record(&path).await? {
                records.push(record);
            }
        }

        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn put(&self, record: ContentRecord) -> Result<(), StoreError> {
        validate_id(&record.id)?;

        let path = self.record_path(record.collection, &record.id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let encoded = serde_json::to_vec_pretty(&record)
            .map_err(|error| StoreError::Decode(format!("record failed to serialize: {error}")))?;

        let staging = path.with_extension("json.tmp");
        fs::write(&staging, encoded).await?;
        fs::rename(&staging, &path).await?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        validate_id(id)?;

        match fs::remove_file(self.record_path(collection, id)).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.data_dir).await?;
        Ok(())
    }
}

async fn read_record(path: &Path) -> Result<Option<ContentRecord>, StoreError> {
    let raw = match fs::read(path).await {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.into()),
    };

    serde_json::from_slice(&raw)
        .map(Some)
        .map_err(|error| StoreError::Decode(format!("{}: {error}", path.display())))
}
