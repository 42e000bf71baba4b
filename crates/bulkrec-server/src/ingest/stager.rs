//! Durable handoff of chunks to the apply step
//!
//! A chunk is written to a [`ChunkStore`] under a job-unique name and the
//! apply step receives only the resulting [`StagedReference`]. Stores do not
//! retry; the orchestrator owns the retry policy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::storage::Storage;

#[derive(Error, Debug, Clone)]
pub enum StageError {
    #[error("Staging timed out after {0:?}")]
    Timeout(Duration),

    #[error("Staged object not found: {0}")]
    NotFound(String),

    #[error("Staging backend error: {0}")]
    Backend(String),

    #[error("Chunk could not be serialized: {0}")]
    Serialize(String),
}

/// Opaque handle to staged content, unique within and across jobs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StagedReference(String);

impl StagedReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StagedReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry returned by [`ChunkStore::list`]
#[derive(Debug, Clone)]
pub struct StagedObject {
    pub reference: StagedReference,
    pub last_modified: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<StagedReference, StageError>;

    async fn get(&self, reference: &StagedReference) -> Result<Vec<u8>, StageError>;

    async fn delete(&self, reference: &StagedReference) -> Result<(), StageError>;

    async fn list(&self, prefix: &str) -> Result<Vec<StagedObject>, StageError>;
}

/// Prefix holding every chunk of one job
pub fn job_prefix(staging_prefix: &str, job_id: Uuid) -> String {
    format!("{}/{}/", staging_prefix, job_id)
}

/// `{staging_prefix}/{job_id}/chunk-{sequence:05}.csv`
pub fn object_name(staging_prefix: &str, job_id: Uuid, sequence: u32) -> String {
    format!("{}chunk-{:05}.csv", job_prefix(staging_prefix, job_id), sequence)
}

fn backend(err: anyhow::Error) -> StageError {
    StageError::Backend(format!("{:#}", err))
}

#[async_trait]
impl ChunkStore for Storage {
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<StagedReference, StageError> {
        let receipt = self
            .put_object(name, bytes, "text/csv; charset=utf-8")
            .await
            .map_err(backend)?;
        debug!(key = %receipt.key, sha256 = %receipt.sha256, bytes = receipt.bytes, "Chunk staged");
        Ok(StagedReference(receipt.key))
    }

    async fn get(&self, reference: &StagedReference) -> Result<Vec<u8>, StageError> {
        self.get_object(reference.as_str())
            .await
            .map_err(backend)?
            .ok_or_else(|| StageError::NotFound(reference.to_string()))
    }

    async fn delete(&self, reference: &StagedReference) -> Result<(), StageError> {
        self.delete_object(reference.as_str()).await.map_err(backend)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StagedObject>, StageError> {
        let objects = self.list_objects(prefix).await.map_err(backend)?;
        Ok(objects
            .into_iter()
            .map(|o| StagedObject {
                reference: StagedReference(o.key),
                last_modified: o.last_modified,
            })
            .collect())
    }
}

/// Process-local store
///
/// Staged chunks live only as long as the server process, so this backend is
/// usable only when the apply step runs inline.
#[derive(Debug, Default)]
pub struct MemoryChunkStore {
    objects: RwLock<BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Insert with an explicit timestamp; used to simulate stale objects
    pub async fn insert_at(&self, name: &str, bytes: Vec<u8>, modified: DateTime<Utc>) {
        self.objects
            .write()
            .await
            .insert(name.to_string(), (bytes, modified));
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<StagedReference, StageError> {
        self.insert_at(name, bytes, Utc::now()).await;
        Ok(StagedReference::new(name))
    }

    async fn get(&self, reference: &StagedReference) -> Result<Vec<u8>, StageError> {
        self.objects
            .read()
            .await
            .get(reference.as_str())
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| StageError::NotFound(reference.to_string()))
    }

    async fn delete(&self, reference: &StagedReference) -> Result<(), StageError> {
        self.objects.write().await.remove(reference.as_str());
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StagedObject>, StageError> {
        Ok(self
            .objects
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, (_, modified))| StagedObject {
                reference: StagedReference::new(name.clone()),
                last_modified: Some(*modified),
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_object_name_format() {
        let job_id = Uuid::parse_str("6f1c2b1e-7d40-4a8a-9f5e-2f0e3c1d9a77").unwrap();
        assert_eq!(
            object_name("staging", job_id, 3),
            "staging/6f1c2b1e-7d40-4a8a-9f5e-2f0e3c1d9a77/chunk-00003.csv"
        );
    }

    #[test]
    fn test_names_unique_across_jobs() {
        let a = object_name("staging", Uuid::new_v4(), 1);
        let b = object_name("staging", Uuid::new_v4(), 1);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip_and_delete() {
        let store = MemoryChunkStore::new();
        let reference = store.put("staging/j/chunk-00001.csv", b"a,b\n".to_vec()).await.unwrap();

        assert_eq!(store.get(&reference).await.unwrap(), b"a,b\n");
        store.delete(&reference).await.unwrap();
        assert!(matches!(store.get(&reference).await, Err(StageError::NotFound(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_store_list_by_prefix() {
        let store = MemoryChunkStore::new();
        store.put("staging/a/chunk-00001.csv", vec![]).await.unwrap();
        store.put("staging/a/chunk-00002.csv", vec![]).await.unwrap();
        store.put("staging/b/chunk-00001.csv", vec![]).await.unwrap();

        let listed = store.list("staging/a/").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|o| o.reference.as_str().starts_with("staging/a/")));
        assert_eq!(store.list("staging/").await.unwrap().len(), 3);
    }
}
