use super::{BlobObject, BlobStore, PutCondition};
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// In-process store for standalone runs and tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryBlobStore {
    objects: Arc<DashMap<(String, String), BlobObject>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> usize {
        self.objects.len()
    }
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<BlobObject>> {
        Ok(self
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
        condition: PutCondition,
    ) -> Result<u64> {
        let object = |version| BlobObject {
            data,
            version,
            content_type: content_type.to_string(),
        };
        // the entry guard holds the shard lock, so check and write are atomic
        let version = match self.objects.entry((bucket.to_string(), key.to_string())) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get().version;
                if !condition.is_satisfied_by(Some(current)) {
                    return Err(super::conflict(bucket, key, condition, Some(current)));
                }
                occupied.insert(object(current + 1));
                current + 1
            }
            Entry::Vacant(vacant) => {
                if !condition.is_satisfied_by(None) {
                    return Err(super::conflict(bucket, key, condition, None));
                }
                vacant.insert(object(1));
                1
            }
        };
        tracing::debug!("put object to memory: {}/{} v{}", bucket, key, version);
        Ok(version)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self
            .objects
            .remove(&(bucket.to_string(), key.to_string()))
            .is_some())
    }
}
