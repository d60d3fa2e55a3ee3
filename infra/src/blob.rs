use crate::config::{RedisConfig, StorageBackend, StorageConfig};
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

pub mod fs;
pub mod memory;
pub mod redis;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobObject {
    pub data: Bytes,
    /// starts at 1, incremented by each successful write
    pub version: u64,
    pub content_type: String,
}

/// Precondition of a write. A failed precondition is reported as
/// `MomentumError::ConflictError` and leaves the stored object untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutCondition {
    Always,
    IfAbsent,
    IfVersion(u64),
}

impl PutCondition {
    /// `current` is the stored version, `None` when no object exists.
    pub fn is_satisfied_by(&self, current: Option<u64>) -> bool {
        match (self, current) {
            (PutCondition::Always, _) => true,
            (PutCondition::IfAbsent, None) => true,
            (PutCondition::IfAbsent, Some(_)) => false,
            (PutCondition::IfVersion(v), Some(c)) => *v == c,
            (PutCondition::IfVersion(_), None) => false,
        }
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<BlobObject>>;

    /// Returns the version of the written object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
        condition: PutCondition,
    ) -> Result<u64>;

    /// Returns whether an object was removed.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<bool>;
}

pub(crate) fn conflict(
    bucket: &str,
    key: &str,
    condition: PutCondition,
    current: Option<u64>,
) -> anyhow::Error {
    momentum_base::error::MomentumError::ConflictError(format!(
        "put {}/{}: condition {:?} not satisfied by version {:?}",
        bucket, key, condition, current
    ))
    .into()
}

pub fn new_blob_store(
    storage: &StorageConfig,
    redis: Option<&RedisConfig>,
) -> Result<Arc<dyn BlobStore>> {
    match storage.backend {
        StorageBackend::Memory => {
            tracing::info!("use memory blob store");
            Ok(Arc::new(memory::MemoryBlobStore::new()))
        }
        StorageBackend::Fs => {
            tracing::info!("use fs blob store: root={:?}", &storage.root_dir);
            Ok(Arc::new(fs::FsBlobStore::new(storage.root_dir.clone())))
        }
        StorageBackend::Redis => {
            let conf = match redis {
                Some(c) => c.clone(),
                None => crate::config::load_redis_config_from_env()?,
            };
            tracing::info!("use redis blob store: url={}", &conf.url);
            let pool = crate::config::new_redis_pool(&conf)?;
            Ok(Arc::new(redis::RedisBlobStore::new(pool)))
        }
    }
}
