use super::{ActivityInfo, RunInfo, RUN_INFO_CONTENT_TYPE};
use crate::blob::{BlobStore, PutCondition};
use crate::run_meta::RunMeta;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use momentum_base::error::MomentumError;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait RunInfoRepository: Sync + 'static
where
    Self: Send + 'static,
{
    /// An absent object yields an empty RunInfo and no version.
    async fn load(&self, meta: &RunMeta) -> Result<(RunInfo, Option<u64>)>;

    /// Adds or replaces the entry of `info.activity_key` without losing
    /// entries written concurrently by other tasks of the same run.
    async fn record_activity(&self, meta: &RunMeta, info: ActivityInfo) -> Result<RunInfo>;
}

pub trait UseRunInfoRepository {
    fn run_info_repository(&self) -> &Arc<dyn RunInfoRepository>;
}

/// Keeps RunInfo as a json object in a [`BlobStore`] and serializes
/// concurrent writers with versioned conditional puts: a writer that loses
/// the race reloads the current object and applies its entry again.
///
/// Every round of conflicting writers has one winner, so a writer retries
/// until its entry lands, sleeping a random delay of up to `max_backoff`
/// between rounds.
#[derive(Clone)]
pub struct BlobRunInfoRepository {
    store: Arc<dyn BlobStore>,
    bucket: String,
    max_backoff: Duration,
}

impl BlobRunInfoRepository {
    pub fn new(store: Arc<dyn BlobStore>, bucket: impl Into<String>, max_backoff: Duration) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            max_backoff,
        }
    }

    fn conflict_backoff(&self, attempt: u32) -> Duration {
        let cap_ms = (self.max_backoff.as_millis() as u64).min(1u64 << attempt.min(20));
        Duration::from_millis(rand::rng().random_range(0..=cap_ms))
    }
}

impl std::fmt::Debug for BlobRunInfoRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobRunInfoRepository")
            .field("bucket", &self.bucket)
            .field("max_backoff", &self.max_backoff)
            .finish()
    }
}

#[async_trait]
impl RunInfoRepository for BlobRunInfoRepository {
    async fn load(&self, meta: &RunMeta) -> Result<(RunInfo, Option<u64>)> {
        let key = RunInfo::object_key(&meta.run_id);
        match self.store.get_object(&self.bucket, &key).await? {
            Some(object) => {
                let info: RunInfo = serde_json::from_slice(&object.data).map_err(|e| {
                    MomentumError::StorageError(format!("broken run info {}: {:?}", &key, e))
                })?;
                Ok((info, Some(object.version)))
            }
            None => {
                tracing::debug!("run info not found, start empty: {}", &key);
                Ok((RunInfo::empty_for(meta), None))
            }
        }
    }

    async fn record_activity(&self, meta: &RunMeta, info: ActivityInfo) -> Result<RunInfo> {
        let key = RunInfo::object_key(&meta.run_id);
        let mut attempt: u32 = 1;
        loop {
            let (mut run_info, version) = self.load(meta).await?;
            run_info.upsert(info.clone());
            let condition = version
                .map(PutCondition::IfVersion)
                .unwrap_or(PutCondition::IfAbsent);
            let data = Bytes::from(serde_json::to_vec(&run_info)?);
            match self
                .store
                .put_object(&self.bucket, &key, data, RUN_INFO_CONTENT_TYPE, condition)
                .await
            {
                Ok(new_version) => {
                    tracing::debug!(
                        "recorded activity {} in {} (v{}, attempt {})",
                        &info.activity_key,
                        &key,
                        new_version,
                        attempt
                    );
                    return Ok(run_info);
                }
                Err(e)
                    if matches!(
                        e.downcast_ref::<MomentumError>(),
                        Some(MomentumError::ConflictError(_))
                    ) =>
                {
                    let backoff = self.conflict_backoff(attempt);
                    tracing::debug!(
                        "run info {} changed concurrently, retry in {:?} (attempt {}): {:?}",
                        &key,
                        backoff,
                        attempt,
                        e
                    );
                    if backoff.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::time::sleep(backoff).await;
                    }
                    attempt = attempt.saturating_add(1);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::fs::FsBlobStore;
    use crate::blob::memory::MemoryBlobStore;

    fn meta() -> RunMeta {
        RunMeta {
            workflow_id: "wf".into(),
            run_id: "run-1".into(),
            upload_id: "up-1".into(),
            ..Default::default()
        }
    }

    fn activity(key: &str) -> ActivityInfo {
        ActivityInfo {
            activity_key: key.to_string(),
            data_container_id: format!("{}-container", key),
            num_files: 1,
            num_bytes: 1,
            files: vec![],
        }
    }

    #[tokio::test]
    async fn test_load_absent_is_empty() -> Result<()> {
        let repo = BlobRunInfoRepository::new(Arc::new(MemoryBlobStore::new()), "b", Duration::from_millis(10));
        let (info, version) = repo.load(&meta()).await?;
        assert_eq!(info, RunInfo::empty_for(&meta()));
        assert!(version.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_record_overwrites_own_entry() -> Result<()> {
        let repo = BlobRunInfoRepository::new(Arc::new(MemoryBlobStore::new()), "b", Duration::from_millis(10));
        repo.record_activity(&meta(), activity("a")).await?;
        let mut again = activity("a");
        again.num_files = 7;
        repo.record_activity(&meta(), again).await?;
        let (info, version) = repo.load(&meta()).await?;
        assert_eq!(info.activity_info_map.len(), 1);
        assert_eq!(info.activity("a").map(|a| a.num_files), Some(7));
        assert_eq!(version, Some(2));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_records_keep_every_entry() -> Result<()> {
        let repo = Arc::new(BlobRunInfoRepository::new(
            Arc::new(MemoryBlobStore::new()),
            "b",
            Duration::from_millis(10),
        ));
        let handles = (0..8)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.record_activity(&meta(), activity(&format!("step{}", i))).await })
            })
            .collect::<Vec<_>>();
        for r in futures::future::join_all(handles).await {
            r??;
        }
        let (info, _) = repo.load(&meta()).await?;
        assert_eq!(info.activity_info_map.len(), 8);
        for i in 0..8 {
            assert!(info.activity(&format!("step{}", i)).is_some());
        }
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fan_out_on_fs_store_never_gives_up() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = Arc::new(BlobRunInfoRepository::new(
            Arc::new(FsBlobStore::new(dir.path())),
            "b",
            Duration::from_millis(20),
        ));
        // far more concurrent writers than a single writer ever needs rounds
        let handles = (0..64)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.record_activity(&meta(), activity(&format!("s{}", i))).await })
            })
            .collect::<Vec<_>>();
        for r in futures::future::join_all(handles).await {
            r??;
        }
        let (info, version) = repo.load(&meta()).await?;
        assert_eq!(info.activity_info_map.len(), 64);
        assert_eq!(version, Some(64));
        Ok(())
    }
}
