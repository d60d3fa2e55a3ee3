use super::{BlobObject, BlobStore, PutCondition};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use momentum_base::error::MomentumError;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

const OBJECTS_DIR: &str = "objects";
const META_DIR: &str = "meta";

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ObjectMeta {
    version: u64,
    content_type: String,
}

/// Stores each object as a plain file under `root/<bucket>/objects/<key>`
/// with its version in a json sidecar under `root/<bucket>/meta/<key>`.
///
/// Conditional writes are serialized inside this process only; several
/// processes sharing one root need the redis backend instead.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
    lock: Arc<RwLock<()>>,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Arc::new(RwLock::new(())),
        }
    }

    fn paths(&self, bucket: &str, key: &str) -> Result<(PathBuf, PathBuf)> {
        for part in [bucket, key] {
            let p = Path::new(part);
            if part.is_empty()
                || p.components()
                    .any(|c| !matches!(c, Component::Normal(_)))
            {
                return Err(MomentumError::InvalidParameter(format!(
                    "invalid object path: {}/{}",
                    bucket, key
                ))
                .into());
            }
        }
        let base = self.root.join(bucket);
        Ok((
            base.join(OBJECTS_DIR).join(key),
            base.join(META_DIR).join(format!("{}.json", key)),
        ))
    }

    async fn read_meta(path: &Path) -> Result<Option<ObjectMeta>> {
        match tokio::fs::read(path).await {
            Ok(buf) => Ok(Some(serde_json::from_slice(&buf)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MomentumError::IoError(e).into()),
        }
    }

    // write to a temp file in the destination dir and rename over the target
    fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| MomentumError::StorageError(format!("no parent dir: {:?}", path)))?;
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .map_err(|e| MomentumError::IoError(e.error))?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<BlobObject>> {
        let (data_path, meta_path) = self.paths(bucket, key)?;
        let _guard = self.lock.read().await;
        let Some(meta) = Self::read_meta(&meta_path).await? else {
            return Ok(None);
        };
        let data = tokio::fs::read(&data_path)
            .await
            .with_context(|| format!("read object {:?}", &data_path))?;
        Ok(Some(BlobObject {
            data: Bytes::from(data),
            version: meta.version,
            content_type: meta.content_type,
        }))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
        condition: PutCondition,
    ) -> Result<u64> {
        let (data_path, meta_path) = self.paths(bucket, key)?;
        let _guard = self.lock.write().await;
        let current = Self::read_meta(&meta_path).await?.map(|m| m.version);
        if !condition.is_satisfied_by(current) {
            return Err(super::conflict(bucket, key, condition, current));
        }
        let meta = ObjectMeta {
            version: current.unwrap_or(0) + 1,
            content_type: content_type.to_string(),
        };
        let version = meta.version;
        let meta_buf = serde_json::to_vec(&meta)?;
        // the sidecar is written last: an object without one does not exist
        tokio::task::spawn_blocking(move || -> Result<()> {
            Self::write_atomic(&data_path, &data)?;
            Self::write_atomic(&meta_path, &meta_buf)
        })
        .await
        .map_err(|e| MomentumError::RuntimeError(format!("fs put task failed: {:?}", e)))??;
        tracing::debug!("put object to fs: {}/{} v{}", bucket, key, version);
        Ok(version)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<bool> {
        let (data_path, meta_path) = self.paths(bucket, key)?;
        let _guard = self.lock.write().await;
        let existed = match tokio::fs::remove_file(&meta_path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(MomentumError::IoError(e).into()),
        };
        if let Err(e) = tokio::fs::remove_file(&data_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(MomentumError::IoError(e).into());
            }
        }
        Ok(existed)
    }
}
