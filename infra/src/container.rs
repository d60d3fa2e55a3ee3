use crate::archive::{self, ZIP_CONTENT_TYPE};
use crate::blob::{BlobObject, BlobStore, PutCondition};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use momentum_base::error::MomentumError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Addressable blob location holding either the uploaded file itself or
/// the zipped output directory of one task.
#[async_trait]
pub trait DataContainer: Send + Sync {
    fn container_id(&self) -> &str;

    /// Writes the single stored object to `path`. Returns the byte count.
    async fn download_file(&self, path: &Path) -> Result<u64>;

    /// Extracts the stored zip archive into `dir`.
    async fn download_and_unzip(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    async fn upload_file(&self, path: &Path, content_type: &str) -> Result<u64>;

    async fn zip_and_upload_directory(&self, dir: &Path) -> Result<u64>;
}

#[derive(Clone)]
pub struct BlobDataContainer {
    store: Arc<dyn BlobStore>,
    bucket: String,
    id: String,
}

impl std::fmt::Debug for BlobDataContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobDataContainer")
            .field("bucket", &self.bucket)
            .field("id", &self.id)
            .finish()
    }
}

impl BlobDataContainer {
    pub fn new(store: Arc<dyn BlobStore>, bucket: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            id: id.into(),
        }
    }

    async fn fetch(&self) -> Result<BlobObject> {
        self.store
            .get_object(&self.bucket, &self.id)
            .await?
            .ok_or_else(|| {
                MomentumError::DataRelayError(format!(
                    "data container not found: {}/{}",
                    &self.bucket, &self.id
                ))
                .into()
            })
    }

    // containers are write-once
    async fn put(&self, data: Bytes, content_type: &str) -> Result<u64> {
        self.store
            .put_object(&self.bucket, &self.id, data, content_type, PutCondition::IfAbsent)
            .await
            .with_context(|| format!("upload data container {}", &self.id))
    }
}

#[async_trait]
impl DataContainer for BlobDataContainer {
    fn container_id(&self) -> &str {
        &self.id
    }

    async fn download_file(&self, path: &Path) -> Result<u64> {
        let object = self.fetch().await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &object.data)
            .await
            .with_context(|| format!("write downloaded file {:?}", path))?;
        tracing::debug!("downloaded {} ({} bytes) to {:?}", &self.id, object.data.len(), path);
        Ok(object.data.len() as u64)
    }

    async fn download_and_unzip(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let object = self.fetch().await?;
        tokio::fs::create_dir_all(dir).await?;
        let files = archive::unzip_to(object.data, dir)
            .await
            .map_err(|e| MomentumError::DataRelayError(format!("unzip {}: {:?}", &self.id, e)))?;
        tracing::debug!("extracted {} files of {} into {:?}", files.len(), &self.id, dir);
        Ok(files)
    }

    async fn upload_file(&self, path: &Path, content_type: &str) -> Result<u64> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("read upload file {:?}", path))?;
        self.put(Bytes::from(data), content_type).await
    }

    async fn zip_and_upload_directory(&self, dir: &Path) -> Result<u64> {
        let data = archive::zip_directory(dir)
            .await
            .map_err(|e| MomentumError::DataRelayError(format!("zip {:?}: {:?}", dir, e)))?;
        self.put(data, ZIP_CONTENT_TYPE).await
    }
}

/// Opens containers in one bucket of one store.
#[derive(Clone)]
pub struct DataContainerFactory {
    store: Arc<dyn BlobStore>,
    bucket: String,
}

impl std::fmt::Debug for DataContainerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataContainerFactory")
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl DataContainerFactory {
    pub fn new(store: Arc<dyn BlobStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn open(&self, id: &str) -> BlobDataContainer {
        BlobDataContainer::new(self.store.clone(), self.bucket.clone(), id)
    }

    /// A container under a fresh random id.
    pub fn create(&self) -> BlobDataContainer {
        self.open(&uuid::Uuid::new_v4().to_string())
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::memory::MemoryBlobStore;

    #[tokio::test]
    async fn test_zip_upload_then_download_and_unzip() -> Result<()> {
        let factory = DataContainerFactory::new(Arc::new(MemoryBlobStore::new()), "bucket");
        let out = tempfile::tempdir()?;
        std::fs::write(out.path().join("a.txt"), b"hi")?;
        std::fs::write(out.path().join("b.txt"), b"bye")?;

        let container = factory.create();
        container.zip_and_upload_directory(out.path()).await?;
        let object = factory
            .store()
            .get_object("bucket", container.container_id())
            .await?
            .unwrap();
        assert_eq!(object.content_type, ZIP_CONTENT_TYPE);

        let input = tempfile::tempdir()?;
        let files = factory
            .open(container.container_id())
            .download_and_unzip(input.path())
            .await?;
        assert_eq!(files.len(), 2);
        assert_eq!(std::fs::read(input.path().join("a.txt"))?, b"hi");
        assert_eq!(std::fs::read(input.path().join("b.txt"))?, b"bye");

        // write-once
        assert!(container.zip_and_upload_directory(out.path()).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_single_file_round_trip_and_missing_container() -> Result<()> {
        let factory = DataContainerFactory::new(Arc::new(MemoryBlobStore::new()), "bucket");
        let dir = tempfile::tempdir()?;
        let src = dir.path().join("photo.png");
        std::fs::write(&src, b"\x89PNG")?;
        factory.open("upload-1").upload_file(&src, "image/png").await?;

        let dst = dir.path().join("in").join("photo.png");
        assert_eq!(factory.open("upload-1").download_file(&dst).await?, 4);
        assert_eq!(std::fs::read(&dst)?, b"\x89PNG");

        let err = factory
            .open("missing")
            .download_file(&dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MomentumError>(),
            Some(MomentumError::DataRelayError(_))
        ));
        Ok(())
    }
}
