use crate::runner::{ActivityContext, TaskWorkspace};
use anyhow::{Context, Result};
use momentum_base::error::MomentumError;
use momentum_infra::container::{DataContainer, DataContainerFactory};
use momentum_infra::run_info::repository::{RunInfoRepository, UseRunInfoRepository};
use momentum_infra::run_info::{ActivityInfo, RunInfo};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Local state of one task invocation between
/// [`ActivityDataHandler::prepare_data_layer`] and
/// [`ActivityDataHandler::cleanup`]. Dropping it removes both directories.
#[derive(Debug)]
pub struct ActivityDataLayer {
    pub run_info: RunInfo,
    pub input_container_id: String,
    input_dir: TempDir,
    output_dir: TempDir,
}

impl ActivityDataLayer {
    pub fn workspace(&self) -> TaskWorkspace {
        TaskWorkspace {
            input_dir: self.input_dir.path().to_path_buf(),
            output_dir: self.output_dir.path().to_path_buf(),
        }
    }
}

#[derive(Clone)]
pub struct ActivityDataHandler {
    containers: DataContainerFactory,
    run_info_repository: Arc<dyn RunInfoRepository>,
    /// base of the per-task working directories, system temp dir when None
    work_dir: Option<PathBuf>,
}

impl std::fmt::Debug for ActivityDataHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityDataHandler")
            .field("containers", &self.containers)
            .field("work_dir", &self.work_dir)
            .finish_non_exhaustive()
    }
}

impl UseRunInfoRepository for ActivityDataHandler {
    fn run_info_repository(&self) -> &Arc<dyn RunInfoRepository> {
        &self.run_info_repository
    }
}

impl ActivityDataHandler {
    pub fn new(
        containers: DataContainerFactory,
        run_info_repository: Arc<dyn RunInfoRepository>,
        work_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            containers,
            run_info_repository,
            work_dir,
        }
    }

    pub fn containers(&self) -> &DataContainerFactory {
        &self.containers
    }

    fn new_work_dir(base: Option<&Path>, prefix: &str) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        match base {
            Some(base) => {
                std::fs::create_dir_all(base)
                    .with_context(|| format!("create work dir {:?}", base))?;
                Ok(builder.tempdir_in(base)?)
            }
            None => Ok(builder.tempdir()?),
        }
    }

    /// Input and output directories of one task.
    async fn new_work_dirs(&self) -> Result<(TempDir, TempDir)> {
        let base = self.work_dir.clone();
        tokio::task::spawn_blocking(move || {
            Ok::<_, anyhow::Error>((
                Self::new_work_dir(base.as_deref(), "momentum-in-")?,
                Self::new_work_dir(base.as_deref(), "momentum-out-")?,
            ))
        })
        .await
        .map_err(|e| MomentumError::RuntimeError(format!("create work dirs failed: {:?}", e)))?
    }

    /// Container id the task reads from: the output of its declared input
    /// step, or the uploaded file itself.
    pub fn resolve_input_container(run_info: &RunInfo, ctx: &ActivityContext) -> Result<String> {
        match ctx.input_activity_key.as_deref() {
            Some(input_key) => run_info
                .activity(input_key)
                .map(|info| info.data_container_id.clone())
                .ok_or_else(|| {
                    MomentumError::PredecessorNotFound(format!(
                        "input activity {} of {} not found in run {}",
                        input_key, &ctx.activity_key, &ctx.meta.run_id
                    ))
                    .into()
                }),
            None => Ok(ctx.meta.upload_id.clone()),
        }
    }

    // only the last path component of the uploaded name is used
    fn upload_file_name(ctx: &ActivityContext) -> String {
        Path::new(&ctx.meta.file_name)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| ctx.meta.upload_id.clone())
    }

    pub async fn prepare_data_layer(&self, ctx: &ActivityContext) -> Result<ActivityDataLayer> {
        let (run_info, _) = self.run_info_repository.load(&ctx.meta).await?;
        let input_container_id = Self::resolve_input_container(&run_info, ctx)?;

        let (input_dir, output_dir) = self.new_work_dirs().await?;
        let container = self.containers.open(&input_container_id);
        if input_container_id == ctx.meta.upload_id {
            let path = input_dir.path().join(Self::upload_file_name(ctx));
            container.download_file(&path).await?;
        } else {
            container.download_and_unzip(input_dir.path()).await?;
        }
        tracing::debug!(
            "prepared data layer of {}: input={} dir={:?}",
            &ctx.activity_key,
            &input_container_id,
            input_dir.path()
        );
        Ok(ActivityDataLayer {
            run_info,
            input_container_id,
            input_dir,
            output_dir,
        })
    }

    /// Uploads the output directory as a fresh container, then records it in
    /// RunInfo. A visible RunInfo entry therefore always names an uploaded
    /// container.
    pub async fn save_output(
        &self,
        ctx: &ActivityContext,
        layer: &mut ActivityDataLayer,
    ) -> Result<ActivityInfo> {
        let output_dir = layer.output_dir.path().to_path_buf();
        let (files, num_bytes) = tokio::task::spawn_blocking(move || {
            super::collect_output_files(&output_dir)
        })
        .await
        .map_err(|e| MomentumError::RuntimeError(format!("walk output failed: {:?}", e)))??;

        let container = self.containers.create();
        container
            .zip_and_upload_directory(layer.output_dir.path())
            .await?;

        let info = ActivityInfo {
            activity_key: ctx.activity_key.clone(),
            data_container_id: container.container_id().to_string(),
            num_files: files.len() as i64,
            num_bytes,
            files,
        };
        layer.run_info = self
            .run_info_repository
            .record_activity(&ctx.meta, info.clone())
            .await?;
        tracing::info!(
            "saved output of {}: container={} files={} bytes={}",
            &info.activity_key,
            &info.data_container_id,
            info.num_files,
            info.num_bytes
        );
        Ok(info)
    }

    /// Best effort: failures are logged.
    pub fn cleanup(&self, layer: ActivityDataLayer) {
        let ActivityDataLayer {
            input_dir,
            output_dir,
            ..
        } = layer;
        for dir in [input_dir, output_dir] {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!("failed to remove work dir {:?}: {:?}", path, e);
            }
        }
    }
}
