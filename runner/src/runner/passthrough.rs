use super::{ActivityContext, TaskHandler, TaskWorkspace};
use anyhow::Result;
use async_trait::async_trait;
use momentum_base::error::MomentumError;
use momentum_infra::archive;
use serde_json::Value;

/// Copies every input file to the output directory unchanged, keeping
/// relative paths. Returns null, so the executor reports the container id.
#[derive(Debug, Clone, Default)]
pub struct PassthroughRunner;

#[async_trait]
impl TaskHandler for PassthroughRunner {
    fn name(&self) -> String {
        "Passthrough".to_string()
    }

    async fn run(&self, ctx: &ActivityContext, workspace: Option<&TaskWorkspace>) -> Result<Value> {
        let workspace = workspace.ok_or_else(|| {
            MomentumError::RuntimeError("passthrough needs a workspace".to_string())
        })?;
        let files = archive::list_files(&workspace.input_dir)?;
        for file in files.iter() {
            let target = workspace.output(&file.path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(workspace.input(&file.path), &target).await?;
        }
        tracing::debug!("passthrough {}: copied {} files", &ctx.activity_key, files.len());
        Ok(Value::Null)
    }
}
