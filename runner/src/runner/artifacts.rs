use super::{ActivityContext, TaskHandler, TaskWorkspace};
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use momentum_infra::blob::PutCondition;
use momentum_infra::container::DataContainerFactory;
use serde_json::{json, Value};

pub const SAVE_ARTIFACTS_NAME: &str = "SaveArtifactsV1";

/// Post-processing step: stores the arguments it receives (the bindings
/// of the finished run) as `<runID>.artifacts.json`.
#[derive(Clone, Debug)]
pub struct SaveArtifactsRunner {
    containers: DataContainerFactory,
}

impl SaveArtifactsRunner {
    pub fn new(containers: DataContainerFactory) -> Self {
        Self { containers }
    }

    pub fn object_key(run_id: &str) -> String {
        format!("{}.artifacts.json", run_id)
    }
}

#[async_trait]
impl TaskHandler for SaveArtifactsRunner {
    fn name(&self) -> String {
        SAVE_ARTIFACTS_NAME.to_string()
    }
    fn uses_data_layer(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &ActivityContext, _workspace: Option<&TaskWorkspace>) -> Result<Value> {
        let key = Self::object_key(&ctx.meta.run_id);
        let data = Bytes::from(serde_json::to_vec_pretty(&ctx.args)?);
        let version = self
            .containers
            .store()
            .put_object(
                self.containers.bucket(),
                &key,
                data,
                "application/json",
                PutCondition::Always,
            )
            .await?;
        tracing::info!("saved artifacts of run {} to {} (v{})", &ctx.meta.run_id, &key, version);
        Ok(json!({ "artifacts": key }))
    }
}
