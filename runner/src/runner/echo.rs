use super::{ActivityContext, TaskHandler, TaskWorkspace};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Returns its arguments. Touches no files.
#[derive(Debug, Clone, Default)]
pub struct EchoRunner;

#[async_trait]
impl TaskHandler for EchoRunner {
    fn name(&self) -> String {
        "Echo".to_string()
    }
    fn uses_data_layer(&self) -> bool {
        false
    }
    async fn run(&self, ctx: &ActivityContext, _workspace: Option<&TaskWorkspace>) -> Result<Value> {
        tracing::debug!("echo {}: {}", &ctx.activity_key, &ctx.args);
        Ok(ctx.args.clone())
    }
}
