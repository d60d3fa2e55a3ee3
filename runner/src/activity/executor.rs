use super::ActivityRequest;
use crate::data::handler::ActivityDataHandler;
use crate::runner::cancellation_helper::execute_cancellable;
use crate::runner::factory::TaskHandlerRegistry;
use crate::runner::{ActivityContext, TaskHandler};
use anyhow::Result;
use momentum_base::error::MomentumError;
use momentum_base::EXECUTOR_HANDLER_NAME;
use momentum_infra::run_meta::RunMeta;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const DATA_CONTAINER_ID_FIELD: &str = "dataContainerId";

/// The single substrate entry point. Decodes the request once, finds the
/// handler named by `uses` and wraps data-layer handlers with
/// prepare / save / cleanup.
#[derive(Clone, Debug)]
pub struct ActivityExecutor {
    registry: Arc<TaskHandlerRegistry>,
    data_handler: ActivityDataHandler,
}

impl ActivityExecutor {
    pub fn new(registry: Arc<TaskHandlerRegistry>, data_handler: ActivityDataHandler) -> Self {
        Self {
            registry,
            data_handler,
        }
    }

    pub fn registry(&self) -> &Arc<TaskHandlerRegistry> {
        &self.registry
    }

    pub fn data_handler(&self) -> &ActivityDataHandler {
        &self.data_handler
    }

    fn decode(request: &ActivityRequest, cancellation: CancellationToken) -> Result<ActivityContext> {
        let meta = RunMeta::from_wire(&request.run_meta_json)?;
        let args = if request.args_json.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&request.args_json).map_err(|e| {
                MomentumError::InvalidParameter(format!(
                    "cannot decode arguments of {}: {:?}",
                    &request.activity_key, e
                ))
            })?
        };
        Ok(ActivityContext {
            meta,
            activity_key: request.activity_key.clone(),
            input_activity_key: request.input_activity_key.clone(),
            args,
            cancellation,
        })
    }

    /// Returns the handler result as json.
    pub async fn execute(
        &self,
        request: &ActivityRequest,
        cancellation: CancellationToken,
    ) -> Result<String> {
        if request.handler_name != EXECUTOR_HANDLER_NAME {
            return Err(MomentumError::HandlerNotFound(format!(
                "unknown entry point {}",
                &request.handler_name
            ))
            .into());
        }
        let handler = self.registry.find(&request.uses).ok_or_else(|| {
            MomentumError::HandlerNotFound(format!("task handler {} not registered", &request.uses))
        })?;
        let ctx = Self::decode(request, cancellation)?;
        tracing::debug!(
            "execute {} (uses={}, input={:?}) in run {}",
            &ctx.activity_key,
            &request.uses,
            &ctx.input_activity_key,
            &ctx.meta.run_id
        );
        let result = if handler.uses_data_layer() {
            self.execute_with_data_layer(handler, &ctx).await?
        } else {
            execute_cancellable(handler.run(&ctx, None), &ctx.cancellation, &ctx.activity_key)
                .await?
        };
        Ok(serde_json::to_string(&result)?)
    }

    async fn execute_with_data_layer(
        &self,
        handler: Arc<dyn TaskHandler>,
        ctx: &ActivityContext,
    ) -> Result<Value> {
        let mut layer = self.data_handler.prepare_data_layer(ctx).await?;
        let workspace = layer.workspace();
        let result = async {
            let value = execute_cancellable(
                handler.run(ctx, Some(&workspace)),
                &ctx.cancellation,
                &ctx.activity_key,
            )
            .await?;
            let info = self.data_handler.save_output(ctx, &mut layer).await?;
            Ok::<_, anyhow::Error>(Self::attach_container_id(value, &info.data_container_id))
        }
        .await;
        self.data_handler.cleanup(layer);
        result
    }

    /// A null result becomes the container id; an object result gains a
    /// `dataContainerId` field. Anything else is returned as is.
    pub fn attach_container_id(value: Value, container_id: &str) -> Value {
        match value {
            Value::Null => Value::String(container_id.to_string()),
            Value::Object(mut map) => {
                map.insert(
                    DATA_CONTAINER_ID_FIELD.to_string(),
                    Value::String(container_id.to_string()),
                );
                Value::Object(map)
            }
            other => other,
        }
    }
}
