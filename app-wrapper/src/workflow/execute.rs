pub mod context;
pub mod task;
pub mod workflow;

use crate::modules::AppWrapperModule;
use crate::workflow::definition::workflow::WorkflowDefinition;
use anyhow::Result;
use context::WorkflowContext;
use momentum_infra::run_meta::RunMeta;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use workflow::WorkflowExecutor;

/// Runs `definition` for one run against the module's substrate.
///
/// Returns the executor together with the outcome so callers can read the
/// final context (status, bindings, error) whether or not the run succeeded.
pub async fn execute(
    app_module: &AppWrapperModule,
    definition: Arc<WorkflowDefinition>,
    meta: RunMeta,
    cancellation: CancellationToken,
) -> (WorkflowExecutor, Result<WorkflowContext>) {
    let executor = WorkflowExecutor::new(
        app_module.activity_invoker.clone(),
        Some(app_module.repositories.run_info_repository.clone()),
        app_module.config_module.workflow_config.post_processing.clone(),
        definition,
        meta,
    );
    let result = executor.execute_workflow(cancellation).await;
    (executor, result)
}
