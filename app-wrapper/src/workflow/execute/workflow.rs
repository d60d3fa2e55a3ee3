use super::context::{WorkflowContext, WorkflowStatus};
use super::task::StatementExecutor;
use crate::workflow::definition::workflow::WorkflowDefinition;
use anyhow::Result;
use momentum_base::error::MomentumError;
use momentum_base::EXECUTOR_HANDLER_NAME;
use momentum_infra::run_info::repository::RunInfoRepository;
use momentum_infra::run_meta::RunMeta;
use momentum_runner::activity::{ActivityInvoker, ActivityOptions, ActivityRequest};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// activity key of the post-processing invocation
pub const POST_PROCESSING_KEY: &str = "post_processing";

#[derive(Clone)]
pub struct WorkflowExecutor {
    pub invoker: Arc<dyn ActivityInvoker>,
    pub run_info_repository: Option<Arc<dyn RunInfoRepository>>,
    pub post_processing: Option<String>,
    pub definition: Arc<WorkflowDefinition>,
    pub workflow_context: Arc<RwLock<WorkflowContext>>,
}

impl std::fmt::Debug for WorkflowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowExecutor")
            .field("post_processing", &self.post_processing)
            .field("definition", &self.definition)
            .field("records_run_info", &self.run_info_repository.is_some())
            .finish_non_exhaustive()
    }
}

impl WorkflowExecutor {
    pub fn new(
        invoker: Arc<dyn ActivityInvoker>,
        run_info_repository: Option<Arc<dyn RunInfoRepository>>,
        post_processing: Option<String>,
        definition: Arc<WorkflowDefinition>,
        meta: RunMeta,
    ) -> Self {
        Self {
            invoker,
            run_info_repository,
            post_processing,
            definition,
            workflow_context: Arc::new(RwLock::new(WorkflowContext::new(meta))),
        }
    }

    /// Runs the definition to completion. On failure the returned error is
    /// the first failing step, and [`Self::workflow_context`] still holds the
    /// bindings written up to that point.
    pub async fn execute_workflow(&self, cancellation: CancellationToken) -> Result<WorkflowContext> {
        let (meta, bindings) = {
            let mut cx = self.workflow_context.write().await;
            cx.status = WorkflowStatus::Running;
            (cx.meta.clone(), cx.bindings.clone())
        };
        tracing::info!(
            "start workflow run: workflow_id={}, run_id={}",
            meta.workflow_id,
            meta.run_id
        );

        let result = self.run(meta.clone(), cancellation).await;

        let mut cx = self.workflow_context.write().await;
        match result {
            Ok(()) => {
                cx.status = WorkflowStatus::Completed;
                tracing::info!(
                    "workflow run completed: run_id={}, bindings={}",
                    meta.run_id,
                    bindings.snapshot().await.len()
                );
                Ok(cx.clone())
            }
            Err(e) => {
                cx.status = match e.downcast_ref::<MomentumError>() {
                    Some(MomentumError::CancelledError(_)) => WorkflowStatus::Cancelled,
                    _ => WorkflowStatus::Faulted,
                };
                cx.error = Some(e.to_string());
                tracing::error!("workflow run failed: run_id={}, {:?}", meta.run_id, e);
                Err(e)
            }
        }
    }

    async fn run(&self, meta: Arc<RunMeta>, cancellation: CancellationToken) -> Result<()> {
        self.definition.validate()?;
        let bindings = self.workflow_context.read().await.bindings.clone();
        bindings
            .extend(WorkflowContext::identifier_bindings(&meta))
            .await;
        bindings
            .extend(
                self.definition
                    .variables
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone()))),
            )
            .await;

        let executor = StatementExecutor::new(
            self.invoker.clone(),
            self.run_info_repository.clone(),
            meta,
            bindings,
        )?;
        executor
            .execute(&self.definition.root, cancellation.clone())
            .await?;
        self.post_process(&executor, cancellation).await
    }

    async fn post_process(
        &self,
        executor: &StatementExecutor,
        cancellation: CancellationToken,
    ) -> Result<()> {
        let Some(handler) = &self.post_processing else {
            return Ok(());
        };
        let args = Value::Object(executor.bindings.snapshot().await);
        let request = ActivityRequest {
            handler_name: EXECUTOR_HANDLER_NAME.to_string(),
            uses: handler.clone(),
            activity_key: POST_PROCESSING_KEY.to_string(),
            input_activity_key: None,
            args_json: serde_json::to_string(&args)?,
            run_meta_json: executor.run_meta_json.as_ref().clone(),
            options: ActivityOptions::default(),
        };
        tracing::debug!("post processing with {}", handler);
        let result = self.invoker.invoke(request, cancellation).await?;
        tracing::info!("post processing {} done: {}", handler, result);
        Ok(())
    }

    pub fn workflow_context(&self) -> Arc<RwLock<WorkflowContext>> {
        self.workflow_context.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::definition::workflow::{Statement, TaskStatement};
    use crate::workflow::execute::task::test_util::{test_meta, RecordingInvoker, Reply};
    use serde_json::json;

    fn executor(
        invoker: Arc<RecordingInvoker>,
        definition: WorkflowDefinition,
        post_processing: Option<&str>,
    ) -> WorkflowExecutor {
        WorkflowExecutor::new(
            invoker,
            None,
            post_processing.map(|s| s.to_string()),
            Arc::new(definition),
            test_meta(),
        )
    }

    #[tokio::test]
    async fn test_seeds_identifiers_and_variables() {
        let invoker = Arc::new(RecordingInvoker::new());
        let definition = WorkflowDefinition {
            variables: [
                ("x".to_string(), "42".to_string()),
                ("file_name".to_string(), "override.txt".to_string()),
            ]
            .into_iter()
            .collect(),
            root: Statement::task(
                TaskStatement::new("a", "Echo")
                    .with_arg("n", json!("$x"))
                    .with_arg("run", json!("$run_id")),
            ),
        };
        let cx = executor(invoker.clone(), definition, None)
            .execute_workflow(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(cx.status, WorkflowStatus::Completed);
        let snap = cx.bindings.snapshot().await;
        assert_eq!(snap["upload_id"], json!("upload-1"));
        assert_eq!(snap["workspace_id"], json!("ws-1"));
        assert_eq!(snap["file_name"], json!("override.txt"));

        let req = invoker.requests.lock().unwrap()[0].clone();
        let args: Value = serde_json::from_str(&req.args_json).unwrap();
        assert_eq!(args, json!({"n": "42", "run": "run-1"}));
    }

    #[tokio::test]
    async fn test_failure_keeps_partial_bindings() {
        let invoker = Arc::new(
            RecordingInvoker::new()
                .reply("a", vec![Reply::Ok(json!("A"))])
                .reply("b", vec![Reply::Fail("broken".to_string())]),
        );
        let definition = WorkflowDefinition {
            variables: Default::default(),
            root: Statement::sequence(vec![
                Statement::task(TaskStatement::new("a", "Echo")),
                Statement::task(TaskStatement::new("b", "Echo")),
            ]),
        };
        let exec = executor(invoker.clone(), definition, Some("SaveArtifactsV1"));
        let err = exec
            .execute_workflow(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("broken"));

        let cx = exec.workflow_context().read().await.clone();
        assert_eq!(cx.status, WorkflowStatus::Faulted);
        assert!(cx.error.unwrap().contains("broken"));
        assert_eq!(cx.bindings.get("aresult").await, Some(json!("A")));
        // no post processing after a failure
        assert_eq!(invoker.keys(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_schema_error_schedules_nothing() {
        let invoker = Arc::new(RecordingInvoker::new());
        let definition = WorkflowDefinition {
            variables: Default::default(),
            root: Statement::sequence(vec![
                Statement::task(TaskStatement::new("a", "Echo")),
                Statement::default(),
            ]),
        };
        let err = executor(invoker.clone(), definition, None)
            .execute_workflow(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MomentumError>(),
            Some(MomentumError::SchemaError(_))
        ));
        assert!(invoker.keys().is_empty());
    }

    #[tokio::test]
    async fn test_post_processing_receives_bindings() {
        let invoker = Arc::new(RecordingInvoker::new().reply("a", vec![Reply::Ok(json!({"n": 1}))]));
        let definition = WorkflowDefinition {
            variables: Default::default(),
            root: Statement::task(TaskStatement::new("a", "Echo")),
        };
        executor(invoker.clone(), definition, Some("SaveArtifactsV1"))
            .execute_workflow(CancellationToken::new())
            .await
            .unwrap();
        let requests = invoker.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        let post = &requests[1];
        assert_eq!(post.uses, "SaveArtifactsV1");
        assert_eq!(post.activity_key, POST_PROCESSING_KEY);
        let args: Value = serde_json::from_str(&post.args_json).unwrap();
        assert_eq!(args["aresult"], json!({"n": 1}));
        assert_eq!(args["a.n"], json!(1));
        assert_eq!(args["run_id"], json!("run-1"));
    }

    #[tokio::test]
    async fn test_cancelled_run() {
        let invoker = Arc::new(RecordingInvoker::new());
        let definition = WorkflowDefinition {
            variables: Default::default(),
            root: Statement::task(TaskStatement::new("a", "Echo")),
        };
        let exec = executor(invoker, definition, None);
        let token = CancellationToken::new();
        token.cancel();
        exec.execute_workflow(token).await.unwrap_err();
        assert_eq!(
            exec.workflow_context().read().await.status,
            WorkflowStatus::Cancelled
        );
    }
}
