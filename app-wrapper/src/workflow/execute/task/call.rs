use super::{StatementExecutor, TaskExecutorTrait};
use crate::workflow::definition::workflow::TaskStatement;
use crate::workflow::execute::context::Bindings;
use anyhow::Result;
use futures::Future;
use momentum_base::error::MomentumError;
use momentum_base::EXECUTOR_HANDLER_NAME;
use momentum_runner::activity::ActivityRequest;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

const BINDING_REFERENCE_PREFIX: char = '$';
const SAVE_OUTPUT_ARG: &str = "save_output";

pub struct CallTaskExecutor<'a> {
    parent: &'a StatementExecutor,
    task: &'a TaskStatement,
}

impl<'a> CallTaskExecutor<'a> {
    pub fn new(parent: &'a StatementExecutor, task: &'a TaskStatement) -> Self {
        Self { parent, task }
    }

    /// Copies `with`, replacing each `"$name"` string by the current value
    /// of binding `name` (null when unbound).
    pub async fn build_args(with: &BTreeMap<String, Value>, bindings: &Bindings) -> Value {
        let mut args = Map::with_capacity(with.len());
        for (name, value) in with {
            let resolved = match value {
                Value::String(s) if s.len() > 1 && s.starts_with(BINDING_REFERENCE_PREFIX) => {
                    let var = &s[1..];
                    match bindings.get(var).await {
                        Some(v) => v,
                        None => {
                            tracing::warn!("argument '{}' refers to unbound '{}'", name, var);
                            Value::Null
                        }
                    }
                }
                other => other.clone(),
            };
            args.insert(name.clone(), resolved);
        }
        Value::Object(args)
    }

    async fn check_predecessor(&self) -> Result<()> {
        let (Some(input), Some(repository)) = (&self.task.input, &self.parent.run_info_repository)
        else {
            return Ok(());
        };
        let (run_info, _) = repository.load(&self.parent.meta).await?;
        if run_info.activity(input).is_none() {
            return Err(MomentumError::PredecessorNotFound(format!(
                "task '{}' reads the output of '{}', which has not completed",
                self.task.key, input
            ))
            .into());
        }
        Ok(())
    }

    async fn bind_result(&self, result_json: String) {
        let key = &self.task.key;
        let value = serde_json::from_str::<Value>(&result_json).unwrap_or(Value::String(result_json));
        let mut entries = Vec::new();
        if let Value::Object(fields) = &value {
            entries.extend(
                fields
                    .iter()
                    .map(|(f, v)| (format!("{}.{}", key, f), v.clone())),
            );
        }
        entries.push((format!("{}result", key), value));
        self.parent.bindings.extend(entries).await;
    }
}

impl<'a> TaskExecutorTrait<'a> for CallTaskExecutor<'a> {
    fn execute(&'a self, cancellation: CancellationToken) -> impl Future<Output = Result<()>> + Send {
        async move {
            let key = &self.task.key;
            if cancellation.is_cancelled() {
                return Err(MomentumError::CancelledError(format!("task '{}' not started", key)).into());
            }
            self.check_predecessor().await?;

            let mut args = Self::build_args(&self.task.with, &self.parent.bindings).await;
            if let (Some(save_output), Value::Object(map)) = (self.task.save_output, &mut args) {
                map.insert(SAVE_OUTPUT_ARG.to_string(), Value::Bool(save_output));
            }
            let request = ActivityRequest {
                handler_name: EXECUTOR_HANDLER_NAME.to_string(),
                uses: self.task.uses.clone(),
                activity_key: key.clone(),
                input_activity_key: self.task.input.clone(),
                args_json: serde_json::to_string(&args)?,
                run_meta_json: self.parent.run_meta_json.as_ref().clone(),
                options: self.task.activity_options(),
            };
            tracing::debug!("invoke task '{}' uses {}", key, self.task.uses);
            let result_json = self
                .parent
                .invoker
                .invoke(request, cancellation)
                .await
                .inspect_err(|e| tracing::debug!("task '{}' failed: {:?}", key, e))?;
            self.bind_result(result_json).await;
            tracing::info!("task '{}' completed", key);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::definition::workflow::Statement;
    use crate::workflow::execute::task::test_util::{
        new_statement_executor, test_meta, RecordingInvoker, Reply,
    };
    use momentum_infra::blob::memory::MemoryBlobStore;
    use momentum_infra::run_info::repository::{BlobRunInfoRepository, RunInfoRepository};
    use momentum_infra::run_info::ActivityInfo;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_substitutes_bindings_and_writes_result() {
        let invoker = Arc::new(
            RecordingInvoker::new().reply("a", vec![Reply::Ok(json!({"count": 2, "label": "x"}))]),
        );
        let executor = new_statement_executor(invoker.clone(), None);
        executor.bindings.set("x", json!(42)).await;
        let stmt = Statement::task(
            TaskStatement::new("a", "Echo")
                .with_arg("n", json!("$x"))
                .with_arg("missing", json!("$nope"))
                .with_arg("literal", json!("plain"))
                .with_arg("dollar", json!("$")),
        );
        executor.execute(&stmt, CancellationToken::new()).await.unwrap();

        let requests = invoker.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.handler_name, "Executor");
        assert_eq!(req.uses, "Echo");
        assert_eq!(req.run_meta_json, test_meta().to_wire().unwrap());
        let args: Value = serde_json::from_str(&req.args_json).unwrap();
        assert_eq!(
            args,
            json!({"n": 42, "missing": null, "literal": "plain", "dollar": "$"})
        );

        let snap = executor.bindings.snapshot().await;
        assert_eq!(snap["aresult"], json!({"count": 2, "label": "x"}));
        assert_eq!(snap["a.count"], json!(2));
        assert_eq!(snap["a.label"], json!("x"));
    }

    #[tokio::test]
    async fn test_string_result() {
        let invoker = Arc::new(RecordingInvoker::new().reply("a", vec![Reply::Ok(json!("done"))]));
        let executor = new_statement_executor(invoker, None);
        executor
            .execute(&Statement::task(TaskStatement::new("a", "Echo")), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(executor.bindings.get("aresult").await, Some(json!("done")));
    }

    #[tokio::test]
    async fn test_missing_predecessor_never_invokes() {
        let invoker = Arc::new(RecordingInvoker::new());
        let repo: Arc<dyn RunInfoRepository> = Arc::new(BlobRunInfoRepository::new(
            Arc::new(MemoryBlobStore::new()),
            "test-bucket",
            std::time::Duration::from_millis(10),
        ));
        let executor = new_statement_executor(invoker.clone(), Some(repo.clone()));
        let stmt = Statement::task(TaskStatement::new("b", "Passthrough").with_input("a"));

        let err = executor
            .execute(&stmt, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MomentumError>(),
            Some(MomentumError::PredecessorNotFound(_))
        ));
        assert!(invoker.keys().is_empty());

        // once the predecessor is recorded the task runs
        repo.record_activity(
            &test_meta(),
            ActivityInfo {
                activity_key: "a".to_string(),
                data_container_id: "c-1".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        executor
            .execute(&stmt, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(invoker.keys(), vec!["b"]);
        let req = invoker.requests.lock().unwrap()[0].clone();
        assert_eq!(req.input_activity_key.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_cancelled_task_is_not_invoked() {
        let invoker = Arc::new(RecordingInvoker::new());
        let executor = new_statement_executor(invoker.clone(), None);
        let token = CancellationToken::new();
        token.cancel();
        let err = executor
            .execute(&Statement::task(TaskStatement::new("a", "Echo")), token)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MomentumError>(),
            Some(MomentumError::CancelledError(_))
        ));
        assert!(invoker.keys().is_empty());
    }

    #[tokio::test]
    async fn test_retry_options_reach_request() {
        let invoker = Arc::new(RecordingInvoker::new());
        let executor = new_statement_executor(invoker.clone(), None);
        let mut task = TaskStatement::new("a", "Echo");
        task.max_retries = Some(5);
        executor
            .execute(&Statement::task(task), CancellationToken::new())
            .await
            .unwrap();
        let req = invoker.requests.lock().unwrap()[0].clone();
        let day = std::time::Duration::from_secs(24 * 60 * 60);
        assert_eq!(req.options.retry.max_attempts, 5);
        assert_eq!(req.options.retry.backoff_coefficient, 2.0);
        assert_eq!(req.options.retry.initial_interval, std::time::Duration::ZERO);
        assert_eq!(req.options.retry.max_interval, std::time::Duration::from_secs(60));
        assert_eq!(req.options.schedule_to_close, day);
        assert_eq!(req.options.schedule_to_start, day);
        assert_eq!(req.options.start_to_close, day);
    }

    #[tokio::test]
    async fn test_save_output_flag_reaches_args() {
        let invoker = Arc::new(RecordingInvoker::new());
        let executor = new_statement_executor(invoker.clone(), None);
        let task: TaskStatement = serde_json::from_value(json!({
            "key": "a",
            "uses": "Echo",
            "with": {"x": 1},
            "saveOutput": true
        }))
        .unwrap();
        let plain = TaskStatement::new("b", "Echo").with_arg("x", json!(1));
        let stmt = Statement::sequence(vec![Statement::task(task), Statement::task(plain)]);
        executor.execute(&stmt, CancellationToken::new()).await.unwrap();

        let requests = invoker.requests.lock().unwrap().clone();
        let args: Vec<Value> = requests
            .iter()
            .map(|r| serde_json::from_str(&r.args_json).unwrap())
            .collect();
        assert_eq!(args[0], json!({"x": 1, "save_output": true}));
        // absent flag leaves the arguments as written
        assert_eq!(args[1], json!({"x": 1}));
    }
}
