use super::{StatementExecutor, TaskExecutorTrait};
use crate::workflow::definition::workflow::ConditionStatement;
use anyhow::Result;
use futures::Future;
use tokio_util::sync::CancellationToken;

pub struct SwitchTaskExecutor<'a> {
    parent: &'a StatementExecutor,
    condition: &'a ConditionStatement,
}

impl<'a> SwitchTaskExecutor<'a> {
    pub fn new(parent: &'a StatementExecutor, condition: &'a ConditionStatement) -> Self {
        Self { parent, condition }
    }
}

impl<'a> TaskExecutorTrait<'a> for SwitchTaskExecutor<'a> {
    fn execute(&'a self, cancellation: CancellationToken) -> impl Future<Output = Result<()>> + Send {
        async move {
            let cond = self.condition;
            let matched = self
                .parent
                .bindings
                .matches(&cond.variable, &cond.value)
                .await;
            tracing::debug!("condition {} == {:?}: {}", cond.variable, cond.value, matched);
            if matched {
                self.parent.execute(&cond.then, cancellation).await
            } else if let Some(else_) = &cond.else_ {
                self.parent.execute(else_, cancellation).await
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::workflow::definition::workflow::{Statement, TaskStatement};
    use crate::workflow::execute::task::test_util::{new_statement_executor, RecordingInvoker};
    use serde_json::json;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn task(key: &str) -> Statement {
        Statement::task(TaskStatement::new(key, "Echo"))
    }

    #[tokio::test]
    async fn test_routes_on_binding() {
        let invoker = Arc::new(RecordingInvoker::new());
        let executor = new_statement_executor(invoker.clone(), None);
        let stmt = Statement::condition("mode", "fast", task("t"), Some(task("e")));

        executor.bindings.set("mode", json!("fast")).await;
        executor.execute(&stmt, CancellationToken::new()).await.unwrap();
        executor.bindings.set("mode", json!("slow")).await;
        executor.execute(&stmt, CancellationToken::new()).await.unwrap();
        assert_eq!(invoker.keys(), vec!["t", "e"]);
    }

    #[tokio::test]
    async fn test_no_else_is_noop() {
        let invoker = Arc::new(RecordingInvoker::new());
        let executor = new_statement_executor(invoker.clone(), None);
        // unbound variable never matches
        let stmt = Statement::condition("unset", "", task("t"), None);
        executor.execute(&stmt, CancellationToken::new()).await.unwrap();
        assert!(invoker.keys().is_empty());
    }

    #[tokio::test]
    async fn test_matches_identifier_binding() {
        let invoker = Arc::new(RecordingInvoker::new());
        let executor = new_statement_executor(invoker.clone(), None);
        executor.bindings.set("content_type", json!("text/plain")).await;
        let stmt = Statement::condition("content_type", "text/plain", task("t"), None);
        executor.execute(&stmt, CancellationToken::new()).await.unwrap();
        assert_eq!(invoker.keys(), vec!["t"]);
    }
}
