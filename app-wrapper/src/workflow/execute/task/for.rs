use super::{StatementExecutor, TaskExecutorTrait};
use crate::workflow::definition::workflow::LoopStatement;
use anyhow::Result;
use futures::Future;
use tokio_util::sync::CancellationToken;

/// Runs the body up to `iterations` times. When a break variable is set it
/// is checked after each pass and ends the loop once it holds the break value.
pub struct ForTaskExecutor<'a> {
    parent: &'a StatementExecutor,
    loop_: &'a LoopStatement,
}

impl<'a> ForTaskExecutor<'a> {
    pub fn new(parent: &'a StatementExecutor, loop_: &'a LoopStatement) -> Self {
        Self { parent, loop_ }
    }

    async fn should_break(&self) -> bool {
        match (&self.loop_.break_variable, &self.loop_.break_value) {
            (Some(variable), Some(value)) => self.parent.bindings.matches(variable, value).await,
            _ => false,
        }
    }
}

impl<'a> TaskExecutorTrait<'a> for ForTaskExecutor<'a> {
    fn execute(&'a self, cancellation: CancellationToken) -> impl Future<Output = Result<()>> + Send {
        async move {
            for i in 0..self.loop_.iterations {
                tracing::debug!("loop iteration {}/{}", i + 1, self.loop_.iterations);
                self.parent
                    .execute(&self.loop_.body, cancellation.clone())
                    .await?;
                if self.should_break().await {
                    tracing::debug!("loop break after iteration {}", i + 1);
                    break;
                }
            }
            Ok(())
        }
    }
}
