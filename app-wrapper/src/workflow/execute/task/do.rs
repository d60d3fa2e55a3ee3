use super::{StatementExecutor, TaskExecutorTrait};
use crate::workflow::definition::workflow::SequenceStatement;
use anyhow::Result;
use futures::Future;
use tokio_util::sync::CancellationToken;

/// Runs elements in order and stops at the first failure.
pub struct DoTaskExecutor<'a> {
    parent: &'a StatementExecutor,
    sequence: &'a SequenceStatement,
}

impl<'a> DoTaskExecutor<'a> {
    pub fn new(parent: &'a StatementExecutor, sequence: &'a SequenceStatement) -> Self {
        Self { parent, sequence }
    }
}

impl<'a> TaskExecutorTrait<'a> for DoTaskExecutor<'a> {
    fn execute(&'a self, cancellation: CancellationToken) -> impl Future<Output = Result<()>> + Send {
        async move {
            for (i, element) in self.sequence.elements.iter().enumerate() {
                self.parent
                    .execute(element, cancellation.clone())
                    .await
                    .inspect_err(|e| tracing::debug!("sequence aborted at element {}: {:?}", i, e))?;
            }
            Ok(())
        }
    }
}
