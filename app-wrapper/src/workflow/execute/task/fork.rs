use super::{StatementExecutor, TaskExecutorTrait};
use crate::workflow::definition::workflow::ParallelStatement;
use anyhow::Result;
use futures::stream::FuturesUnordered;
use futures::{Future, StreamExt};
use tokio_util::sync::CancellationToken;

/// Runs all branches concurrently.
///
/// The first branch to fail cancels its siblings; their errors are logged
/// and discarded, and the parallel fails only after every branch has
/// returned.
pub struct ForkTaskExecutor<'a> {
    parent: &'a StatementExecutor,
    parallel: &'a ParallelStatement,
}

impl<'a> ForkTaskExecutor<'a> {
    pub fn new(parent: &'a StatementExecutor, parallel: &'a ParallelStatement) -> Self {
        Self { parent, parallel }
    }
}

impl<'a> TaskExecutorTrait<'a> for ForkTaskExecutor<'a> {
    fn execute(&'a self, cancellation: CancellationToken) -> impl Future<Output = Result<()>> + Send {
        async move {
            let branch_token = cancellation.child_token();
            let mut branches = self
                .parallel
                .branches
                .iter()
                .enumerate()
                .map(|(i, branch)| {
                    let token = branch_token.clone();
                    async move { (i, self.parent.execute(branch, token).await) }
                })
                .collect::<FuturesUnordered<_>>();

            let mut first_error: Option<anyhow::Error> = None;
            while let Some((i, result)) = branches.next().await {
                let Err(e) = result else {
                    continue;
                };
                if first_error.is_none() {
                    tracing::debug!("parallel branch {} failed, cancelling siblings: {:?}", i, e);
                    branch_token.cancel();
                    first_error = Some(e);
                } else {
                    tracing::warn!("discarded error of parallel branch {}: {:?}", i, e);
                }
            }
            match first_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }
}
