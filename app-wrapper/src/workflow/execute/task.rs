use super::context::Bindings;
use crate::workflow::definition::workflow::{supplement::StatementKind, Statement};
use anyhow::Result;
use call::CallTaskExecutor;
use do_::DoTaskExecutor;
use for_::ForTaskExecutor;
use fork::ForkTaskExecutor;
use futures::future::BoxFuture;
use futures::Future;
use momentum_infra::run_info::repository::RunInfoRepository;
use momentum_infra::run_meta::RunMeta;
use momentum_runner::activity::ActivityInvoker;
use std::sync::Arc;
use switch::SwitchTaskExecutor;
use tokio_util::sync::CancellationToken;

pub mod call;
#[path = "task/do.rs"]
pub mod do_;
#[path = "task/for.rs"]
pub mod for_;
pub mod fork;
pub mod switch;

pub trait TaskExecutorTrait<'a> {
    fn execute(&'a self, cancellation: CancellationToken) -> impl Future<Output = Result<()>> + Send;
}

/// Walks a statement tree, dispatching each node to its executor.
#[derive(Clone)]
pub struct StatementExecutor {
    pub invoker: Arc<dyn ActivityInvoker>,
    pub run_info_repository: Option<Arc<dyn RunInfoRepository>>,
    pub meta: Arc<RunMeta>,
    pub run_meta_json: Arc<String>,
    pub bindings: Bindings,
}

impl std::fmt::Debug for StatementExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementExecutor")
            .field("meta", &self.meta)
            .field("records_run_info", &self.run_info_repository.is_some())
            .finish_non_exhaustive()
    }
}

impl StatementExecutor {
    pub fn new(
        invoker: Arc<dyn ActivityInvoker>,
        run_info_repository: Option<Arc<dyn RunInfoRepository>>,
        meta: Arc<RunMeta>,
        bindings: Bindings,
    ) -> Result<Self> {
        let run_meta_json = Arc::new(meta.to_wire()?);
        Ok(Self {
            invoker,
            run_info_repository,
            meta,
            run_meta_json,
            bindings,
        })
    }

    // boxed for recursion through nested statements
    pub fn execute<'a>(
        &'a self,
        statement: &'a Statement,
        cancellation: CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let kind = statement.kind()?;
            tracing::debug!("execute statement: {}", kind.name());
            match kind {
                StatementKind::Task(task) => {
                    CallTaskExecutor::new(self, task).execute(cancellation).await
                }
                StatementKind::Sequence(seq) => {
                    DoTaskExecutor::new(self, seq).execute(cancellation).await
                }
                StatementKind::Parallel(par) => {
                    ForkTaskExecutor::new(self, par).execute(cancellation).await
                }
                StatementKind::Condition(cond) => {
                    SwitchTaskExecutor::new(self, cond).execute(cancellation).await
                }
                StatementKind::Loop(lp) => ForTaskExecutor::new(self, lp).execute(cancellation).await,
            }
        })
    }
}
