//! Task handlers: the named units of work a workflow task invokes.
//!
//! * [`TaskHandler`] - one handler, looked up by the task's `uses` name
//! * [`factory::TaskHandlerRegistry`] - name to handler table
//! * [`passthrough`], [`echo`], [`artifacts`] - built-in handlers
//!
//! Handlers that use the data layer receive a [`TaskWorkspace`]: the input
//! directory holds the files of the upstream step (or the uploaded file),
//! and whatever the handler writes into the output directory becomes this
//! task's data container.

use anyhow::Result;
use async_trait::async_trait;
use momentum_infra::run_meta::RunMeta;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

pub mod artifacts;
pub mod cancellation_helper;
pub mod echo;
pub mod factory;
pub mod passthrough;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_common;

/// Everything a handler knows about the invocation, decoded once at the
/// executor boundary.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    pub meta: RunMeta,
    pub activity_key: String,
    pub input_activity_key: Option<String>,
    pub args: Value,
    pub cancellation: CancellationToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskWorkspace {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl TaskWorkspace {
    pub fn input(&self, name: impl AsRef<Path>) -> PathBuf {
        self.input_dir.join(name)
    }
    pub fn output(&self, name: impl AsRef<Path>) -> PathBuf {
        self.output_dir.join(name)
    }
}

#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    fn name(&self) -> String;

    /// Whether the executor materializes input files and collects output
    /// files around [`TaskHandler::run`].
    fn uses_data_layer(&self) -> bool {
        true
    }

    /// `workspace` is `Some` exactly when [`TaskHandler::uses_data_layer`]
    /// returns true.
    async fn run(&self, ctx: &ActivityContext, workspace: Option<&TaskWorkspace>) -> Result<Value>;
}
