#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use crate::activity::executor::ActivityExecutor;
    use crate::data::handler::ActivityDataHandler;
    use crate::runner::factory::TaskHandlerRegistry;
    use crate::runner::{ActivityContext, TaskHandler, TaskWorkspace};
    use anyhow::Result;
    use async_trait::async_trait;
    use bytes::Bytes;
    use momentum_base::error::MomentumError;
    use momentum_infra::blob::memory::MemoryBlobStore;
    use momentum_infra::blob::{BlobStore, PutCondition};
    use momentum_infra::container::DataContainerFactory;
    use momentum_infra::run_info::repository::BlobRunInfoRepository;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    pub const TEST_BUCKET: &str = "test-bucket";
    pub const TEST_UPLOAD_ID: &str = "upload-1";

    #[derive(Debug, Clone)]
    pub enum Outcome {
        Ok(Value),
        /// fails with a retryable TaskFailed
        Retryable(String),
        /// fails with a non-retryable InvalidParameter
        Permanent(String),
    }

    /// Handler that plays back a list of outcomes, then repeats `fallback`,
    /// recording every activity key it ran for.
    #[derive(Debug)]
    pub struct ScriptedRunner {
        name: String,
        data_layer: bool,
        outcomes: Mutex<VecDeque<Outcome>>,
        fallback: Outcome,
        delay: Option<Duration>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedRunner {
        pub fn new(name: &str, data_layer: bool, fallback: Outcome) -> Self {
            Self {
                name: name.to_string(),
                data_layer,
                outcomes: Mutex::new(VecDeque::new()),
                fallback,
                delay: None,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
        pub fn failing(name: &str, data_layer: bool) -> Self {
            Self::new(name, data_layer, Outcome::Retryable(format!("{} failed", name)))
        }
        pub fn with_outcomes(self, outcomes: Vec<Outcome>) -> Self {
            *self.outcomes.lock().unwrap() = outcomes.into();
            self
        }
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
        pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
            self.calls.clone()
        }
    }

    #[async_trait]
    impl TaskHandler for ScriptedRunner {
        fn name(&self) -> String {
            self.name.clone()
        }
        fn uses_data_layer(&self) -> bool {
            self.data_layer
        }
        async fn run(&self, ctx: &ActivityContext, _workspace: Option<&TaskWorkspace>) -> Result<Value> {
            self.calls.lock().unwrap().push(ctx.activity_key.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());
            match outcome {
                Outcome::Ok(v) => Ok(v),
                Outcome::Retryable(m) => Err(MomentumError::TaskFailed(m).into()),
                Outcome::Permanent(m) => Err(MomentumError::InvalidParameter(m).into()),
            }
        }
    }

    /// Executor over a memory store holding one uploaded file
    /// (`upload-1`, content `hello`) plus the built-ins and `extra`
    /// handlers. The returned dir hosts the working directories.
    pub async fn new_test_executor(extra: Vec<Arc<dyn TaskHandler>>) -> (ActivityExecutor, TempDir) {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        store
            .put_object(
                TEST_BUCKET,
                TEST_UPLOAD_ID,
                Bytes::from_static(b"hello"),
                "text/plain",
                PutCondition::Always,
            )
            .await
            .unwrap();
        let containers = DataContainerFactory::new(store.clone(), TEST_BUCKET);
        let registry = TaskHandlerRegistry::new_with_builtins(containers.clone()).unwrap();
        for handler in extra {
            registry.register(handler).unwrap();
        }
        let work_dir = tempfile::tempdir().unwrap();
        let data_handler = ActivityDataHandler::new(
            containers,
            Arc::new(BlobRunInfoRepository::new(store, TEST_BUCKET, Duration::from_millis(10))),
            Some(work_dir.path().to_path_buf()),
        );
        (
            ActivityExecutor::new(Arc::new(registry), data_handler),
            work_dir,
        )
    }
}
