use crate::workflow::WorkflowConfig;
use anyhow::Result;
use momentum_infra::blob::{new_blob_store, BlobStore};
use momentum_infra::config::{load_redis_config_from_env, RedisConfig, StorageBackend, StorageConfig};
use momentum_infra::container::DataContainerFactory;
use momentum_infra::run_info::repository::{BlobRunInfoRepository, RunInfoRepository};
use momentum_runner::activity::executor::ActivityExecutor;
use momentum_runner::activity::local::LocalActivityInvoker;
use momentum_runner::activity::ActivityInvoker;
use momentum_runner::data::handler::ActivityDataHandler;
use momentum_runner::runner::factory::TaskHandlerRegistry;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppWrapperConfigModule {
    pub workflow_config: Arc<WorkflowConfig>,
    pub storage_config: Arc<StorageConfig>,
    pub redis_config: Option<Arc<RedisConfig>>,
}

impl AppWrapperConfigModule {
    pub fn new_by_env() -> Result<Self> {
        let workflow_config = WorkflowConfig::new_by_envy();
        let storage_config = StorageConfig::new_by_env();
        let redis_config = match storage_config.backend {
            StorageBackend::Redis => Some(Arc::new(load_redis_config_from_env()?)),
            _ => None,
        };
        Ok(Self::new(workflow_config, storage_config, redis_config))
    }
    pub fn new(
        workflow_config: WorkflowConfig,
        mut storage_config: StorageConfig,
        redis_config: Option<Arc<RedisConfig>>,
    ) -> Self {
        if let Some(bucket) = &workflow_config.bucket {
            storage_config.bucket = bucket.clone();
        }
        Self {
            workflow_config: Arc::new(workflow_config),
            storage_config: Arc::new(storage_config),
            redis_config,
        }
    }
}

#[derive(Clone)]
pub struct AppWrapperRepositoryModule {
    pub blob_store: Arc<dyn BlobStore>,
    pub containers: DataContainerFactory,
    pub run_info_repository: Arc<dyn RunInfoRepository>,
}

impl std::fmt::Debug for AppWrapperRepositoryModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppWrapperRepositoryModule")
            .field("containers", &self.containers)
            .finish_non_exhaustive()
    }
}

impl AppWrapperRepositoryModule {
    pub fn new(config_module: &AppWrapperConfigModule) -> Result<Self> {
        let storage = &config_module.storage_config;
        let blob_store = new_blob_store(storage, config_module.redis_config.as_deref())?;
        Ok(Self::new_with_store(blob_store, storage))
    }
    pub fn new_with_store(blob_store: Arc<dyn BlobStore>, storage: &StorageConfig) -> Self {
        let containers = DataContainerFactory::new(blob_store.clone(), storage.bucket.clone());
        let run_info_repository = Arc::new(BlobRunInfoRepository::new(
            blob_store.clone(),
            storage.bucket.clone(),
            Duration::from_millis(storage.run_info_max_backoff_ms),
        ));
        Self {
            blob_store,
            containers,
            run_info_repository,
        }
    }
}

/// Wiring of the interpreter with the in-process substrate: one registry,
/// one executor entry point and a local invoker sized by
/// `WorkflowConfig::max_concurrent_activities`.
#[derive(Clone)]
pub struct AppWrapperModule {
    pub config_module: Arc<AppWrapperConfigModule>,
    pub repositories: Arc<AppWrapperRepositoryModule>,
    pub registry: Arc<TaskHandlerRegistry>,
    pub activity_invoker: Arc<dyn ActivityInvoker>,
}

impl std::fmt::Debug for AppWrapperModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppWrapperModule")
            .field("config_module", &self.config_module)
            .field("repositories", &self.repositories)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl AppWrapperModule {
    pub fn new_by_env() -> Result<Self> {
        let config_module = Arc::new(AppWrapperConfigModule::new_by_env()?);
        let repositories = Arc::new(AppWrapperRepositoryModule::new(&config_module)?);
        Self::new(config_module, repositories)
    }

    pub fn new(
        config_module: Arc<AppWrapperConfigModule>,
        repositories: Arc<AppWrapperRepositoryModule>,
    ) -> Result<Self> {
        let registry = Arc::new(TaskHandlerRegistry::new_with_builtins(
            repositories.containers.clone(),
        )?);
        let data_handler = ActivityDataHandler::new(
            repositories.containers.clone(),
            repositories.run_info_repository.clone(),
            config_module.workflow_config.work_dir.clone(),
        );
        let executor = Arc::new(ActivityExecutor::new(registry.clone(), data_handler));
        let activity_invoker = Arc::new(LocalActivityInvoker::new(
            executor,
            config_module.workflow_config.max_concurrent_activities,
        ));
        Ok(Self {
            config_module,
            repositories,
            registry,
            activity_invoker,
        })
    }
}
