use anyhow::Result;
use momentum_base::error::MomentumError;
use serde::Deserialize;
use std::path::PathBuf;

const DEFAULT_ROOT_DIR: &str = "./momentum-data";
const DEFAULT_RUN_INFO_MAX_BACKOFF_MS: u64 = 50;

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Fs,
    Redis,
}

#[derive(Deserialize, Clone, Debug)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// root directory of the fs backend
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// upper bound of the random delay between conflicting RunInfo writes
    #[serde(default = "default_run_info_max_backoff_ms")]
    pub run_info_max_backoff_ms: u64,
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(DEFAULT_ROOT_DIR)
}
fn default_bucket() -> String {
    momentum_base::DEFAULT_BUCKET.clone()
}
fn default_run_info_max_backoff_ms() -> u64 {
    DEFAULT_RUN_INFO_MAX_BACKOFF_MS
}

impl Default for StorageConfig {
    fn default() -> Self {
        tracing::info!("Use default StorageConfig.");
        Self {
            backend: StorageBackend::default(),
            root_dir: default_root_dir(),
            bucket: default_bucket(),
            run_info_max_backoff_ms: DEFAULT_RUN_INFO_MAX_BACKOFF_MS,
        }
    }
}

impl StorageConfig {
    pub fn new_by_env() -> Self {
        envy::prefixed("STORAGE_")
            .from_env::<StorageConfig>()
            .unwrap_or_else(|e| {
                tracing::info!("cannot read storage config from env: {:?}", e);
                Self::default()
            })
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct RedisConfig {
    pub url: String,
    pub pool_size: Option<usize>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: None,
        }
    }
}

pub fn load_redis_config_from_env() -> Result<RedisConfig> {
    envy::prefixed("REDIS_")
        .from_env::<RedisConfig>()
        .map_err(|e| {
            MomentumError::RuntimeError(format!("cannot read redis config from env: {:?}", e))
                .into()
        })
}

pub fn new_redis_pool(config: &RedisConfig) -> Result<deadpool_redis::Pool> {
    let mut cfg = deadpool_redis::Config::from_url(config.url.clone());
    if let Some(size) = config.pool_size {
        cfg.pool = Some(deadpool_redis::PoolConfig::new(size));
    }
    cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| MomentumError::RedisError(format!("cannot create redis pool: {:?}", e)).into())
}
