//! Process-wide structured logging setup.

use serde::Deserialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

#[derive(Deserialize, Clone, Debug)]
pub struct LoggingConfig {
    pub level: Option<String>,
    #[serde(default)]
    pub use_json: bool,
    #[serde(default = "default_with_ansi")]
    pub with_ansi: bool,
}

fn default_with_ansi() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Some("info".to_string()),
            use_json: false,
            with_ansi: true,
        }
    }
}

/// Reads `LOG_LEVEL`, `LOG_USE_JSON` and `LOG_WITH_ANSI`.
pub fn load_logging_config_from_env() -> anyhow::Result<LoggingConfig> {
    envy::prefixed("LOG_")
        .from_env::<LoggingConfig>()
        .map_err(|e| anyhow::anyhow!("cannot read logging config from env: {:?}", e))
}

fn create_env_filter(conf: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(conf.level.as_deref().unwrap_or("info")))
        .map_err(|e| anyhow::anyhow!("failed to create env filter: {e}"))
}

/// `RUST_LOG` wins over `LoggingConfig::level`.
pub fn logging_init(conf: LoggingConfig) -> anyhow::Result<()> {
    let env_filter = create_env_filter(&conf)?;
    let fmt_layer = if conf.use_json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(conf.with_ansi)
            .boxed()
    };
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))
}

/// For tests: ignores a subscriber that is already installed.
pub fn logging_init_test(level: tracing::Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_test_writer()
        .try_init();
}
