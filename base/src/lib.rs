use once_cell::sync::Lazy;
use std::env;

pub mod error;
pub mod limits;
pub mod logging;

/// Fixed substrate entry point every task invocation is routed through.
pub static EXECUTOR_HANDLER_NAME: &str = "Executor";

pub static DEFAULT_BUCKET: Lazy<String> =
    Lazy::new(|| env::var("MOMENTUM_BUCKET").unwrap_or_else(|_| "momentum".to_string()));
