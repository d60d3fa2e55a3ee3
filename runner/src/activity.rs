//! Invocation contract between the workflow interpreter and the execution
//! substrate that runs task handlers.
//!
//! The interpreter never calls a handler directly: it sends an
//! [`ActivityRequest`] through an [`ActivityInvoker`], and the substrate
//! routes it to [`executor::ActivityExecutor`] on some worker.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub mod executor;
pub mod local;

pub const DEFAULT_ACTIVITY_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::ZERO;
pub const DEFAULT_BACKOFF_COEFFICIENT: f64 = 2.0;
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 0 means unlimited, bounded only by the schedule-to-close timeout
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            backoff_coefficient: DEFAULT_BACKOFF_COEFFICIENT,
            max_interval: DEFAULT_MAX_INTERVAL,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(64) as i32;
        let secs = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exp);
        if !secs.is_finite() || secs >= self.max_interval.as_secs_f64() {
            self.max_interval
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }

    /// Whether another attempt may follow attempt number `attempt`.
    pub fn allows_attempt_after(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt < self.max_attempts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityOptions {
    /// whole invocation including retries
    pub schedule_to_close: Duration,
    /// wait for a free worker, per attempt
    pub schedule_to_start: Duration,
    /// a single attempt
    pub start_to_close: Duration,
    pub retry: RetryPolicy,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            schedule_to_close: DEFAULT_ACTIVITY_TIMEOUT,
            schedule_to_start: DEFAULT_ACTIVITY_TIMEOUT,
            start_to_close: DEFAULT_ACTIVITY_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// One scheduled unit of work. Arguments and run metadata travel as json
/// strings, as they would through an external substrate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRequest {
    /// always [`momentum_base::EXECUTOR_HANDLER_NAME`]
    pub handler_name: String,
    /// the task handler that does the work
    pub uses: String,
    pub activity_key: String,
    pub input_activity_key: Option<String>,
    pub args_json: String,
    pub run_meta_json: String,
    pub options: ActivityOptions,
}

#[async_trait]
pub trait ActivityInvoker: Send + Sync + 'static {
    /// Schedules `request` and waits for its result json. Retries and
    /// timeouts follow `request.options`; `cancellation` abandons the
    /// invocation promptly with `MomentumError::CancelledError`.
    async fn invoke(&self, request: ActivityRequest, cancellation: CancellationToken)
        -> Result<String>;
}
