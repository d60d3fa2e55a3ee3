use super::executor::ActivityExecutor;
use super::{ActivityInvoker, ActivityOptions, ActivityRequest};
use anyhow::Result;
use async_trait::async_trait;
use momentum_base::error::MomentumError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

// roughly 30 years
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// In-process substrate: runs activities on the current runtime with a
/// bounded number of worker slots, applying the timeouts and retry policy
/// of each request.
#[derive(Clone, Debug)]
pub struct LocalActivityInvoker {
    executor: Arc<ActivityExecutor>,
    slots: Arc<Semaphore>,
}

impl LocalActivityInvoker {
    pub fn new(executor: Arc<ActivityExecutor>, max_concurrent_activities: usize) -> Self {
        Self {
            executor,
            slots: Arc::new(Semaphore::new(max_concurrent_activities.max(1))),
        }
    }

    pub fn executor(&self) -> &Arc<ActivityExecutor> {
        &self.executor
    }

    async fn attempt(
        &self,
        request: &ActivityRequest,
        attempt: u32,
        cancellation: CancellationToken,
    ) -> Result<String> {
        let options = &request.options;
        let _permit = tokio::time::timeout(options.schedule_to_start, self.slots.clone().acquire_owned())
            .await
            .map_err(|_| {
                MomentumError::TimeoutError(format!(
                    "{}: no worker within schedule-to-start {:?}",
                    &request.activity_key, options.schedule_to_start
                ))
            })?
            .map_err(|e| MomentumError::RuntimeError(format!("worker slots closed: {:?}", e)))?;
        tracing::debug!("start {} attempt {}", &request.activity_key, attempt);
        // the handler observes cancellation when this attempt is dropped
        let token = cancellation.child_token();
        let _guard = token.clone().drop_guard();
        let executor = self.executor.clone();
        let req = request.clone();
        // aborted when the attempt times out or is abandoned
        let worker = AbortOnDropHandle::new(tokio::spawn(async move {
            executor.execute(&req, token).await
        }));
        match tokio::time::timeout(options.start_to_close, worker).await {
            Ok(joined) => joined.map_err(|e| {
                MomentumError::RuntimeError(format!(
                    "{}: attempt {} worker failed: {:?}",
                    &request.activity_key, attempt, e
                ))
            })?,
            Err(_) => Err(MomentumError::TimeoutError(format!(
                "{}: attempt {} exceeded start-to-close {:?}",
                &request.activity_key, attempt, options.start_to_close
            ))
            .into()),
        }
    }

    async fn invoke_with_retry(
        &self,
        request: &ActivityRequest,
        cancellation: &CancellationToken,
    ) -> Result<String> {
        let ActivityOptions {
            schedule_to_close,
            retry,
            ..
        } = &request.options;
        let deadline = deadline_after(*schedule_to_close);
        let mut attempt = 1;
        loop {
            let result = tokio::time::timeout_at(
                deadline,
                self.attempt(request, attempt, cancellation.clone()),
            )
            .await
            .unwrap_or_else(|_| {
                Err(MomentumError::TimeoutError(format!(
                    "{}: exceeded schedule-to-close {:?}",
                    &request.activity_key, schedule_to_close
                ))
                .into())
            });
            let err = match result {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };
            if !MomentumError::is_retryable_error(&err) {
                tracing::debug!("{}: not retryable: {:?}", &request.activity_key, &err);
                return Err(err);
            }
            if !retry.allows_attempt_after(attempt) {
                return Err(err);
            }
            let backoff = retry.backoff_for(attempt);
            if deadline_after(backoff) >= deadline {
                return Err(err);
            }
            tracing::warn!(
                "{} attempt {} failed, retry in {:?}: {:?}",
                &request.activity_key,
                attempt,
                backoff,
                &err
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

// saturates where the clock cannot represent the sum
fn deadline_after(duration: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(duration)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

#[async_trait]
impl ActivityInvoker for LocalActivityInvoker {
    async fn invoke(
        &self,
        request: ActivityRequest,
        cancellation: CancellationToken,
    ) -> Result<String> {
        tokio::select! {
            result = self.invoke_with_retry(&request, &cancellation) => result,
            _ = cancellation.cancelled() => {
                tracing::info!("activity {} cancelled", &request.activity_key);
                Err(MomentumError::CancelledError(format!(
                    "activity {} cancelled",
                    &request.activity_key
                ))
                .into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::RetryPolicy;
    use crate::runner::{ActivityContext, TaskHandler, TaskWorkspace};
    use crate::runner::test_common::mock::{new_test_executor, Outcome, ScriptedRunner};
    use momentum_base::EXECUTOR_HANDLER_NAME;
    use momentum_infra::run_meta::RunMeta;
    use serde_json::json;
    use std::time::Duration;

    fn request(uses: &str, options: ActivityOptions) -> ActivityRequest {
        ActivityRequest {
            handler_name: EXECUTOR_HANDLER_NAME.to_string(),
            uses: uses.to_string(),
            activity_key: "step".to_string(),
            input_activity_key: None,
            args_json: "{}".to_string(),
            run_meta_json: RunMeta::default().to_wire().unwrap(),
            options,
        }
    }

    fn retrying(max_attempts: u32) -> ActivityOptions {
        ActivityOptions {
            retry: RetryPolicy {
                max_attempts,
                initial_interval: Duration::from_millis(1),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_retry_until_success() -> Result<()> {
        let runner = ScriptedRunner::new("Flaky", false, Outcome::Ok(json!("ok"))).with_outcomes(vec![
            Outcome::Retryable("first".into()),
            Outcome::Retryable("second".into()),
        ]);
        let calls = runner.calls();
        let (executor, _work) = new_test_executor(vec![Arc::new(runner)]).await;
        let invoker = LocalActivityInvoker::new(Arc::new(executor), 2);
        let out = invoker
            .invoke(request("Flaky", retrying(5)), CancellationToken::new())
            .await?;
        assert_eq!(out, "\"ok\"");
        assert_eq!(calls.lock().unwrap().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_default_policy_runs_once() {
        let runner = ScriptedRunner::failing("Broken", false);
        let calls = runner.calls();
        let (executor, _work) = new_test_executor(vec![Arc::new(runner)]).await;
        let invoker = LocalActivityInvoker::new(Arc::new(executor), 2);
        assert!(invoker
            .invoke(request("Broken", ActivityOptions::default()), CancellationToken::new())
            .await
            .is_err());
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_not_retried() {
        let runner = ScriptedRunner::new("Strict", false, Outcome::Permanent("bad args".into()));
        let calls = runner.calls();
        let (executor, _work) = new_test_executor(vec![Arc::new(runner)]).await;
        let invoker = LocalActivityInvoker::new(Arc::new(executor), 2);
        let err = invoker
            .invoke(request("Strict", retrying(5)), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MomentumError>(),
            Some(MomentumError::InvalidParameter(_))
        ));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_to_close_timeout_is_retried() {
        let runner = ScriptedRunner::new("Slow", false, Outcome::Ok(json!(1)))
            .with_delay(Duration::from_secs(30));
        let calls = runner.calls();
        let (executor, _work) = new_test_executor(vec![Arc::new(runner)]).await;
        let invoker = LocalActivityInvoker::new(Arc::new(executor), 2);
        let mut options = retrying(2);
        options.start_to_close = Duration::from_millis(20);
        let err = invoker
            .invoke(request("Slow", options), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MomentumError>(),
            Some(MomentumError::TimeoutError(_))
        ));
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_schedule_to_close_bounds_unlimited_retries() {
        let (executor, _work) =
            new_test_executor(vec![Arc::new(ScriptedRunner::failing("Broken", false))]).await;
        let invoker = LocalActivityInvoker::new(Arc::new(executor), 2);
        let mut options = retrying(0);
        options.schedule_to_close = Duration::from_millis(100);
        let started = std::time::Instant::now();
        assert!(invoker
            .invoke(request("Broken", options), CancellationToken::new())
            .await
            .is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancellation_returns_promptly() {
        let (executor, _work) = new_test_executor(vec![Arc::new(
            ScriptedRunner::new("Slow", false, Outcome::Ok(json!(1))).with_delay(Duration::from_secs(30)),
        )])
        .await;
        let invoker = LocalActivityInvoker::new(Arc::new(executor), 2);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        let err = invoker
            .invoke(request("Slow", ActivityOptions::default()), token)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MomentumError>(),
            Some(MomentumError::CancelledError(_))
        ));
    }

    #[tokio::test]
    async fn test_schedule_to_start_timeout_when_slots_busy() {
        let (executor, _work) = new_test_executor(vec![Arc::new(
            ScriptedRunner::new("Slow", false, Outcome::Ok(json!(1))).with_delay(Duration::from_millis(300)),
        )])
        .await;
        let invoker = LocalActivityInvoker::new(Arc::new(executor), 1);
        let busy = {
            let invoker = invoker.clone();
            tokio::spawn(async move {
                invoker
                    .invoke(request("Slow", ActivityOptions::default()), CancellationToken::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut options = ActivityOptions::default();
        options.schedule_to_start = Duration::from_millis(20);
        let err = invoker
            .invoke(request("Echo", options), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MomentumError>(),
            Some(MomentumError::TimeoutError(_))
        ));
        assert!(busy.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_unbounded_timeouts_do_not_overflow() -> Result<()> {
        let runner = ScriptedRunner::new("Flaky", false, Outcome::Ok(json!("ok")))
            .with_outcomes(vec![Outcome::Retryable("once".into())]);
        let (executor, _work) = new_test_executor(vec![Arc::new(runner)]).await;
        let invoker = LocalActivityInvoker::new(Arc::new(executor), 2);
        let huge = Duration::from_secs(u64::MAX);
        let options = ActivityOptions {
            schedule_to_close: huge,
            schedule_to_start: huge,
            start_to_close: huge,
            retry: RetryPolicy {
                max_attempts: 2,
                initial_interval: Duration::ZERO,
                backoff_coefficient: 2.0,
                max_interval: huge,
            },
        };
        let out = invoker.invoke(request("Flaky", options), CancellationToken::new()).await?;
        assert_eq!(out, "\"ok\"");
        assert!(deadline_after(huge) > Instant::now());
        Ok(())
    }

    /// Occupies its worker thread for the whole call.
    #[derive(Debug)]
    struct BlockingRunner;

    #[async_trait]
    impl TaskHandler for BlockingRunner {
        fn name(&self) -> String {
            "Blocking".to_string()
        }
        fn uses_data_layer(&self) -> bool {
            false
        }
        async fn run(&self, _ctx: &ActivityContext, _workspace: Option<&TaskWorkspace>) -> Result<serde_json::Value> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(json!(null))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_attempts_run_on_separate_workers() {
        let (executor, _work) = new_test_executor(vec![Arc::new(BlockingRunner)]).await;
        let invoker = LocalActivityInvoker::new(Arc::new(executor), 4);
        let started = std::time::Instant::now();
        let results = futures::future::join_all(
            (0..4).map(|_| invoker.invoke(request("Blocking", ActivityOptions::default()), CancellationToken::new())),
        )
        .await;
        assert!(results.iter().all(|r| r.is_ok()));
        // sequential execution would take 1.2s
        assert!(started.elapsed() < Duration::from_millis(900), "{:?}", started.elapsed());
    }
}
