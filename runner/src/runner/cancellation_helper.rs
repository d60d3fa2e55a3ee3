//! Cancellation support shared by the executor and the local substrate.

use anyhow::Result;
use momentum_base::error::MomentumError;
use tokio_util::sync::CancellationToken;

/// Runs `future` until it finishes or `cancellation_token` fires, whichever
/// comes first. Cancellation yields `MomentumError::CancelledError`.
pub async fn execute_cancellable<F, T>(
    future: F,
    cancellation_token: &CancellationToken,
    operation_name: &str,
) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    if cancellation_token.is_cancelled() {
        tracing::info!("{} was cancelled before start", operation_name);
        return Err(cancelled(operation_name));
    }
    tokio::select! {
        result = future => result,
        _ = cancellation_token.cancelled() => {
            tracing::info!("{} was cancelled", operation_name);
            Err(cancelled(operation_name))
        }
    }
}

fn cancelled(operation_name: &str) -> anyhow::Error {
    MomentumError::CancelledError(format!("{} was cancelled", operation_name)).into()
}
