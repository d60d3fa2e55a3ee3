use thiserror::Error;

#[derive(Debug, Error)]
pub enum MomentumError {
    #[error("SchemaError({0})")]
    SchemaError(String),
    #[error("InvalidParameter({0})")]
    InvalidParameter(String),
    #[error("PredecessorNotFound({0})")]
    PredecessorNotFound(String),
    #[error("HandlerNotFound({0})")]
    HandlerNotFound(String),
    #[error("ConflictError({0})")]
    ConflictError(String),
    #[error("StorageError({0})")]
    StorageError(String),
    #[error("DataRelayError({0})")]
    DataRelayError(String),
    #[error("TimeoutError({0})")]
    TimeoutError(String),
    #[error("CancelledError({0})")]
    CancelledError(String),
    #[error("TaskFailed({0})")]
    TaskFailed(String),
    #[error("IoError({0:?})")]
    IoError(std::io::Error),
    #[error("RedisError({0})")]
    RedisError(String),
    #[error("RuntimeError({0})")]
    RuntimeError(String),
}

impl MomentumError {
    /// Returns false for failures a retry can never fix: malformed
    /// definitions or arguments, a missing upstream output, an unknown
    /// handler, or an explicit cancellation.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            MomentumError::SchemaError(_)
                | MomentumError::InvalidParameter(_)
                | MomentumError::PredecessorNotFound(_)
                | MomentumError::HandlerNotFound(_)
                | MomentumError::CancelledError(_)
        )
    }

    /// Classifies an arbitrary error chain. Errors that carry no
    /// `MomentumError` are treated as retryable.
    pub fn is_retryable_error(err: &anyhow::Error) -> bool {
        err.chain()
            .find_map(|e| e.downcast_ref::<MomentumError>())
            .map(|e| e.is_retryable())
            .unwrap_or(true)
    }
}

impl From<std::io::Error> for MomentumError {
    fn from(e: std::io::Error) -> Self {
        MomentumError::IoError(e)
    }
}
