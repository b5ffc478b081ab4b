use thiserror::Error;

/// Error taxonomy for both store gateways. `Transient` covers connection
/// and pool exhaustion failures the caller should retry (the next broker
/// redelivery, or the next detector tick); `Fatal` covers schema
/// mismatches and auth failures that should propagate and shut the
/// process down.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transient store error: {0}")]
    Transient(#[source] sqlx::Error),
    #[error("fatal store error: {0}")]
    Fatal(#[source] sqlx::Error),
    #[error("unsupported KPI: {0}")]
    UnknownKpi(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// Classify a `sqlx::Error` per spec: connection-level failures are
/// transient (the caller retries via broker redelivery or the next
/// detector tick); anything else — schema mismatches, auth failures,
/// constraint violations we don't expect — is fatal.
pub fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Transient(err)
        }
        _ => StoreError::Fatal(err),
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
