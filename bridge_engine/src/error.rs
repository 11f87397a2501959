use bridge_core::{RawDecodeError, TimestampError, ValueKind};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("context {0} already exists")]
    DuplicateContext(String),
    #[error("context {0} does not exist")]
    UnknownContext(String),
    #[error("task {0} has been canceled")]
    ContextDone(String),
    #[error("metric {0} is not defined")]
    UndefinedMetric(String),
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("definitions are frozen once the collector is ready")]
    AlreadyReady,
    #[error("collector has already been started")]
    AlreadyStarted,
    #[error("serialization failed: {0}")]
    SerializationFailure(String),
    #[error("invalid value type {0}")]
    InvalidValueType(i32),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(#[from] TimestampError),
    #[error("metric {name} is defined as {expected} but got {actual}")]
    ValueKindMismatch {
        name: String,
        expected: ValueKind,
        actual: ValueKind,
    },
    #[error("another request for task {0} is in progress")]
    TaskBusy(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Callback(String),
}

impl BridgeError {
    pub fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        BridgeError::InvalidPattern { pattern: pattern.to_string(), reason: reason.into() }
    }
}

impl From<RawDecodeError> for BridgeError {
    fn from(err: RawDecodeError) -> Self {
        match err {
            RawDecodeError::InvalidValueType(code) => BridgeError::InvalidValueType(code),
            RawDecodeError::InvalidTimestamp(ts) => BridgeError::InvalidTimestamp(ts),
            other => BridgeError::InvalidArgument(other.to_string()),
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
