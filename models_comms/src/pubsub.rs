use strum::{Display, EnumString};
use thiserror::Error;

/// An error annotated with the failure reason we aggregate on.
#[derive(Debug, Error)]
#[error("{reason}: {source}")]
pub struct DetailedError {
    pub reason: FailureReason,
    #[source]
    pub source: anyhow::Error,
}

/// Classification every pipeline failure resolves to. Retryable failures
/// leave the triggering event in place for redelivery; non-retryable ones
/// consume it.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Retryable error occurred")]
    Retryable(#[source] DetailedError),

    #[error("Non-retryable error occurred")]
    NonRetryable(#[source] DetailedError),
}

impl ProcessingError {
    pub fn retryable(reason: FailureReason, source: anyhow::Error) -> ProcessingError {
        ProcessingError::Retryable(DetailedError { reason, source })
    }

    pub fn non_retryable(reason: FailureReason, source: anyhow::Error) -> ProcessingError {
        ProcessingError::NonRetryable(DetailedError { reason, source })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum FailureReason {
    DatabaseQueryFailed,
    ProviderApiFailed,
    RecordStoreLookupFailed,
    ChannelNotFound,
    ConversationNotFound,
    PublishFailed,
}
