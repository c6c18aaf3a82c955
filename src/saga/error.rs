use crate::framework::{FrameworkError, Ref};
use thiserror::Error;

/// Errors raised by saga operations and returned by saga hooks.
#[derive(Debug, Error, PartialEq)]
pub enum SagaError {
    #[error("Unknown transaction: {0}")]
    UnknownTransaction(Ref),

    #[error("Transaction limit reached: {0}")]
    MaxTransactions(usize),

    #[error("Hop limit exceeded")]
    HopLimitExceeded,

    #[error("Loop detected")]
    LoopDetected,

    /// Raised by user hooks.
    #[error("{0}")]
    Handler(String),

    #[error(transparent)]
    Framework(#[from] FrameworkError),
}
