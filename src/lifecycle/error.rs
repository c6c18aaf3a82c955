//! Error types for application lifecycle operations.

use crate::framework::FrameworkError;
use thiserror::Error;

/// Errors that can occur while loading, starting or stopping applications.
#[derive(Debug, Error, PartialEq)]
pub enum ApplicationError {
    /// The behavior could not produce a usable spec.
    #[error("Application load failed: {0}")]
    LoadFailed(String),

    /// Two children of one application share a name.
    #[error("Duplicate child {child} in application {app}")]
    DuplicateChild { app: String, child: String },

    #[error("Application already loaded: {0}")]
    AlreadyLoaded(String),

    #[error("Application not loaded: {0}")]
    NotLoaded(String),

    #[error("Application already started: {0}")]
    AlreadyStarted(String),

    #[error("Application not started: {0}")]
    NotStarted(String),

    /// An underlying process operation failed.
    #[error(transparent)]
    Framework(#[from] FrameworkError),
}
