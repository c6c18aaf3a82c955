//! # Framework Errors
//!
//! This module defines the common error types used by the process primitive.
//! Lifecycle and saga layers wrap these in their own error enums via `#[from]`.

use crate::framework::Pid;
use std::time::Duration;

/// Errors that can occur within the process framework itself.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FrameworkError {
    #[error("Process {0} is not alive")]
    ProcessNotAlive(Pid),
    #[error("Process dropped response channel")]
    ReplyDropped,
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Unsupported request")]
    UnsupportedRequest,
    #[error("Process {name} failed to start: {reason}")]
    StartFailed { name: String, reason: String },
    #[error("Name already registered: {0}")]
    NameTaken(String),
    #[error("Node is stopped")]
    NodeStopped,
    #[error("Process not found: {0}")]
    NotFound(String),
}
