//! In-process actor primitive.
//!
//! This module provides the building blocks the supervision and saga layers run on:
//! processes with a mailbox, exit and direct channels, links and trap-exit, and a
//! node that spawns and registers them.
//!
//! # Main Components
//!
//! - [`Node`] - Process registry, spawning, node-wide stop
//! - [`Process`] / [`ProcessContext`] - Handle and receiving half of a process
//! - [`ProcessBehavior`] - Trait every process body implements
//! - [`GenServer`] - Request/reply server contract and its [`GenServerProcess`] adapter
//! - [`FrameworkError`] - Common error types
//!
//! # Testing
//!
//! See [`mock`] module for scripted child processes.

pub mod error;
pub mod gen_server;
pub mod message;
pub mod mock;
pub mod node;
pub mod process;
pub mod types;

// Re-export core types for convenience
pub use error::FrameworkError;
pub use gen_server::{CallResult, GenServer, GenServerProcess, ServerStatus};
pub use message::{
    DirectEnvelope, DirectReply, DirectRequest, GracefulExit, Message, ProcessEvent, Response,
};
pub use node::Node;
pub use process::{Process, ProcessBehavior, ProcessContext};
pub use types::{ExitReason, Pid, Ref, Term};
