//! # Messages
//!
//! Every shape a process can receive is a variant of a closed enum, so the
//! receiving loops match exhaustively instead of inspecting payloads at runtime.

use crate::framework::{ExitReason, FrameworkError, Pid, Term};
use crate::saga::SagaMessage;
use tokio::sync::oneshot;

/// Type alias for the one-shot response channel used by synchronous requests.
pub type Response<T> = oneshot::Sender<Result<T, FrameworkError>>;

/// A message delivered to a process mailbox.
#[derive(Debug)]
pub enum Message {
    /// Exit notification of a linked process (or an exit request) for a process
    /// that traps exits.
    Exit { from: Pid, reason: ExitReason },
    /// Synchronous request expecting exactly one reply.
    Call {
        from: Pid,
        request: Term,
        reply_to: Response<Term>,
    },
    /// Fire-and-forget request.
    Cast(Term),
    /// Plain message.
    Info { from: Pid, payload: Term },
    /// Saga transaction traffic.
    Saga(SagaMessage),
}

/// Administrative request sent over the direct channel, bypassing the mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectRequest {
    /// Ask a supervising process for the pids of its live children.
    GetChildren,
    Custom(String),
}

impl DirectRequest {
    pub fn id(&self) -> &str {
        match self {
            DirectRequest::GetChildren => "$getChildren",
            DirectRequest::Custom(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectReply {
    Children(Vec<Pid>),
}

/// A direct request together with the channel its reply goes to.
#[derive(Debug)]
pub struct DirectEnvelope {
    pub request: DirectRequest,
    pub respond_to: Response<DirectReply>,
}

/// Request for a non-trapping process to terminate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GracefulExit {
    pub from: Pid,
    pub reason: ExitReason,
}

/// One event drawn from any of a process's input sources.
#[derive(Debug)]
pub enum ProcessEvent {
    GracefulExit(GracefulExit),
    Direct(DirectEnvelope),
    Cancelled,
    Mailbox(Message),
}
