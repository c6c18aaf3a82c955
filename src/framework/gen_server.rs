//! # Generic Request/Reply Server
//!
//! [`GenServer`] is the callback contract for a stateful request/reply process.
//! [`GenServerProcess`] adapts any implementation into a [`ProcessBehavior`],
//! writing the receive loop once for every server.
//!
//! Only the subset needed by the saga coordinator is provided: init, call,
//! cast, info and terminate.

use crate::framework::{
    ExitReason, FrameworkError, Message, Pid, Process, ProcessBehavior, ProcessContext,
    ProcessEvent, Term,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of [`GenServer::handle_call`].
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    Reply(Term),
    /// Reply, then terminate with the given reason.
    Stop(ExitReason, Term),
}

/// Outcome of [`GenServer::handle_cast`] and [`GenServer::handle_info`].
#[derive(Debug, Clone, PartialEq)]
pub enum ServerStatus {
    Continue,
    Stop(ExitReason),
}

/// Callbacks of a generic server. Only `init` is mandatory.
#[async_trait]
pub trait GenServer: Send + Sync + 'static {
    type State: Send;

    /// Builds the initial state. An error aborts the spawn.
    async fn init(&self, process: &Process, args: Vec<Term>) -> Result<Self::State, String>;

    async fn handle_call(
        &self,
        _process: &Process,
        _state: &mut Self::State,
        from: Pid,
        request: Term,
    ) -> CallResult {
        warn!(%from, ?request, "handle_call: unhandled message");
        CallResult::Reply(Term::from("ok"))
    }

    async fn handle_cast(
        &self,
        _process: &Process,
        _state: &mut Self::State,
        request: Term,
    ) -> ServerStatus {
        warn!(?request, "handle_cast: unhandled message");
        ServerStatus::Continue
    }

    /// Receives every mailbox message that is neither a call nor a cast.
    async fn handle_info(
        &self,
        _process: &Process,
        _state: &mut Self::State,
        message: Message,
    ) -> ServerStatus {
        warn!(?message, "handle_info: unhandled message");
        ServerStatus::Continue
    }

    async fn terminate(&self, _process: &Process, _state: &mut Self::State, _reason: &ExitReason) {}
}

/// Runs a [`GenServer`] as a process body.
pub struct GenServerProcess<B: GenServer> {
    behavior: B,
}

impl<B: GenServer> GenServerProcess<B> {
    pub fn new(behavior: B) -> Self {
        Self { behavior }
    }

    pub fn arc(behavior: B) -> Arc<dyn ProcessBehavior> {
        Arc::new(Self::new(behavior))
    }
}

#[async_trait]
impl<B: GenServer> ProcessBehavior for GenServerProcess<B> {
    async fn run(&self, ctx: &mut ProcessContext, args: Vec<Term>) -> ExitReason {
        let process = ctx.process().clone();
        ctx.set_current_function("GenServer:init");
        let mut state = match self.behavior.init(&process, args).await {
            Ok(state) => state,
            Err(e) => {
                warn!(pid = %process.pid(), error = %e, "init failed");
                return ExitReason::Other(e);
            }
        };
        ctx.ready();
        ctx.set_current_function("GenServer:loop");
        info!(pid = %process.pid(), name = %process.name(), "Server started");

        let reason = loop {
            let status = match ctx.next_event().await {
                ProcessEvent::Cancelled => break ExitReason::Kill,
                ProcessEvent::GracefulExit(exit) => {
                    debug!(pid = %process.pid(), from = %exit.from, reason = %exit.reason, "Graceful exit");
                    break exit.reason;
                }
                ProcessEvent::Direct(direct) => {
                    let _ = direct
                        .respond_to
                        .send(Err(FrameworkError::UnsupportedRequest));
                    ServerStatus::Continue
                }
                ProcessEvent::Mailbox(Message::Call {
                    from,
                    request,
                    reply_to,
                }) => {
                    match self
                        .behavior
                        .handle_call(&process, &mut state, from, request)
                        .await
                    {
                        CallResult::Reply(reply) => {
                            let _ = reply_to.send(Ok(reply));
                            ServerStatus::Continue
                        }
                        CallResult::Stop(reason, reply) => {
                            let _ = reply_to.send(Ok(reply));
                            ServerStatus::Stop(reason)
                        }
                    }
                }
                ProcessEvent::Mailbox(Message::Cast(request)) => {
                    self.behavior
                        .handle_cast(&process, &mut state, request)
                        .await
                }
                ProcessEvent::Mailbox(message) => {
                    self.behavior
                        .handle_info(&process, &mut state, message)
                        .await
                }
            };
            if let ServerStatus::Stop(reason) = status {
                break reason;
            }
        };

        self.behavior.terminate(&process, &mut state, &reason).await;
        info!(pid = %process.pid(), %reason, "Server stopped");
        reason
    }
}
