//! # Processes
//!
//! A process is a Tokio task with a mailbox, a direct request channel, a
//! graceful-exit channel and a cancellation token. [`Process`] is the cloneable
//! handle other code holds; [`ProcessContext`] is the receiving half, owned
//! exclusively by the running body.
//!
//! **Concurrency Model**:
//! The body processes its inputs sequentially, so its own state needs no locks.
//! The few fields shared with handles (links, trap flag, diagnostics) sit behind
//! small mutexes or atomics on [`Process`].

use crate::framework::message::{DirectEnvelope, DirectReply, DirectRequest, GracefulExit};
use crate::framework::node::NodeInner;
use crate::framework::{ExitReason, FrameworkError, Message, Node, Pid, ProcessEvent, Term};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The body of a process.
///
/// `run` must call [`ProcessContext::ready`] once it is initialised; a body that
/// returns before doing so makes the spawn fail. The returned reason becomes the
/// process's exit reason. A body must return once its context is cancelled,
/// which [`ProcessContext::next_event`] reports as [`ProcessEvent::Cancelled`].
#[async_trait]
pub trait ProcessBehavior: Send + Sync + 'static {
    async fn run(&self, ctx: &mut ProcessContext, args: Vec<Term>) -> ExitReason;
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct ProcessInner {
    pub(crate) pid: Pid,
    pub(crate) name: String,
    pub(crate) node: Weak<NodeInner>,
    pub(crate) mailbox: mpsc::UnboundedSender<Message>,
    pub(crate) direct: mpsc::Sender<DirectEnvelope>,
    pub(crate) graceful_exit: mpsc::UnboundedSender<GracefulExit>,
    pub(crate) token: CancellationToken,
    pub(crate) done: watch::Receiver<Option<ExitReason>>,
    pub(crate) started: AtomicBool,
    pub(crate) trap_exit: AtomicBool,
    pub(crate) links: Mutex<HashSet<Pid>>,
    pub(crate) current_function: Mutex<&'static str>,
}

/// Handle to a running (or terminated) process. Cheap to clone.
#[derive(Clone)]
pub struct Process {
    pub(crate) inner: Arc<ProcessInner>,
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.inner.pid)
            .field("name", &self.inner.name)
            .finish()
    }
}

impl PartialEq for Process {
    fn eq(&self, other: &Self) -> bool {
        self.inner.pid == other.inner.pid
    }
}

impl Process {
    pub fn pid(&self) -> Pid {
        self.inner.pid
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn node(&self) -> Result<Node, FrameworkError> {
        self.inner
            .node
            .upgrade()
            .map(Node::from_inner)
            .ok_or(FrameworkError::NodeStopped)
    }

    pub fn is_alive(&self) -> bool {
        self.inner.done.borrow().is_none() && !self.inner.token.is_cancelled()
    }

    /// The exit reason, once the process has terminated.
    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.inner.done.borrow().clone()
    }

    pub fn trap_exit(&self) -> bool {
        self.inner.trap_exit.load(Ordering::SeqCst)
    }

    pub fn links(&self) -> Vec<Pid> {
        lock(&self.inner.links).iter().copied().collect()
    }

    pub fn current_function(&self) -> &'static str {
        *lock(&self.inner.current_function)
    }

    /// Asks the process to terminate.
    ///
    /// A trapping process receives [`Message::Exit`] in its mailbox, any other
    /// process receives a [`GracefulExit`]. [`ExitReason::Kill`] cancels the
    /// process context and cannot be trapped.
    pub fn exit(&self, from: Pid, reason: ExitReason) -> Result<(), FrameworkError> {
        if !self.is_alive() {
            return Err(FrameworkError::ProcessNotAlive(self.pid()));
        }
        debug!(pid = %self.pid(), %from, %reason, "Exit requested");
        if reason == ExitReason::Kill {
            self.inner.token.cancel();
            return Ok(());
        }
        let delivered = if self.trap_exit() {
            self.inner.mailbox.send(Message::Exit { from, reason }).is_ok()
        } else {
            self.inner
                .graceful_exit
                .send(GracefulExit { from, reason })
                .is_ok()
        };
        if delivered {
            Ok(())
        } else {
            Err(FrameworkError::ProcessNotAlive(self.pid()))
        }
    }

    /// Delivers a message to the mailbox.
    pub fn send(&self, message: Message) -> Result<(), FrameworkError> {
        self.inner
            .mailbox
            .send(message)
            .map_err(|_| FrameworkError::ProcessNotAlive(self.pid()))
    }

    pub fn cast(&self, request: Term) -> Result<(), FrameworkError> {
        self.send(Message::Cast(request))
    }

    /// Synchronous request/reply through the mailbox.
    pub async fn call(
        &self,
        from: Pid,
        request: Term,
        timeout: Duration,
    ) -> Result<Term, FrameworkError> {
        let (reply_to, response) = oneshot::channel();
        self.send(Message::Call {
            from,
            request,
            reply_to,
        })?;
        tokio::time::timeout(timeout, response)
            .await
            .map_err(|_| FrameworkError::Timeout(timeout))?
            .map_err(|_| FrameworkError::ReplyDropped)?
    }

    /// Synchronous administrative request that bypasses the mailbox, bounded by
    /// the node's `call_timeout`.
    pub async fn direct(&self, request: DirectRequest) -> Result<DirectReply, FrameworkError> {
        let timeout = self.node()?.config().call_timeout;
        let (respond_to, response) = oneshot::channel();
        let exchange = async {
            self.inner
                .direct
                .send(DirectEnvelope {
                    request,
                    respond_to,
                })
                .await
                .map_err(|_| FrameworkError::ProcessNotAlive(self.pid()))?;
            response.await.map_err(|_| FrameworkError::ReplyDropped)?
        };
        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| FrameworkError::Timeout(timeout))?
    }

    /// Waits until the process has terminated and returns its exit reason.
    pub async fn wait(&self) -> ExitReason {
        let mut done = self.inner.done.clone();
        let reason = match done.wait_for(Option::is_some).await {
            Ok(reason) => (*reason).clone(),
            Err(_) => None,
        };
        reason.unwrap_or(ExitReason::Kill)
    }

    pub async fn wait_with_timeout(&self, timeout: Duration) -> Result<ExitReason, FrameworkError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| FrameworkError::Timeout(timeout))
    }
}

/// The receiving half of a process, owned by its body.
pub struct ProcessContext {
    pub(crate) process: Process,
    pub(crate) node: Node,
    pub(crate) mailbox: mpsc::UnboundedReceiver<Message>,
    pub(crate) direct: mpsc::Receiver<DirectEnvelope>,
    pub(crate) graceful_exit: mpsc::UnboundedReceiver<GracefulExit>,
    pub(crate) token: CancellationToken,
    pub(crate) ready: Option<oneshot::Sender<()>>,
    pub(crate) env: HashMap<String, Term>,
}

impl ProcessContext {
    pub fn process(&self) -> &Process {
        &self.process
    }

    pub fn pid(&self) -> Pid {
        self.process.pid()
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Signals the spawner that initialisation succeeded. Later calls are no-ops.
    pub fn ready(&mut self) {
        if let Some(ready) = self.ready.take() {
            self.process.inner.started.store(true, Ordering::SeqCst);
            let _ = ready.send(());
        }
    }

    pub fn set_trap_exit(&self, trap: bool) {
        self.process.inner.trap_exit.store(trap, Ordering::SeqCst);
    }

    pub fn set_env(&mut self, key: impl Into<String>, value: Term) {
        self.env.insert(key.into(), value);
    }

    pub fn env(&self, key: &str) -> Option<&Term> {
        self.env.get(key)
    }

    pub fn set_current_function(&self, function: &'static str) {
        *lock(&self.process.inner.current_function) = function;
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.token
    }

    /// Spawns a process linked to this one.
    pub async fn spawn_link(
        &self,
        name: impl Into<String>,
        behavior: Arc<dyn ProcessBehavior>,
        args: Vec<Term>,
    ) -> Result<Process, FrameworkError> {
        self.node
            .spawn_with(name.into(), behavior, args, Some(&self.process))
            .await
    }

    /// Waits for the next input from any source. Cancel-safe.
    pub async fn next_event(&mut self) -> ProcessEvent {
        tokio::select! {
            _ = self.token.cancelled() => ProcessEvent::Cancelled,
            Some(exit) = self.graceful_exit.recv() => ProcessEvent::GracefulExit(exit),
            Some(direct) = self.direct.recv() => ProcessEvent::Direct(direct),
            Some(message) = self.mailbox.recv() => ProcessEvent::Mailbox(message),
            else => ProcessEvent::Cancelled,
        }
    }
}
