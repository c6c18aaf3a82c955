//! # Mock Processes & Testing Guide
//!
//! [`MockChild`] is a scripted [`ProcessBehavior`] for exercising supervisors
//! without writing a real child. Each constructor selects one script:
//!
//! | Constructor | Becomes ready | Honours exit requests | Terminates on its own |
//! |-------------|---------------|-----------------------|-----------------------|
//! | [`MockChild::ready`] | yes | yes | no |
//! | [`MockChild::fail_init`] | no | - | immediately, `failed` |
//! | [`MockChild::stubborn`] | yes | no (only `kill`) | no |
//! | [`MockChild::exit_after`] | yes | yes | after a delay |
//! | [`MockChild::panic_after`] | yes | - | panics after a delay |
//!
//! A shared counter can be attached with [`MockChild::with_counter`] to observe
//! how many times the behavior was started.
//!
//! ```rust
//! use actor_supervisor::framework::mock::MockChild;
//! use actor_supervisor::framework::{ExitReason, Node, Pid};
//! use actor_supervisor::runtime::Config;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let node = Node::new("demo", Config::default());
//!     let child = node.spawn("worker", Arc::new(MockChild::ready()), vec![]).await.unwrap();
//!
//!     child.exit(Pid(0), ExitReason::Shutdown).unwrap();
//!     let reason = child.wait_with_timeout(Duration::from_secs(1)).await.unwrap();
//!     assert_eq!(reason, ExitReason::Shutdown);
//! }
//! ```

use crate::framework::{
    ExitReason, FrameworkError, ProcessBehavior, ProcessContext, ProcessEvent, Term,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Script {
    Ready,
    FailInit,
    Stubborn,
    ExitAfter(Duration, ExitReason),
    PanicAfter(Duration),
}

/// A scripted child process for tests.
#[derive(Debug, Clone)]
pub struct MockChild {
    script: Script,
    starts: Option<Arc<AtomicUsize>>,
}

impl MockChild {
    fn new(script: Script) -> Self {
        Self {
            script,
            starts: None,
        }
    }

    /// Becomes ready and runs until asked to exit.
    pub fn ready() -> Self {
        Self::new(Script::Ready)
    }

    /// Returns `failed` without ever becoming ready, so spawning it fails.
    pub fn fail_init() -> Self {
        Self::new(Script::FailInit)
    }

    /// Becomes ready and ignores graceful exit requests.
    pub fn stubborn() -> Self {
        Self::new(Script::Stubborn)
    }

    /// Becomes ready and terminates with `reason` after `delay`.
    pub fn exit_after(delay: Duration, reason: ExitReason) -> Self {
        Self::new(Script::ExitAfter(delay, reason))
    }

    /// Becomes ready and panics after `delay`.
    pub fn panic_after(delay: Duration) -> Self {
        Self::new(Script::PanicAfter(delay))
    }

    /// Counts every start attempt into `counter`.
    pub fn with_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.starts = Some(counter);
        self
    }
}

#[async_trait]
impl ProcessBehavior for MockChild {
    async fn run(&self, ctx: &mut ProcessContext, _args: Vec<Term>) -> ExitReason {
        if let Some(starts) = &self.starts {
            starts.fetch_add(1, Ordering::SeqCst);
        }

        let deadline = match &self.script {
            Script::FailInit => return ExitReason::Failed,
            Script::ExitAfter(delay, _) | Script::PanicAfter(delay) => Some(*delay),
            Script::Ready | Script::Stubborn => None,
        };
        ctx.ready();

        let sleep = tokio::time::sleep(deadline.unwrap_or(Duration::from_secs(86_400)));
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep, if deadline.is_some() => {
                    match &self.script {
                        Script::ExitAfter(_, reason) => return reason.clone(),
                        _ => panic!("scripted panic"),
                    }
                }
                event = ctx.next_event() => match event {
                    ProcessEvent::Cancelled => return ExitReason::Kill,
                    ProcessEvent::GracefulExit(exit) => {
                        if !matches!(self.script, Script::Stubborn) {
                            return exit.reason;
                        }
                    }
                    ProcessEvent::Direct(direct) => {
                        let _ = direct.respond_to.send(Err(FrameworkError::UnsupportedRequest));
                    }
                    ProcessEvent::Mailbox(_) => {}
                },
            }
        }
    }
}
