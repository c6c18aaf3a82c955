//! # Application Controller
//!
//! The process that owns an application's children. It traps exits, starts the
//! children, then serves a single loop that merges every input source:
//!
//! - lifespan expiry, turned into a graceful exit of the application;
//! - graceful exit requests, which stop the children and end the loop;
//! - direct requests (`$getChildren`);
//! - exit notifications, classified as coming from a child or from elsewhere.
//!
//! A child exit is escalated according to the [`ApplicationStartType`].

use crate::framework::{
    DirectEnvelope, DirectReply, DirectRequest, ExitReason, FrameworkError, GracefulExit, Message,
    Pid, Process, ProcessBehavior, ProcessContext, ProcessEvent, Term,
};
use crate::lifecycle::supervision::{start_children, stop_children, ChildTable};
use crate::lifecycle::{ApplicationBehavior, ApplicationSpec, ApplicationStartType};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

enum ControlEvent {
    Process(ProcessEvent),
    LifespanExpired,
}

/// Process body supervising one application.
pub struct ApplicationController {
    spec: Arc<ApplicationSpec>,
    behavior: Arc<dyn ApplicationBehavior>,
    start_type: ApplicationStartType,
}

impl ApplicationController {
    pub fn new(
        spec: Arc<ApplicationSpec>,
        behavior: Arc<dyn ApplicationBehavior>,
        start_type: ApplicationStartType,
    ) -> Self {
        Self {
            spec,
            behavior,
            start_type,
        }
    }

    /// Applies the start type to the exit of a known child.
    ///
    /// Returns the controller's own exit reason when the loop must end.
    async fn handle_child_exit(
        &self,
        ctx: &ProcessContext,
        children: &mut ChildTable,
        index: usize,
        from: Pid,
        reason: ExitReason,
    ) -> Option<ExitReason> {
        let app = self.spec.name.as_str();
        let child = children.slots()[index].name.clone();
        children.retire(index);
        let stop_timeout = ctx.node().config().stop_timeout;

        match self.start_type {
            ApplicationStartType::Permanent => {
                stop_children(from, children, &reason, stop_timeout).await;
                warn!(app, %child, %reason, "Permanent child terminated; stopping node");
                ctx.node().stop();
                Some(ExitReason::Shutdown)
            }
            ApplicationStartType::Transient if !reason.is_clean() => {
                stop_children(from, children, &ExitReason::Normal, stop_timeout).await;
                warn!(app, %child, %reason, "Transient child failed; stopping node");
                ctx.node().stop();
                Some(reason)
            }
            ApplicationStartType::Transient | ApplicationStartType::Temporary => {
                info!(app, %child, %reason, start_type = %self.start_type, "Child terminated");
                None
            }
        }
    }

    fn handle_direct(&self, children: &ChildTable, direct: DirectEnvelope) {
        let reply = match direct.request {
            DirectRequest::GetChildren => Ok(DirectReply::Children(children.live_pids())),
            DirectRequest::Custom(ref id) => {
                debug!(app = %self.spec.name, request = %id, "Unsupported direct request");
                Err(FrameworkError::UnsupportedRequest)
            }
        };
        let _ = direct.respond_to.send(reply);
    }
}

#[async_trait]
impl ProcessBehavior for ApplicationController {
    async fn run(&self, ctx: &mut ProcessContext, args: Vec<Term>) -> ExitReason {
        let app = self.spec.name.as_str();
        let pid = ctx.pid();
        let config = ctx.node().config().clone();

        ctx.set_trap_exit(true);
        for (key, value) in &self.spec.environment {
            ctx.set_env(key.clone(), value.clone());
        }

        let mut children = ChildTable::new(&self.spec.children);
        if !start_children(ctx, &self.spec.children, &mut children).await {
            stop_children(pid, &mut children, &ExitReason::Failed, config.stop_timeout).await;
            return ExitReason::Failed;
        }

        ctx.set_current_function("Application:start");
        self.behavior.start(ctx.process(), args).await;
        ctx.ready();
        ctx.set_current_function("Application:loop");
        info!(app, %pid, start_type = %self.start_type, children = children.len(), "Application started");

        let lifespan = if self.spec.lifespan.is_zero() {
            config.default_lifespan
        } else {
            self.spec.lifespan
        };
        let timer = tokio::time::sleep(lifespan);
        tokio::pin!(timer);
        let mut timer_armed = true;

        let mut pending: VecDeque<GracefulExit> = VecDeque::new();
        let mut stop_attempts = 0u32;

        loop {
            // Cancellation wins over queued exits.
            let event = if ctx.cancellation().is_cancelled() {
                ControlEvent::Process(ProcessEvent::Cancelled)
            } else if let Some(exit) = pending.pop_front() {
                ControlEvent::Process(ProcessEvent::GracefulExit(exit))
            } else {
                tokio::select! {
                    event = ctx.next_event() => ControlEvent::Process(event),
                    _ = &mut timer, if timer_armed => ControlEvent::LifespanExpired,
                }
            };

            match event {
                ControlEvent::LifespanExpired => {
                    timer_armed = false;
                    info!(app, ?lifespan, "Lifespan expired");
                    pending.push_back(GracefulExit {
                        from: pid,
                        reason: ExitReason::Normal,
                    });
                }
                ControlEvent::Process(ProcessEvent::Cancelled) => {
                    debug!(app, "Controller cancelled");
                    return ExitReason::Kill;
                }
                ControlEvent::Process(ProcessEvent::GracefulExit(exit)) => {
                    if stop_children(exit.from, &mut children, &exit.reason, config.stop_timeout).await {
                        info!(app, reason = %exit.reason, "Application stopped");
                        return exit.reason;
                    }
                    stop_attempts += 1;
                    let policy = &config.shutdown_retry;
                    if stop_attempts >= policy.max_attempts {
                        warn!(app, attempts = stop_attempts, "Children still running; killing them");
                        stop_children(exit.from, &mut children, &ExitReason::Kill, config.stop_timeout).await;
                        return exit.reason;
                    }
                    let backoff = policy.backoff(stop_attempts);
                    warn!(app, attempt = stop_attempts, ?backoff, "Stop incomplete; retrying");
                    tokio::select! {
                        _ = ctx.cancellation().cancelled() => {
                            debug!(app, "Controller cancelled during stop retry");
                            return ExitReason::Kill;
                        }
                        _ = tokio::time::sleep(backoff) => pending.push_front(exit),
                    }
                }
                ControlEvent::Process(ProcessEvent::Direct(direct)) => {
                    self.handle_direct(&children, direct);
                }
                ControlEvent::Process(ProcessEvent::Mailbox(Message::Exit { from, reason })) => {
                    if let Some(index) = children.find(from) {
                        if let Some(outcome) = self
                            .handle_child_exit(ctx, &mut children, index, from, reason)
                            .await
                        {
                            return outcome;
                        }
                    } else if children.is_retired(from) {
                        debug!(app, %from, %reason, "Exit of a stopped child");
                    } else {
                        info!(app, %from, %reason, "Exit request; stopping application");
                        pending.push_back(GracefulExit { from, reason });
                    }
                }
                ControlEvent::Process(ProcessEvent::Mailbox(message)) => {
                    debug!(app, ?message, "Ignoring message");
                }
            }
        }
    }
}

/// Pids of an application's live children.
#[instrument(skip(controller), fields(app = %controller.name()))]
pub async fn get_children(controller: &Process) -> Result<Vec<Pid>, FrameworkError> {
    match controller.direct(DirectRequest::GetChildren).await? {
        DirectReply::Children(pids) => Ok(pids),
    }
}
