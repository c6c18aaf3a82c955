//! # Node
//!
//! The node owns the process registry and is the only place processes are
//! spawned. Stopping the node cancels the context of every process on it.

use crate::framework::process::{lock, ProcessInner};
use crate::framework::{
    ExitReason, FrameworkError, Message, Pid, Process, ProcessBehavior, ProcessContext, Ref, Term,
};
use crate::runtime::Config;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub(crate) struct NodeInner {
    name: String,
    config: Config,
    next_id: AtomicU64,
    registry: Mutex<HashMap<Pid, Process>>,
    names: Mutex<HashMap<String, Pid>>,
    token: CancellationToken,
}

/// Handle to a node. Cheap to clone.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    pub fn new(name: impl Into<String>, config: Config) -> Self {
        let name = name.into();
        info!(node = %name, "Node started");
        Self {
            inner: Arc::new(NodeInner {
                name,
                config,
                next_id: AtomicU64::new(1),
                registry: Mutex::new(HashMap::new()),
                names: Mutex::new(HashMap::new()),
                token: CancellationToken::new(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<NodeInner>) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn is_alive(&self) -> bool {
        !self.inner.token.is_cancelled()
    }

    /// Cancels every process on the node. Idempotent.
    pub fn stop(&self) {
        if self.is_alive() {
            info!(node = %self.inner.name, "Node stopping");
        }
        self.inner.token.cancel();
    }

    /// Resolves once [`Node::stop`] has been called.
    pub async fn stopped(&self) {
        self.inner.token.cancelled().await
    }

    pub fn make_ref(&self) -> Ref {
        Ref(self.inner.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn process(&self, pid: Pid) -> Option<Process> {
        lock(&self.inner.registry).get(&pid).cloned()
    }

    pub fn whereis(&self, name: &str) -> Option<Process> {
        let pid = lock(&self.inner.names).get(name).copied()?;
        self.process(pid)
    }

    /// Like [`Node::whereis`], but a missing name is an error.
    pub fn lookup(&self, name: &str) -> Result<Process, FrameworkError> {
        self.whereis(name)
            .ok_or_else(|| FrameworkError::NotFound(name.to_string()))
    }

    /// Pids of every registered process, in spawn order.
    pub fn processes(&self) -> Vec<Pid> {
        let mut pids: Vec<Pid> = lock(&self.inner.registry).keys().copied().collect();
        pids.sort();
        pids
    }

    pub fn send(&self, to: Pid, message: Message) -> Result<(), FrameworkError> {
        self.process(to)
            .ok_or(FrameworkError::ProcessNotAlive(to))?
            .send(message)
    }

    /// Spawns an unlinked process. Resolves once the body has signalled readiness.
    pub async fn spawn(
        &self,
        name: impl Into<String>,
        behavior: Arc<dyn ProcessBehavior>,
        args: Vec<Term>,
    ) -> Result<Process, FrameworkError> {
        self.spawn_with(name.into(), behavior, args, None).await
    }

    pub(crate) async fn spawn_with(
        &self,
        name: String,
        behavior: Arc<dyn ProcessBehavior>,
        args: Vec<Term>,
        link: Option<&Process>,
    ) -> Result<Process, FrameworkError> {
        if !self.is_alive() {
            return Err(FrameworkError::NodeStopped);
        }

        let pid = Pid(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        let (direct_tx, direct_rx) = mpsc::channel(self.inner.config.direct_capacity);
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = watch::channel(None);
        let (ready_tx, ready_rx) = oneshot::channel();
        let token = self.inner.token.child_token();

        let process = Process {
            inner: Arc::new(ProcessInner {
                pid,
                name: name.clone(),
                node: Arc::downgrade(&self.inner),
                mailbox: mailbox_tx,
                direct: direct_tx,
                graceful_exit: exit_tx,
                token: token.clone(),
                done: done_rx,
                started: AtomicBool::new(false),
                trap_exit: AtomicBool::new(false),
                links: Mutex::new(HashSet::new()),
                current_function: Mutex::new("init"),
            }),
        };

        if !name.is_empty() {
            let mut names = lock(&self.inner.names);
            if names.contains_key(&name) {
                return Err(FrameworkError::NameTaken(name));
            }
            names.insert(name.clone(), pid);
        }
        lock(&self.inner.registry).insert(pid, process.clone());

        if let Some(parent) = link {
            lock(&parent.inner.links).insert(pid);
            lock(&process.inner.links).insert(parent.pid());
        }

        let ctx = ProcessContext {
            process: process.clone(),
            node: self.clone(),
            mailbox: mailbox_rx,
            direct: direct_rx,
            graceful_exit: exit_rx,
            token,
            ready: Some(ready_tx),
            env: HashMap::new(),
        };

        let node = self.clone();
        let terminated = process.clone();
        tokio::spawn(async move {
            let body = tokio::spawn(async move {
                let mut ctx = ctx;
                behavior.run(&mut ctx, args).await
            });
            let reason = match body.await {
                Ok(reason) => reason,
                Err(e) if e.is_panic() => ExitReason::Other("panic".to_string()),
                Err(_) => ExitReason::Kill,
            };
            node.terminate(&terminated, reason, done_tx);
        });

        debug!(%pid, name = %name, "Spawned");

        match ready_rx.await {
            Ok(()) => Ok(process),
            Err(_) => {
                let reason = process.wait().await;
                warn!(%pid, name = %name, %reason, "Process exited before becoming ready");
                Err(FrameworkError::StartFailed {
                    name,
                    reason: reason.to_string(),
                })
            }
        }
    }

    /// Final bookkeeping for a terminated process: deregister, publish the exit
    /// reason, and notify linked processes.
    fn terminate(
        &self,
        process: &Process,
        reason: ExitReason,
        done: watch::Sender<Option<ExitReason>>,
    ) {
        let pid = process.pid();
        lock(&self.inner.registry).remove(&pid);
        {
            let mut names = lock(&self.inner.names);
            if names.get(process.name()) == Some(&pid) {
                names.remove(process.name());
            }
        }
        let links = std::mem::take(&mut *lock(&process.inner.links));
        done.send_replace(Some(reason.clone()));
        debug!(%pid, name = %process.name(), %reason, "Terminated");

        // A process that never became ready is reported to its spawner as a
        // start failure instead.
        let started = process.inner.started.load(Ordering::SeqCst);

        for linked_pid in links {
            let Some(linked) = self.process(linked_pid) else {
                continue;
            };
            lock(&linked.inner.links).remove(&pid);
            if !started {
                continue;
            }
            let notified = if linked.trap_exit() {
                linked.send(Message::Exit {
                    from: pid,
                    reason: reason.clone(),
                })
            } else if reason != ExitReason::Normal {
                linked.exit(pid, reason.clone())
            } else {
                Ok(())
            };
            if let Err(e) = notified {
                debug!(%pid, linked = %linked_pid, error = %e, "Link notification dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::mock::MockChild;
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawn_and_exit() {
        let node = Node::new("test", Config::default());
        let child = node
            .spawn("child", Arc::new(MockChild::ready()), vec![])
            .await
            .unwrap();
        assert!(child.is_alive());
        assert_eq!(node.whereis("child").unwrap().pid(), child.pid());

        child.exit(Pid(0), ExitReason::Shutdown).unwrap();
        let reason = child.wait_with_timeout(Duration::from_secs(1)).await.unwrap();
        assert_eq!(reason, ExitReason::Shutdown);
        assert!(!child.is_alive());
        assert!(node.process(child.pid()).is_none());
        assert!(node.whereis("child").is_none());
        assert_eq!(
            node.lookup("child").unwrap_err(),
            FrameworkError::NotFound("child".into())
        );
    }

    #[tokio::test]
    async fn test_spawn_fails_when_body_never_ready() {
        let node = Node::new("test", Config::default());
        let result = node
            .spawn("broken", Arc::new(MockChild::fail_init()), vec![])
            .await;
        assert!(matches!(result, Err(FrameworkError::StartFailed { .. })));
        assert!(node.processes().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let node = Node::new("test", Config::default());
        let _first = node
            .spawn("dup", Arc::new(MockChild::ready()), vec![])
            .await
            .unwrap();
        let second = node.spawn("dup", Arc::new(MockChild::ready()), vec![]).await;
        assert_eq!(second.unwrap_err(), FrameworkError::NameTaken("dup".into()));
    }

    #[tokio::test]
    async fn test_node_stop_kills_processes() {
        let node = Node::new("test", Config::default());
        let child = node
            .spawn("child", Arc::new(MockChild::stubborn()), vec![])
            .await
            .unwrap();
        node.stop();
        let reason = child.wait_with_timeout(Duration::from_secs(1)).await.unwrap();
        assert_eq!(reason, ExitReason::Kill);
        assert!(matches!(
            node.spawn("late", Arc::new(MockChild::ready()), vec![]).await,
            Err(FrameworkError::NodeStopped)
        ));
    }

    #[tokio::test]
    async fn test_panicking_body_is_contained() {
        let node = Node::new("test", Config::default());
        let child = node
            .spawn("child", Arc::new(MockChild::panic_after(Duration::from_millis(10))), vec![])
            .await
            .unwrap();
        let reason = child.wait_with_timeout(Duration::from_secs(1)).await.unwrap();
        assert_eq!(reason, ExitReason::Other("panic".into()));
        assert!(node.is_alive());
    }
}
