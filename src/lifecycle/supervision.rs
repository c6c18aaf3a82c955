//! # Child Supervision
//!
//! Starting and stopping an application's children. The realized handles live in
//! a [`ChildTable`] owned by the controller loop, separate from the immutable
//! [`ApplicationSpec`](super::ApplicationSpec), so only the loop ever mutates them.

use crate::framework::{ExitReason, Pid, Process, ProcessContext};
use crate::lifecycle::ApplicationChildSpec;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Runtime slot for one declared child.
#[derive(Debug, Clone)]
pub struct ChildSlot {
    pub name: String,
    /// `None` until started, and again once the child is known to be gone.
    pub process: Option<Process>,
}

/// Realized children of one application, in declaration order.
#[derive(Debug, Default)]
pub struct ChildTable {
    slots: Vec<ChildSlot>,
    index: HashMap<String, usize>,
    /// Pids of former children whose exit has already been accounted for.
    retired: HashSet<Pid>,
}

impl ChildTable {
    pub fn new(children: &[ApplicationChildSpec]) -> Self {
        let slots: Vec<ChildSlot> = children
            .iter()
            .map(|child| ChildSlot {
                name: child.name.clone(),
                process: None,
            })
            .collect();
        let index = slots
            .iter()
            .enumerate()
            .map(|(i, slot)| (slot.name.clone(), i))
            .collect();
        Self {
            slots,
            index,
            retired: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[ChildSlot] {
        &self.slots
    }

    pub fn get(&self, name: &str) -> Option<&Process> {
        self.index
            .get(name)
            .and_then(|&i| self.slots[i].process.as_ref())
    }

    /// Slot index of the child currently running as `pid`.
    pub fn find(&self, pid: Pid) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.process.as_ref().map(Process::pid) == Some(pid))
    }

    pub fn is_retired(&self, pid: Pid) -> bool {
        self.retired.contains(&pid)
    }

    /// Marks the child in slot `index` as terminated.
    pub fn retire(&mut self, index: usize) -> Option<Process> {
        let process = self.slots.get_mut(index)?.process.take()?;
        self.retired.insert(process.pid());
        Some(process)
    }

    /// Pids of started children that are still alive, in declaration order.
    pub fn live_pids(&self) -> Vec<Pid> {
        self.slots
            .iter()
            .filter_map(|slot| slot.process.as_ref())
            .filter(|process| process.is_alive())
            .map(Process::pid)
            .collect()
    }

    /// Records the realized process for slot `index`.
    pub fn set(&mut self, index: usize, process: Process) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.process = Some(process);
        }
    }
}

/// Spawns every child linked to the controller, in declaration order.
///
/// Returns `false` at the first failure; children started before it stay in the
/// table so the caller can stop them.
pub async fn start_children(
    ctx: &ProcessContext,
    children: &[ApplicationChildSpec],
    table: &mut ChildTable,
) -> bool {
    for (index, child) in children.iter().enumerate() {
        match ctx
            .spawn_link(child.name.clone(), child.child.clone(), child.args.clone())
            .await
        {
            Ok(process) => {
                debug!(app = %ctx.process().name(), child = %child.name, pid = %process.pid(), "Child started");
                table.set(index, process);
            }
            Err(e) => {
                error!(app = %ctx.process().name(), child = %child.name, error = %e, "Child start failed");
                return false;
            }
        }
    }
    true
}

/// Asks every live child except `from` to exit with `reason`, last started
/// first, and waits up to `timeout` for each.
///
/// Children that confirm are cleared from the table. Returns `true` when none
/// is left running.
pub async fn stop_children(
    from: Pid,
    table: &mut ChildTable,
    reason: &ExitReason,
    timeout: Duration,
) -> bool {
    let mut complete = true;
    for index in (0..table.slots.len()).rev() {
        let Some(process) = table.slots[index].process.clone() else {
            continue;
        };
        if process.pid() == from {
            continue;
        }
        if !process.is_alive() {
            table.retire(index);
            continue;
        }
        let name = &table.slots[index].name;
        if let Err(e) = process.exit(from, reason.clone()) {
            debug!(child = %name, error = %e, "Exit request not delivered");
        }
        match process.wait_with_timeout(timeout).await {
            Ok(exit) => {
                info!(child = %name, pid = %process.pid(), reason = %exit, "Child stopped");
                table.retire(index);
            }
            Err(_) => {
                warn!(child = %name, pid = %process.pid(), ?timeout, "Child did not stop in time");
                complete = false;
            }
        }
    }
    complete
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::mock::MockChild;
    use crate::framework::{Node, ProcessBehavior, Term};
    use crate::runtime::Config;
    use async_trait::async_trait;
    use std::sync::Arc;

    fn spec(name: &str, child: MockChild) -> ApplicationChildSpec {
        ApplicationChildSpec::new(name, Arc::new(child), vec![])
    }

    #[test]
    fn test_table_indexes_by_name_and_pid() {
        let table = ChildTable::new(&[
            spec("a", MockChild::ready()),
            spec("b", MockChild::ready()),
        ]);
        assert_eq!(table.len(), 2);
        assert!(table.get("a").is_none());
        assert!(table.find(Pid(1)).is_none());
        assert!(table.live_pids().is_empty());
    }

    /// Runs `start_children` inside a throwaway process and reports the outcome.
    struct Starter {
        children: Vec<ApplicationChildSpec>,
        outcome: tokio::sync::mpsc::UnboundedSender<(bool, Vec<Pid>)>,
    }

    #[async_trait]
    impl ProcessBehavior for Starter {
        async fn run(&self, ctx: &mut ProcessContext, _args: Vec<Term>) -> ExitReason {
            ctx.set_trap_exit(true);
            let mut table = ChildTable::new(&self.children);
            let started = start_children(ctx, &self.children, &mut table).await;
            let pids = table
                .slots()
                .iter()
                .filter_map(|slot| slot.process.as_ref().map(Process::pid))
                .collect();
            let _ = self.outcome.send((started, pids));
            stop_children(ctx.pid(), &mut table, &ExitReason::Shutdown, Duration::from_secs(1)).await;
            ctx.ready();
            ExitReason::Normal
        }
    }

    #[tokio::test]
    async fn test_start_aborts_on_first_failure() {
        let node = Node::new("test", Config::default());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let starter = Starter {
            children: vec![
                spec("first", MockChild::ready()),
                spec("broken", MockChild::fail_init()),
                spec("never", MockChild::ready()),
            ],
            outcome: tx,
        };
        let _ = node.spawn("starter", Arc::new(starter), vec![]).await;
        let (started, pids) = rx.recv().await.unwrap();
        assert!(!started);
        assert_eq!(pids.len(), 1);
        assert!(node.whereis("never").is_none());
    }

    #[tokio::test]
    async fn test_stop_children_skips_sender_and_clears_slots() {
        let node = Node::new("test", Config::default());
        let children = vec![spec("a", MockChild::ready()), spec("b", MockChild::ready())];
        let mut table = ChildTable::new(&children);
        for (i, child) in children.iter().enumerate() {
            let process = node
                .spawn(child.name.clone(), child.child.clone(), vec![])
                .await
                .unwrap();
            table.set(i, process);
        }
        let b = table.get("b").unwrap().clone();

        let complete = stop_children(b.pid(), &mut table, &ExitReason::Shutdown, Duration::from_secs(1)).await;
        assert!(complete);
        assert!(table.get("a").is_none());
        assert!(b.is_alive());
        assert_eq!(table.live_pids(), vec![b.pid()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_children_reports_stubborn_child() {
        let node = Node::new("test", Config::default());
        let children = vec![spec("stubborn", MockChild::stubborn())];
        let mut table = ChildTable::new(&children);
        let process = node
            .spawn("stubborn", children[0].child.clone(), vec![])
            .await
            .unwrap();
        table.set(0, process.clone());

        let complete = stop_children(Pid(0), &mut table, &ExitReason::Shutdown, Duration::from_secs(5)).await;
        assert!(!complete);
        assert!(process.is_alive());
        assert_eq!(table.live_pids(), vec![process.pid()]);

        let forced = stop_children(Pid(0), &mut table, &ExitReason::Kill, Duration::from_secs(5)).await;
        assert!(forced);
        assert_eq!(process.wait().await, ExitReason::Kill);
    }
}
