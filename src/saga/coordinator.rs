//! # Saga Coordinator
//!
//! [`GenSaga`] runs a [`GenSagaBehavior`] on top of the generic server. It keeps
//! the transactions this process takes part in and turns [`SagaMessage`]
//! traffic into hook calls.
//!
//! Operations called from inside a hook ([`GenSagaState::start_transaction`],
//! [`GenSagaState::cancel`], ...) never call hooks themselves. Local outcomes are
//! queued and dispatched once the current hook returns, so a hook never
//! re-enters the behavior.

use crate::framework::{
    CallResult, ExitReason, GenServer, GenServerProcess, Message, Node, Pid, Process,
    ProcessBehavior, Ref, ServerStatus, Term,
};
use crate::saga::{
    GenSagaBehavior, GenSagaOptions, GenSagaTransaction, GenSagaTransactionOptions, SagaError,
    SagaMessage,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const LOOP: &str = "loop";
const HOP_LIMIT: &str = "hop limit";
const MAX_TRANSACTIONS: &str = "max transactions";
const TIMEOUT: &str = "timeout";

struct TxEntry {
    tx: GenSagaTransaction,
    /// Where this hop reports to, fixed when the entry is created. `None` at the
    /// originator, even after an ignored loop brings the transaction back.
    upstream: Option<Pid>,
    /// Processes this hop forwarded the transaction to.
    downstream: Vec<Pid>,
    timer: Option<JoinHandle<()>>,
}

impl TxEntry {
    fn is_originator(&self) -> bool {
        self.upstream.is_none()
    }

    fn neighbours(&self) -> Vec<Pid> {
        let mut pids: Vec<Pid> = self.upstream.into_iter().collect();
        for pid in &self.downstream {
            if !pids.contains(pid) {
                pids.push(*pid);
            }
        }
        pids
    }
}

/// Outcomes produced by local operations, dispatched after the current hook.
enum LocalEvent {
    Next { tx: GenSagaTransaction, arg: Term },
    Interim { tx: GenSagaTransaction, interim: Term },
    Done { tx: GenSagaTransaction, result: Term },
    Canceled { tx: GenSagaTransaction, reason: String },
}

/// Coordinator state handed to every saga hook.
pub struct GenSagaState<S> {
    process: Process,
    node: Node,
    options: GenSagaOptions,
    txs: HashMap<Ref, TxEntry>,
    events: VecDeque<LocalEvent>,
    /// User state built by `init_saga`.
    pub state: S,
}

impl<S> GenSagaState<S> {
    fn new(process: Process, node: Node, options: GenSagaOptions, state: S) -> Self {
        Self {
            process,
            node,
            options,
            txs: HashMap::new(),
            events: VecDeque::new(),
            state,
        }
    }

    pub fn process(&self) -> &Process {
        &self.process
    }

    pub fn pid(&self) -> Pid {
        self.process.pid()
    }

    pub fn options(&self) -> GenSagaOptions {
        self.options
    }

    pub fn transaction(&self, tx_ref: Ref) -> Option<&GenSagaTransaction> {
        self.txs.get(&tx_ref).map(|entry| &entry.tx)
    }

    /// Number of transactions this process currently takes part in.
    pub fn transactions(&self) -> usize {
        self.txs.len()
    }

    /// Starts a transaction originated by this process and dispatches
    /// `handle_next` for it locally.
    pub fn start_transaction(
        &mut self,
        options: GenSagaTransactionOptions,
        arg: Term,
    ) -> Result<Ref, SagaError> {
        if self.at_capacity() {
            return Err(SagaError::MaxTransactions(self.options.max_transactions));
        }
        let tx = GenSagaTransaction::originate(self.node.make_ref(), self.pid(), options);
        let tx_ref = tx.tx_ref;
        info!(tx = %tx_ref, name = %tx.name, "Transaction started");
        self.track(tx.clone());
        self.events.push_back(LocalEvent::Next { tx, arg });
        Ok(tx_ref)
    }

    /// Forwards the transaction to `to`.
    ///
    /// When the hop limit is reached the transaction is canceled instead and
    /// [`SagaError::HopLimitExceeded`] is returned.
    pub fn next(&mut self, tx_ref: Ref, to: Pid, arg: Term) -> Result<(), SagaError> {
        let entry = self
            .txs
            .get(&tx_ref)
            .ok_or(SagaError::UnknownTransaction(tx_ref))?;
        if entry.tx.hop_limit_reached() {
            warn!(tx = %tx_ref, hops = entry.tx.parents.len(), "Hop limit reached");
            self.cancel(tx_ref, HOP_LIMIT)?;
            return Err(SagaError::HopLimitExceeded);
        }
        let outgoing = entry.tx.forward(self.pid(), to);
        self.send(to, SagaMessage::Next { tx: outgoing, arg })?;
        if let Some(entry) = self.txs.get_mut(&tx_ref) {
            if !entry.downstream.contains(&to) {
                entry.downstream.push(to);
            }
        }
        debug!(tx = %tx_ref, %to, "Forwarded");
        Ok(())
    }

    /// Reports an intermediate result upstream. At the originator it is
    /// delivered to `handle_interim` locally.
    pub fn interim(&mut self, tx_ref: Ref, interim: Term) -> Result<(), SagaError> {
        let entry = self
            .txs
            .get(&tx_ref)
            .ok_or(SagaError::UnknownTransaction(tx_ref))?;
        match entry.upstream {
            Some(upstream) => self.send(
                upstream,
                SagaMessage::Interim {
                    tx_ref,
                    from: self.pid(),
                    interim,
                },
            ),
            None => {
                let tx = entry.tx.clone();
                self.events.push_back(LocalEvent::Interim { tx, interim });
                Ok(())
            }
        }
    }

    /// Completes this hop: the result goes upstream and the entry is dropped.
    /// At the originator it is delivered to `handle_done` locally.
    pub fn done(&mut self, tx_ref: Ref, result: Term) -> Result<(), SagaError> {
        let entry = self
            .untrack(tx_ref)
            .ok_or(SagaError::UnknownTransaction(tx_ref))?;
        match entry.upstream {
            Some(upstream) => self.send(
                upstream,
                SagaMessage::Done {
                    tx_ref,
                    from: self.pid(),
                    result,
                },
            ),
            None => {
                self.events.push_back(LocalEvent::Done {
                    tx: entry.tx,
                    result,
                });
                Ok(())
            }
        }
    }

    /// Cancels the transaction here and on every neighbouring hop.
    pub fn cancel(&mut self, tx_ref: Ref, reason: &str) -> Result<(), SagaError> {
        let entry = self
            .untrack(tx_ref)
            .ok_or(SagaError::UnknownTransaction(tx_ref))?;
        info!(tx = %tx_ref, %reason, "Transaction canceled");
        self.propagate_cancel(&entry, None, reason);
        self.events.push_back(LocalEvent::Canceled {
            tx: entry.tx,
            reason: reason.to_string(),
        });
        Ok(())
    }

    fn at_capacity(&self) -> bool {
        self.options.max_transactions > 0 && self.txs.len() >= self.options.max_transactions
    }

    fn track(&mut self, tx: GenSagaTransaction) {
        let timer = (!tx.options.timeout.is_zero()).then(|| {
            let process = self.process.clone();
            let tx_ref = tx.tx_ref;
            let timeout = tx.options.timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = process.send(Message::Saga(SagaMessage::Timeout { tx_ref }));
            })
        });
        self.txs.insert(
            tx.tx_ref,
            TxEntry {
                upstream: tx.upstream(),
                tx,
                downstream: Vec::new(),
                timer,
            },
        );
    }

    fn untrack(&mut self, tx_ref: Ref) -> Option<TxEntry> {
        let entry = self.txs.remove(&tx_ref)?;
        if let Some(timer) = &entry.timer {
            timer.abort();
        }
        Some(entry)
    }

    fn send(&self, to: Pid, message: SagaMessage) -> Result<(), SagaError> {
        self.node.send(to, Message::Saga(message))?;
        Ok(())
    }

    fn propagate_cancel(&self, entry: &TxEntry, except: Option<Pid>, reason: &str) {
        for pid in entry.neighbours() {
            if Some(pid) == except || pid == self.pid() {
                continue;
            }
            let cancel = SagaMessage::Cancel {
                tx_ref: entry.tx.tx_ref,
                from: self.pid(),
                reason: reason.to_string(),
            };
            if let Err(e) = self.send(pid, cancel) {
                debug!(tx = %entry.tx.tx_ref, to = %pid, error = %e, "Cancel not delivered");
            }
        }
    }
}

/// Runs a [`GenSagaBehavior`] as a generic server.
pub struct GenSaga<B: GenSagaBehavior> {
    behavior: B,
    options: GenSagaOptions,
}

impl<B: GenSagaBehavior> GenSaga<B> {
    pub fn new(behavior: B) -> Self {
        Self::with_options(behavior, GenSagaOptions::default())
    }

    pub fn with_options(behavior: B, options: GenSagaOptions) -> Self {
        Self { behavior, options }
    }

    /// The process body to spawn.
    pub fn arc(self) -> Arc<dyn ProcessBehavior> {
        GenServerProcess::arc(self)
    }

    async fn receive(&self, saga: &mut GenSagaState<B::State>, message: SagaMessage) {
        match message {
            SagaMessage::Next { tx, arg } => self.receive_next(saga, tx, arg).await,
            SagaMessage::Interim {
                tx_ref,
                from,
                interim,
            } => {
                let Some(tx) = saga.transaction(tx_ref).cloned() else {
                    debug!(tx = %tx_ref, %from, "Interim for unknown transaction");
                    return;
                };
                let result = self.behavior.handle_interim(saga, &tx, interim).await;
                cancel_on_error(saga, &tx, result);
            }
            SagaMessage::Done {
                tx_ref,
                from,
                result,
            } => {
                let Some(tx) = saga.transaction(tx_ref).cloned() else {
                    debug!(tx = %tx_ref, %from, "Done for unknown transaction");
                    return;
                };
                debug!(tx = %tx_ref, %from, "Done");
                let outcome = self.behavior.handle_done(saga, &tx, result).await;
                log_error(&tx, "handle_done", outcome);
                saga.untrack(tx_ref);
            }
            SagaMessage::Cancel {
                tx_ref,
                from,
                reason,
            } => {
                let Some(entry) = saga.untrack(tx_ref) else {
                    debug!(tx = %tx_ref, %from, "Cancel for unknown transaction");
                    return;
                };
                info!(tx = %tx_ref, %from, %reason, "Transaction canceled by peer");
                saga.propagate_cancel(&entry, Some(from), &reason);
                let outcome = if entry.is_originator() {
                    self.behavior.handle_cancel(saga, &entry.tx, &reason).await
                } else {
                    self.behavior.handle_canceled(saga, &entry.tx, &reason).await
                };
                log_error(&entry.tx, "cancel", outcome);
            }
            SagaMessage::Timeout { tx_ref } => {
                let Some(entry) = saga.untrack(tx_ref) else {
                    return;
                };
                let timeout = entry.tx.options.timeout;
                warn!(tx = %tx_ref, ?timeout, "Transaction timed out");
                saga.propagate_cancel(&entry, None, TIMEOUT);
                let outcome = self.behavior.handle_timeout(saga, &entry.tx, timeout).await;
                log_error(&entry.tx, "handle_timeout", outcome);
            }
        }
    }

    async fn receive_next(&self, saga: &mut GenSagaState<B::State>, tx: GenSagaTransaction, arg: Term) {
        let pid = saga.pid();
        let tx_ref = tx.tx_ref;
        let Some(sender) = tx.upstream() else {
            warn!(tx = %tx_ref, "Next without a sender");
            return;
        };

        if tx.parents.contains(&pid) && !tx.options.ignore_loop {
            warn!(tx = %tx_ref, %sender, "Loop detected");
            reject(saga, tx_ref, sender, LOOP);
            if let Some(entry) = saga.untrack(tx_ref) {
                saga.propagate_cancel(&entry, Some(sender), LOOP);
                saga.events.push_back(LocalEvent::Canceled {
                    tx: entry.tx,
                    reason: LOOP.to_string(),
                });
            }
            return;
        }

        if let Some(entry) = saga.txs.get_mut(&tx_ref) {
            // Re-entry through an ignored loop keeps the entry and its timer but
            // follows the longer chain, so the hop limit still applies.
            entry.tx.parents.clone_from(&tx.parents);
        } else if saga.at_capacity() {
            warn!(tx = %tx_ref, %sender, limit = saga.options.max_transactions, "Transaction limit reached");
            reject(saga, tx_ref, sender, MAX_TRANSACTIONS);
            return;
        } else {
            saga.track(tx.clone());
        }

        let result = self.behavior.handle_next(saga, &tx, arg).await;
        cancel_on_error(saga, &tx, result);
    }

    /// Dispatches queued local outcomes until none are left.
    async fn drain(&self, saga: &mut GenSagaState<B::State>) {
        while let Some(event) = saga.events.pop_front() {
            match event {
                LocalEvent::Next { tx, arg } => {
                    let result = self.behavior.handle_next(saga, &tx, arg).await;
                    cancel_on_error(saga, &tx, result);
                }
                LocalEvent::Interim { tx, interim } => {
                    let result = self.behavior.handle_interim(saga, &tx, interim).await;
                    cancel_on_error(saga, &tx, result);
                }
                LocalEvent::Done { tx, result } => {
                    let outcome = self.behavior.handle_done(saga, &tx, result).await;
                    log_error(&tx, "handle_done", outcome);
                }
                LocalEvent::Canceled { tx, reason } => {
                    let outcome = self.behavior.handle_canceled(saga, &tx, &reason).await;
                    log_error(&tx, "handle_canceled", outcome);
                }
            }
        }
    }
}

fn reject<S>(saga: &GenSagaState<S>, tx_ref: Ref, to: Pid, reason: &str) {
    let cancel = SagaMessage::Cancel {
        tx_ref,
        from: saga.pid(),
        reason: reason.to_string(),
    };
    if let Err(e) = saga.send(to, cancel) {
        debug!(tx = %tx_ref, %to, error = %e, "Rejection not delivered");
    }
}

fn cancel_on_error<S>(saga: &mut GenSagaState<S>, tx: &GenSagaTransaction, result: Result<(), SagaError>) {
    let Err(e) = result else {
        return;
    };
    if saga.txs.contains_key(&tx.tx_ref) {
        warn!(tx = %tx.tx_ref, error = %e, "Hook failed; canceling transaction");
        let _ = saga.cancel(tx.tx_ref, &e.to_string());
    } else {
        debug!(tx = %tx.tx_ref, error = %e, "Hook failed on a finished transaction");
    }
}

fn log_error(tx: &GenSagaTransaction, hook: &str, result: Result<(), SagaError>) {
    if let Err(e) = result {
        warn!(tx = %tx.tx_ref, hook, error = %e, "Hook failed");
    }
}

#[async_trait]
impl<B: GenSagaBehavior> GenServer for GenSaga<B> {
    type State = GenSagaState<B::State>;

    async fn init(&self, process: &Process, args: Vec<Term>) -> Result<Self::State, String> {
        let node = process.node().map_err(|e| e.to_string())?;
        let state = self
            .behavior
            .init_saga(process, args)
            .await
            .map_err(|e| e.to_string())?;
        Ok(GenSagaState::new(process.clone(), node, self.options, state))
    }

    async fn handle_call(
        &self,
        _process: &Process,
        saga: &mut Self::State,
        from: Pid,
        request: Term,
    ) -> CallResult {
        let reply = self.behavior.handle_saga_call(saga, from, request).await;
        self.drain(saga).await;
        reply
    }

    async fn handle_cast(&self, _process: &Process, saga: &mut Self::State, request: Term) -> ServerStatus {
        let status = self.behavior.handle_saga_cast(saga, request).await;
        self.drain(saga).await;
        status
    }

    async fn handle_info(&self, _process: &Process, saga: &mut Self::State, message: Message) -> ServerStatus {
        let status = match message {
            Message::Saga(message) => {
                self.receive(saga, message).await;
                ServerStatus::Continue
            }
            other => self.behavior.handle_saga_info(saga, other).await,
        };
        self.drain(saga).await;
        status
    }

    async fn terminate(&self, process: &Process, saga: &mut Self::State, reason: &ExitReason) {
        let open: Vec<Ref> = saga.txs.keys().copied().collect();
        for tx_ref in &open {
            if let Some(entry) = saga.untrack(*tx_ref) {
                saga.propagate_cancel(&entry, None, reason.as_str());
            }
        }
        debug!(pid = %process.pid(), %reason, open = open.len(), "Saga terminated");
    }
}
