//! # Saga Transactions
//!
//! A transaction is identified by a [`Ref`] and carries the chain of processes
//! it has passed through. The chain drives loop detection and the hop limit.

use crate::framework::{Pid, Ref, Term};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-transaction options, fixed by the originator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenSagaTransactionOptions {
    /// Defaults to a random hex id when empty.
    pub name: String,
    /// Keep the transaction when it comes back to a process already in the chain.
    pub ignore_loop: bool,
    /// Maximum chain length. Zero means no limit.
    pub hop_limit: usize,
    /// Per-hop deadline. Zero means none.
    pub timeout: Duration,
}

/// Coordinator-wide limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenSagaOptions {
    /// Zero means unlimited.
    pub max_transactions: usize,
}

/// One hop's view of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenSagaTransaction {
    pub tx_ref: Ref,
    pub name: String,
    /// The process holding this hop.
    pub pid: Pid,
    /// Every process the transaction came through, originator first.
    pub parents: Vec<Pid>,
    pub options: GenSagaTransactionOptions,
}

impl GenSagaTransaction {
    pub(crate) fn originate(tx_ref: Ref, pid: Pid, mut options: GenSagaTransactionOptions) -> Self {
        if options.name.is_empty() {
            options.name = random_name();
        }
        Self {
            tx_ref,
            name: options.name.clone(),
            pid,
            parents: Vec::new(),
            options,
        }
    }

    /// Whether the holding process started this transaction.
    pub fn is_originator(&self) -> bool {
        self.parents.first().map_or(true, |first| *first == self.pid)
    }

    /// The process this hop reports to, if any.
    pub fn upstream(&self) -> Option<Pid> {
        self.parents.last().copied()
    }

    /// Whether another hop would exceed the hop limit.
    pub fn hop_limit_reached(&self) -> bool {
        self.options.hop_limit > 0 && self.parents.len() >= self.options.hop_limit
    }

    /// The copy sent to the next hop.
    pub(crate) fn forward(&self, from: Pid, to: Pid) -> Self {
        let mut next = self.clone();
        next.parents.push(from);
        next.pid = to;
        next
    }
}

/// Traffic between saga participants.
#[derive(Debug, Clone, PartialEq)]
pub enum SagaMessage {
    Next {
        tx: GenSagaTransaction,
        arg: Term,
    },
    Interim {
        tx_ref: Ref,
        from: Pid,
        interim: Term,
    },
    Done {
        tx_ref: Ref,
        from: Pid,
        result: Term,
    },
    Cancel {
        tx_ref: Ref,
        from: Pid,
        reason: String,
    },
    /// Sent by a process to itself when a transaction's deadline passes.
    Timeout { tx_ref: Ref },
}

fn random_name() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
