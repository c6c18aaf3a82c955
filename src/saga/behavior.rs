//! # Saga Behavior
//!
//! Callbacks a saga participant implements. The transaction hooks
//! (`handle_cancel`, `handle_canceled`, `handle_done`, `handle_timeout`) are
//! mandatory; the rest have logging defaults.

use crate::framework::{CallResult, Message, Pid, Process, ServerStatus, Term};
use crate::saga::{GenSagaState, GenSagaTransaction, SagaError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

#[async_trait]
pub trait GenSagaBehavior: Send + Sync + 'static {
    type State: Send + 'static;

    /// Builds the user state. An error aborts the spawn.
    async fn init_saga(&self, process: &Process, args: Vec<Term>) -> Result<Self::State, SagaError>;

    /// A transaction this process originated is being canceled by another hop.
    async fn handle_cancel(
        &self,
        saga: &mut GenSagaState<Self::State>,
        tx: &GenSagaTransaction,
        reason: &str,
    ) -> Result<(), SagaError>;

    /// The transaction was canceled and this hop must clean up.
    async fn handle_canceled(
        &self,
        saga: &mut GenSagaState<Self::State>,
        tx: &GenSagaTransaction,
        reason: &str,
    ) -> Result<(), SagaError>;

    /// A downstream hop finished with `result`.
    async fn handle_done(
        &self,
        saga: &mut GenSagaState<Self::State>,
        tx: &GenSagaTransaction,
        result: Term,
    ) -> Result<(), SagaError>;

    async fn handle_timeout(
        &self,
        saga: &mut GenSagaState<Self::State>,
        tx: &GenSagaTransaction,
        timeout: Duration,
    ) -> Result<(), SagaError>;

    /// This hop now holds the transaction. An error cancels it.
    async fn handle_next(
        &self,
        _saga: &mut GenSagaState<Self::State>,
        tx: &GenSagaTransaction,
        arg: Term,
    ) -> Result<(), SagaError> {
        warn!(tx = %tx.tx_ref, name = %tx.name, ?arg, "handle_next: unhandled transaction");
        Ok(())
    }

    /// A downstream hop reported an intermediate result. An error cancels the
    /// transaction.
    async fn handle_interim(
        &self,
        _saga: &mut GenSagaState<Self::State>,
        tx: &GenSagaTransaction,
        interim: Term,
    ) -> Result<(), SagaError> {
        warn!(tx = %tx.tx_ref, name = %tx.name, ?interim, "handle_interim: unhandled message");
        Ok(())
    }

    async fn handle_saga_call(
        &self,
        _saga: &mut GenSagaState<Self::State>,
        from: Pid,
        request: Term,
    ) -> CallResult {
        warn!(%from, ?request, "handle_saga_call: unhandled message");
        CallResult::Reply(Term::from("ok"))
    }

    async fn handle_saga_cast(&self, _saga: &mut GenSagaState<Self::State>, request: Term) -> ServerStatus {
        warn!(?request, "handle_saga_cast: unhandled message");
        ServerStatus::Continue
    }

    async fn handle_saga_info(&self, _saga: &mut GenSagaState<Self::State>, message: Message) -> ServerStatus {
        warn!(?message, "handle_saga_info: unhandled message");
        ServerStatus::Continue
    }
}
