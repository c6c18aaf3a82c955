//! Multi-hop, cancelable transactions on top of the generic server.
//!
//! # Main Components
//!
//! - [`GenSagaBehavior`] - Hooks a participant implements
//! - [`GenSaga`] - Adapter that runs a behavior as a process
//! - [`GenSagaState`] - Per-process transaction table plus the user state
//! - [`SagaMessage`] - Traffic exchanged between participants

pub mod behavior;
pub mod coordinator;
pub mod error;
pub mod transaction;

pub use behavior::GenSagaBehavior;
pub use coordinator::{GenSaga, GenSagaState};
pub use error::SagaError;
pub use transaction::{GenSagaOptions, GenSagaTransaction, GenSagaTransactionOptions, SagaMessage};
