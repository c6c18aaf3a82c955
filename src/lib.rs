#![doc(html_logo_url = "https://www.rust-lang.org/logos/rust-logo-128x128.png")]
#![doc(html_favicon_url = "https://www.rust-lang.org/favicon.ico")]
//! # Actor Supervisor
//!
//! > **Supervised process trees and saga transactions on Tokio.**
//!
//! This crate runs groups of actor processes as *applications*: a controller
//! process starts the children in order, links to them, traps their exits and
//! applies a start type (`permanent`, `transient`, `temporary`) when one of them
//! terminates. On top of the same processes, a saga coordinator carries
//! multi-hop transactions that can be canceled, time out, and detect loops.
//!
//! ## Core Concepts
//!
//! ### Processes
//! A process is a Tokio task with a mailbox, a direct request channel, a
//! graceful-exit channel and a cancellation token. Bodies implement
//! [`ProcessBehavior`](framework::ProcessBehavior) and receive one merged
//! [`ProcessEvent`](framework::ProcessEvent) at a time, so each body handles its
//! inputs sequentially and needs no locks for its own state.
//!
//! ### Links and trap-exit
//! Links are bidirectional. A terminating process notifies every linked one:
//! trapping processes get an [`Exit`](framework::Message::Exit) message, the
//! others are asked to exit unless the reason is `normal`.
//!
//! ### Supervision
//! The [`ApplicationController`](lifecycle::ApplicationController) turns child
//! exits into policy decisions. A permanent child's exit stops its siblings and
//! the node; a transient child only escalates on an abnormal reason; a temporary
//! child is just logged.
//!
//! ## Module Tour
//!
//! ### 1. The Primitive ([`framework`])
//! - **Role**: Nodes, processes, links, messages and the generic server.
//! - **Key items**: [`Node`](framework::Node), [`Process`](framework::Process),
//!   [`GenServer`](framework::GenServer).
//!
//! ### 2. Supervision ([`lifecycle`])
//! - **Role**: Application specs, the controller loop, the child start/stop engine and the
//!   application registry.
//! - **Key items**: [`ApplicationSpec`](lifecycle::ApplicationSpec),
//!   [`Applications`](lifecycle::Applications).
//!
//! ### 3. Transactions ([`saga`])
//! - **Role**: Saga participants, hop chains, cancellation and timeouts.
//! - **Key items**: [`GenSagaBehavior`](saga::GenSagaBehavior), [`GenSaga`](saga::GenSaga).
//!
//! ### 4. Runtime ([`runtime`])
//! - **Role**: Configuration and tracing setup.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the demo with info logs
//! RUST_LOG=info cargo run
//!
//! # Run the tests
//! cargo test
//! ```

pub mod framework;
pub mod lifecycle;
pub mod runtime;
pub mod saga;
