//! Runtime configuration and observability setup.
//!
//! # Main Components
//!
//! - [`Config`] - Node-wide deadlines, capacities and the shutdown retry policy
//! - [`setup_tracing`] - Initializes the tracing/logging infrastructure

pub mod config;
pub mod tracing;

pub use self::config::*;
pub use self::tracing::setup_tracing;
