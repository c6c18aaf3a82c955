//! Applications and their supervision.
//!
//! # Main Components
//!
//! - [`ApplicationSpec`] / [`ApplicationBehavior`] - What an application is and how it is loaded
//! - [`ApplicationController`] - Process that starts, watches and stops the children
//! - [`ChildTable`] with [`start_children`] / [`stop_children`] - The supervision engine
//! - [`Applications`] - Load, start and stop applications on a node

pub mod application;
pub mod controller;
pub mod error;
pub mod registry;
pub mod supervision;

pub use application::{
    ApplicationBehavior, ApplicationChildSpec, ApplicationInfo, ApplicationSpec,
    ApplicationStartType,
};
pub use controller::{get_children, ApplicationController};
pub use error::ApplicationError;
pub use registry::Applications;
pub use supervision::{start_children, stop_children, ChildSlot, ChildTable};
