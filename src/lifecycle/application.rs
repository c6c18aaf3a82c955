//! # Application Specification
//!
//! An application is a named, versioned group of child processes started in
//! declaration order and supervised by one controller process under a
//! [`ApplicationStartType`].
//!
//! The spec is immutable once [`ApplicationBehavior::load`] has returned it; the
//! realized child handles live in a separate [`ChildTable`](super::ChildTable)
//! owned by the controller.

use crate::framework::{Pid, Process, ProcessBehavior, Term};
use crate::lifecycle::ApplicationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

/// Escalation policy applied when a supervised child terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationStartType {
    /// Any child termination stops the other children and the node.
    Permanent,
    /// Child terminations are reported; nothing else is stopped.
    Temporary,
    /// Like `Temporary` for `normal`/`shutdown` exits, like `Permanent` otherwise.
    Transient,
}

impl Display for ApplicationStartType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ApplicationStartType::Permanent => "permanent",
            ApplicationStartType::Temporary => "temporary",
            ApplicationStartType::Transient => "transient",
        })
    }
}

/// One supervised child.
#[derive(Clone)]
pub struct ApplicationChildSpec {
    /// Unique within the application. Also the child's registered name.
    pub name: String,
    pub child: Arc<dyn ProcessBehavior>,
    pub args: Vec<Term>,
}

impl ApplicationChildSpec {
    pub fn new(name: impl Into<String>, child: Arc<dyn ProcessBehavior>, args: Vec<Term>) -> Self {
        Self {
            name: name.into(),
            child,
            args,
        }
    }
}

impl std::fmt::Debug for ApplicationChildSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationChildSpec")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish()
    }
}

/// Declarative description of a deployable unit.
#[derive(Debug, Clone, Default)]
pub struct ApplicationSpec {
    pub name: String,
    pub description: String,
    pub version: String,
    /// Zero means no limit.
    pub lifespan: Duration,
    /// Applied to the controller's environment at startup.
    pub environment: HashMap<String, Term>,
    /// Start order; stop order is the reverse.
    pub children: Vec<ApplicationChildSpec>,
}

impl ApplicationSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn lifespan(mut self, lifespan: Duration) -> Self {
        self.lifespan = lifespan;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: Term) -> Self {
        self.environment.insert(key.into(), value);
        self
    }

    pub fn child(mut self, child: ApplicationChildSpec) -> Self {
        self.children.push(child);
        self
    }

    /// Checks the invariants a controller relies on.
    pub fn validate(&self) -> Result<(), ApplicationError> {
        if self.name.is_empty() {
            return Err(ApplicationError::LoadFailed("empty application name".into()));
        }
        let mut seen = HashSet::new();
        for child in &self.children {
            if !seen.insert(child.name.as_str()) {
                return Err(ApplicationError::DuplicateChild {
                    app: self.name.clone(),
                    child: child.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Public summary of a loaded application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    pub name: String,
    pub description: String,
    pub version: String,
    /// Controller pid while the application is running.
    pub pid: Option<Pid>,
}

/// Callbacks an application implements.
#[async_trait]
pub trait ApplicationBehavior: Send + Sync + 'static {
    /// Produces the declarative spec.
    fn load(&self, args: Vec<Term>) -> Result<ApplicationSpec, ApplicationError>;

    /// Called once every child is up, before the controller reports ready.
    async fn start(&self, process: &Process, args: Vec<Term>);
}
