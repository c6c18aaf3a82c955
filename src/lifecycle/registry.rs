//! # Application Registry
//!
//! [`Applications`] keeps the applications loaded on a node and starts or stops
//! their controllers.

use crate::framework::process::lock;
use crate::framework::{ExitReason, Node, Process, Term};
use crate::lifecycle::{
    ApplicationBehavior, ApplicationController, ApplicationError, ApplicationInfo,
    ApplicationSpec, ApplicationStartType,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

struct LoadedApplication {
    spec: Arc<ApplicationSpec>,
    behavior: Arc<dyn ApplicationBehavior>,
    process: Option<Process>,
}

impl LoadedApplication {
    fn running(&self) -> Option<&Process> {
        self.process.as_ref().filter(|process| process.is_alive())
    }

    fn info(&self) -> ApplicationInfo {
        ApplicationInfo {
            name: self.spec.name.clone(),
            description: self.spec.description.clone(),
            version: self.spec.version.clone(),
            pid: self.running().map(Process::pid),
        }
    }
}

/// Applications loaded on one node, keyed by name.
pub struct Applications {
    node: Node,
    loaded: Mutex<BTreeMap<String, LoadedApplication>>,
}

impl Applications {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            loaded: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Calls the behavior's `load`, validates the spec and registers it.
    /// Returns the application name.
    pub fn load(
        &self,
        behavior: Arc<dyn ApplicationBehavior>,
        args: Vec<Term>,
    ) -> Result<String, ApplicationError> {
        let spec = behavior.load(args)?;
        spec.validate()?;
        let name = spec.name.clone();

        let mut loaded = lock(&self.loaded);
        if loaded.contains_key(&name) {
            return Err(ApplicationError::AlreadyLoaded(name));
        }
        info!(app = %name, version = %spec.version, children = spec.children.len(), "Application loaded");
        loaded.insert(
            name.clone(),
            LoadedApplication {
                spec: Arc::new(spec),
                behavior,
                process: None,
            },
        );
        Ok(name)
    }

    /// Forgets a loaded application. Fails while it is running.
    pub fn unload(&self, name: &str) -> Result<(), ApplicationError> {
        let mut loaded = lock(&self.loaded);
        let entry = loaded
            .get(name)
            .ok_or_else(|| ApplicationError::NotLoaded(name.to_string()))?;
        if entry.running().is_some() {
            return Err(ApplicationError::AlreadyStarted(name.to_string()));
        }
        loaded.remove(name);
        info!(app = %name, "Application unloaded");
        Ok(())
    }

    /// Spawns the application's controller. Resolves once every child is up.
    #[instrument(skip(self, args))]
    pub async fn start(
        &self,
        name: &str,
        start_type: ApplicationStartType,
        args: Vec<Term>,
    ) -> Result<Process, ApplicationError> {
        let (spec, behavior) = {
            let loaded = lock(&self.loaded);
            let entry = loaded
                .get(name)
                .ok_or_else(|| ApplicationError::NotLoaded(name.to_string()))?;
            if entry.running().is_some() {
                return Err(ApplicationError::AlreadyStarted(name.to_string()));
            }
            (entry.spec.clone(), entry.behavior.clone())
        };

        let controller = ApplicationController::new(spec, behavior, start_type);
        let process = self.node.spawn(name, Arc::new(controller), args).await?;

        if let Some(entry) = lock(&self.loaded).get_mut(name) {
            entry.process = Some(process.clone());
        }
        Ok(process)
    }

    pub async fn start_permanent(&self, name: &str, args: Vec<Term>) -> Result<Process, ApplicationError> {
        self.start(name, ApplicationStartType::Permanent, args).await
    }

    pub async fn start_transient(&self, name: &str, args: Vec<Term>) -> Result<Process, ApplicationError> {
        self.start(name, ApplicationStartType::Transient, args).await
    }

    pub async fn start_temporary(&self, name: &str, args: Vec<Term>) -> Result<Process, ApplicationError> {
        self.start(name, ApplicationStartType::Temporary, args).await
    }

    /// Asks a running application to stop its children and waits for it.
    #[instrument(skip(self))]
    pub async fn stop(&self, name: &str) -> Result<ExitReason, ApplicationError> {
        let process = {
            let loaded = lock(&self.loaded);
            let entry = loaded
                .get(name)
                .ok_or_else(|| ApplicationError::NotLoaded(name.to_string()))?;
            entry
                .running()
                .cloned()
                .ok_or_else(|| ApplicationError::NotStarted(name.to_string()))?
        };

        let config = self.node.config();
        let children = lock(&self.loaded)
            .get(name)
            .map_or(0, |entry| entry.spec.children.len());
        // Every child may use its full stop deadline, and a stubborn one may be
        // retried before it is killed.
        let attempts = config.shutdown_retry.max_attempts.max(1) + 1;
        let deadline = config
            .stop_timeout
            .saturating_mul(attempts * (children as u32 + 1))
            .saturating_add(config.shutdown_retry.max_backoff.saturating_mul(attempts));

        process.exit(process.pid(), ExitReason::Normal)?;
        let reason = process.wait_with_timeout(deadline).await?;
        debug!(app = %name, %reason, "Application controller exited");

        if let Some(entry) = lock(&self.loaded).get_mut(name) {
            entry.process = None;
        }
        Ok(reason)
    }

    /// Summaries of the running applications.
    pub fn which_applications(&self) -> Vec<ApplicationInfo> {
        lock(&self.loaded)
            .values()
            .filter(|entry| entry.running().is_some())
            .map(LoadedApplication::info)
            .collect()
    }

    /// Summary of a loaded application, running or not.
    pub fn info(&self, name: &str) -> Option<ApplicationInfo> {
        lock(&self.loaded).get(name).map(LoadedApplication::info)
    }
}
