//! # Actor Supervisor Demo
//!
//! Loads a three-stage pipeline application, inspects it, runs one saga through
//! the three stages and shuts everything down.
//!
//! ```bash
//! RUST_LOG=info cargo run
//! ```

use actor_supervisor::framework::{Node, Process, ServerStatus, Term};
use actor_supervisor::lifecycle::{
    get_children, ApplicationBehavior, ApplicationChildSpec, ApplicationError, ApplicationSpec,
    Applications,
};
use actor_supervisor::runtime::{setup_tracing, Config};
use actor_supervisor::saga::{
    GenSaga, GenSagaBehavior, GenSagaState, GenSagaTransaction, GenSagaTransactionOptions,
    SagaError,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Instrument};

/// One pipeline stage: stamps its name on the payload and hands it on.
struct Stage {
    name: &'static str,
    next: Option<&'static str>,
}

#[async_trait]
impl GenSagaBehavior for Stage {
    type State = u64;

    async fn init_saga(&self, _process: &Process, _args: Vec<Term>) -> Result<u64, SagaError> {
        Ok(0)
    }

    async fn handle_saga_cast(&self, saga: &mut GenSagaState<u64>, request: Term) -> ServerStatus {
        if request.as_str() == Some("start") {
            let options = GenSagaTransactionOptions {
                name: "order".into(),
                hop_limit: 5,
                timeout: Duration::from_secs(1),
                ..Default::default()
            };
            if let Err(e) = saga.start_transaction(options, json!([])) {
                warn!(stage = self.name, error = %e, "Could not start transaction");
            }
        }
        ServerStatus::Continue
    }

    async fn handle_next(
        &self,
        saga: &mut GenSagaState<u64>,
        tx: &GenSagaTransaction,
        mut arg: Term,
    ) -> Result<(), SagaError> {
        if let Some(stamps) = arg.as_array_mut() {
            stamps.push(Term::from(self.name));
        }
        match self.next {
            Some(next) => {
                let to = saga.process().node()?.lookup(next)?;
                saga.next(tx.tx_ref, to.pid(), arg)
            }
            None => saga.done(tx.tx_ref, arg),
        }
    }

    async fn handle_done(
        &self,
        saga: &mut GenSagaState<u64>,
        tx: &GenSagaTransaction,
        result: Term,
    ) -> Result<(), SagaError> {
        if tx.is_originator() {
            saga.state += 1;
            info!(stage = self.name, tx = %tx.tx_ref, %result, completed = saga.state, "Transaction completed");
            Ok(())
        } else {
            saga.done(tx.tx_ref, result)
        }
    }

    async fn handle_cancel(
        &self,
        _saga: &mut GenSagaState<u64>,
        tx: &GenSagaTransaction,
        reason: &str,
    ) -> Result<(), SagaError> {
        warn!(stage = self.name, tx = %tx.tx_ref, reason, "Transaction cancel requested");
        Ok(())
    }

    async fn handle_canceled(
        &self,
        _saga: &mut GenSagaState<u64>,
        tx: &GenSagaTransaction,
        reason: &str,
    ) -> Result<(), SagaError> {
        warn!(stage = self.name, tx = %tx.tx_ref, reason, "Transaction canceled");
        Ok(())
    }

    async fn handle_timeout(
        &self,
        _saga: &mut GenSagaState<u64>,
        tx: &GenSagaTransaction,
        timeout: Duration,
    ) -> Result<(), SagaError> {
        warn!(stage = self.name, tx = %tx.tx_ref, ?timeout, "Transaction timed out");
        Ok(())
    }
}

struct Pipeline;

#[async_trait]
impl ApplicationBehavior for Pipeline {
    fn load(&self, _args: Vec<Term>) -> Result<ApplicationSpec, ApplicationError> {
        let stage = |name: &'static str, next: Option<&'static str>| {
            ApplicationChildSpec::new(name, GenSaga::new(Stage { name, next }).arc(), vec![])
        };
        Ok(ApplicationSpec::new("pipeline")
            .description("Three saga stages in a row")
            .version("0.1.0")
            .env("stages", json!(3))
            .child(stage("stage_a", Some("stage_b")))
            .child(stage("stage_b", Some("stage_c")))
            .child(stage("stage_c", None)))
    }

    async fn start(&self, process: &Process, _args: Vec<Term>) {
        info!(pid = %process.pid(), "Pipeline ready");
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let node = Node::new("demo@localhost", Config::default());
    let apps = Applications::new(node.clone());

    let name = apps
        .load(Arc::new(Pipeline), vec![])
        .map_err(|e| e.to_string())?;
    let controller = apps
        .start_permanent(&name, vec![])
        .await
        .map_err(|e| e.to_string())?;

    let children = get_children(&controller)
        .await
        .map_err(|e| e.to_string())?;
    info!(app = %name, ?children, "$getChildren");
    for app in apps.which_applications() {
        info!(app = %app.name, version = %app.version, pid = ?app.pid, "Running");
    }

    let stage_a = node.lookup("stage_a").map_err(|e| e.to_string())?;
    let span = tracing::info_span!("saga");
    async {
        info!("Starting transaction");
        stage_a.cast(Term::from("start")).map_err(|e| e.to_string())
    }
    .instrument(span)
    .await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let reason = apps.stop(&name).await.map_err(|e| e.to_string())?;
    info!(app = %name, %reason, "Application stopped");

    node.stop();
    info!("Demo completed");
    Ok(())
}
