use actor_supervisor::framework::{CallResult, ExitReason, Node, Pid, Process, Ref, Term};
use actor_supervisor::runtime::Config;
use actor_supervisor::saga::{
    GenSaga, GenSagaBehavior, GenSagaOptions, GenSagaState, GenSagaTransaction,
    GenSagaTransactionOptions, SagaError,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Next(Ref, Vec<Pid>),
    Interim(Ref, Term),
    Done(Ref, Term),
    Cancel(Ref, String),
    Canceled(Ref, String),
    Timeout(Ref),
}

type Log = Arc<Mutex<Vec<(&'static str, Event)>>>;

/// What a participant does when it receives a transaction.
#[derive(Clone, Copy)]
enum Route {
    Forward(&'static str),
    /// Forward a fresh transaction, finish it once it comes back.
    RoundTrip(&'static str),
    Finish,
    Hold,
    Report,
    Fail,
}

/// Saga participant that records every hook call.
struct Recorder {
    name: &'static str,
    route: Route,
    log: Log,
}

impl Recorder {
    fn record(&self, event: Event) {
        self.log.lock().unwrap().push((self.name, event));
    }
}

#[async_trait]
impl GenSagaBehavior for Recorder {
    type State = ();

    async fn init_saga(&self, _process: &Process, _args: Vec<Term>) -> Result<(), SagaError> {
        Ok(())
    }

    async fn handle_next(
        &self,
        saga: &mut GenSagaState<()>,
        tx: &GenSagaTransaction,
        mut arg: Term,
    ) -> Result<(), SagaError> {
        self.record(Event::Next(tx.tx_ref, tx.parents.clone()));
        if let Some(stamps) = arg.as_array_mut() {
            stamps.push(Term::from(self.name));
        }
        match self.route {
            Route::Forward(next) => {
                let to = saga.process().node()?.lookup(next)?;
                saga.next(tx.tx_ref, to.pid(), arg)
            }
            Route::RoundTrip(next) if tx.parents.is_empty() => {
                let to = saga.process().node()?.lookup(next)?;
                saga.next(tx.tx_ref, to.pid(), arg)
            }
            Route::Finish | Route::RoundTrip(_) => saga.done(tx.tx_ref, arg),
            Route::Hold => Ok(()),
            Route::Report => saga.interim(tx.tx_ref, json!("half")),
            Route::Fail => Err(SagaError::Handler("nope".into())),
        }
    }

    async fn handle_interim(
        &self,
        _saga: &mut GenSagaState<()>,
        tx: &GenSagaTransaction,
        interim: Term,
    ) -> Result<(), SagaError> {
        self.record(Event::Interim(tx.tx_ref, interim));
        Ok(())
    }

    async fn handle_done(
        &self,
        saga: &mut GenSagaState<()>,
        tx: &GenSagaTransaction,
        result: Term,
    ) -> Result<(), SagaError> {
        self.record(Event::Done(tx.tx_ref, result.clone()));
        if tx.is_originator() {
            Ok(())
        } else {
            saga.done(tx.tx_ref, result)
        }
    }

    async fn handle_cancel(
        &self,
        _saga: &mut GenSagaState<()>,
        tx: &GenSagaTransaction,
        reason: &str,
    ) -> Result<(), SagaError> {
        self.record(Event::Cancel(tx.tx_ref, reason.to_string()));
        Ok(())
    }

    async fn handle_canceled(
        &self,
        _saga: &mut GenSagaState<()>,
        tx: &GenSagaTransaction,
        reason: &str,
    ) -> Result<(), SagaError> {
        self.record(Event::Canceled(tx.tx_ref, reason.to_string()));
        Ok(())
    }

    async fn handle_timeout(
        &self,
        _saga: &mut GenSagaState<()>,
        tx: &GenSagaTransaction,
        _timeout: Duration,
    ) -> Result<(), SagaError> {
        self.record(Event::Timeout(tx.tx_ref));
        Ok(())
    }

    async fn handle_saga_call(&self, saga: &mut GenSagaState<()>, _from: Pid, request: Term) -> CallResult {
        let reply = match request["op"].as_str() {
            Some("start") => {
                let options: GenSagaTransactionOptions =
                    serde_json::from_value(request["options"].clone()).unwrap();
                match saga.start_transaction(options, json!([])) {
                    Ok(tx_ref) => json!({ "ref": tx_ref }),
                    Err(e) => json!({ "error": e.to_string() }),
                }
            }
            Some("cancel") => {
                let tx_ref: Ref = serde_json::from_value(request["ref"].clone()).unwrap();
                match saga.cancel(tx_ref, "user") {
                    Ok(()) => json!("ok"),
                    Err(e) => json!({ "error": e.to_string() }),
                }
            }
            Some("count") => json!(saga.transactions()),
            _ => json!("unknown"),
        };
        CallResult::Reply(reply)
    }
}

struct Harness {
    node: Node,
    log: Log,
}

impl Harness {
    fn new() -> Self {
        Self {
            node: Node::new("test", Config::default()),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    async fn spawn(&self, name: &'static str, route: Route) -> Process {
        self.spawn_with(name, route, GenSagaOptions::default()).await
    }

    async fn spawn_with(&self, name: &'static str, route: Route, options: GenSagaOptions) -> Process {
        let recorder = Recorder {
            name,
            route,
            log: self.log.clone(),
        };
        self.node
            .spawn(name, GenSaga::with_options(recorder, options).arc(), vec![])
            .await
            .unwrap()
    }

    async fn call(&self, process: &Process, request: Term) -> Term {
        process
            .call(Pid(0), request, Duration::from_secs(1))
            .await
            .unwrap()
    }

    async fn start(&self, process: &Process, options: GenSagaTransactionOptions) -> Ref {
        let reply = self
            .call(process, json!({ "op": "start", "options": options }))
            .await;
        serde_json::from_value(reply["ref"].clone()).unwrap()
    }

    async fn count(&self, process: &Process) -> u64 {
        self.call(process, json!({ "op": "count" })).await.as_u64().unwrap()
    }

    fn events(&self) -> Vec<(&'static str, Event)> {
        self.log.lock().unwrap().clone()
    }

    fn has(&self, who: &'static str, event: &Event) -> bool {
        self.events().iter().any(|(name, e)| *name == who && e == event)
    }

    /// Waits until `who` has recorded `event`.
    async fn expect(&self, who: &'static str, event: Event) {
        for _ in 0..200 {
            if self.has(who, &event) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{who} never recorded {event:?}; log: {:?}", self.events());
    }
}

fn options() -> GenSagaTransactionOptions {
    GenSagaTransactionOptions::default()
}

#[tokio::test]
async fn test_three_hop_transaction_completes() {
    let h = Harness::new();
    let a = h.spawn("a", Route::Forward("b")).await;
    let b = h.spawn("b", Route::Forward("c")).await;
    let c = h.spawn("c", Route::Finish).await;

    let tx = h.start(&a, options()).await;
    h.expect("a", Event::Done(tx, json!(["a", "b", "c"]))).await;

    assert!(h.has("c", &Event::Next(tx, vec![a.pid(), b.pid()])));
    assert_eq!(h.count(&a).await, 0);
    assert_eq!(h.count(&b).await, 0);
    assert_eq!(h.count(&c).await, 0);
}

#[tokio::test]
async fn test_loop_cancels_transaction() {
    let h = Harness::new();
    let a = h.spawn("a", Route::Forward("b")).await;
    let b = h.spawn("b", Route::Forward("a")).await;

    let tx = h.start(&a, options()).await;
    h.expect("a", Event::Canceled(tx, "loop".into())).await;
    h.expect("b", Event::Canceled(tx, "loop".into())).await;

    // The looping hop never reached handle_next.
    assert!(!h.has("a", &Event::Next(tx, vec![a.pid(), b.pid()])));
    assert_eq!(h.count(&a).await, 0);
    assert_eq!(h.count(&b).await, 0);
}

#[tokio::test]
async fn test_ignored_loop_continues_until_hop_limit() {
    let h = Harness::new();
    let a = h.spawn("a", Route::Forward("b")).await;
    let b = h.spawn("b", Route::Forward("a")).await;

    let tx = h
        .start(
            &a,
            GenSagaTransactionOptions {
                ignore_loop: true,
                hop_limit: 4,
                ..options()
            },
        )
        .await;

    h.expect("a", Event::Canceled(tx, "hop limit".into())).await;
    h.expect("b", Event::Canceled(tx, "hop limit".into())).await;
    assert!(h.has("a", &Event::Next(tx, vec![a.pid(), b.pid()])));
    assert!(!h.events().iter().any(|(_, e)| *e == Event::Canceled(tx, "loop".into())));
}

#[tokio::test]
async fn test_ignored_loop_back_to_originator_completes_locally() {
    let h = Harness::new();
    let a = h.spawn("a", Route::RoundTrip("b")).await;
    let b = h.spawn("b", Route::Forward("a")).await;

    let tx = h
        .start(
            &a,
            GenSagaTransactionOptions {
                ignore_loop: true,
                ..options()
            },
        )
        .await;

    h.expect("a", Event::Done(tx, json!(["a", "b", "a"]))).await;
    assert!(h.has("a", &Event::Next(tx, vec![a.pid(), b.pid()])));
    assert!(!h.events().iter().any(|(name, e)| *name == "b" && matches!(e, Event::Done(..))));
    assert_eq!(h.count(&a).await, 0);
}

#[tokio::test]
async fn test_hop_limit_cancels_on_next_hop() {
    let h = Harness::new();
    let a = h.spawn("a", Route::Forward("b")).await;
    let _b = h.spawn("b", Route::Forward("c")).await;
    let c = h.spawn("c", Route::Forward("d")).await;
    let _d = h.spawn("d", Route::Finish).await;

    let tx = h
        .start(
            &a,
            GenSagaTransactionOptions {
                hop_limit: 2,
                ..options()
            },
        )
        .await;

    h.expect("c", Event::Canceled(tx, "hop limit".into())).await;
    h.expect("b", Event::Canceled(tx, "hop limit".into())).await;
    h.expect("a", Event::Cancel(tx, "hop limit".into())).await;
    assert!(!h.events().iter().any(|(name, _)| *name == "d"));
    assert_eq!(h.count(&a).await, 0);
    assert_eq!(h.count(&c).await, 0);
}

#[tokio::test]
async fn test_zero_hop_limit_is_unlimited() {
    let h = Harness::new();
    let a = h.spawn("a", Route::Forward("b")).await;
    h.spawn("b", Route::Forward("c")).await;
    h.spawn("c", Route::Forward("d")).await;
    h.spawn("d", Route::Finish).await;

    let tx = h.start(&a, options()).await;
    h.expect("a", Event::Done(tx, json!(["a", "b", "c", "d"]))).await;
}

#[tokio::test]
async fn test_max_transactions() {
    let h = Harness::new();
    let limited = GenSagaOptions { max_transactions: 1 };
    let a = h.spawn("a", Route::Forward("b")).await;
    let b = h.spawn_with("b", Route::Hold, limited).await;

    let first = h.start(&a, options()).await;
    h.expect("b", Event::Next(first, vec![a.pid()])).await;

    let second = h.start(&a, options()).await;
    h.expect("a", Event::Cancel(second, "max transactions".into())).await;
    assert_eq!(h.count(&b).await, 1);

    // The limit also applies to transactions a process starts itself.
    let c = h.spawn_with("c", Route::Hold, limited).await;
    h.start(&c, options()).await;
    let reply = h
        .call(&c, json!({ "op": "start", "options": options() }))
        .await;
    assert_eq!(reply["error"], json!("Transaction limit reached: 1"));
}

#[tokio::test]
async fn test_interim_reaches_upstream() {
    let h = Harness::new();
    let a = h.spawn("a", Route::Forward("b")).await;
    let b = h.spawn("b", Route::Report).await;

    let tx = h.start(&a, options()).await;
    h.expect("a", Event::Interim(tx, json!("half"))).await;
    assert_eq!(h.count(&a).await, 1);
    assert_eq!(h.count(&b).await, 1);
}

#[tokio::test]
async fn test_explicit_cancel_reaches_downstream() {
    let h = Harness::new();
    let a = h.spawn("a", Route::Forward("b")).await;
    let b = h.spawn("b", Route::Hold).await;

    let tx = h.start(&a, options()).await;
    h.expect("b", Event::Next(tx, vec![a.pid()])).await;

    assert_eq!(h.call(&a, json!({ "op": "cancel", "ref": tx })).await, json!("ok"));
    h.expect("a", Event::Canceled(tx, "user".into())).await;
    h.expect("b", Event::Canceled(tx, "user".into())).await;
    assert_eq!(h.count(&b).await, 0);

    let again = h.call(&a, json!({ "op": "cancel", "ref": tx })).await;
    assert_eq!(again["error"], json!(format!("Unknown transaction: {tx}")));
}

#[tokio::test]
async fn test_handler_error_cancels_transaction() {
    let h = Harness::new();
    let a = h.spawn("a", Route::Forward("b")).await;
    h.spawn("b", Route::Fail).await;

    let tx = h.start(&a, options()).await;
    h.expect("b", Event::Canceled(tx, "nope".into())).await;
    h.expect("a", Event::Cancel(tx, "nope".into())).await;
}

#[tokio::test]
async fn test_timeout_fires_once() {
    let h = Harness::new();
    let a = h.spawn("a", Route::Hold).await;

    let tx = h
        .start(
            &a,
            GenSagaTransactionOptions {
                timeout: Duration::from_millis(50),
                ..options()
            },
        )
        .await;
    h.expect("a", Event::Timeout(tx)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let timeouts = h
        .events()
        .iter()
        .filter(|(_, e)| *e == Event::Timeout(tx))
        .count();
    assert_eq!(timeouts, 1);
    assert_eq!(h.count(&a).await, 0);
}

#[tokio::test]
async fn test_timeout_cancels_other_hops() {
    let h = Harness::new();
    let a = h.spawn("a", Route::Forward("b")).await;
    let b = h.spawn("b", Route::Hold).await;

    let tx = h
        .start(
            &a,
            GenSagaTransactionOptions {
                timeout: Duration::from_millis(50),
                ..options()
            },
        )
        .await;
    h.expect("b", Event::Next(tx, vec![a.pid()])).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Whichever hop expires first cancels the other.
    assert!(h.has("a", &Event::Timeout(tx)) || h.has("a", &Event::Cancel(tx, "timeout".into())));
    assert!(h.has("b", &Event::Timeout(tx)) || h.has("b", &Event::Canceled(tx, "timeout".into())));
    assert_eq!(h.count(&a).await, 0);
    assert_eq!(h.count(&b).await, 0);
}

#[tokio::test]
async fn test_completed_transaction_timer_is_disarmed() {
    let h = Harness::new();
    let a = h.spawn("a", Route::Forward("b")).await;
    h.spawn("b", Route::Finish).await;

    let tx = h
        .start(
            &a,
            GenSagaTransactionOptions {
                timeout: Duration::from_millis(50),
                ..options()
            },
        )
        .await;
    h.expect("a", Event::Done(tx, json!(["a", "b"]))).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!h.events().iter().any(|(_, e)| *e == Event::Timeout(tx)));
}

#[tokio::test]
async fn test_stopped_hop_cancels_open_transactions() {
    let h = Harness::new();
    let a = h.spawn("a", Route::Forward("b")).await;
    let b = h.spawn("b", Route::Hold).await;

    let tx = h.start(&a, options()).await;
    h.expect("b", Event::Next(tx, vec![a.pid()])).await;
    assert_eq!(h.count(&a).await, 1);

    b.exit(Pid(0), ExitReason::Shutdown).unwrap();
    assert_eq!(b.wait().await, ExitReason::Shutdown);

    h.expect("a", Event::Cancel(tx, "shutdown".into())).await;
    assert_eq!(h.count(&a).await, 0);
}
