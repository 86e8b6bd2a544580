//! Scheduling, failure propagation and teardown order of the service graph.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tenancy_graph::{
    Failure, GraphError, Injected, Service, ServiceGraph, ServiceName, ServiceState,
    ServiceValue, StartContext, StartError, StopContext, ValueService,
};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

type Log = Arc<Mutex<Vec<String>>>;

fn name(s: &str) -> ServiceName {
    s.parse().unwrap()
}

/// Records `start:<name>` and `stop:<name>` and produces its own name.
struct Recorder {
    log: Log,
    fail: bool,
}

impl Recorder {
    fn new(log: &Log) -> Self {
        Self {
            log: Arc::clone(log),
            fail: false,
        }
    }

    fn failing(log: &Log) -> Self {
        Self {
            log: Arc::clone(log),
            fail: true,
        }
    }
}

impl Service for Recorder {
    fn start(&self, ctx: &StartContext) -> Result<ServiceValue, StartError> {
        self.log.lock().unwrap().push(format!("start:{}", ctx.name()));
        if self.fail {
            return Err(StartError::new("boom"));
        }
        Ok(Arc::new(ctx.name().to_string()))
    }

    fn stop(&self, ctx: &StopContext) {
        self.log.lock().unwrap().push(format!("stop:{}", ctx.name()));
    }
}

/// Produces the injected string with a suffix.
struct Suffix {
    input: Injected<String>,
}

impl Service for Suffix {
    fn start(&self, _ctx: &StartContext) -> Result<ServiceValue, StartError> {
        let input = self.input.require()?;
        Ok(Arc::new(format!("{input}+suffix")))
    }
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn position(log: &[String], entry: &str) -> usize {
    log.iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("{entry} missing from {log:?}"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dependency_value_is_injected_before_start() {
    let graph = ServiceGraph::new().unwrap();
    let target = graph.target();
    let input = Injected::new();

    target
        .add_service(name("app.source"), ValueService::new("value".to_string()))
        .install()
        .unwrap();
    let consumer = target
        .add_service(name("app.consumer"), Suffix { input: input.clone() })
        .dependency_into(name("app.source"), &input)
        .install()
        .unwrap();

    graph.start();
    let value = timeout(WAIT, consumer.await_up()).await.unwrap().unwrap();

    assert_eq!(value.downcast_ref::<String>().unwrap(), "value+suffix");
    assert_eq!(input.get().as_deref(), Some("value"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_nothing_starts_before_graph_start() {
    let log = Log::default();
    let graph = ServiceGraph::new().unwrap();
    graph
        .target()
        .add_service(name("a"), Recorder::new(&log))
        .install()
        .unwrap();

    graph.await_settled().await;
    assert!(entries(&log).is_empty());
    assert_eq!(graph.status(&name("a")).unwrap().state, ServiceState::Down);

    graph.start();
    timeout(WAIT, graph.await_service(&name("a"))).await.unwrap().unwrap();
    assert_eq!(entries(&log), vec!["start:a"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_chain_starts_in_dependency_order() {
    let log = Log::default();
    let graph = ServiceGraph::new().unwrap();
    let target = graph.target();

    // Installed leaf-last to show ordering comes from dependencies
    target
        .add_service(name("c"), Recorder::new(&log))
        .dependency(name("b"))
        .install()
        .unwrap();
    target
        .add_service(name("b"), Recorder::new(&log))
        .dependency(name("a"))
        .install()
        .unwrap();
    target
        .add_service(name("a"), Recorder::new(&log))
        .install()
        .unwrap();

    graph.start();
    timeout(WAIT, graph.await_service(&name("c"))).await.unwrap().unwrap();

    assert_eq!(entries(&log), vec!["start:a", "start:b", "start:c"]);
    let a = graph.status(&name("a")).unwrap();
    let b = graph.status(&name("b")).unwrap();
    assert!(a.up_at.unwrap() <= b.started_at.unwrap());
}

/// Two services that can only finish if they run at the same time.
struct Rendezvous {
    signal: Mutex<mpsc::Sender<()>>,
    wait: Mutex<mpsc::Receiver<()>>,
}

impl Service for Rendezvous {
    fn start(&self, _ctx: &StartContext) -> Result<ServiceValue, StartError> {
        self.signal.lock().unwrap().send(()).unwrap();
        self.wait
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| StartError::new("peer never started"))?;
        Ok(Arc::new(()))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_independent_services_start_concurrently() {
    let graph = ServiceGraph::new().unwrap();
    let (to_b, from_a) = mpsc::channel();
    let (to_a, from_b) = mpsc::channel();

    graph
        .target()
        .add_service(
            name("left"),
            Rendezvous {
                signal: Mutex::new(to_b),
                wait: Mutex::new(from_b),
            },
        )
        .install()
        .unwrap();
    graph
        .target()
        .add_service(
            name("right"),
            Rendezvous {
                signal: Mutex::new(to_a),
                wait: Mutex::new(from_a),
            },
        )
        .install()
        .unwrap();

    graph.start();
    timeout(WAIT, graph.await_service(&name("left"))).await.unwrap().unwrap();
    timeout(WAIT, graph.await_service(&name("right"))).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_propagates_to_transitive_dependents() {
    let log = Log::default();
    let graph = ServiceGraph::new().unwrap();
    let target = graph.target();

    target
        .add_service(name("root"), Recorder::failing(&log))
        .install()
        .unwrap();
    target
        .add_service(name("mid"), Recorder::new(&log))
        .dependency(name("root"))
        .install()
        .unwrap();
    target
        .add_service(name("leaf"), Recorder::new(&log))
        .dependency(name("mid"))
        .install()
        .unwrap();
    target
        .add_service(name("unrelated"), Recorder::new(&log))
        .install()
        .unwrap();

    graph.start();
    let err = timeout(WAIT, graph.await_service(&name("leaf")))
        .await
        .unwrap()
        .unwrap_err();
    timeout(WAIT, graph.await_service(&name("unrelated")))
        .await
        .unwrap()
        .unwrap();
    graph.await_settled().await;

    assert_eq!(
        err,
        GraphError::ServiceFailed {
            name: name("leaf"),
            cause: Failure::DependencyUnavailable {
                dependency: name("root")
            },
        }
    );
    assert_eq!(
        graph.status(&name("root")).unwrap().failure,
        Some(Failure::StartFailed("boom".to_string()))
    );
    let log = entries(&log);
    assert!(!log.contains(&"start:mid".to_string()));
    assert!(!log.contains(&"start:leaf".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_late_dependent_of_failed_service_fails() {
    let log = Log::default();
    let graph = ServiceGraph::new().unwrap();
    graph.start();

    let root = graph
        .target()
        .add_service(name("root"), Recorder::failing(&log))
        .install()
        .unwrap();
    assert!(timeout(WAIT, root.await_up()).await.unwrap().is_err());

    let late = graph
        .target()
        .add_service(name("late"), Recorder::new(&log))
        .dependency(name("root"))
        .install()
        .unwrap();
    assert!(timeout(WAIT, late.await_up()).await.unwrap().is_err());
    assert_eq!(late.state(), Some(ServiceState::Failed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_missing_dependency_waits_for_late_install() {
    let log = Log::default();
    let graph = ServiceGraph::new().unwrap();
    graph.start();

    let waiting = graph
        .target()
        .add_service(name("ext.mount"), Recorder::new(&log))
        .dependency(name("ext.resource"))
        .install()
        .unwrap();
    graph.await_settled().await;

    let status = waiting.status().unwrap();
    assert_eq!(status.state, ServiceState::Down);
    assert_eq!(status.missing, vec![name("ext.resource")]);

    graph
        .target()
        .add_service(name("ext.resource"), Recorder::new(&log))
        .install()
        .unwrap();
    timeout(WAIT, waiting.await_up()).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_install_rejected() {
    let log = Log::default();
    let graph = ServiceGraph::new().unwrap();
    let target = graph.target();

    target
        .add_service(name("a"), Recorder::new(&log))
        .install()
        .unwrap();
    let err = target
        .add_service(name("a"), Recorder::new(&log))
        .install()
        .err()
        .unwrap();

    assert_eq!(err, GraphError::DuplicateService(name("a")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cycle_rejected() {
    let log = Log::default();
    let graph = ServiceGraph::new().unwrap();
    let target = graph.target();

    target
        .add_service(name("a"), Recorder::new(&log))
        .dependency(name("b"))
        .install()
        .unwrap();
    let err = target
        .add_service(name("b"), Recorder::new(&log))
        .dependency(name("a"))
        .install()
        .err()
        .unwrap();

    assert!(matches!(err, GraphError::DependencyCycle { .. }));
    assert!(!graph.contains(&name("b")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_stops_in_reverse_order() {
    let log = Log::default();
    let graph = ServiceGraph::new().unwrap();
    let target = graph.target();

    target
        .add_service(name("a"), Recorder::new(&log))
        .install()
        .unwrap();
    target
        .add_service(name("b"), Recorder::new(&log))
        .dependency(name("a"))
        .install()
        .unwrap();
    target
        .add_service(name("c"), Recorder::new(&log))
        .dependency(name("b"))
        .dependency(name("a"))
        .install()
        .unwrap();

    graph.start();
    timeout(WAIT, graph.await_service(&name("c"))).await.unwrap().unwrap();
    timeout(WAIT, graph.shutdown()).await.unwrap();

    let log = entries(&log);
    assert!(position(&log, "stop:c") < position(&log, "stop:b"));
    assert!(position(&log, "stop:b") < position(&log, "stop:a"));
    for service in ["a", "b", "c"] {
        assert_eq!(graph.status(&name(service)).unwrap().state, ServiceState::Down);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_removed_dependency_stops_dependents_until_reinstalled() {
    let log = Log::default();
    let graph = ServiceGraph::new().unwrap();
    let target = graph.target();
    graph.start();

    target
        .add_service(name("dep"), Recorder::new(&log))
        .install()
        .unwrap();
    let dependent = target
        .add_service(name("user"), Recorder::new(&log))
        .dependency(name("dep"))
        .install()
        .unwrap();
    timeout(WAIT, dependent.await_up()).await.unwrap().unwrap();

    graph.remove(&name("dep")).unwrap();
    timeout(WAIT, graph.await_removed(&name("dep"))).await.unwrap();
    assert_eq!(dependent.state(), Some(ServiceState::Down));

    let snapshot = entries(&log);
    assert!(position(&snapshot, "stop:user") < position(&snapshot, "stop:dep"));

    target
        .add_service(name("dep"), Recorder::new(&log))
        .install()
        .unwrap();
    timeout(WAIT, dependent.await_up()).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_replace_existing_swaps_value() {
    let graph = ServiceGraph::new().unwrap();
    let target = graph.target();
    graph.start();

    target
        .add_service(name("value"), ValueService::new(1u32))
        .install()
        .unwrap();
    timeout(WAIT, graph.await_service(&name("value"))).await.unwrap().unwrap();

    target
        .add_service(name("value"), ValueService::new(2u32))
        .replace_existing()
        .install()
        .unwrap();
    let value = timeout(WAIT, graph.await_service(&name("value")))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(value.downcast_ref::<u32>(), Some(&2));
    assert_eq!(graph.names(), vec![name("value")]);
}

/// Installs one child, then optionally fails.
struct Installer {
    log: Log,
    fail: bool,
}

impl Service for Installer {
    fn start(&self, ctx: &StartContext) -> Result<ServiceValue, StartError> {
        ctx.child_target()
            .add_service(ctx.name().append("child"), Recorder::new(&self.log))
            .install()
            .map_err(|e| StartError::context("installing child", e))?;
        if self.fail {
            return Err(StartError::new("installer failed"));
        }
        Ok(Arc::new(()))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_children_removed_with_parent() {
    let log = Log::default();
    let graph = ServiceGraph::new().unwrap();
    graph.start();

    let parent = graph
        .target()
        .add_service(name("parent"), Installer { log: Arc::clone(&log), fail: false })
        .install()
        .unwrap();
    timeout(WAIT, parent.await_up()).await.unwrap().unwrap();
    timeout(WAIT, graph.await_service(&name("parent.child")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        graph.status(&name("parent.child")).unwrap().parent,
        Some(name("parent"))
    );

    parent.remove().unwrap();
    timeout(WAIT, parent.await_removed()).await.unwrap();

    assert!(!graph.contains(&name("parent.child")));
    assert!(entries(&log).contains(&"stop:parent.child".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_start_releases_children() {
    let log = Log::default();
    let graph = ServiceGraph::new().unwrap();
    graph.start();

    let parent = graph
        .target()
        .add_service(name("parent"), Installer { log: Arc::clone(&log), fail: true })
        .install()
        .unwrap();
    assert!(timeout(WAIT, parent.await_up()).await.unwrap().is_err());

    timeout(WAIT, graph.await_removed(&name("parent.child")))
        .await
        .unwrap();
    assert_eq!(parent.state(), Some(ServiceState::Failed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_removing_failed_root_clears_dependent_failures() {
    let log = Log::default();
    let graph = ServiceGraph::new().unwrap();
    let target = graph.target();
    graph.start();

    target
        .add_service(name("root"), Recorder::failing(&log))
        .install()
        .unwrap();
    let dependent = target
        .add_service(name("dependent"), Recorder::new(&log))
        .dependency(name("root"))
        .install()
        .unwrap();
    assert!(timeout(WAIT, dependent.await_up()).await.unwrap().is_err());

    target
        .add_service(name("root"), Recorder::new(&log))
        .replace_existing()
        .install()
        .unwrap();

    timeout(WAIT, dependent.await_up()).await.unwrap().unwrap();
}

#[test]
fn test_new_without_runtime_fails() {
    assert!(matches!(ServiceGraph::new(), Err(GraphError::NoRuntime)));
}
