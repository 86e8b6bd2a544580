//! Scheduler for the service graph
//!
//! All bookkeeping happens under one mutex in [`GraphState::plan`], which
//! computes the starts and stops that are possible right now and marks the
//! affected nodes `Starting`/`Stopping`. The service routines then run on the
//! blocking pool without the lock held; each completion re-enters `plan`.
//!
//! # Invariants
//!
//! - A node starts only when every dependency is `Up` and none of them is
//!   about to go down.
//! - A node stops only when no `Starting`/`Up`/`Stopping` node consumed it at
//!   start time and none of its children are running.
//! - A node is deleted only from `Down` or `Failed`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::inject::Dependency;
use crate::{
    Failure, GraphError, NodeStatus, Result, Service, ServiceName, ServiceState, ServiceTarget,
    ServiceValue, StartContext, StartError, StopContext,
};

/// Everything needed to create a node.
pub(crate) struct NodeSpec {
    pub(crate) name: ServiceName,
    pub(crate) service: Arc<dyn Service>,
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) parent: Option<ServiceName>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Active,
    Remove,
}

struct Node {
    service: Arc<dyn Service>,
    dependencies: Arc<Vec<Dependency>>,
    parent: Option<ServiceName>,
    state: ServiceState,
    mode: Mode,
    failure: Option<Failure>,
    value: Option<ServiceValue>,
    /// Dependencies consumed by the current run, in declaration order.
    started_with: Vec<ServiceName>,
    replacement: Option<NodeSpec>,
    started_at: Option<Instant>,
    up_at: Option<Instant>,
    stopped_at: Option<Instant>,
}

impl Node {
    fn new(spec: NodeSpec) -> Self {
        Self {
            service: spec.service,
            dependencies: Arc::new(spec.dependencies),
            parent: spec.parent,
            state: ServiceState::Down,
            mode: Mode::Active,
            failure: None,
            value: None,
            started_with: Vec::new(),
            replacement: None,
            started_at: None,
            up_at: None,
            stopped_at: None,
        }
    }

    fn dependency_names(&self) -> impl Iterator<Item = &ServiceName> {
        self.dependencies.iter().map(|d| &d.name)
    }

    /// Node where this node's failure originated.
    fn failure_root(&self, own_name: &ServiceName) -> Option<ServiceName> {
        match (&self.state, &self.failure) {
            (ServiceState::Failed, Some(Failure::DependencyUnavailable { dependency })) => {
                Some(dependency.clone())
            }
            (ServiceState::Failed, _) => Some(own_name.clone()),
            _ => None,
        }
    }

    fn is_running(&self) -> bool {
        matches!(
            self.state,
            ServiceState::Starting | ServiceState::Up | ServiceState::Stopping
        )
    }
}

enum Action {
    Start {
        name: ServiceName,
        service: Arc<dyn Service>,
        dependencies: Arc<Vec<Dependency>>,
        values: Vec<Option<ServiceValue>>,
    },
    Stop {
        name: ServiceName,
        service: Arc<dyn Service>,
        dependencies: Arc<Vec<Dependency>>,
    },
}

#[derive(Default)]
struct GraphState {
    nodes: HashMap<ServiceName, Node>,
    active: bool,
}

impl GraphState {
    fn plan(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        loop {
            let going_down = self.going_down();
            let mut changed = self.delete_removed();
            changed |= self.propagate_failures();
            changed |= self.collect_starts(&going_down, &mut actions);
            changed |= self.collect_stops(&going_down, &mut actions);
            if !changed {
                return actions;
            }
        }
    }

    /// Nodes that must stop (or must not start): everything while the graph
    /// is inactive, nodes marked for removal, and whatever consumed or was
    /// installed by such a node.
    fn going_down(&self) -> HashSet<ServiceName> {
        let mut down: HashSet<ServiceName> = self
            .nodes
            .iter()
            .filter(|(_, n)| !self.active || n.mode == Mode::Remove)
            .map(|(name, _)| name.clone())
            .collect();

        loop {
            let extra: Vec<ServiceName> = self
                .nodes
                .iter()
                .filter(|(name, _)| !down.contains(*name))
                .filter(|(_, n)| {
                    n.parent.as_ref().is_some_and(|p| down.contains(p))
                        || n.started_with.iter().any(|d| down.contains(d))
                })
                .map(|(name, _)| name.clone())
                .collect();
            if extra.is_empty() {
                return down;
            }
            down.extend(extra);
        }
    }

    fn children_of(&self, parent: &ServiceName) -> Vec<ServiceName> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.parent.as_ref() == Some(parent))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn mark_children_removed(&mut self, parent: &ServiceName) -> bool {
        let mut changed = false;
        for child in self.children_of(parent) {
            if let Some(node) = self.nodes.get_mut(&child)
                && node.mode != Mode::Remove
            {
                node.mode = Mode::Remove;
                changed = true;
            }
        }
        changed
    }

    fn delete_removed(&mut self) -> bool {
        let removable: Vec<ServiceName> = self
            .nodes
            .iter()
            .filter(|(_, n)| {
                n.mode == Mode::Remove
                    && matches!(n.state, ServiceState::Down | ServiceState::Failed)
            })
            .map(|(name, _)| name.clone())
            .collect();

        let mut changed = false;
        for name in removable {
            if !self.children_of(&name).is_empty() {
                changed |= self.mark_children_removed(&name);
                continue;
            }
            let Some(node) = self.nodes.remove(&name) else {
                continue;
            };
            changed = true;
            tracing::debug!(service = %name, "Service removed");
            self.clear_failures_rooted_at(&name);
            if let Some(spec) = node.replacement {
                tracing::debug!(service = %spec.name, "Installing replacement service");
                self.nodes.insert(spec.name.clone(), Node::new(spec));
            }
        }
        changed
    }

    fn clear_failures_rooted_at(&mut self, root: &ServiceName) {
        for node in self.nodes.values_mut() {
            if matches!(&node.failure, Some(Failure::DependencyUnavailable { dependency }) if dependency == root)
            {
                node.failure = None;
                node.state = ServiceState::Down;
            }
        }
    }

    fn propagate_failures(&mut self) -> bool {
        let failed: Vec<(ServiceName, ServiceName)> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.state == ServiceState::Down)
            .filter_map(|(name, n)| {
                n.dependency_names()
                    .find_map(|dep| self.nodes.get(dep).and_then(|d| d.failure_root(dep)))
                    .map(|root| (name.clone(), root))
            })
            .collect();

        for (name, root) in &failed {
            if let Some(node) = self.nodes.get_mut(name) {
                tracing::warn!(service = %name, failed = %root, "Dependency unavailable, service will not start");
                node.state = ServiceState::Failed;
                node.failure = Some(Failure::DependencyUnavailable {
                    dependency: root.clone(),
                });
            }
        }
        !failed.is_empty()
    }

    fn collect_starts(&mut self, going_down: &HashSet<ServiceName>, actions: &mut Vec<Action>) -> bool {
        if !self.active {
            return false;
        }

        let ready: Vec<ServiceName> = self
            .nodes
            .iter()
            .filter(|(name, n)| n.state == ServiceState::Down && !going_down.contains(*name))
            .filter(|(_, n)| {
                n.dependency_names().all(|dep| {
                    !going_down.contains(dep)
                        && self
                            .nodes
                            .get(dep)
                            .is_some_and(|d| d.state == ServiceState::Up)
                })
            })
            .map(|(name, _)| name.clone())
            .collect();

        for name in &ready {
            let Some(node) = self.nodes.get(name) else {
                continue;
            };
            let values: Vec<Option<ServiceValue>> = node
                .dependency_names()
                .map(|dep| self.nodes.get(dep).and_then(|d| d.value.clone()))
                .collect();
            let started_with: Vec<ServiceName> = node.dependency_names().cloned().collect();

            if let Some(node) = self.nodes.get_mut(name) {
                node.state = ServiceState::Starting;
                node.started_with = started_with;
                node.started_at = Some(Instant::now());
                node.up_at = None;
                tracing::debug!(service = %name, "Starting service");
                actions.push(Action::Start {
                    name: name.clone(),
                    service: Arc::clone(&node.service),
                    dependencies: Arc::clone(&node.dependencies),
                    values,
                });
            }
        }
        !ready.is_empty()
    }

    /// Whether some running node still relies on `name`.
    fn is_blocked(&self, name: &ServiceName) -> bool {
        self.nodes.values().any(|n| {
            n.is_running()
                && (n.started_with.contains(name) || n.parent.as_ref() == Some(name))
        })
    }

    fn collect_stops(&mut self, going_down: &HashSet<ServiceName>, actions: &mut Vec<Action>) -> bool {
        let ready: Vec<ServiceName> = self
            .nodes
            .iter()
            .filter(|(name, n)| n.state == ServiceState::Up && going_down.contains(*name))
            .filter(|(name, _)| !self.is_blocked(name))
            .map(|(name, _)| name.clone())
            .collect();

        for name in &ready {
            if let Some(node) = self.nodes.get_mut(name) {
                node.state = ServiceState::Stopping;
                tracing::debug!(service = %name, "Stopping service");
                actions.push(Action::Stop {
                    name: name.clone(),
                    service: Arc::clone(&node.service),
                    dependencies: Arc::clone(&node.dependencies),
                });
            }
            // Children belong to this run; a restart installs them again
            self.mark_children_removed(name);
        }
        !ready.is_empty()
    }

    /// Whether some installed dependency chain leads from `from` back to `to`.
    fn reaches(&self, from: &ServiceName, to: &ServiceName) -> bool {
        let mut stack = vec![from.clone()];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if &current == to {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.dependency_names().cloned());
            }
        }
        false
    }

    fn check_cycle(&self, spec: &NodeSpec) -> Result<()> {
        for dep in &spec.dependencies {
            if self.reaches(&dep.name, &spec.name) {
                return Err(GraphError::DependencyCycle {
                    name: spec.name.clone(),
                    through: dep.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.nodes.values().any(|n| {
            matches!(
                n.state,
                ServiceState::Starting | ServiceState::Stopping
            )
        })
    }
}

struct Inner {
    state: Mutex<GraphState>,
    changes: watch::Sender<u64>,
    runtime: Handle,
}

/// The service graph.
///
/// Cheap to clone; clones share the same nodes.
#[derive(Clone)]
pub struct ServiceGraph {
    inner: Arc<Inner>,
}

impl ServiceGraph {
    /// Create a graph scheduling on the current tokio runtime.
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| GraphError::NoRuntime)?;
        Ok(Self::with_handle(runtime))
    }

    /// Create a graph scheduling on the given runtime.
    pub fn with_handle(runtime: Handle) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(GraphState::default()),
                changes,
                runtime,
            }),
        }
    }

    /// Target installing services at the root of the graph.
    pub fn target(&self) -> ServiceTarget {
        ServiceTarget::root(self.clone())
    }

    /// Begin starting services. Services installed later start as soon as
    /// their dependencies are up.
    pub fn start(&self) {
        self.lock().active = true;
        tracing::info!("Service graph started");
        self.schedule();
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub(crate) fn install(&self, spec: NodeSpec, replace: bool) -> Result<()> {
        let name = spec.name.clone();
        {
            let mut state = self.lock();
            state.check_cycle(&spec)?;
            if !state.nodes.contains_key(&name) {
                state.nodes.insert(name.clone(), Node::new(spec));
            } else if !replace {
                return Err(GraphError::DuplicateService(name));
            } else if let Some(existing) = state.nodes.get_mut(&name) {
                tracing::debug!(service = %name, "Replacing service");
                existing.mode = Mode::Remove;
                existing.replacement = Some(spec);
            }
        }
        tracing::debug!(service = %name, "Service installed");
        self.schedule();
        Ok(())
    }

    /// Request removal of a service. Its dependents stop first and wait for
    /// the name to be installed again; its children are removed with it.
    pub fn remove(&self, name: &ServiceName) -> Result<()> {
        {
            let mut state = self.lock();
            let node = state
                .nodes
                .get_mut(name)
                .ok_or_else(|| GraphError::UnknownService(name.clone()))?;
            node.mode = Mode::Remove;
            node.replacement = None;
        }
        self.schedule();
        Ok(())
    }

    /// Stop every service in reverse dependency order and wait until all of
    /// them are down.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down service graph");
        self.lock().active = false;
        self.schedule();
        self.wait_until(|state| !state.nodes.values().any(Node::is_running))
            .await;
        tracing::info!("Service graph stopped");
    }

    pub fn contains(&self, name: &ServiceName) -> bool {
        self.lock().nodes.contains_key(name)
    }

    /// Installed service names, sorted.
    pub fn names(&self) -> Vec<ServiceName> {
        let mut names: Vec<ServiceName> = self.lock().nodes.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn status(&self, name: &ServiceName) -> Option<NodeStatus> {
        let state = self.lock();
        let node = state.nodes.get(name)?;
        Some(NodeStatus {
            name: name.clone(),
            state: node.state,
            failure: node.failure.clone(),
            missing: node
                .dependency_names()
                .filter(|dep| !state.nodes.contains_key(*dep))
                .cloned()
                .collect(),
            parent: node.parent.clone(),
            started_at: node.started_at,
            up_at: node.up_at,
            stopped_at: node.stopped_at,
        })
    }

    /// Value of a service that is up.
    pub fn value(&self, name: &ServiceName) -> Option<ServiceValue> {
        let state = self.lock();
        state
            .nodes
            .get(name)
            .filter(|n| n.state == ServiceState::Up)
            .and_then(|n| n.value.clone())
    }

    /// Wait until the service is up and return its value.
    ///
    /// Fails when the service fails or is removed without replacement. A
    /// service that is not installed yet is waited for.
    pub async fn await_service(&self, name: &ServiceName) -> Result<ServiceValue> {
        let mut changes = self.inner.changes.subscribe();
        let mut seen = false;
        loop {
            {
                let state = self.lock();
                match state.nodes.get(name) {
                    Some(node) if node.mode == Mode::Remove && node.replacement.is_some() => {}
                    Some(node) if node.state == ServiceState::Up && node.mode == Mode::Active => {
                        if let Some(value) = &node.value {
                            return Ok(Arc::clone(value));
                        }
                    }
                    Some(node) if node.state == ServiceState::Failed => {
                        return Err(GraphError::ServiceFailed {
                            name: name.clone(),
                            cause: node.failure.clone().unwrap_or_else(|| {
                                Failure::StartFailed("unknown".to_string())
                            }),
                        });
                    }
                    Some(_) => seen = true,
                    None if seen => return Err(GraphError::Removed(name.clone())),
                    None => {}
                }
            }
            if changes.changed().await.is_err() {
                return Err(GraphError::Removed(name.clone()));
            }
        }
    }

    /// Wait until the service is no longer installed.
    pub async fn await_removed(&self, name: &ServiceName) {
        self.wait_until(|state| !state.nodes.contains_key(name))
            .await
    }

    /// Wait until no service is starting or stopping.
    pub async fn await_settled(&self) {
        self.wait_until(|state| !state.is_busy()).await
    }

    async fn wait_until(&self, done: impl Fn(&GraphState) -> bool) {
        let mut changes = self.inner.changes.subscribe();
        loop {
            let finished = {
                let state = self.lock();
                done(&*state)
            };
            if finished {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.inner.changes.send_modify(|generation| *generation += 1);
    }

    fn schedule(&self) {
        let actions = self.lock().plan();
        for action in actions {
            match action {
                Action::Start {
                    name,
                    service,
                    dependencies,
                    values,
                } => self.spawn_start(name, service, dependencies, values),
                Action::Stop {
                    name,
                    service,
                    dependencies,
                } => self.spawn_stop(name, service, dependencies),
            }
        }
        self.notify();
    }

    fn spawn_start(
        &self,
        name: ServiceName,
        service: Arc<dyn Service>,
        dependencies: Arc<Vec<Dependency>>,
        values: Vec<Option<ServiceValue>>,
    ) {
        let graph = self.clone();
        self.inner.runtime.spawn(async move {
            let task_graph = graph.clone();
            let task_name = name.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                run_start(&task_graph, &task_name, service.as_ref(), &dependencies, &values)
            })
            .await;
            let result = outcome.unwrap_or_else(|e| {
                Err(StartError::context("start routine panicked", e))
            });
            graph.finish_start(&name, result);
        });
    }

    fn spawn_stop(
        &self,
        name: ServiceName,
        service: Arc<dyn Service>,
        dependencies: Arc<Vec<Dependency>>,
    ) {
        let graph = self.clone();
        self.inner.runtime.spawn(async move {
            let task_name = name.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                service.stop(&StopContext::new(task_name));
                uninject_all(&dependencies);
            })
            .await;
            if let Err(e) = outcome {
                tracing::error!(service = %name, error = %e, "Stop routine panicked");
            }
            graph.finish_stop(&name);
        });
    }

    fn finish_start(&self, name: &ServiceName, result: std::result::Result<ServiceValue, StartError>) {
        {
            let mut state = self.lock();
            let succeeded = match state.nodes.get_mut(name) {
                Some(node) => match result {
                    Ok(value) => {
                        node.state = ServiceState::Up;
                        node.value = Some(value);
                        node.up_at = Some(Instant::now());
                        tracing::info!(service = %name, "Service started");
                        true
                    }
                    Err(err) => {
                        node.state = ServiceState::Failed;
                        node.failure = Some(Failure::StartFailed(err.to_string()));
                        node.value = None;
                        node.started_with.clear();
                        tracing::error!(service = %name, error = %err, "Service failed to start");
                        false
                    }
                },
                None => true,
            };
            if !succeeded {
                // Release whatever the failed start managed to install
                state.mark_children_removed(name);
            }
        }
        self.schedule();
    }

    fn finish_stop(&self, name: &ServiceName) {
        {
            let mut state = self.lock();
            if let Some(node) = state.nodes.get_mut(name) {
                node.state = ServiceState::Down;
                node.value = None;
                node.started_with.clear();
                node.stopped_at = Some(Instant::now());
                tracing::debug!(service = %name, "Service stopped");
            }
        }
        self.schedule();
    }
}

fn run_start(
    graph: &ServiceGraph,
    name: &ServiceName,
    service: &dyn Service,
    dependencies: &[Dependency],
    values: &[Option<ServiceValue>],
) -> std::result::Result<ServiceValue, StartError> {
    for (dependency, value) in dependencies.iter().zip(values) {
        let (Some(injector), Some(value)) = (&dependency.injector, value) else {
            continue;
        };
        if let Err(err) = injector.inject(value) {
            uninject_all(dependencies);
            return Err(StartError::context(
                &format!("injecting {}", dependency.name),
                err,
            ));
        }
    }

    let result = service.start(&StartContext::new(name.clone(), graph.clone()));
    if result.is_err() {
        uninject_all(dependencies);
    }
    result
}

fn uninject_all(dependencies: &[Dependency]) {
    for injector in dependencies.iter().filter_map(|d| d.injector.as_ref()) {
        injector.uninject();
    }
}
