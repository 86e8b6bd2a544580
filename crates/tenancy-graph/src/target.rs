//! Installing services and observing them

use std::any::Any;
use std::sync::Arc;

use crate::graph::NodeSpec;
use crate::inject::Dependency;
use crate::{
    Injected, NodeStatus, Result, Service, ServiceGraph, ServiceName, ServiceState, ServiceValue,
};

/// Where new services are installed: the graph root, or under a parent
/// service that owns them.
#[derive(Clone)]
pub struct ServiceTarget {
    graph: ServiceGraph,
    parent: Option<ServiceName>,
}

impl ServiceTarget {
    pub(crate) fn root(graph: ServiceGraph) -> Self {
        Self {
            graph,
            parent: None,
        }
    }

    pub(crate) fn child(graph: ServiceGraph, parent: ServiceName) -> Self {
        Self {
            graph,
            parent: Some(parent),
        }
    }

    /// Begin installing a service.
    pub fn add_service<S: Service>(&self, name: ServiceName, service: S) -> ServiceBuilder {
        self.add_shared(name, Arc::new(service))
    }

    /// Begin installing a service that is shared with the caller.
    pub fn add_shared(&self, name: ServiceName, service: Arc<dyn Service>) -> ServiceBuilder {
        ServiceBuilder {
            target: self.clone(),
            name,
            service,
            dependencies: Vec::new(),
            replace: false,
        }
    }

    pub fn graph(&self) -> &ServiceGraph {
        &self.graph
    }

    pub fn parent(&self) -> Option<&ServiceName> {
        self.parent.as_ref()
    }
}

/// Declares a service's dependencies before installing it.
#[must_use = "a service is only added to the graph by `install`"]
pub struct ServiceBuilder {
    target: ServiceTarget,
    name: ServiceName,
    service: Arc<dyn Service>,
    dependencies: Vec<Dependency>,
    replace: bool,
}

impl ServiceBuilder {
    /// Depend on `name` for ordering only.
    pub fn dependency(mut self, name: ServiceName) -> Self {
        self.dependencies.push(Dependency::ordering(name));
        self
    }

    /// Depend on `name` and receive its value, which must be exactly `T`.
    pub fn dependency_into<T>(self, name: ServiceName, slot: &Injected<T>) -> Self
    where
        T: Any + Clone + Send + Sync,
    {
        self.dependency_with(name, slot, |value: T| value)
    }

    /// Depend on `name`, converting its `S` value into the slot's `T`.
    pub fn dependency_with<S, T, F>(mut self, name: ServiceName, slot: &Injected<T>, convert: F) -> Self
    where
        S: Any + Clone + Send + Sync,
        T: Clone + Send + Sync + 'static,
        F: Fn(S) -> T + Send + Sync + 'static,
    {
        self.dependencies
            .push(Dependency::converting(name, slot, convert));
        self
    }

    /// Replace an installed service of the same name instead of failing.
    ///
    /// The old node is stopped (dependents first) and removed; this one takes
    /// its place afterwards.
    pub fn replace_existing(mut self) -> Self {
        self.replace = true;
        self
    }

    /// Add the service to the graph and schedule it.
    pub fn install(self) -> Result<ServiceController> {
        let graph = self.target.graph.clone();
        let name = self.name.clone();
        graph.install(
            NodeSpec {
                name: self.name,
                service: self.service,
                dependencies: self.dependencies,
                parent: self.target.parent,
            },
            self.replace,
        )?;
        Ok(ServiceController { graph, name })
    }
}

/// Handle to one installed service.
#[derive(Clone)]
pub struct ServiceController {
    graph: ServiceGraph,
    name: ServiceName,
}

impl std::fmt::Debug for ServiceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceController")
            .field("name", &self.name)
            .finish()
    }
}

impl ServiceController {
    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    pub fn state(&self) -> Option<ServiceState> {
        self.status().map(|s| s.state)
    }

    pub fn status(&self) -> Option<NodeStatus> {
        self.graph.status(&self.name)
    }

    pub fn value(&self) -> Option<ServiceValue> {
        self.graph.value(&self.name)
    }

    /// Request removal of the service.
    pub fn remove(&self) -> Result<()> {
        self.graph.remove(&self.name)
    }

    /// Wait until the service is up, or report why it never will be.
    pub async fn await_up(&self) -> Result<ServiceValue> {
        self.graph.await_service(&self.name).await
    }

    pub async fn await_removed(&self) {
        self.graph.await_removed(&self.name).await
    }
}
