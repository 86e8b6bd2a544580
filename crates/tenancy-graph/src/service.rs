//! Service trait and start/stop contexts

use std::any::Any;
use std::sync::Arc;

use crate::{ServiceGraph, ServiceName, ServiceTarget, StartError};

/// Value produced by a started service, handed to dependents.
pub type ServiceValue = Arc<dyn Any + Send + Sync>;

/// A node of the service graph.
///
/// `start` runs once every dependency is up and its injected slots are
/// filled; `stop` runs once every dependent that consumed this node has
/// stopped. Both run on the blocking pool and may perform blocking I/O.
pub trait Service: Send + Sync + 'static {
    fn start(&self, ctx: &StartContext) -> Result<ServiceValue, StartError>;

    fn stop(&self, _ctx: &StopContext) {}
}

/// Passed to [`Service::start`].
pub struct StartContext {
    name: ServiceName,
    graph: ServiceGraph,
}

impl StartContext {
    pub(crate) fn new(name: ServiceName, graph: ServiceGraph) -> Self {
        Self { name, graph }
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    /// Target for installing nodes owned by this one.
    ///
    /// Children are stopped and removed before this node stops, and removed
    /// if this node fails to start.
    pub fn child_target(&self) -> ServiceTarget {
        ServiceTarget::child(self.graph.clone(), self.name.clone())
    }
}

/// Passed to [`Service::stop`].
pub struct StopContext {
    name: ServiceName,
}

impl StopContext {
    pub(crate) fn new(name: ServiceName) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }
}

/// Service producing a fixed value.
#[derive(Debug, Clone)]
pub struct ValueService<T> {
    value: T,
}

impl<T> ValueService<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T: Clone + Send + Sync + 'static> Service for ValueService<T> {
    fn start(&self, _ctx: &StartContext) -> Result<ServiceValue, StartError> {
        Ok(Arc::new(self.value.clone()))
    }
}
