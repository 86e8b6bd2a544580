//! Node states and status snapshots

use std::fmt;
use std::time::Instant;

use crate::ServiceName;

/// Lifecycle state of a service node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    /// Not running; waiting for dependencies or for the graph to start
    Down,
    /// `start` is executing
    Starting,
    /// Started, value available to dependents
    Up,
    /// Failed to start, or a dependency failed
    Failed,
    /// `stop` is executing
    Stopping,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Down => write!(f, "down"),
            Self::Starting => write!(f, "starting"),
            Self::Up => write!(f, "up"),
            Self::Failed => write!(f, "failed"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// Why a node is in the [`ServiceState::Failed`] state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Failure {
    /// The node's own `start` returned an error
    #[error("start failed: {0}")]
    StartFailed(String),

    /// A direct or transitive dependency failed; `dependency` is the node
    /// where the failure originated
    #[error("dependency unavailable: {dependency}")]
    DependencyUnavailable { dependency: ServiceName },
}

/// Point-in-time view of one node.
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub name: ServiceName,
    pub state: ServiceState,
    pub failure: Option<Failure>,
    /// Declared dependencies that are not installed
    pub missing: Vec<ServiceName>,
    /// Node whose `start` installed this one
    pub parent: Option<ServiceName>,
    pub started_at: Option<Instant>,
    pub up_at: Option<Instant>,
    pub stopped_at: Option<Instant>,
}

impl NodeStatus {
    pub fn is_up(&self) -> bool {
        self.state == ServiceState::Up
    }
}
