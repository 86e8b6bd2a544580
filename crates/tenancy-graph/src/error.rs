//! Error types for tenancy-graph

use crate::{Failure, ServiceName};

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised by the service graph
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A node with this name is already installed
    #[error("service already installed: {0}")]
    DuplicateService(ServiceName),

    /// Installing the node would close a dependency cycle
    #[error("installing {name} would create a dependency cycle through {through}")]
    DependencyCycle {
        name: ServiceName,
        through: ServiceName,
    },

    /// The node failed, either itself or through a dependency
    #[error("service {name} failed: {cause}")]
    ServiceFailed { name: ServiceName, cause: Failure },

    /// No node with this name is installed
    #[error("unknown service: {0}")]
    UnknownService(ServiceName),

    /// The node was removed while being awaited
    #[error("service removed: {0}")]
    Removed(ServiceName),

    /// Malformed service name
    #[error("invalid service name: '{0}'")]
    InvalidName(String),

    /// No tokio runtime to schedule on
    #[error("no tokio runtime available to run the service graph")]
    NoRuntime,
}

/// Error returned by a service's `start` routine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StartError {
    message: String,
}

impl StartError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Wrap an underlying error with a short description of what failed.
    pub fn context(what: &str, err: impl std::fmt::Display) -> Self {
        Self::new(format!("{what}: {err}"))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
