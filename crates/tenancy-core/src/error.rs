//! Error types for tenancy-core

use std::path::PathBuf;

/// Result type for tenancy-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tenancy-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Identifier unusable as an application or resource id
    #[error("invalid id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    /// No extension registered under this id
    #[error("unknown extension: {0}")]
    UnknownExtension(String),

    /// An extension with this id is already registered
    #[error("extension already registered: {0}")]
    DuplicateExtension(String),

    /// The application is not booted, or not up yet
    #[error("application not available: {0}")]
    UnknownApplication(String),

    /// Server configuration could not be read
    #[error("invalid server configuration at {path}: {message}")]
    ServerConfig { path: PathBuf, message: String },

    /// Configuration value of the wrong shape
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    // Transparent wrappers for underlying crate errors
    /// Filesystem error from tenancy-fs
    #[error(transparent)]
    Fs(#[from] tenancy_fs::Error),

    /// Graph error from tenancy-graph
    #[error(transparent)]
    Graph(#[from] tenancy_graph::GraphError),

    /// Mount error from tenancy-mount
    #[error(transparent)]
    Mount(#[from] tenancy_mount::MountError),

    /// Resource hook error from tenancy-mount
    #[error(transparent)]
    Resource(#[from] tenancy_mount::ResourceError),
}
