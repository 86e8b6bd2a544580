//! Error types for tenancy-mount

/// Result type for mount operations
pub type Result<T> = std::result::Result<T, MountError>;

/// Errors raised by the mount registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MountError {
    /// Nothing resolvable at the requested path
    #[error("resource not found: {path}")]
    NotFound { path: String },

    /// The (path, media type) pair already has a binding
    #[error("{path} already has a {media_type} binding")]
    AlreadyBound { path: String, media_type: String },

    /// Malformed media type
    #[error("invalid media type: '{0}'")]
    InvalidMediaType(String),
}

/// Errors raised by resource hooks
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    /// The resource does not support the operation
    #[error("resource {id} does not support {operation}")]
    NotSupported { id: String, operation: String },

    /// Rejected input, e.g. a malformed configuration value
    #[error("invalid value for resource {id}: {message}")]
    Invalid { id: String, message: String },

    /// The hook itself failed
    #[error("resource {id} failed: {message}")]
    Failed { id: String, message: String },
}
