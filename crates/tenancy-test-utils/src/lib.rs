//! Shared test utilities for the tenancy workspace.
//!
//! A dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`apps`]: [`TestApps`], a temporary applications directory
//! - [`resource`]: [`RecordingResource`] and the [`EventLog`] it writes to
//! - [`extension`]: [`TestExtension`], mounting recording resources

pub mod apps;
pub mod extension;
pub mod resource;

pub use apps::TestApps;
pub use extension::{TestExtension, Visibility};
pub use resource::{Event, EventKind, EventLog, RecordingResource};
