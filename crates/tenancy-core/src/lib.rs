//! Core of the tenancy resource server
//!
//! Applications are booted as nodes of a [`tenancy_graph::ServiceGraph`].
//! Each application gets a directory, a configuration file, a public
//! context mounted at `/<app>` and an admin resource mounted at
//! `/admin/applications/<app>`. [`Extension`]s contribute further
//! resources, mounted publicly or privately through the
//! [`ApplicationExtensionContext`].
//!
//! [`Server`] ties these together around one graph and one
//! [`tenancy_mount::MountRegistry`].

pub mod application;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod extension;
pub mod mounting;
pub mod names;
pub mod resources;
pub mod server;

pub use application::{Application, BootstrapState, BootstrapTracker};
pub use config::{
    ApplicationConfig, ClientRecord, ConfigurationManager, FilteredView, LoadOutcome,
    ResourceEntry,
};
pub use error::{Error, Result};
pub use extension::{Extension, ExtensionRegistry};
pub use mounting::{AdminResourceWrapper, ApplicationExtensionContext};
pub use resources::{ApplicationAdminResource, ApplicationContextResource};
pub use server::{ApplicationSpec, Server, ServerConfig};
