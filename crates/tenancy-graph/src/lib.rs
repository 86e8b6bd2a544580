//! Service graph engine
//!
//! Nodes ("services") are kept in a flat map keyed by hierarchical
//! [`ServiceName`]s. Each node declares named dependencies, optionally
//! receiving a dependency's produced value through an [`Injected`] slot. The
//! scheduler starts a node once every dependency is up, runs independent
//! nodes concurrently on the blocking pool, fails dependents of failed nodes,
//! and tears nodes down in reverse dependency order.
//!
//! # Example
//!
//! ```ignore
//! use tenancy_graph::{Injected, ServiceGraph, ServiceName, ValueService};
//!
//! let graph = ServiceGraph::new()?;
//! let target = graph.target();
//! target
//!     .add_service(ServiceName::of(["config"]), ValueService::new(42u32))
//!     .install()?;
//! let slot = Injected::<u32>::new();
//! target
//!     .add_service(ServiceName::of(["consumer"]), Consumer::new(slot.clone()))
//!     .dependency_into(ServiceName::of(["config"]), &slot)
//!     .install()?;
//! graph.start();
//! graph.await_settled().await;
//! ```

pub mod error;
pub mod graph;
pub mod inject;
pub mod name;
pub mod service;
pub mod status;
pub mod target;

pub use error::{GraphError, Result, StartError};
pub use graph::ServiceGraph;
pub use inject::Injected;
pub use name::ServiceName;
pub use service::{Service, ServiceValue, StartContext, StopContext, ValueService};
pub use status::{Failure, NodeStatus, ServiceState};
pub use target::{ServiceBuilder, ServiceController, ServiceTarget};
