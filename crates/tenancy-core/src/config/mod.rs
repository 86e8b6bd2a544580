//! Per-application configuration
//!
//! An application's configuration is a JSON tree stored in
//! `<app dir>/application.json`. [`ConfigurationManager`] owns the tree and
//! is the only writer; [`ApplicationConfig`] is the typed read of its
//! recognized keys; [`FilteredView`] is the reduced mapping handed to
//! resources instead of the raw tree.

mod filter;
mod manager;
mod tree;

pub use filter::FilteredView;
pub use manager::{ConfigurationManager, LoadOutcome};
pub use tree::{ApplicationConfig, CONFIG_FILE, ClientRecord, ResourceEntry, default_tree};
