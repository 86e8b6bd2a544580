//! Filesystem helpers for the tenancy resource server
//!
//! Provides locked atomic writes, canonical JSON persistence and directory
//! helpers used by the per-application configuration layer.

pub mod error;
pub mod io;
pub mod store;

pub use error::{Error, Result};
pub use io::{LockRetry, absolute, ensure_dir, read_if_exists, read_text, write_atomic};
pub use store::{JsonStore, to_canonical_bytes};
