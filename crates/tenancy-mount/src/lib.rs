//! Resources and mount resolution
//!
//! A [`MountRegistry`] maps logical paths to resources. One path may carry
//! several resources distinguished by [`MediaType`], one of which is the
//! path's default. [`MountPoint`]s scope the registry to a path prefix and
//! are what applications and extensions mount their resources into.

pub mod error;
pub mod media;
pub mod mount_point;
pub mod registry;
pub mod resource;

pub use error::{MountError, ResourceError, Result};
pub use media::MediaType;
pub use mount_point::MountPoint;
pub use registry::{Binding, MountRegistry, normalize_path};
pub use resource::{Properties, Resource};
