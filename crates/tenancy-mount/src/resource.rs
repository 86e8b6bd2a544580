//! The resource contract seen by the mounting core

use serde_json::Value;

use crate::ResourceError;

/// Flat or nested property map of a resource.
pub type Properties = serde_json::Map<String, Value>;

/// A REST-addressable object mounted into an application.
///
/// Concrete resource types live outside the core; all the core needs are
/// the lifecycle hooks and property access below. Configuration arrives
/// through [`Resource::update_properties`] already filtered, never as the
/// raw application tree.
pub trait Resource: Send + Sync {
    fn id(&self) -> &str;

    /// Called once configuration has been applied, before the resource
    /// becomes reachable through an admin mount.
    fn start(&self) -> Result<(), ResourceError> {
        Ok(())
    }

    /// Called after a successful `start`.
    fn on_ready(&self) {}

    fn stop(&self) {}

    fn properties(&self) -> Properties {
        Properties::new()
    }

    fn update_properties(&self, _properties: &Properties) -> Result<(), ResourceError> {
        Err(ResourceError::NotSupported {
            id: self.id().to_string(),
            operation: "update".to_string(),
        })
    }
}

impl std::fmt::Debug for dyn Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource").field("id", &self.id()).finish()
    }
}
