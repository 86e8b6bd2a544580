//! Extensions and the catalog of registered extensions

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::mounting::ApplicationExtensionContext;
use crate::{Error, Result};

/// A pluggable unit that contributes resources to applications.
///
/// `extend` runs when a resource backed by this extension is installed into
/// an application, and registers that resource's mounts through the
/// context. Mounts are torn down with the installation; `unextend` runs
/// afterwards for any extension-side cleanup.
pub trait Extension: Send + Sync + 'static {
    fn id(&self) -> &str;

    fn extend(&self, ctx: &ApplicationExtensionContext) -> Result<()>;

    fn unextend(&self, _ctx: &ApplicationExtensionContext) {}
}

/// Registry of extensions by id.
#[derive(Default)]
pub struct ExtensionRegistry {
    entries: RwLock<BTreeMap<String, Arc<dyn Extension>>>,
}

impl ExtensionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension. Ids are unique.
    pub fn register(&self, extension: Arc<dyn Extension>) -> Result<()> {
        let id = extension.id().to_string();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.contains_key(&id) {
            return Err(Error::DuplicateExtension(id));
        }
        entries.insert(id, extension);
        Ok(())
    }

    /// Look up an extension by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Extension>> {
        self.read().get(id).cloned()
    }

    /// Check if an extension is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// All registered ids (sorted).
    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Number of registered extensions.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Arc<dyn Extension>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }
}
