//! Prefix-scoped views onto the registry

use std::sync::Arc;

use serde_json::Value;

use crate::{Binding, MediaType, MountRegistry, Properties, Resource, Result, normalize_path};

/// A container resource at one path; children mount beneath it.
///
/// An application's public context and its admin resource are both mount
/// points: `/<app>` and `/admin/applications/<app>` respectively.
#[derive(Clone)]
pub struct MountPoint {
    id: String,
    path: String,
    registry: Arc<MountRegistry>,
}

impl MountPoint {
    /// The registry root, `/`.
    pub fn root(registry: Arc<MountRegistry>) -> Self {
        Self {
            id: String::new(),
            path: "/".to_string(),
            registry,
        }
    }

    /// A mount point at an absolute `path`.
    pub fn at(id: impl Into<String>, path: &str, registry: Arc<MountRegistry>) -> Self {
        Self {
            id: id.into(),
            path: normalize_path(path),
            registry,
        }
    }

    /// A nested mount point one segment below this one.
    pub fn child(&self, id: &str) -> MountPoint {
        MountPoint::at(id, &self.child_path(id), Arc::clone(&self.registry))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn registry(&self) -> &Arc<MountRegistry> {
        &self.registry
    }

    pub fn child_path(&self, child: &str) -> String {
        normalize_path(&format!("{}/{}", self.path, child))
    }

    /// Bind `resource` under `child`, returning the full path.
    pub fn bind(
        &self,
        child: &str,
        media_type: MediaType,
        resource: Arc<dyn Resource>,
        make_default: bool,
    ) -> Result<String> {
        let path = self.child_path(child);
        self.registry
            .bind(&path, media_type, resource, make_default)?;
        Ok(path)
    }

    /// Remove `child`'s binding if it still points at `resource`.
    pub fn unbind(&self, child: &str, media_type: &MediaType, resource: &Arc<dyn Resource>) -> bool {
        self.registry
            .unbind_resource(&self.child_path(child), media_type, resource)
    }

    pub fn resolve(&self, child: &str, hint: Option<&str>) -> Result<Binding> {
        self.registry.resolve(&self.child_path(child), hint)
    }

    /// Ids of the direct children that have bindings.
    pub fn members(&self) -> Vec<String> {
        let prefix = if self.path == "/" {
            "/".to_string()
        } else {
            format!("{}/", self.path)
        };
        self.registry
            .paths()
            .into_iter()
            .filter_map(|path| {
                let rest = path.strip_prefix(&prefix)?;
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect()
    }
}

impl Resource for MountPoint {
    fn id(&self) -> &str {
        &self.id
    }

    fn properties(&self) -> Properties {
        let mut properties = Properties::new();
        properties.insert("id".into(), Value::from(self.id.as_str()));
        properties.insert("path".into(), Value::from(self.path.as_str()));
        properties.insert("members".into(), Value::from(self.members()));
        properties
    }
}

impl std::fmt::Debug for MountPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountPoint")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish()
    }
}
