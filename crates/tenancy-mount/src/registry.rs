//! Path and media type to resource bindings

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{MediaType, MountError, Resource, Result};

/// Canonical form of a mount path: leading `/`, no trailing or repeated `/`.
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// One resolved binding.
#[derive(Debug, Clone)]
pub struct Binding {
    pub path: String,
    pub media_type: MediaType,
    pub resource: Arc<dyn Resource>,
    pub is_default: bool,
}

#[derive(Default)]
struct PathEntry {
    resources: BTreeMap<MediaType, Arc<dyn Resource>>,
    default: Option<MediaType>,
}

impl PathEntry {
    fn binding(&self, path: &str, media_type: &MediaType) -> Option<Binding> {
        self.resources.get(media_type).map(|resource| Binding {
            path: path.to_string(),
            media_type: media_type.clone(),
            resource: Arc::clone(resource),
            is_default: self.default.as_ref() == Some(media_type),
        })
    }
}

/// Registry of every mount in a server.
///
/// Each path holds at most one resource per media type. A path's default
/// binding answers requests that carry no usable media type hint. Only
/// bindings flagged as default set it, the latest one winning; once the
/// default is unbound the path has none until another is flagged.
#[derive(Default)]
pub struct MountRegistry {
    paths: RwLock<BTreeMap<String, PathEntry>>,
}

impl MountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `resource` at `path` for `media_type`.
    pub fn bind(
        &self,
        path: &str,
        media_type: MediaType,
        resource: Arc<dyn Resource>,
        make_default: bool,
    ) -> Result<()> {
        let path = normalize_path(path);
        let mut paths = self.write();
        let entry = paths.entry(path.clone()).or_default();

        if entry.resources.contains_key(&media_type) {
            return Err(MountError::AlreadyBound {
                path,
                media_type: media_type.to_string(),
            });
        }

        if make_default {
            entry.default = Some(media_type.clone());
        }
        tracing::debug!(
            path = %path,
            media_type = %media_type,
            resource = resource.id(),
            default = entry.default.as_ref() == Some(&media_type),
            "Bound resource"
        );
        entry.resources.insert(media_type, resource);
        Ok(())
    }

    /// Find the resource at `path` for a client hint.
    ///
    /// The hint is an Accept-style list; the first listed media type with an
    /// exact binding wins. Without a hint, or when nothing in it matches,
    /// the path's default binding answers.
    pub fn resolve(&self, path: &str, hint: Option<&str>) -> Result<Binding> {
        let requested = path;
        let path = normalize_path(path);
        let paths = self.read();
        let not_found = || MountError::NotFound {
            path: requested.to_string(),
        };
        let entry = paths.get(&path).ok_or_else(not_found)?;

        let preferred = hint
            .map(MediaType::parse_accept)
            .unwrap_or_default()
            .into_iter()
            .find_map(|media_type| entry.binding(&path, &media_type));

        match preferred {
            Some(binding) => Ok(binding),
            None => entry
                .default
                .as_ref()
                .and_then(|media_type| entry.binding(&path, media_type))
                .ok_or_else(not_found),
        }
    }

    /// Remove the binding for (`path`, `media_type`), returning its resource.
    ///
    /// Removing the default binding leaves the path without a default.
    pub fn unbind(&self, path: &str, media_type: &MediaType) -> Option<Arc<dyn Resource>> {
        let path = normalize_path(path);
        let mut paths = self.write();
        let entry = paths.get_mut(&path)?;
        let removed = entry.resources.remove(media_type)?;

        if entry.default.as_ref() == Some(media_type) {
            entry.default = None;
        }
        if entry.resources.is_empty() {
            paths.remove(&path);
        }
        tracing::debug!(path = %path, media_type = %media_type, "Unbound resource");
        Some(removed)
    }

    /// Remove the binding only if it still points at `resource`.
    ///
    /// Guards against tearing down a binding that a replacement has since
    /// taken over.
    pub fn unbind_resource(
        &self,
        path: &str,
        media_type: &MediaType,
        resource: &Arc<dyn Resource>,
    ) -> bool {
        let bound = {
            let paths = self.read();
            paths
                .get(&normalize_path(path))
                .and_then(|entry| entry.resources.get(media_type))
                .is_some_and(|current| same_resource(current, resource))
        };
        bound && self.unbind(path, media_type).is_some()
    }

    /// All bindings at `path`, ordered by media type.
    pub fn bindings(&self, path: &str) -> Vec<Binding> {
        let path = normalize_path(path);
        let paths = self.read();
        paths
            .get(&path)
            .map(|entry| {
                entry
                    .resources
                    .keys()
                    .filter_map(|media_type| entry.binding(&path, media_type))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn default_media_type(&self, path: &str) -> Option<MediaType> {
        let paths = self.read();
        paths
            .get(&normalize_path(path))
            .and_then(|entry| entry.default.clone())
    }

    /// Every path with at least one binding, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, PathEntry>> {
        self.paths.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, PathEntry>> {
        self.paths.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn same_resource(a: &Arc<dyn Resource>, b: &Arc<dyn Resource>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    struct Named(&'static str);

    impl Resource for Named {
        fn id(&self) -> &str {
            self.0
        }
    }

    fn named(id: &'static str) -> Arc<dyn Resource> {
        Arc::new(Named(id))
    }

    #[rstest]
    #[case("", "/")]
    #[case("/", "/")]
    #[case("demo", "/demo")]
    #[case("/demo/", "/demo")]
    #[case("//admin//applications/demo", "/admin/applications/demo")]
    fn normalizes_paths(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_path(input), expected);
    }

    #[test]
    fn bindings_are_only_default_when_asked() {
        let registry = MountRegistry::new();
        registry
            .bind("/demo/a", MediaType::HTML, named("page"), false)
            .unwrap();

        assert_eq!(registry.default_media_type("/demo/a"), None);
        assert_eq!(
            registry.resolve("/demo/a", None).unwrap_err(),
            MountError::NotFound {
                path: "/demo/a".into()
            }
        );
        let page = registry.resolve("/demo/a", Some("text/html")).unwrap();
        assert_eq!(page.resource.id(), "page");
        assert!(!page.is_default);

        registry
            .bind("/demo/a", MediaType::JSON, named("data"), true)
            .unwrap();
        let binding = registry.resolve("/demo/a", None).unwrap();
        assert_eq!(binding.resource.id(), "data");
        assert!(binding.is_default);
    }

    #[test]
    fn emptied_path_gets_no_implicit_default() {
        let registry = MountRegistry::new();
        registry
            .bind("/a", MediaType::JSON, named("data"), true)
            .unwrap();
        registry.unbind("/a", &MediaType::JSON);
        registry
            .bind("/a", MediaType::HTML, named("page"), false)
            .unwrap();

        assert_eq!(
            registry.resolve("/a", None).unwrap_err(),
            MountError::NotFound { path: "/a".into() }
        );
        assert_eq!(
            registry.resolve("/a", Some("text/html")).unwrap().resource.id(),
            "page"
        );
    }

    #[test]
    fn hint_selects_exact_media_type() {
        let registry = MountRegistry::new();
        registry
            .bind("/a", MediaType::JSON, named("data"), true)
            .unwrap();
        registry
            .bind("/a", MediaType::HTML, named("page"), false)
            .unwrap();

        let html = registry.resolve("/a", Some("text/html")).unwrap();
        assert_eq!(html.resource.id(), "page");
        assert!(!html.is_default);

        let fallback = registry.resolve("/a", Some("image/png")).unwrap();
        assert_eq!(fallback.resource.id(), "data");
    }

    #[test]
    fn duplicate_media_type_is_rejected() {
        let registry = MountRegistry::new();
        registry
            .bind("/a", MediaType::JSON, named("one"), false)
            .unwrap();
        let err = registry
            .bind("/a", MediaType::JSON, named("two"), false)
            .unwrap_err();
        assert_eq!(
            err,
            MountError::AlreadyBound {
                path: "/a".into(),
                media_type: "application/json".into()
            }
        );
        assert_eq!(
            registry
                .resolve("/a", Some("application/json"))
                .unwrap()
                .resource
                .id(),
            "one"
        );
    }

    #[test]
    fn later_default_takes_over() {
        let registry = MountRegistry::new();
        registry
            .bind("/a", MediaType::JSON, named("data"), true)
            .unwrap();
        registry
            .bind("/a", MediaType::HTML, named("page"), true)
            .unwrap();

        assert_eq!(registry.default_media_type("/a"), Some(MediaType::HTML));
        assert_eq!(registry.resolve("/a", None).unwrap().resource.id(), "page");
    }

    #[test]
    fn unbinding_default_leaves_path_without_default() {
        let registry = MountRegistry::new();
        registry
            .bind("/a", MediaType::JSON, named("data"), true)
            .unwrap();
        registry
            .bind("/a", MediaType::HTML, named("page"), false)
            .unwrap();

        assert!(registry.unbind("/a", &MediaType::JSON).is_some());
        assert_eq!(
            registry.resolve("/a", None).unwrap_err(),
            MountError::NotFound { path: "/a".into() }
        );
        assert_eq!(
            registry.resolve("/a", Some("text/html")).unwrap().resource.id(),
            "page"
        );
    }

    #[test]
    fn unbind_resource_ignores_replaced_binding() {
        let registry = MountRegistry::new();
        let old = named("old");
        let new = named("new");
        registry
            .bind("/a", MediaType::JSON, Arc::clone(&old), true)
            .unwrap();
        registry.unbind("/a", &MediaType::JSON);
        registry
            .bind("/a", MediaType::JSON, Arc::clone(&new), true)
            .unwrap();

        assert!(!registry.unbind_resource("/a", &MediaType::JSON, &old));
        assert_eq!(registry.resolve("/a", None).unwrap().resource.id(), "new");
        assert!(registry.unbind_resource("/a", &MediaType::JSON, &new));
        assert!(registry.paths().is_empty());
    }

    #[test]
    fn not_found_carries_requested_path() {
        let registry = MountRegistry::new();
        assert_eq!(
            registry.resolve("missing/child/", None).unwrap_err(),
            MountError::NotFound {
                path: "missing/child/".into()
            }
        );
    }
}
