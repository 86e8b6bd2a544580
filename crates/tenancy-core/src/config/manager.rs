//! Loading and persisting an application's configuration tree

use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde_json::{Map, Value};
use tenancy_fs::JsonStore;

use super::{ApplicationConfig, default_tree};
use crate::{Error, Result};

/// What `load` found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    Missing,
    /// The file exists but could not be read or parsed
    Unreadable,
}

struct State {
    tree: Option<Value>,
    outcome: LoadOutcome,
}

/// Owner of one application's configuration tree.
///
/// The tree is shared read-only through [`snapshot`](Self::snapshot); every
/// change goes through this manager, which serializes writers and persists
/// atomically.
pub struct ConfigurationManager {
    path: PathBuf,
    store: JsonStore,
    state: RwLock<State>,
    writer: Mutex<()>,
}

impl ConfigurationManager {
    /// Load the tree at `path`.
    ///
    /// A missing file, or one that cannot be read or parsed, leaves the
    /// manager without a tree; failures are logged, never returned.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let store = JsonStore::new();
        let (tree, outcome) = match store.load_optional::<Value>(&path) {
            Ok(Some(tree)) if tree.is_object() => (Some(tree), LoadOutcome::Loaded),
            Ok(Some(_)) => {
                tracing::error!(path = %path.display(), "Application configuration is not a JSON object");
                (None, LoadOutcome::Unreadable)
            }
            Ok(None) => (None, LoadOutcome::Missing),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to load application configuration");
                (None, LoadOutcome::Unreadable)
            }
        };

        Self {
            path,
            store,
            state: RwLock::new(State { tree, outcome }),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn outcome(&self) -> LoadOutcome {
        self.read(|state| state.outcome)
    }

    /// Copy of the current tree.
    pub fn snapshot(&self) -> Option<Value> {
        self.read(|state| state.tree.clone())
    }

    /// Typed view of the current tree.
    pub fn config(&self) -> ApplicationConfig {
        self.read(|state| {
            state
                .tree
                .as_ref()
                .map(ApplicationConfig::from_tree)
                .unwrap_or_default()
        })
    }

    /// The `config` object of `resources.<id>`.
    pub fn resource_config(&self, resource_id: &str) -> Option<Value> {
        self.read(|state| {
            state
                .tree
                .as_ref()?
                .get("resources")?
                .get(resource_id)?
                .get("config")
                .cloned()
        })
    }

    /// Synthesize and persist the minimal tree when there is none.
    ///
    /// Returns whether a file was written. An unreadable file is left in
    /// place; the defaults then only live in memory.
    pub fn ensure_defaults(&self, id: &str, name: &str) -> Result<bool> {
        let _writer = self.lock_writer();
        if self.read(|state| state.tree.is_some()) {
            return Ok(false);
        }

        let tree = default_tree(id, name);
        let outcome = self.outcome();
        self.replace(Some(tree.clone()), outcome);

        if outcome == LoadOutcome::Unreadable {
            tracing::warn!(path = %self.path.display(), "Not overwriting unreadable configuration, defaults kept in memory");
            return Ok(false);
        }

        self.store.save(&self.path, &tree)?;
        self.replace(Some(tree), LoadOutcome::Loaded);
        tracing::info!(path = %self.path.display(), application = id, "Wrote default configuration");
        Ok(true)
    }

    /// Set `resources.<id>` to `entry` and persist.
    pub fn update_resource(&self, resource_id: &str, entry: Value) -> Result<()> {
        self.modify(|root| {
            with_resources(root, |resources| {
                resources.insert(resource_id.to_string(), entry);
            })
        })?;
        tracing::debug!(path = %self.path.display(), resource = resource_id, "Persisted resource configuration");
        Ok(())
    }

    /// Drop `resources.<id>` and persist. Returns whether it was present.
    pub fn remove_resource(&self, resource_id: &str) -> Result<bool> {
        let present = self.read(|state| {
            state
                .tree
                .as_ref()
                .and_then(|tree| tree.get("resources")?.get(resource_id))
                .is_some()
        });
        if !present {
            return Ok(false);
        }
        self.modify(|root| {
            with_resources(root, |resources| remove_ordered(resources, resource_id).is_some())
        })
    }

    /// Persist edits of `name`, `visible` and `html-app`; other keys in
    /// `properties` are ignored. A null `html-app` removes it.
    pub fn update_application(&self, properties: &Map<String, Value>) -> Result<()> {
        for (key, valid) in [
            ("name", properties.get("name").is_none_or(Value::is_string)),
            ("visible", properties.get("visible").is_none_or(Value::is_boolean)),
            (
                "html-app",
                properties
                    .get("html-app")
                    .is_none_or(|v| v.is_string() || v.is_null()),
            ),
        ] {
            if !valid {
                return Err(Error::InvalidConfig {
                    message: format!("'{key}' has the wrong type"),
                });
            }
        }

        self.modify(|root| {
            for key in ["name", "visible"] {
                if let Some(value) = properties.get(key) {
                    root.insert(key.to_string(), value.clone());
                }
            }
            match properties.get("html-app") {
                Some(Value::Null) => {
                    remove_ordered(root, "html-app");
                }
                Some(value) => {
                    root.insert("html-app".to_string(), value.clone());
                }
                None => {}
            }
        })
    }

    /// Apply `change` to a copy of the tree, persist it, then publish it.
    ///
    /// Refused while the file on disk is unreadable: writing would replace
    /// its content with the in-memory defaults.
    fn modify<R>(&self, change: impl FnOnce(&mut Map<String, Value>) -> R) -> Result<R> {
        let _writer = self.lock_writer();
        if self.outcome() == LoadOutcome::Unreadable {
            tracing::error!(path = %self.path.display(), "Refusing to overwrite unreadable configuration");
            return Err(Error::InvalidConfig {
                message: format!(
                    "{} could not be read; fix or remove it before making changes",
                    self.path.display()
                ),
            });
        }
        let mut root = match self.snapshot() {
            Some(Value::Object(root)) => root,
            _ => Map::new(),
        };

        let output = change(&mut root);
        let tree = Value::Object(root);
        self.store.save(&self.path, &tree)?;
        self.replace(Some(tree), LoadOutcome::Loaded);
        Ok(output)
    }

    fn read<R>(&self, f: impl FnOnce(&State) -> R) -> R {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        f(&state)
    }

    fn replace(&self, tree: Option<Value>, outcome: LoadOutcome) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.tree = tree;
        state.outcome = outcome;
    }

    fn lock_writer(&self) -> std::sync::MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for ConfigurationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationManager")
            .field("path", &self.path)
            .field("outcome", &self.outcome())
            .finish()
    }
}

fn with_resources<R>(
    root: &mut Map<String, Value>,
    change: impl FnOnce(&mut Map<String, Value>) -> R,
) -> R {
    if !root.get("resources").is_some_and(Value::is_object) {
        if root.contains_key("resources") {
            tracing::warn!("Replacing non-object 'resources' section");
        }
        root.insert("resources".to_string(), Value::Object(Map::new()));
    }
    match root.get_mut("resources") {
        Some(Value::Object(resources)) => change(resources),
        _ => change(&mut Map::new()),
    }
}

/// Remove `key`, keeping the order of the remaining entries.
fn remove_ordered(map: &mut Map<String, Value>, key: &str) -> Option<Value> {
    let removed = map.get(key).cloned()?;
    *map = std::mem::take(map)
        .into_iter()
        .filter(|(k, _)| k != key)
        .collect();
    Some(removed)
}
