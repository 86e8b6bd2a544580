//! The application entity

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use tenancy_graph::ServiceTarget;

use crate::config::{ApplicationConfig, ClientRecord};

/// Bootstrap progress of one application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BootstrapState {
    Uninitialized,
    DirectoryEnsured,
    ConfigLoaded,
    EntityConstructed,
    ContextMounted,
    AdminMounted,
    Ready,
    TornDown,
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::DirectoryEnsured => "directory-ensured",
            Self::ConfigLoaded => "config-loaded",
            Self::EntityConstructed => "entity-constructed",
            Self::ContextMounted => "context-mounted",
            Self::AdminMounted => "admin-mounted",
            Self::Ready => "ready",
            Self::TornDown => "torn-down",
        };
        f.write_str(name)
    }
}

/// Shared, observable bootstrap state of one application.
#[derive(Debug, Clone)]
pub struct BootstrapTracker {
    app_id: Arc<str>,
    state: Arc<Mutex<BootstrapState>>,
}

impl BootstrapTracker {
    pub fn new(app_id: &str) -> Self {
        Self {
            app_id: Arc::from(app_id),
            state: Arc::new(Mutex::new(BootstrapState::Uninitialized)),
        }
    }

    pub fn state(&self) -> BootstrapState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn advance(&self, next: BootstrapState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != next {
            tracing::debug!(application = %self.app_id, from = %*state, to = %next, "Bootstrap state");
            *state = next;
        }
    }
}

#[derive(Debug)]
struct Settings {
    name: String,
    html_app: Option<String>,
    visible: bool,
    clients: BTreeMap<String, ClientRecord>,
}

impl Settings {
    fn from_config(id: &str, fallback_name: &str, config: &ApplicationConfig) -> Self {
        Self {
            name: config
                .name
                .clone()
                .unwrap_or_else(|| fallback_name.to_string()),
            html_app: config
                .html_app
                .as_deref()
                .map(|path| format!("/{id}/{}", path.trim_start_matches('/'))),
            visible: config.visible,
            clients: config.clients.clone(),
        }
    }
}

/// One tenant of the server.
///
/// Built once per boot by the application's bootstrap node and shared as
/// `Arc<Application>`. Only [`refresh`](Self::refresh) changes it, from a
/// re-read of the configuration.
pub struct Application {
    id: String,
    directory: PathBuf,
    default_name: String,
    settings: RwLock<Settings>,
    tracker: BootstrapTracker,
    target: ServiceTarget,
}

impl Application {
    /// `default_name` is used when the configuration has no `name`.
    pub fn new(
        id: &str,
        default_name: &str,
        directory: PathBuf,
        config: &ApplicationConfig,
        tracker: BootstrapTracker,
        target: ServiceTarget,
    ) -> Self {
        Self {
            id: id.to_string(),
            directory,
            default_name: default_name.to_string(),
            settings: RwLock::new(Settings::from_config(id, default_name, config)),
            tracker,
            target,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> String {
        self.read(|s| s.name.clone())
    }

    /// Absolute path of the application's directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the embedded html application, prefixed with the id.
    pub fn html_app(&self) -> Option<String> {
        self.read(|s| s.html_app.clone())
    }

    pub fn visible(&self) -> bool {
        self.read(|s| s.visible)
    }

    pub fn clients(&self) -> Vec<ClientRecord> {
        self.read(|s| s.clients.values().cloned().collect())
    }

    pub fn client(&self, id: &str) -> Option<ClientRecord> {
        self.read(|s| s.clients.get(id).cloned())
    }

    pub fn state(&self) -> BootstrapState {
        self.tracker.state()
    }

    /// Target owning nodes installed for this application after boot.
    pub fn target(&self) -> &ServiceTarget {
        &self.target
    }

    /// Re-read settings from configuration.
    pub fn refresh(&self, config: &ApplicationConfig) {
        let settings = Settings::from_config(&self.id, &self.default_name, config);
        *self.settings.write().unwrap_or_else(|e| e.into_inner()) = settings;
        tracing::debug!(application = %self.id, "Application settings refreshed");
    }

    fn read<R>(&self, f: impl FnOnce(&Settings) -> R) -> R {
        let settings = self.settings.read().unwrap_or_else(|e| e.into_inner());
        f(&settings)
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("id", &self.id)
            .field("directory", &self.directory)
            .field("settings", &*self.settings.read().unwrap_or_else(|e| e.into_inner()))
            .finish()
    }
}
