//! The server container

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tenancy_graph::{GraphError, ServiceController, ServiceGraph, ValueService};
use tenancy_mount::{Binding, MountPoint, MountRegistry};

use crate::application::{BootstrapState, BootstrapTracker};
use crate::bootstrap::ApplicationService;
use crate::config::{CONFIG_FILE, ConfigurationManager};
use crate::mounting::ApplicationExtensionService;
use crate::{Application, Error, Extension, ExtensionRegistry, Result, names};

/// An application listed in the server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApplicationSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Defaults to `<applications dir>/<id>`
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// Server configuration, read from TOML.
///
/// ```toml
/// applications-dir = "/srv/tenancy/applications"
///
/// [[applications]]
/// id = "demo"
/// name = "Demo"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServerConfig {
    pub applications_dir: PathBuf,
    pub applications: Vec<ApplicationSpec>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            applications_dir: default_applications_dir(),
            applications: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = tenancy_fs::read_text(path)?;
        toml::from_str(&content).map_err(|e| Error::ServerConfig {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn with_applications_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.applications_dir = dir.into();
        self
    }

    /// Subdirectories of the applications directory holding an
    /// `application.json`, skipping ids listed already. Sorted by id.
    pub fn discover(&self) -> Result<Vec<ApplicationSpec>> {
        let dir = &self.applications_dir;
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(tenancy_fs::Error::io(dir, e).into()),
        };

        let mut found = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| tenancy_fs::Error::io(dir, e))?.path();
            if !path.join(CONFIG_FILE).is_file() {
                continue;
            }
            let Some(id) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if validate_id(id).is_err() || self.applications.iter().any(|app| app.id == id) {
                tracing::debug!(path = %path.display(), "Skipping application directory");
                continue;
            }
            found.push(ApplicationSpec {
                id: id.to_string(),
                name: None,
                directory: None,
            });
        }
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }
}

/// Platform data directory, e.g. `~/.local/share/tenancy/applications`.
fn default_applications_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tenancy")
        .join("applications")
}

/// Owns the service graph and mount registry of one server.
///
/// Creating a server installs the root nodes: the applications directory,
/// the global mount point `/` and the admin mount point
/// `/admin/applications`. Applications and extensions are added to the
/// running graph afterwards, in any order.
pub struct Server {
    config: ServerConfig,
    graph: ServiceGraph,
    registry: Arc<MountRegistry>,
    extensions: ExtensionRegistry,
    trackers: Mutex<HashMap<String, BootstrapTracker>>,
}

impl Server {
    /// Create a server on the current tokio runtime.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let graph = ServiceGraph::new()?;
        let registry = Arc::new(MountRegistry::new());
        let target = graph.target();

        target
            .add_service(
                names::applications_dir(),
                ValueService::new(config.applications_dir.clone()),
            )
            .install()?;
        let root = MountPoint::root(Arc::clone(&registry));
        let admin_applications = root.child("admin").child("applications");
        target
            .add_service(names::global_context(), ValueService::new(Arc::new(root)))
            .install()?;
        target
            .add_service(
                names::admin_applications(),
                ValueService::new(Arc::new(admin_applications)),
            )
            .install()?;

        graph.start();
        tracing::info!(applications_dir = %config.applications_dir.display(), "Server started");

        Ok(Self {
            config,
            graph,
            registry,
            extensions: ExtensionRegistry::new(),
            trackers: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn graph(&self) -> &ServiceGraph {
        &self.graph
    }

    pub fn registry(&self) -> &Arc<MountRegistry> {
        &self.registry
    }

    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    /// Register an extension and install its node. Resources waiting for
    /// it start once the node is up.
    pub fn register_extension(&self, extension: Arc<dyn Extension>) -> Result<()> {
        let id = extension.id().to_string();
        validate_id(&id)?;
        self.extensions.register(Arc::clone(&extension))?;
        self.graph
            .target()
            .add_service(names::extension(&id), ValueService::new(extension))
            .install()?;
        tracing::info!(extension = %id, "Extension registered");
        Ok(())
    }

    /// Boot an application.
    pub fn boot_application(
        &self,
        id: &str,
        name: Option<&str>,
        directory: Option<PathBuf>,
    ) -> Result<ServiceController> {
        validate_id(id)?;
        let service = Arc::new(ApplicationService::new(id, name, directory));
        let controller = self
            .graph
            .target()
            .add_shared(names::application(id), service.clone())
            .dependency_into(names::applications_dir(), service.applications_dir_slot())
            .install()?;
        self.trackers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), service.tracker().clone());
        Ok(controller)
    }

    /// Boot every application listed in the configuration.
    pub fn boot_configured(&self) -> Result<Vec<ServiceController>> {
        self.config
            .applications
            .iter()
            .map(|app| self.boot_application(&app.id, app.name.as_deref(), app.directory.clone()))
            .collect()
    }

    pub fn application_state(&self, id: &str) -> Option<BootstrapState> {
        self.trackers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .map(BootstrapTracker::state)
    }

    /// The application, if its bootstrap node is up.
    pub fn application(&self, id: &str) -> Option<Arc<Application>> {
        self.graph
            .value(&names::application(id))?
            .downcast_ref::<Arc<Application>>()
            .cloned()
    }

    /// Wait until the application is mounted and ready.
    pub async fn await_application_ready(&self, id: &str) -> Result<Arc<Application>> {
        self.graph.await_service(&names::ready(id)).await?;
        self.application(id)
            .ok_or_else(|| Error::UnknownApplication(id.to_string()))
    }

    /// Install a resource into a running application, replacing any
    /// installation with the same id. The entry is persisted once the
    /// resource's node starts.
    pub fn install_resource(
        &self,
        app_id: &str,
        resource_id: &str,
        extension_id: &str,
        configuration: Value,
    ) -> Result<ServiceController> {
        validate_id(resource_id)?;
        if !self.extensions.contains(extension_id) {
            return Err(Error::UnknownExtension(extension_id.to_string()));
        }
        let app = self
            .application(app_id)
            .ok_or_else(|| Error::UnknownApplication(app_id.to_string()))?;
        ApplicationExtensionService::install(
            app.target(),
            app_id,
            resource_id,
            extension_id,
            configuration,
            false,
        )
    }

    /// Uninstall a resource and drop it from the application's configuration.
    pub fn remove_resource(&self, app_id: &str, resource_id: &str) -> Result<()> {
        match self
            .graph
            .remove(&names::application_extension(app_id, resource_id))
        {
            Ok(()) | Err(GraphError::UnknownService(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let config = self
            .graph
            .value(&names::config_manager(app_id))
            .and_then(|value| value.downcast_ref::<Arc<ConfigurationManager>>().cloned())
            .ok_or_else(|| Error::UnknownApplication(app_id.to_string()))?;
        if config.remove_resource(resource_id)? {
            tracing::info!(application = app_id, resource = resource_id, "Resource removed");
        }
        Ok(())
    }

    /// Resolve a mount path with an optional Accept-style media hint.
    pub fn resolve(&self, path: &str, hint: Option<&str>) -> Result<Binding> {
        Ok(self.registry.resolve(path, hint)?)
    }

    /// Stop every node in reverse dependency order.
    pub async fn shutdown(&self) {
        self.graph.shutdown().await;
    }
}

/// Ids become path segments and service name segments.
fn validate_id(id: &str) -> Result<()> {
    let reason = if id.is_empty() {
        Some("must not be empty")
    } else if id.contains('/') {
        Some("must not contain '/'")
    } else if id.chars().any(char::is_whitespace) {
        Some("must not contain whitespace")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(Error::InvalidId {
            id: id.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
