//! Application bootstrap
//!
//! One [`ApplicationService`] node per application. Starting it ensures the
//! application directory and configuration file, builds the
//! [`Application`], and installs the application's subtree:
//!
//! - the configuration manager
//! - the context resource, mounted at `/<app>`
//! - the admin resource, mounted at `/admin/applications/<app>`
//! - stage nodes recording `context-mounted`, `admin-mounted` and `ready`;
//!   `ready` also waits for the application node itself
//! - one extension node per typed entry of the `resources` section
//!
//! Directory and configuration I/O failures are logged and bootstrap
//! continues on in-memory defaults; only failures of the nodes above make
//! the application unavailable.

use std::path::PathBuf;
use std::sync::Arc;

use tenancy_graph::{
    Injected, Service, ServiceName, ServiceTarget, ServiceValue, StartContext, StartError,
    StopContext, ValueService,
};
use tenancy_mount::{MediaType, MountPoint, Resource};

use crate::application::{BootstrapState, BootstrapTracker};
use crate::config::{CONFIG_FILE, ConfigurationManager};
use crate::mounting::{ApplicationExtensionService, MountService};
use crate::resources::{ApplicationAdminResource, ApplicationContextResource};
use crate::{Application, Result, names};

/// Bootstrap node of one application; produces `Arc<Application>`.
pub struct ApplicationService {
    id: String,
    name: Option<String>,
    directory: Option<PathBuf>,
    tracker: BootstrapTracker,
    applications_dir: Injected<PathBuf>,
}

impl ApplicationService {
    /// `directory` defaults to `<applications dir>/<id>`; `name` to the id.
    pub fn new(id: &str, name: Option<&str>, directory: Option<PathBuf>) -> Self {
        Self {
            id: id.to_string(),
            name: name.map(str::to_string),
            directory,
            tracker: BootstrapTracker::new(id),
            applications_dir: Injected::new(),
        }
    }

    pub fn tracker(&self) -> &BootstrapTracker {
        &self.tracker
    }

    pub fn applications_dir_slot(&self) -> &Injected<PathBuf> {
        &self.applications_dir
    }

    fn ensure_directory(&self) -> std::result::Result<PathBuf, StartError> {
        let directory = match &self.directory {
            Some(directory) => directory.clone(),
            None => self.applications_dir.require()?.join(&self.id),
        };
        let directory = match tenancy_fs::ensure_dir(&directory) {
            Ok(directory) => directory,
            Err(e) => {
                tracing::error!(application = %self.id, error = %e, "Failed to create application directory");
                tenancy_fs::absolute(&directory)
            }
        };
        self.tracker.advance(BootstrapState::DirectoryEnsured);
        Ok(directory)
    }

    fn load_configuration(&self, directory: &std::path::Path) -> ConfigurationManager {
        let config = ConfigurationManager::load(directory.join(CONFIG_FILE));
        let name = self.name.as_deref().unwrap_or(&self.id);
        if let Err(e) = config.ensure_defaults(&self.id, name) {
            tracing::error!(application = %self.id, error = %e, "Failed to write default configuration");
        }
        self.tracker.advance(BootstrapState::ConfigLoaded);
        config
    }

    fn install_children(
        &self,
        target: &ServiceTarget,
        app: &Arc<Application>,
        config: Arc<ConfigurationManager>,
    ) -> Result<()> {
        let id = self.id.as_str();

        target
            .add_service(names::config_manager(id), ValueService::new(config.clone()))
            .install()?;

        let context = Arc::new(ContextService::new(app.clone()));
        target
            .add_shared(names::application_context(id), context.clone())
            .dependency_into(names::global_context(), &context.parent)
            .install()?;
        install_mount(
            target,
            id,
            names::application_context(id),
            names::global_context(),
            |context: Arc<ApplicationContextResource>| context as Arc<dyn Resource>,
        )?;

        let admin = Arc::new(AdminService::new(app.clone()));
        target
            .add_shared(names::application_admin(id), admin.clone())
            .dependency_into(names::admin_applications(), &admin.parent)
            .dependency_into(names::config_manager(id), &admin.config)
            .install()?;
        install_mount(
            target,
            id,
            names::application_admin(id),
            names::admin_applications(),
            |admin: Arc<ApplicationAdminResource>| admin as Arc<dyn Resource>,
        )?;

        self.install_stage(
            target,
            names::context_mounted(id),
            BootstrapState::ContextMounted,
            &[names::mount(&names::application_context(id))],
        )?;
        self.install_stage(
            target,
            names::admin_mounted(id),
            BootstrapState::AdminMounted,
            &[
                names::context_mounted(id),
                names::mount(&names::application_admin(id)),
            ],
        )?;
        self.install_stage(
            target,
            names::ready(id),
            BootstrapState::Ready,
            &[names::admin_mounted(id), names::application(id)],
        )?;

        for entry in config.config().resources {
            let Some(extension) = entry.extension else {
                tracing::warn!(application = id, resource = %entry.id, "Resource has no 'type', not starting it");
                continue;
            };
            ApplicationExtensionService::install(
                target,
                id,
                &entry.id,
                &extension,
                entry.config,
                true,
            )?;
        }
        Ok(())
    }

    fn install_stage(
        &self,
        target: &ServiceTarget,
        name: ServiceName,
        stage: BootstrapState,
        after: &[ServiceName],
    ) -> Result<()> {
        let builder = target.add_service(
            name,
            StageService {
                tracker: self.tracker.clone(),
                stage,
            },
        );
        after
            .iter()
            .cloned()
            .fold(builder, |builder, dependency| builder.dependency(dependency))
            .install()?;
        Ok(())
    }
}

impl Service for ApplicationService {
    fn start(&self, ctx: &StartContext) -> std::result::Result<ServiceValue, StartError> {
        tracing::info!(application = %self.id, "Booting application");
        let target = ctx.child_target();

        let directory = self.ensure_directory()?;
        let config = Arc::new(self.load_configuration(&directory));

        let default_name = self.name.as_deref().unwrap_or(&self.id);
        let app = Arc::new(Application::new(
            &self.id,
            default_name,
            directory,
            &config.config(),
            self.tracker.clone(),
            target.clone(),
        ));
        self.tracker.advance(BootstrapState::EntityConstructed);

        self.install_children(&target, &app, config)
            .map_err(|e| StartError::context("installing application services failed", e))?;
        Ok(Arc::new(app))
    }

    fn stop(&self, _ctx: &StopContext) {
        self.tracker.advance(BootstrapState::TornDown);
        tracing::info!(application = %self.id, "Application stopped");
    }
}

/// Mount-binding node for one of the application's own resources, bound
/// as the JSON default at `<parent mount point>/<app>`.
fn install_mount<S, F>(
    target: &ServiceTarget,
    app_id: &str,
    resource: ServiceName,
    mount_point: ServiceName,
    upcast: F,
) -> Result<()>
where
    S: std::any::Any + Clone + Send + Sync,
    F: Fn(S) -> Arc<dyn Resource> + Send + Sync + 'static,
{
    let mount = Arc::new(MountService::new(app_id, Some(MediaType::JSON), true));
    target
        .add_shared(names::mount(&resource), mount.clone())
        .dependency_into(mount_point, &mount.mount_point)
        .dependency_with(resource, &mount.resource, upcast)
        .install()?;
    Ok(())
}

/// Produces `Arc<ApplicationContextResource>`.
struct ContextService {
    app: Arc<Application>,
    parent: Injected<Arc<MountPoint>>,
}

impl ContextService {
    fn new(app: Arc<Application>) -> Self {
        Self {
            app,
            parent: Injected::new(),
        }
    }
}

impl Service for ContextService {
    fn start(&self, _ctx: &StartContext) -> std::result::Result<ServiceValue, StartError> {
        let mount_point = Arc::new(self.parent.require()?.child(self.app.id()));
        Ok(Arc::new(Arc::new(ApplicationContextResource::new(
            self.app.clone(),
            mount_point,
        ))))
    }
}

/// Produces `Arc<ApplicationAdminResource>`.
struct AdminService {
    app: Arc<Application>,
    parent: Injected<Arc<MountPoint>>,
    config: Injected<Arc<ConfigurationManager>>,
}

impl AdminService {
    fn new(app: Arc<Application>) -> Self {
        Self {
            app,
            parent: Injected::new(),
            config: Injected::new(),
        }
    }
}

impl Service for AdminService {
    fn start(&self, _ctx: &StartContext) -> std::result::Result<ServiceValue, StartError> {
        let mount_point = Arc::new(self.parent.require()?.child(self.app.id()));
        Ok(Arc::new(Arc::new(ApplicationAdminResource::new(
            self.app.clone(),
            self.config.require()?,
            mount_point,
        ))))
    }
}

/// Records that bootstrap reached `stage` once its dependencies are up.
struct StageService {
    tracker: BootstrapTracker,
    stage: BootstrapState,
}

impl Service for StageService {
    fn start(&self, ctx: &StartContext) -> std::result::Result<ServiceValue, StartError> {
        self.tracker.advance(self.stage);
        tracing::debug!(service = %ctx.name(), stage = %self.stage, "Bootstrap stage reached");
        Ok(Arc::new(self.stage))
    }
}
