//! Extension mounting API
//!
//! Extensions mount resources through an [`ApplicationExtensionContext`].
//! Every mount call compiles into a small chain of graph nodes:
//!
//! ```text
//! public:   resource ──────────────────────────────────────────────┐
//!           app context ───────────────────────────────────────── mount
//!
//! private:  filter-config ─ wrapper ─ apply-config ─ lifecycle ── mount
//!           resource ──────┴──────────────────────────┘           │
//!           config manager ┘              app admin resource ─────┘
//! ```
//!
//! A private resource is therefore configured after it is wrapped, started
//! after it is configured, and only resolvable once started. Mounting the
//! same resource again replaces the previous chain.

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tenancy_graph::{
    Injected, Service, ServiceController, ServiceName, ServiceTarget, ServiceValue, StartContext,
    StartError, StopContext, ValueService,
};
use tenancy_mount::{MediaType, MountPoint, Properties, Resource, ResourceError};

use crate::config::{ConfigurationManager, FilteredView};
use crate::resources::{ApplicationAdminResource, ApplicationContextResource};
use crate::{Application, Extension, Result, names};

/// Handed to [`Extension::extend`] for one resource of one application.
pub struct ApplicationExtensionContext {
    target: ServiceTarget,
    application: Arc<Application>,
    extension_id: String,
    resource_id: String,
    configuration: Value,
    boottime: bool,
}

impl ApplicationExtensionContext {
    pub fn application(&self) -> &Arc<Application> {
        &self.application
    }

    pub fn extension_id(&self) -> &str {
        &self.extension_id
    }

    /// Id of the resource being installed; also its path segment.
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// The resource's raw configuration.
    pub fn configuration(&self) -> &Value {
        &self.configuration
    }

    /// Whether the resource is being started from persisted configuration
    /// at application boot, rather than installed at runtime.
    pub fn boottime(&self) -> bool {
        self.boottime
    }

    /// Target for extension-owned nodes; removed with the resource.
    pub fn target(&self) -> &ServiceTarget {
        &self.target
    }

    /// Mount `resource` at `/<app>/<resource id>`.
    pub fn mount_public(
        &self,
        resource: Arc<dyn Resource>,
        media_type: Option<MediaType>,
        make_default: bool,
    ) -> Result<()> {
        let name = names::resource(self.application.id(), &self.resource_id);
        self.target
            .add_service(name.clone(), ValueService::new(resource))
            .replace_existing()
            .install()?;
        self.mount_public_service(name, media_type, make_default)
    }

    /// Mount the `Arc<dyn Resource>` produced by the node `name` publicly.
    pub fn mount_public_service(
        &self,
        name: ServiceName,
        media_type: Option<MediaType>,
        make_default: bool,
    ) -> Result<()> {
        let app_id = self.application.id();
        let mount = Arc::new(MountService::new(&self.resource_id, media_type, make_default));
        self.target
            .add_shared(names::mount(&name), mount.clone())
            .dependency_with(
                names::application_context(app_id),
                &mount.mount_point,
                |context: Arc<ApplicationContextResource>| context.mount_point(),
            )
            .dependency_into(name, &mount.resource)
            .replace_existing()
            .install()?;
        Ok(())
    }

    /// Mount `resource` at `/admin/applications/<app>/<resource id>`.
    pub fn mount_private(
        &self,
        resource: Arc<dyn Resource>,
        media_type: Option<MediaType>,
        make_default: bool,
    ) -> Result<()> {
        let name = names::admin_resource(self.application.id(), &self.resource_id);
        self.target
            .add_service(name.clone(), ValueService::new(resource))
            .replace_existing()
            .install()?;
        self.mount_private_service(name, media_type, make_default)
    }

    /// Mount the `Arc<dyn Resource>` produced by the node `name` privately.
    pub fn mount_private_service(
        &self,
        name: ServiceName,
        media_type: Option<MediaType>,
        make_default: bool,
    ) -> Result<()> {
        let app_id = self.application.id();
        let filter_name = name.append("filter-config");
        let wrapper_name = name.append("wrapper");
        let apply_name = name.append("apply-config");
        let lifecycle_name = name.append("lifecycle");

        let filter = ConfigFilterService {
            view: FilteredView::for_application(&self.application),
            configuration: self.configuration.clone(),
        };
        self.target
            .add_service(filter_name.clone(), filter)
            .replace_existing()
            .install()?;

        let wrapper = Arc::new(WrapperService::new(&self.extension_id, &self.resource_id));
        self.target
            .add_shared(wrapper_name.clone(), wrapper.clone())
            .dependency(filter_name.clone())
            .dependency_into(name.clone(), &wrapper.resource)
            .dependency_into(names::config_manager(app_id), &wrapper.config)
            .replace_existing()
            .install()?;

        let apply = Arc::new(ApplyConfigService::default());
        self.target
            .add_shared(apply_name.clone(), apply.clone())
            .dependency_into(wrapper_name.clone(), &apply.wrapper)
            .dependency_into(filter_name, &apply.configuration)
            .replace_existing()
            .install()?;

        let lifecycle = Arc::new(LifecycleService::default());
        self.target
            .add_shared(lifecycle_name.clone(), lifecycle.clone())
            .dependency(apply_name)
            .dependency_into(name.clone(), &lifecycle.resource)
            .replace_existing()
            .install()?;

        let mount = Arc::new(MountService::new(&self.resource_id, media_type, make_default));
        self.target
            .add_shared(names::mount(&name), mount.clone())
            .dependency(lifecycle_name)
            .dependency_with(
                names::application_admin(app_id),
                &mount.mount_point,
                |admin: Arc<ApplicationAdminResource>| admin.mount_point(),
            )
            .dependency_with(
                wrapper_name,
                &mount.resource,
                |wrapper: Arc<AdminResourceWrapper>| wrapper as Arc<dyn Resource>,
            )
            .replace_existing()
            .install()?;
        Ok(())
    }
}

/// Binds a resource into a mount point while up.
pub(crate) struct MountService {
    child: String,
    media_type: MediaType,
    make_default: bool,
    pub(crate) mount_point: Injected<Arc<MountPoint>>,
    pub(crate) resource: Injected<Arc<dyn Resource>>,
}

impl MountService {
    /// Without a media type the resource is bound as JSON.
    pub(crate) fn new(child: &str, media_type: Option<MediaType>, make_default: bool) -> Self {
        Self {
            child: child.to_string(),
            media_type: media_type.unwrap_or(MediaType::JSON),
            make_default,
            mount_point: Injected::new(),
            resource: Injected::new(),
        }
    }
}

impl Service for MountService {
    fn start(&self, _ctx: &StartContext) -> std::result::Result<ServiceValue, StartError> {
        let mount_point = self.mount_point.require()?;
        let resource = self.resource.require()?;
        let path = mount_point
            .bind(
                &self.child,
                self.media_type.clone(),
                resource,
                self.make_default,
            )
            .map_err(|e| StartError::context("mount failed", e))?;
        tracing::info!(path = %path, media_type = %self.media_type, default = self.make_default, "Mounted resource");
        Ok(Arc::new(path))
    }

    fn stop(&self, _ctx: &StopContext) {
        if let (Some(mount_point), Some(resource)) = (self.mount_point.get(), self.resource.get())
            && mount_point.unbind(&self.child, &self.media_type, &resource)
        {
            tracing::info!(path = %mount_point.child_path(&self.child), media_type = %self.media_type, "Unmounted resource");
        }
    }
}

/// Produces the resource's configuration with placeholders substituted.
struct ConfigFilterService {
    view: FilteredView,
    configuration: Value,
}

impl Service for ConfigFilterService {
    fn start(&self, _ctx: &StartContext) -> std::result::Result<ServiceValue, StartError> {
        Ok(Arc::new(self.view.filter(&self.configuration)))
    }
}

/// Wraps the raw resource in an [`AdminResourceWrapper`].
struct WrapperService {
    extension_id: String,
    resource_id: String,
    resource: Injected<Arc<dyn Resource>>,
    config: Injected<Arc<ConfigurationManager>>,
}

impl WrapperService {
    fn new(extension_id: &str, resource_id: &str) -> Self {
        Self {
            extension_id: extension_id.to_string(),
            resource_id: resource_id.to_string(),
            resource: Injected::new(),
            config: Injected::new(),
        }
    }
}

impl Service for WrapperService {
    fn start(&self, _ctx: &StartContext) -> std::result::Result<ServiceValue, StartError> {
        let wrapper = Arc::new(AdminResourceWrapper::new(
            &self.extension_id,
            &self.resource_id,
            self.resource.require()?,
            self.config.require()?,
        ));
        Ok(Arc::new(wrapper))
    }
}

/// Pushes the filtered configuration into the wrapped resource.
#[derive(Default)]
struct ApplyConfigService {
    wrapper: Injected<Arc<AdminResourceWrapper>>,
    configuration: Injected<Value>,
}

impl Service for ApplyConfigService {
    fn start(&self, ctx: &StartContext) -> std::result::Result<ServiceValue, StartError> {
        let resource = self.wrapper.require()?;
        match self.configuration.require()? {
            Value::Null => {}
            Value::Object(properties) if properties.is_empty() => {}
            Value::Object(properties) => {
                resource
                    .configure(&properties)
                    .map_err(|e| StartError::context("applying configuration failed", e))?;
                tracing::debug!(service = %ctx.name(), resource = resource.id(), "Configuration applied");
            }
            other => {
                return Err(StartError::new(format!(
                    "configuration of {} must be an object, got {other}",
                    resource.id()
                )));
            }
        }
        Ok(Arc::new(()))
    }
}

/// Runs the resource's start/ready hooks, and its stop hook on teardown.
#[derive(Default)]
struct LifecycleService {
    resource: Injected<Arc<dyn Resource>>,
}

impl Service for LifecycleService {
    fn start(&self, _ctx: &StartContext) -> std::result::Result<ServiceValue, StartError> {
        let resource = self.resource.require()?;
        resource
            .start()
            .map_err(|e| StartError::context("resource start failed", e))?;
        resource.on_ready();
        Ok(Arc::new(()))
    }

    fn stop(&self, _ctx: &StopContext) {
        if let Some(resource) = self.resource.get() {
            resource.stop();
        }
    }
}

/// Administrative decorator around a privately mounted resource.
///
/// Reads carry the providing extension's id as `type`. Updates are
/// delegated, then persisted under `resources.<id>` so they survive a
/// restart. The configuration applied while mounting goes through
/// [`configure`](Self::configure) and is not persisted.
pub struct AdminResourceWrapper {
    extension_id: String,
    resource_id: String,
    delegate: Arc<dyn Resource>,
    config: Arc<ConfigurationManager>,
}

impl AdminResourceWrapper {
    pub fn new(
        extension_id: &str,
        resource_id: &str,
        delegate: Arc<dyn Resource>,
        config: Arc<ConfigurationManager>,
    ) -> Self {
        Self {
            extension_id: extension_id.to_string(),
            resource_id: resource_id.to_string(),
            delegate,
            config,
        }
    }

    pub fn delegate(&self) -> &Arc<dyn Resource> {
        &self.delegate
    }

    /// Hand configuration to the resource without persisting it.
    pub fn configure(&self, properties: &Properties) -> std::result::Result<(), ResourceError> {
        self.delegate.update_properties(properties)
    }
}

impl Resource for AdminResourceWrapper {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn properties(&self) -> Properties {
        let mut properties = self.delegate.properties();
        properties.insert("type".into(), Value::from(self.extension_id.as_str()));
        properties
    }

    fn update_properties(&self, properties: &Properties) -> std::result::Result<(), ResourceError> {
        self.delegate.update_properties(properties)?;
        self.config
            .update_resource(
                &self.resource_id,
                json!({"type": self.extension_id, "config": properties}),
            )
            .map_err(|e| ResourceError::Failed {
                id: self.resource_id.clone(),
                message: e.to_string(),
            })
    }
}

/// One resource of one application, provided by an extension.
///
/// Starting it runs the extension's `extend`; the mount chains it creates
/// are its children and go away with it.
pub(crate) struct ApplicationExtensionService {
    resource_id: String,
    extension_id: String,
    configuration: Value,
    boottime: bool,
    application: Injected<Arc<Application>>,
    config: Injected<Arc<ConfigurationManager>>,
    extension: Injected<Arc<dyn Extension>>,
    context: Mutex<Option<ApplicationExtensionContext>>,
}

impl ApplicationExtensionService {
    /// Install (or replace) the node for `resource_id` under `target`.
    pub(crate) fn install(
        target: &ServiceTarget,
        app_id: &str,
        resource_id: &str,
        extension_id: &str,
        configuration: Value,
        boottime: bool,
    ) -> Result<ServiceController> {
        let service = Arc::new(Self {
            resource_id: resource_id.to_string(),
            extension_id: extension_id.to_string(),
            configuration,
            boottime,
            application: Injected::new(),
            config: Injected::new(),
            extension: Injected::new(),
            context: Mutex::new(None),
        });

        let controller = target
            .add_shared(
                names::application_extension(app_id, resource_id),
                service.clone(),
            )
            .dependency_into(names::application(app_id), &service.application)
            .dependency_into(names::config_manager(app_id), &service.config)
            .dependency(names::application_context(app_id))
            .dependency(names::application_admin(app_id))
            .dependency_into(names::extension(extension_id), &service.extension)
            .replace_existing()
            .install()?;
        Ok(controller)
    }
}

impl Service for ApplicationExtensionService {
    fn start(&self, ctx: &StartContext) -> std::result::Result<ServiceValue, StartError> {
        let application = self.application.require()?;
        let extension = self.extension.require()?;

        if !self.boottime {
            let entry = json!({"type": self.extension_id, "config": self.configuration});
            if let Err(e) = self.config.require()?.update_resource(&self.resource_id, entry) {
                tracing::error!(
                    application = %application.id(),
                    resource = %self.resource_id,
                    error = %e,
                    "Failed to persist resource configuration"
                );
            }
        }

        let context = ApplicationExtensionContext {
            target: ctx.child_target(),
            application: Arc::clone(&application),
            extension_id: self.extension_id.clone(),
            resource_id: self.resource_id.clone(),
            configuration: self.configuration.clone(),
            boottime: self.boottime,
        };
        extension.extend(&context).map_err(|e| {
            StartError::context(&format!("extension {} failed", self.extension_id), e)
        })?;

        tracing::info!(
            application = %application.id(),
            resource = %self.resource_id,
            extension = %self.extension_id,
            boottime = self.boottime,
            "Resource installed"
        );
        *self.context.lock().unwrap_or_else(|e| e.into_inner()) = Some(context);
        Ok(Arc::new(self.resource_id.clone()))
    }

    fn stop(&self, _ctx: &StopContext) {
        let context = self.context.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let (Some(context), Some(extension)) = (context, self.extension.get()) {
            extension.unextend(&context);
            tracing::info!(
                application = %context.application.id(),
                resource = %self.resource_id,
                "Resource uninstalled"
            );
        }
    }
}
