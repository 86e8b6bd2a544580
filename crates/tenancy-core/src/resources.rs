//! An application's own resources: its public context and its admin view

use std::sync::Arc;

use serde_json::{Value, json};
use tenancy_mount::{MountPoint, Properties, Resource, ResourceError};

use crate::Application;
use crate::config::ConfigurationManager;

/// The application's public root, mounted at `/<app>`.
///
/// Publicly mounted extension resources bind beneath its mount point.
pub struct ApplicationContextResource {
    app: Arc<Application>,
    mount_point: Arc<MountPoint>,
}

impl ApplicationContextResource {
    pub fn new(app: Arc<Application>, mount_point: Arc<MountPoint>) -> Self {
        Self { app, mount_point }
    }

    pub fn application(&self) -> &Arc<Application> {
        &self.app
    }

    pub fn mount_point(&self) -> Arc<MountPoint> {
        Arc::clone(&self.mount_point)
    }
}

impl Resource for ApplicationContextResource {
    fn id(&self) -> &str {
        self.app.id()
    }

    fn properties(&self) -> Properties {
        let mut properties = self.mount_point.properties();
        properties.insert("name".into(), Value::from(self.app.name()));
        properties
    }
}

/// Administrative view of the application, mounted at
/// `/admin/applications/<app>`.
///
/// Privately mounted extension resources bind beneath its mount point.
pub struct ApplicationAdminResource {
    app: Arc<Application>,
    config: Arc<ConfigurationManager>,
    mount_point: Arc<MountPoint>,
}

impl ApplicationAdminResource {
    pub fn new(
        app: Arc<Application>,
        config: Arc<ConfigurationManager>,
        mount_point: Arc<MountPoint>,
    ) -> Self {
        Self {
            app,
            config,
            mount_point,
        }
    }

    pub fn mount_point(&self) -> Arc<MountPoint> {
        Arc::clone(&self.mount_point)
    }
}

impl Resource for ApplicationAdminResource {
    fn id(&self) -> &str {
        self.app.id()
    }

    fn properties(&self) -> Properties {
        let resources: Vec<String> = self
            .config
            .config()
            .resources
            .into_iter()
            .map(|entry| entry.id)
            .collect();

        let mut properties = Properties::new();
        properties.insert("id".into(), json!(self.app.id()));
        properties.insert("name".into(), json!(self.app.name()));
        properties.insert("visible".into(), json!(self.app.visible()));
        properties.insert("html-app".into(), json!(self.app.html_app()));
        properties.insert(
            "directory".into(),
            json!(self.app.directory().display().to_string()),
        );
        properties.insert("resources".into(), json!(resources));
        properties
    }

    /// Persist `name`, `visible` and `html-app`, then refresh the entity.
    fn update_properties(&self, properties: &Properties) -> Result<(), ResourceError> {
        self.config
            .update_application(properties)
            .map_err(|e| ResourceError::Invalid {
                id: self.app.id().to_string(),
                message: e.to_string(),
            })?;
        self.app.refresh(&self.config.config());
        tracing::info!(application = %self.app.id(), "Application settings updated");
        Ok(())
    }
}
