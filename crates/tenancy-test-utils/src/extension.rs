//! An extension mounting recording resources.

use std::sync::Arc;

use tenancy_core::{ApplicationExtensionContext, Extension, Result};
use tenancy_mount::MediaType;

use crate::{EventKind, EventLog, RecordingResource};

/// Where [`TestExtension`] mounts its resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
    Both,
}

/// Mounts one [`RecordingResource`] per installed resource id.
pub struct TestExtension {
    id: String,
    log: EventLog,
    visibility: Visibility,
    media_type: Option<MediaType>,
    make_default: bool,
    fail_start: bool,
    reject_config: bool,
}

impl TestExtension {
    pub fn new(id: &str, log: EventLog) -> Self {
        Self {
            id: id.to_string(),
            log,
            visibility: Visibility::Private,
            media_type: None,
            make_default: true,
            fail_start: false,
            reject_config: false,
        }
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Media type to mount under; by default JSON, as the path's default.
    pub fn media_type(mut self, media_type: MediaType, make_default: bool) -> Self {
        self.media_type = Some(media_type);
        self.make_default = make_default;
        self
    }

    /// Resources fail in `start`.
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Resources reject their configuration.
    pub fn rejecting_config(mut self) -> Self {
        self.reject_config = true;
        self
    }

    pub fn into_arc(self) -> Arc<dyn Extension> {
        Arc::new(self)
    }

    fn resource(&self, id: &str) -> RecordingResource {
        let mut resource = RecordingResource::new(id, self.log.clone());
        if self.fail_start {
            resource = resource.failing_start();
        }
        if self.reject_config {
            resource = resource.rejecting_config();
        }
        resource
    }
}

impl Extension for TestExtension {
    fn id(&self) -> &str {
        &self.id
    }

    fn extend(&self, ctx: &ApplicationExtensionContext) -> Result<()> {
        self.log.record(ctx.resource_id(), EventKind::Extended);
        if matches!(self.visibility, Visibility::Public | Visibility::Both) {
            ctx.mount_public(
                Arc::new(self.resource(ctx.resource_id())),
                self.media_type.clone(),
                self.make_default,
            )?;
        }
        if matches!(self.visibility, Visibility::Private | Visibility::Both) {
            ctx.mount_private(
                Arc::new(self.resource(ctx.resource_id())),
                self.media_type.clone(),
                self.make_default,
            )?;
        }
        Ok(())
    }

    fn unextend(&self, ctx: &ApplicationExtensionContext) {
        self.log.record(ctx.resource_id(), EventKind::Unextended);
    }
}
