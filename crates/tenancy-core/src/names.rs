//! Service names of the nodes the server installs
//!
//! Everything lives under a single `tenancy` root:
//!
//! ```text
//! tenancy.applications-dir
//! tenancy.context                              global mount point, "/"
//! tenancy.admin.applications                   "/admin/applications"
//! tenancy.extension.<ext>
//! tenancy.application.<app>
//! tenancy.application.<app>.config-manager
//! tenancy.application.<app>.context[.mount]
//! tenancy.application.<app>.admin[.mount]
//! tenancy.application.<app>.{context-mounted,admin-mounted,ready}
//! tenancy.application.<app>.extension.<resource>
//! tenancy.application.<app>.resource.<resource>[.mount]
//! tenancy.application.<app>.admin-resource.<resource>[.filter-config,...]
//! ```

use tenancy_graph::ServiceName;

fn root() -> ServiceName {
    ServiceName::of(["tenancy"])
}

pub fn applications_dir() -> ServiceName {
    root().append("applications-dir")
}

pub fn global_context() -> ServiceName {
    root().append("context")
}

pub fn admin_applications() -> ServiceName {
    root().append("admin").append("applications")
}

pub fn extension(extension_id: &str) -> ServiceName {
    root().append("extension").append(extension_id)
}

pub fn application(app_id: &str) -> ServiceName {
    root().append("application").append(app_id)
}

pub fn config_manager(app_id: &str) -> ServiceName {
    application(app_id).append("config-manager")
}

pub fn application_context(app_id: &str) -> ServiceName {
    application(app_id).append("context")
}

pub fn application_admin(app_id: &str) -> ServiceName {
    application(app_id).append("admin")
}

pub fn context_mounted(app_id: &str) -> ServiceName {
    application(app_id).append("context-mounted")
}

pub fn admin_mounted(app_id: &str) -> ServiceName {
    application(app_id).append("admin-mounted")
}

pub fn ready(app_id: &str) -> ServiceName {
    application(app_id).append("ready")
}

pub fn application_extension(app_id: &str, resource_id: &str) -> ServiceName {
    application(app_id).append("extension").append(resource_id)
}

/// Node holding a publicly mounted resource.
pub fn resource(app_id: &str, resource_id: &str) -> ServiceName {
    application(app_id).append("resource").append(resource_id)
}

/// Node holding a privately (admin) mounted resource.
pub fn admin_resource(app_id: &str, resource_id: &str) -> ServiceName {
    application(app_id)
        .append("admin-resource")
        .append(resource_id)
}

/// Mount-binding node for the resource produced by `name`.
pub fn mount(name: &ServiceName) -> ServiceName {
    name.append("mount")
}
