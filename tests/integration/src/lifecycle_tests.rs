//! End-to-end server lifecycle: configuration on disk, bootstrap, restart
//!
//! Each test drives a whole [`Server`] against a temporary applications
//! directory and checks what ends up on disk and in the mount tree.

use std::future::Future;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tenancy_core::{BootstrapState, Server, ServerConfig};
use tenancy_mount::{MountError, Properties};
use tenancy_test_utils::{EventKind, EventLog, TestApps, TestExtension};

const DEMO_DEFAULTS: &str = "{\n  \"id\": \"demo\",\n  \"name\": \"demo\",\n  \"resources\": {}\n}\n";

async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .expect("timed out")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_demo_defaults_and_rediscovery() {
    let apps = TestApps::new();

    let first = Server::new(apps.server_config()).unwrap();
    first.boot_application("demo", None, None).unwrap();
    let app = within(first.await_application_ready("demo")).await.unwrap();
    assert_eq!(app.name(), "demo");
    assert!(app.visible());
    within(first.shutdown()).await;
    assert_eq!(apps.read_config("demo"), DEMO_DEFAULTS);

    // A fresh server finds the application by its directory alone.
    let mut config = apps.server_config();
    config.applications = config.discover().unwrap();
    assert_eq!(config.applications.len(), 1);

    let second = Server::new(config).unwrap();
    second.boot_configured().unwrap();
    within(second.await_application_ready("demo")).await.unwrap();
    assert!(second.resolve("/demo", None).is_ok());
    within(second.shutdown()).await;

    assert_eq!(apps.read_config("demo"), DEMO_DEFAULTS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_server_toml_boots_listed_applications() {
    let apps = TestApps::new();
    let toml_path = apps.root().join("server.toml");
    std::fs::write(
        &toml_path,
        format!(
            "applications-dir = {:?}\n\n[[applications]]\nid = \"shop\"\nname = \"Shop\"\n",
            apps.root().display().to_string()
        ),
    )
    .unwrap();

    let config = ServerConfig::load(&toml_path).unwrap();
    let server = Server::new(config).unwrap();
    server.boot_configured().unwrap();
    let shop = within(server.await_application_ready("shop")).await.unwrap();

    assert_eq!(shop.name(), "Shop");
    assert_eq!(
        apps.read_json("shop"),
        json!({"id": "shop", "name": "Shop", "resources": {}})
    );
    within(server.shutdown()).await;
    assert_eq!(
        server.application_state("shop"),
        Some(BootstrapState::TornDown)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_installed_resource_survives_restart() {
    let apps = TestApps::new();
    let store_path = "/admin/applications/demo/store";

    let first_log = EventLog::new();
    let first = Server::new(apps.server_config()).unwrap();
    first
        .register_extension(TestExtension::new("recording", first_log.clone()).into_arc())
        .unwrap();
    first.boot_application("demo", None, None).unwrap();
    within(first.await_application_ready("demo")).await.unwrap();

    first
        .install_resource("demo", "store", "recording", json!({"size": 3}))
        .unwrap();
    within(first.graph().await_service(&tenancy_core::names::mount(
        &tenancy_core::names::admin_resource("demo", "store"),
    )))
    .await
    .unwrap();

    let mut edits = Properties::new();
    edits.insert("size".into(), json!(5));
    first
        .resolve(store_path, None)
        .unwrap()
        .resource
        .update_properties(&edits)
        .unwrap();
    within(first.shutdown()).await;

    assert_eq!(
        apps.read_json("demo")["resources"],
        json!({"store": {"type": "recording", "config": {"size": 5}}})
    );
    assert_eq!(first_log.kinds("store").last(), Some(&EventKind::Unextended));

    let second_log = EventLog::new();
    let second = Server::new(apps.server_config()).unwrap();
    second
        .register_extension(TestExtension::new("recording", second_log.clone()).into_arc())
        .unwrap();
    second.boot_application("demo", None, None).unwrap();
    within(second.await_application_ready("demo")).await.unwrap();
    within(second.graph().await_service(&tenancy_core::names::mount(
        &tenancy_core::names::admin_resource("demo", "store"),
    )))
    .await
    .unwrap();

    let store = second.resolve(store_path, None).unwrap();
    assert_eq!(store.resource.properties()["size"], json!(5));
    assert_eq!(store.resource.properties()["type"], json!("recording"));
    assert_eq!(
        second_log.kinds("store"),
        vec![
            EventKind::Extended,
            EventKind::Configured(edits),
            EventKind::Started,
            EventKind::Ready,
        ]
    );
    within(second.shutdown()).await;

    assert!(matches!(
        second.resolve(store_path, None),
        Err(tenancy_core::Error::Mount(MountError::NotFound { .. }))
    ));
}
