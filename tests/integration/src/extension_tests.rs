//! Extensions across several applications on one server

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tenancy_core::{BootstrapState, Server, names};
use tenancy_graph::ServiceState;
use tenancy_mount::{MediaType, MountError, Resource};
use tenancy_test_utils::{EventKind, EventLog, TestApps, TestExtension, Visibility};

async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .expect("timed out")
}

async fn await_mount(server: &Server, resource: tenancy_graph::ServiceName) {
    within(server.graph().await_service(&names::mount(&resource)))
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_applications_with_two_extensions_become_ready() {
    let apps = TestApps::new();
    for id in ["alpha", "beta"] {
        apps.write_config(
            id,
            &json!({
                "id": id,
                "name": id.to_uppercase(),
                "resources": {
                    "docs": {"type": "docs", "config": {"owner": "${application.name}"}},
                    "site": {"type": "site"}
                }
            }),
        );
    }
    let log = EventLog::new();
    let server = Server::new(apps.server_config()).unwrap();

    // Applications first: their resources wait for the extensions.
    server.boot_application("alpha", None, None).unwrap();
    server.boot_application("beta", None, None).unwrap();
    server
        .register_extension(
            TestExtension::new("docs", log.clone())
                .media_type(MediaType::JSON, true)
                .into_arc(),
        )
        .unwrap();
    server
        .register_extension(
            TestExtension::new("site", log.clone())
                .visibility(Visibility::Public)
                .media_type(MediaType::HTML, true)
                .into_arc(),
        )
        .unwrap();

    let (alpha, beta) = within(async {
        tokio::join!(
            server.await_application_ready("alpha"),
            server.await_application_ready("beta")
        )
    })
    .await;
    let (alpha, beta) = (alpha.unwrap(), beta.unwrap());
    assert_eq!(alpha.state(), BootstrapState::Ready);
    assert_eq!(beta.state(), BootstrapState::Ready);

    for app in ["alpha", "beta"] {
        await_mount(&server, names::admin_resource(app, "docs")).await;
        await_mount(&server, names::resource(app, "site")).await;

        let docs = server
            .resolve(&format!("/admin/applications/{app}/docs"), None)
            .unwrap();
        assert_eq!(docs.resource.properties()["owner"], json!(app.to_uppercase()));
        assert_eq!(docs.resource.properties()["type"], json!("docs"));

        let site = server
            .resolve(&format!("/{app}/site"), Some("text/html"))
            .unwrap();
        assert_eq!(site.media_type, MediaType::HTML);
        assert!(site.is_default);
    }

    within(server.shutdown()).await;
    let stopped = log
        .events()
        .iter()
        .filter(|event| event.kind == EventKind::Stopped)
        .count();
    // One private `docs` per application; public mounts have no lifecycle.
    assert_eq!(stopped, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_private_default_unbound_is_not_found() {
    let apps = TestApps::new();
    let server = Server::new(apps.server_config()).unwrap();
    server
        .register_extension(
            TestExtension::new("docs", EventLog::new())
                .media_type(MediaType::JSON, true)
                .into_arc(),
        )
        .unwrap();
    server.boot_application("demo", None, None).unwrap();
    within(server.await_application_ready("demo")).await.unwrap();
    server
        .install_resource("demo", "manual", "docs", json!({}))
        .unwrap();
    await_mount(&server, names::admin_resource("demo", "manual")).await;

    let path = "/admin/applications/demo/manual";
    let binding = server.resolve(path, None).unwrap();
    assert_eq!(binding.resource.id(), "manual");
    assert!(binding.is_default);
    // An unmatched hint falls back to the default.
    assert_eq!(
        server
            .resolve(path, Some("text/html"))
            .unwrap()
            .resource
            .id(),
        "manual"
    );

    let removed: Arc<dyn Resource> = server
        .registry()
        .unbind(path, &MediaType::JSON)
        .unwrap();
    assert_eq!(removed.id(), "manual");
    assert!(matches!(
        server.resolve(path, None),
        Err(tenancy_core::Error::Mount(MountError::NotFound { .. }))
    ));
    within(server.shutdown()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failing_resource_is_isolated() {
    let apps = TestApps::new();
    let log = EventLog::new();
    let server = Server::new(apps.server_config()).unwrap();
    server
        .register_extension(
            TestExtension::new("broken", log.clone())
                .failing_start()
                .into_arc(),
        )
        .unwrap();
    server
        .register_extension(TestExtension::new("working", log.clone()).into_arc())
        .unwrap();
    server.boot_application("one", None, None).unwrap();
    server.boot_application("two", None, None).unwrap();
    within(server.await_application_ready("one")).await.unwrap();
    within(server.await_application_ready("two")).await.unwrap();

    server
        .install_resource("one", "bad", "broken", json!({}))
        .unwrap();
    server
        .install_resource("two", "good", "working", json!({}))
        .unwrap();

    let bad_mount = names::mount(&names::admin_resource("one", "bad"));
    assert!(
        within(server.graph().await_service(&bad_mount))
            .await
            .is_err()
    );
    await_mount(&server, names::admin_resource("two", "good")).await;

    let lifecycle = names::admin_resource("one", "bad").append("lifecycle");
    assert_eq!(
        server.graph().status(&lifecycle).unwrap().state,
        ServiceState::Failed
    );
    assert_eq!(server.application_state("one"), Some(BootstrapState::Ready));
    assert!(server.resolve("/admin/applications/one/bad", None).is_err());
    assert!(server.resolve("/admin/applications/two/good", None).is_ok());
    assert!(!log.kinds("bad").contains(&EventKind::Started));

    within(server.shutdown()).await;
}
