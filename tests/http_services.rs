//! HTTP service lifecycle against fake adapters.

use std::net::Ipv4Addr;

use gatewire::model::{
    AccessRules, HttpServiceUpdate, NewHttpService, ServiceFilter, SslMode,
};

mod common;
use common::Harness;

fn api_service(backend_host: &str, backend_port: u16) -> NewHttpService {
    NewHttpService {
        name: "api".into(),
        path_location: Some("/api".into()),
        backend_host: backend_host.into(),
        backend_port,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_service_without_domain_goes_to_default_locations() {
    let h = Harness::new().await;
    let node = h.managed_node("office", Ipv4Addr::new(10, 0, 0, 5)).await;
    let reloads = h.nginx.reloads();

    let service = h
        .plane
        .create_http_service(node.id, api_service("10.0.0.5", 8080))
        .await
        .unwrap();

    let conf = h.read_nginx("locations/default/api.conf");
    let var = format!("$node{}service{}", node.id, service.id);
    assert!(conf.starts_with("location /api {"));
    assert!(conf.contains(&format!("set {}   10.0.0.5;", var)));
    assert!(conf.contains(&format!("proxy_pass           http://{}:8080;", var)));
    assert!(h.plane.domains().await.unwrap().is_empty());
    assert_eq!(h.nginx.reloads(), reloads + 1);
    assert_eq!(h.plane.http_service_url(&service), "https://203.0.113.10/api");
}

#[tokio::test]
async fn test_path_is_required_without_domain() {
    let h = Harness::new().await;
    let node = h.managed_node("office", Ipv4Addr::new(10, 0, 0, 5)).await;

    let err = h
        .plane
        .create_http_service(
            node.id,
            NewHttpService {
                path_location: None,
                ..api_service("10.0.0.5", 8080)
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.field_errors()[0].field, "path_location");
}

#[tokio::test]
async fn test_unreachable_backend_is_rejected_before_persisting() {
    let h = Harness::new().await;
    let node = h.managed_node("office", Ipv4Addr::new(10, 0, 0, 5)).await;
    h.probe.close(9999);

    let err = h
        .plane
        .create_http_service(node.id, api_service("10.0.0.5", 9999))
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(
        err.public_message(),
        "backend_port: Unable to reach out port 9999 in node 10.0.0.5"
    );
    let stored = h.plane.http_services(&ServiceFilter::node(node.id)).await.unwrap();
    assert!(stored.is_empty());
    assert!(!h.nginx_file("locations/default/api.conf").exists());
}

#[tokio::test]
async fn test_gateway_probes_backend_host() {
    let h = Harness::new().await;
    let gateway = h.gateway_node("site", "172.8.0.0/24").await;

    h.plane
        .create_http_service(gateway.id, api_service("172.8.0.7", 8080))
        .await
        .unwrap();

    let probed = h.probe.probed.lock().unwrap().clone();
    assert_eq!(probed.last().unwrap(), &("172.8.0.7".to_string(), 8080));
}

#[tokio::test]
async fn test_disable_then_enable_restores_identical_file() {
    let h = Harness::new().await;
    let node = h.managed_node("office", Ipv4Addr::new(10, 0, 0, 5)).await;
    let service = h
        .plane
        .create_http_service(node.id, api_service("10.0.0.5", 8080))
        .await
        .unwrap();
    let before = h.read_nginx("locations/default/api.conf");

    let reloads = h.nginx.reloads();
    let disabled = h.plane.disable_http_service(service.id).await.unwrap();
    assert!(!disabled.enabled);
    assert!(!h.nginx_file("locations/default/api.conf").exists());
    assert_eq!(h.nginx.reloads(), reloads + 1);

    h.plane.enable_http_service(service.id, None).await.unwrap();
    assert_eq!(h.read_nginx("locations/default/api.conf"), before);
}

#[tokio::test]
async fn test_enable_with_ttl_sets_expiry() {
    let h = Harness::new().await;
    let node = h.managed_node("office", Ipv4Addr::new(10, 0, 0, 5)).await;
    let service = h
        .plane
        .create_http_service(node.id, api_service("10.0.0.5", 8080))
        .await
        .unwrap();

    let enabled = h
        .plane
        .enable_http_service(service.id, Some("2h".into()))
        .await
        .unwrap();
    assert!(enabled.expires_at.is_some());

    let err = h
        .plane
        .enable_http_service(service.id, Some("2 weeks".into()))
        .await
        .unwrap_err();
    assert_eq!(err.field_errors()[0].field, "ttl");

    let disabled = h.plane.disable_http_service(service.id).await.unwrap();
    assert_eq!(disabled.expires_at, None);
}

#[tokio::test]
async fn test_update_moves_location_file() {
    let h = Harness::new().await;
    let node = h.managed_node("office", Ipv4Addr::new(10, 0, 0, 5)).await;
    let service = h
        .plane
        .create_http_service(node.id, api_service("10.0.0.5", 8080))
        .await
        .unwrap();

    h.plane
        .update_http_service(
            service.id,
            HttpServiceUpdate {
                path_location: Some("v2/api".into()),
                access: Some(AccessRules {
                    allowed_ips: vec!["10.0.0.0/8".into()],
                    blocked_ips: vec![],
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(!h.nginx_file("locations/default/api.conf").exists());
    let conf = h.read_nginx("locations/default/v2-api.conf");
    assert!(conf.starts_with("location /v2/api {"));
    assert!(conf.contains("allow"));
    assert!(conf.contains("deny                 all;"));
}

#[tokio::test]
async fn test_duplicate_backend_on_node_is_a_field_error() {
    let h = Harness::new().await;
    let node = h.managed_node("office", Ipv4Addr::new(10, 0, 0, 5)).await;
    h.plane
        .create_http_service(node.id, api_service("10.0.0.5", 8080))
        .await
        .unwrap();

    let err = h
        .plane
        .create_http_service(
            node.id,
            NewHttpService {
                name: "api-copy".into(),
                path_location: Some("/copy".into()),
                ..api_service("10.0.0.5", 8080)
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(err.field_errors()[0].field, "backend_port");
}

#[tokio::test]
async fn test_domain_is_created_on_first_use() {
    let h = Harness::new().await;
    let node = h.managed_node("office", Ipv4Addr::new(10, 0, 0, 5)).await;
    h.probe
        .local_domains
        .lock()
        .unwrap()
        .insert("live.example.com".into());

    h.plane
        .create_http_service(
            node.id,
            NewHttpService {
                domain: Some("live.example.com".into()),
                path_location: None,
                ..api_service("10.0.0.5", 8080)
            },
        )
        .await
        .unwrap();

    let domains = h.plane.domains().await.unwrap();
    assert_eq!(domains.len(), 1);
    assert_eq!(domains[0].ssl, SslMode::Certbot);
    assert!(h.nginx_file("conf.d/live.example.com.conf").exists());

    // the service at "/" replaced the fallback page
    let main = h.read_nginx("locations/live.example.com/__main.conf");
    assert!(main.contains("proxy_pass"));
}

#[tokio::test]
async fn test_quarantine_leaves_siblings_untouched() {
    let h = Harness::new().await;
    let gateway = h.gateway_node("site", "172.8.0.0/24").await;
    h.plane
        .create_http_service(gateway.id, api_service("172.8.0.7", 8080))
        .await
        .unwrap();
    let sibling = h.read_nginx("locations/default/api.conf");
    let reloads = h.nginx.reloads();

    let err = h
        .plane
        .create_http_service(
            gateway.id,
            NewHttpService {
                name: "broken".into(),
                path_location: Some("/broken".into()),
                ..api_service("invalid.internal", 8081)
            },
        )
        .await
        .unwrap_err();

    assert!(!err.is_validation());
    assert!(!err.public_message().contains("invalid directive"));
    assert!(!h.nginx_file("locations/default/broken.conf").exists());
    assert!(h.nginx_file("locations/default/broken.conf.err").exists());
    assert_eq!(h.read_nginx("locations/default/api.conf"), sibling);
    assert_eq!(h.nginx.reloads(), reloads);
}

#[tokio::test]
async fn test_node_scoped_access() {
    let h = Harness::new().await;
    let office = h.managed_node("office", Ipv4Addr::new(10, 0, 0, 5)).await;
    let home = h.managed_node("home", Ipv4Addr::new(10, 0, 0, 6)).await;
    let service = h
        .plane
        .create_http_service(office.id, api_service("10.0.0.5", 8080))
        .await
        .unwrap();

    let err = h
        .plane
        .disable_http_service_for_node(home.id, service.id)
        .await
        .unwrap_err();
    assert_eq!(err.public_message(), "Service not found");

    h.plane
        .disable_http_service_for_node(office.id, service.id)
        .await
        .unwrap();
    h.plane
        .delete_http_service_for_node(office.id, service.id)
        .await
        .unwrap();
    assert!(h.plane.get_http_service(service.id).await.is_err());
}

#[tokio::test]
async fn test_app_service_is_protected() {
    let h = Harness::new().await;
    let app = h
        .plane
        .http_services(&ServiceFilter::default())
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.backend_host == "127.0.0.1")
        .unwrap();

    let err = h
        .plane
        .update_http_service(
            app.id,
            HttpServiceUpdate {
                backend_port: Some(9000),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let renamed = h
        .plane
        .update_http_service(
            app.id,
            HttpServiceUpdate {
                name: Some("console".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "console");

    let err = h.plane.delete_http_service(app.id).await.unwrap_err();
    assert_eq!(err.public_message(), "id: APP can't be deleted");
}

#[tokio::test]
async fn test_ping_backend() {
    let h = Harness::new().await;
    let gateway = h.gateway_node("site", "172.8.0.0/24").await;

    let ok_port = common::start_http_backend(200).await;
    let ok = h
        .plane
        .create_http_service(gateway.id, api_service("127.0.0.1", ok_port))
        .await
        .unwrap();
    assert_eq!(h.plane.ping_http_backend(ok.id, "/health").await.unwrap(), 200);

    let bad_port = common::start_http_backend(500).await;
    let bad = h
        .plane
        .create_http_service(
            gateway.id,
            NewHttpService {
                name: "bad".into(),
                path_location: Some("/bad".into()),
                ..api_service("127.0.0.1", bad_port)
            },
        )
        .await
        .unwrap();
    let err = h.plane.ping_http_backend(bad.id, "/").await.unwrap_err();
    assert_eq!(err.public_message(), "backend: Request to backend failed.");
}
