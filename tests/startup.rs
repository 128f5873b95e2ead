//! Bootstrap seeding and full rebuilds from the store.

use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;

use gatewire::model::{NewDomain, NewHttpService, NewTcpService, NodeFilter, ServiceFilter};

mod common;
use common::Harness;

async fn populate(h: &Harness) {
    let office = h.managed_node("office", Ipv4Addr::new(10, 0, 0, 5)).await;
    let gateway = h.gateway_node("site", "172.8.0.0/24").await;
    h.plane
        .create_domain(NewDomain::named("x.example.com"))
        .await
        .unwrap();
    h.plane
        .create_http_service(
            office.id,
            NewHttpService {
                name: "api".into(),
                domain: Some("x.example.com".into()),
                path_location: Some("/api".into()),
                backend_host: "10.0.0.5".into(),
                backend_port: 8080,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.plane
        .create_tcp_service(
            gateway.id,
            NewTcpService {
                name: "mqtt".into(),
                backend_host: "172.8.0.7".into(),
                backend_port: 1883,
                ..Default::default()
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_bootstrap_seeds_once() {
    let h = Harness::new().await;
    h.plane.bootstrap().await.unwrap();

    let nodes = h.plane.nodes(&NodeFilter::default()).await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert!(nodes[0].is_self_hosted());
    assert_eq!(nodes[0].address, Ipv4Addr::LOCALHOST);

    let services = h.plane.http_services(&ServiceFilter::default()).await.unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].path_location, "/");
    assert_eq!(services[0].backend_port, h.plane.config().app.port);

    let interface = h.plane.mesh().interface().await.unwrap();
    assert_eq!(interface.address.to_string(), "10.0.0.1/24");
    assert_eq!(interface.private_key, "priv1");
}

#[tokio::test]
async fn test_initialize_builds_app_location_and_brings_mesh_up() {
    let h = Harness::new().await;
    let reloads = h.nginx.reloads();

    h.plane.initialize().await.unwrap();

    let app = h.read_nginx("locations/default/__main.conf");
    assert!(app.starts_with("location / {"));
    assert!(app.contains("127.0.0.1;"));
    assert!(h.wg_conf().starts_with("# Server\n[Interface]\nPrivateKey = priv1\n"));
    assert_eq!(h.wg.ups.load(Ordering::SeqCst), 1);
    assert_eq!(h.nginx.reloads(), reloads + 1);
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let h = Harness::new().await;
    populate(&h).await;

    h.plane.initialize().await.unwrap();
    let tree = h.nginx_tree();
    let wg = h.wg_conf();

    h.plane.initialize().await.unwrap();
    assert_eq!(h.nginx_tree(), tree);
    assert_eq!(h.wg_conf(), wg);
    assert_eq!(h.routes.current().len(), 1);
}

#[tokio::test]
async fn test_initialize_rebuilds_lost_files() {
    let h = Harness::new().await;
    populate(&h).await;
    h.plane.initialize().await.unwrap();
    let tree = h.nginx_tree();

    std::fs::remove_dir_all(h.nginx_root()).unwrap();
    std::fs::remove_file(h.dir.path().join("wireguard").join("wg0.conf")).unwrap();

    h.plane.initialize().await.unwrap();
    assert_eq!(h.nginx_tree(), tree);
    assert!(h.wg_conf().contains("AllowedIPs = 10.0.0.2/32, 172.8.0.0/24"));
}

#[tokio::test]
async fn test_initialize_continues_past_rejected_service() {
    let h = Harness::new().await;
    populate(&h).await;
    let gateway = h.gateway_node("lab", "172.9.0.0/24").await;
    let err = h
        .plane
        .create_http_service(
            gateway.id,
            NewHttpService {
                name: "broken".into(),
                path_location: Some("/broken".into()),
                backend_host: "invalid.internal".into(),
                backend_port: 8080,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(!err.is_validation());

    std::fs::remove_dir_all(h.nginx_root()).unwrap();
    h.plane.initialize().await.unwrap();

    assert!(h.nginx_file("locations/default/broken.conf.err").exists());
    assert!(!h.nginx_file("locations/default/broken.conf").exists());
    assert!(h.nginx_file("locations/x.example.com/api.conf").exists());
    assert!(h.nginx_file("locations/default/__main.conf").exists());
}
