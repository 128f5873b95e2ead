//! First-start seeding and the full rebuild run at every start.

use std::net::Ipv4Addr;

use chrono::Utc;
use ipnet::Ipv4Net;

use crate::model::{
    AccessRules, BackendProto, HttpService, Interface, Node, NodeFilter, NodeKind, ServiceFilter,
};
use crate::orchestrator::http_service::APP_BACKEND_HOST;
use crate::orchestrator::{ControlError, ControlPlane};

impl ControlPlane {
    /// Create the interface record, the self-hosted node and the app
    /// service when they do not exist yet.
    pub async fn bootstrap(&self) -> Result<(), ControlError> {
        let wg = &self.config.wireguard;

        if self.store.interface(&wg.interface).await?.is_none() {
            let keys = self.mesh.generate_keys().await?;
            let subnet = wg.subnet.trunc();
            let host = Ipv4Addr::from(u32::from(subnet.network()).saturating_add(1));
            let address = Ipv4Net::new(host, subnet.prefix_len()).map_err(|_| {
                ControlError::validation("subnet", format!("{} has no host addresses", subnet))
            })?;

            self.store
                .save_interface(Interface {
                    name: wg.interface.clone(),
                    address,
                    port: wg.port,
                    private_key: keys.private_key,
                    public_key: keys.public_key,
                    pre_up: wg.pre_up_script(),
                    post_up: wg.post_up_script(),
                    pre_down: wg.pre_down_script(),
                    post_down: wg.post_down_script(),
                })
                .await?;
            tracing::info!(interface = %wg.interface, address = %address, "Interface created");
        }

        let nodes = self.store.nodes(&NodeFilter::default()).await?;
        let app_node = match nodes.into_iter().find(Node::is_self_hosted) {
            Some(node) => node,
            None => {
                let node = self
                    .store
                    .insert_node(Node {
                        id: 0,
                        name: self.config.app.name.clone(),
                        interface: wg.interface.clone(),
                        address: Ipv4Addr::LOCALHOST,
                        private_key: String::new(),
                        public_key: String::new(),
                        preshared_key: String::new(),
                        allow_internet: false,
                        kind: NodeKind::SelfHosted,
                        enabled: true,
                        created_at: Utc::now(),
                    })
                    .await?;
                tracing::info!(node_id = node.id, "Self-hosted node created");
                node
            }
        };

        let services = self
            .store
            .http_services(&ServiceFilter::node(app_node.id))
            .await?;
        if !services.iter().any(|s| s.backend_host == APP_BACKEND_HOST) {
            let service = self
                .store
                .insert_http_service(HttpService {
                    id: 0,
                    name: self.config.app.name.clone(),
                    node_id: app_node.id,
                    domain: None,
                    path_location: "/".to_string(),
                    backend_host: APP_BACKEND_HOST.to_string(),
                    backend_port: self.config.app.port,
                    backend_proto: BackendProto::Http,
                    require_auth: false,
                    access: AccessRules::default(),
                    enabled: true,
                    expires_at: None,
                })
                .await?;
            tracing::info!(service_id = service.id, port = service.backend_port, "App service created");
        }

        Ok(())
    }

    /// Rebuild every generated artifact from the store. Each phase logs its
    /// failures and the next phase still runs; nginx is reloaded once at
    /// the end.
    pub async fn initialize(&self) -> Result<(), ControlError> {
        if let Err(e) = self.certs.default_certificates().await {
            tracing::error!(error = %e, "Failed to create default certificates");
        }

        if let Err(e) = self.mesh.initialize().await {
            tracing::error!(error = %e, "Failed to bring up WireGuard interface");
        }

        let gateways = NodeFilter {
            enabled: Some(true),
            gateway: Some(true),
            ..Default::default()
        };
        for node in self.store.nodes(&gateways).await? {
            self.mesh.add_route(&node).await;
        }

        for domain in self.store.domains().await? {
            if let Err(e) = self.proxy.add_domain_server(&domain, false).await {
                tracing::error!(domain = %domain.domain, error = %e, "Failed to build domain server");
            }
        }

        let all = ServiceFilter::default();
        for service in self.store.http_services(&all).await? {
            let Some(node) = self.store.node(service.node_id).await? else {
                continue;
            };
            if service.enabled {
                self.restore_domain(service.domain.as_deref()).await;
            }
            if let Err(e) = self.proxy.add_http_service(&service, &node, false).await {
                tracing::error!(service_id = service.id, error = %e, "Failed to build HTTP service");
            }
        }

        for service in self.store.tcp_services(&all).await? {
            let Some(node) = self.store.node(service.node_id).await? else {
                continue;
            };
            if service.enabled {
                self.restore_domain(service.domain.as_deref()).await;
            }
            let ssl = self.stream_ssl(&service).await?;
            if let Err(e) = self
                .proxy
                .add_tcp_service(&service, &node, ssl.as_ref(), false)
                .await
            {
                tracing::error!(service_id = service.id, error = %e, "Failed to build stream service");
            }
        }

        self.proxy.reload().await?;
        tracing::info!("Control plane initialized");
        Ok(())
    }

    /// Recreate a service's domain when its record has gone missing.
    async fn restore_domain(&self, name: Option<&str>) {
        let Some(name) = name else {
            return;
        };
        if let Err(e) = self.create_domain_if_not_exists(name).await {
            tracing::error!(domain = name, error = %e, "Failed to restore domain");
        }
    }

    /// Tear down what `initialize` brought up.
    pub async fn shutdown(&self) {
        self.mesh.shutdown().await;
    }
}
