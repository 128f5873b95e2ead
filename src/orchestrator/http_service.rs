//! HTTP service lifecycle.
//!
//! # Responsibilities
//! - Check the backend answers before anything is persisted
//! - Materialize the service's domain on first use
//! - Keep the location file in step with the record (remove, then re-add)
//! - Protect the control plane's own app service

use std::time::Duration;

use chrono::Utc;

use crate::model::{
    BackendProto, HttpService, HttpServiceUpdate, NewHttpService, Node, NodeId, ServiceFilter,
    ServiceId,
};
use crate::model::service::normalize_path;
use crate::orchestrator::domain::service_domain;
use crate::orchestrator::ttl::expires_at_from_ttl;
use crate::orchestrator::{ControlError, ControlPlane};

/// Backend host of the control plane's own app service.
pub const APP_BACKEND_HOST: &str = "127.0.0.1";

const PING_FAILED: &str = "Request to backend failed.";

fn is_app_service(service: &HttpService, node: &Node) -> bool {
    node.is_self_hosted() && service.backend_host == APP_BACKEND_HOST
}

impl ControlPlane {
    pub async fn get_http_service(&self, id: ServiceId) -> Result<HttpService, ControlError> {
        self.store
            .http_service(id)
            .await?
            .ok_or(ControlError::NotFound("Service"))
    }

    pub async fn http_services(&self, filter: &ServiceFilter) -> Result<Vec<HttpService>, ControlError> {
        Ok(self.store.http_services(filter).await?)
    }

    pub async fn create_http_service(
        &self,
        node_id: NodeId,
        new: NewHttpService,
    ) -> Result<HttpService, ControlError> {
        if new.name.trim().is_empty() {
            return Err(ControlError::validation("name", "Name is required"));
        }
        let mut domain = service_domain(new.domain)?;

        let path_location = match (&domain, new.path_location.as_deref()) {
            (_, Some(path)) if !path.trim().is_empty() => normalize_path(path),
            (Some(_), _) => "/".to_string(),
            (None, _) => {
                return Err(ControlError::validation(
                    "path_location",
                    "A path is required when no domain is set",
                ))
            }
        };

        let node = self.get_node(node_id).await?;
        self.check_node_port(
            node_id,
            new.backend_port,
            Some(&new.backend_host),
            new.backend_proto == BackendProto::Https,
        )
        .await?;

        let enabled = new.enabled.unwrap_or(true);
        let expires_at = match (&new.ttl, enabled) {
            (Some(ttl), true) => Some(expires_at_from_ttl(ttl, Utc::now())?),
            _ => None,
        };

        if let Some(name) = domain.take() {
            domain = Some(self.create_domain_if_not_exists(&name).await?.domain);
        }

        let service = self
            .store
            .insert_http_service(HttpService {
                id: 0,
                name: new.name,
                node_id,
                domain,
                path_location,
                backend_host: new.backend_host,
                backend_port: new.backend_port,
                backend_proto: new.backend_proto,
                require_auth: new.require_auth,
                access: new.access,
                enabled,
                expires_at,
            })
            .await?;
        tracing::info!(service_id = service.id, node_id, path = %service.path_location, "HTTP service created");

        self.proxy.add_http_service(&service, &node, true).await?;
        Ok(service)
    }

    pub async fn update_http_service(
        &self,
        id: ServiceId,
        update: HttpServiceUpdate,
    ) -> Result<HttpService, ControlError> {
        let old = self.get_http_service(id).await?;
        let node = self.get_node(old.node_id).await?;

        if is_app_service(&old, &node) && update.touches_restricted() {
            return Err(ControlError::validation(
                "id",
                "Only the name, domain and access lists of the app service can be changed",
            ));
        }

        if let (Some(host), Some(port)) = (&update.backend_host, update.backend_port) {
            let proto = update.backend_proto.unwrap_or(old.backend_proto);
            self.check_node_port(old.node_id, port, Some(host), proto == BackendProto::Https)
                .await?;
        }

        let mut next = old.clone();
        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(ControlError::validation("name", "Name is required"));
            }
            next.name = name;
        }
        if let Some(domain) = update.domain {
            next.domain = service_domain(domain)?;
        }
        if let Some(path) = update.path_location {
            next.path_location = normalize_path(&path);
        }
        if let Some(host) = update.backend_host {
            next.backend_host = host;
        }
        if let Some(port) = update.backend_port {
            next.backend_port = port;
        }
        if let Some(proto) = update.backend_proto {
            next.backend_proto = proto;
        }
        if let Some(require_auth) = update.require_auth {
            next.require_auth = require_auth;
        }
        if let Some(access) = update.access {
            next.access = access;
        }
        if let Some(enabled) = update.enabled {
            next.enabled = enabled;
        }
        next.expires_at = match (update.enabled, update.ttl) {
            (Some(false), _) | (Some(true), None) => None,
            (_, Some(ttl)) if next.enabled => Some(expires_at_from_ttl(&ttl, Utc::now())?),
            _ => old.expires_at,
        };

        if let Some(name) = next.domain.clone() {
            if next.enabled || old.domain != next.domain {
                next.domain = Some(self.create_domain_if_not_exists(&name).await?.domain);
            }
        }

        let saved = self.store.update_http_service(next).await?;
        self.proxy.remove_http_service(&old, false).await?;
        self.proxy.add_http_service(&saved, &node, true).await?;
        Ok(saved)
    }

    /// Enable a service, optionally for a limited time.
    pub async fn enable_http_service(
        &self,
        id: ServiceId,
        ttl: Option<String>,
    ) -> Result<HttpService, ControlError> {
        self.update_http_service(
            id,
            HttpServiceUpdate {
                enabled: Some(true),
                ttl,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn disable_http_service(&self, id: ServiceId) -> Result<HttpService, ControlError> {
        self.update_http_service(
            id,
            HttpServiceUpdate {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete_http_service(&self, id: ServiceId) -> Result<(), ControlError> {
        let service = self.get_http_service(id).await?;
        let node = self.get_node(service.node_id).await?;
        if is_app_service(&service, &node) {
            return Err(ControlError::validation("id", "APP can't be deleted"));
        }

        self.store.delete_http_service(id).await?;
        self.proxy.remove_http_service(&service, true).await?;
        tracing::info!(service_id = id, "HTTP service deleted");
        Ok(())
    }

    /// Look up a service on behalf of a node; other nodes' services are
    /// reported as missing.
    pub async fn node_http_service(&self, node_id: NodeId, id: ServiceId) -> Result<HttpService, ControlError> {
        let service = self.get_http_service(id).await?;
        if service.node_id != node_id {
            return Err(ControlError::NotFound("Service"));
        }
        Ok(service)
    }

    pub async fn update_http_service_for_node(
        &self,
        node_id: NodeId,
        id: ServiceId,
        update: HttpServiceUpdate,
    ) -> Result<HttpService, ControlError> {
        self.node_http_service(node_id, id).await?;
        self.update_http_service(id, update).await
    }

    pub async fn enable_http_service_for_node(
        &self,
        node_id: NodeId,
        id: ServiceId,
        ttl: Option<String>,
    ) -> Result<HttpService, ControlError> {
        self.node_http_service(node_id, id).await?;
        self.enable_http_service(id, ttl).await
    }

    pub async fn disable_http_service_for_node(
        &self,
        node_id: NodeId,
        id: ServiceId,
    ) -> Result<HttpService, ControlError> {
        self.node_http_service(node_id, id).await?;
        self.disable_http_service(id).await
    }

    pub async fn delete_http_service_for_node(&self, node_id: NodeId, id: ServiceId) -> Result<(), ControlError> {
        self.node_http_service(node_id, id).await?;
        self.delete_http_service(id).await
    }

    /// Where the service is published.
    pub fn http_service_url(&self, service: &HttpService) -> String {
        service.public_url(&self.config.wireguard.host)
    }

    /// GET `path` on the service's backend and return the status code.
    /// Certificates are not verified.
    pub async fn ping_http_backend(&self, id: ServiceId, path: &str) -> Result<u16, ControlError> {
        let service = self.get_http_service(id).await?;
        let node = self.get_node(service.node_id).await?;

        let host = if node.is_gateway() || node.is_self_hosted() {
            service.backend_host.clone()
        } else {
            node.address.to_string()
        };
        let url = format!(
            "{}://{}:{}{}",
            service.backend_proto,
            host,
            service.backend_port,
            normalize_path(path)
        );

        let failed = || ControlError::validation("backend", PING_FAILED);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(self.config.probe.timeout_ms))
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to build backend client");
                failed()
            })?;

        let response = client.get(&url).send().await.map_err(|e| {
            tracing::warn!(url = %url, error = %e, "Backend ping failed");
            failed()
        })?;

        let status = response.status();
        if status.is_success() || status.is_redirection() {
            Ok(status.as_u16())
        } else {
            tracing::warn!(url = %url, status = status.as_u16(), "Backend answered with an error");
            Err(failed())
        }
    }
}
