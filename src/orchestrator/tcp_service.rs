//! TCP/UDP stream service lifecycle.
//!
//! Mirrors the HTTP lifecycle; in addition every service owns one public
//! port from the shared `services.port_range`.

use std::collections::HashSet;

use chrono::Utc;

use crate::model::{
    NewTcpService, NodeId, ServiceFilter, ServiceId, SslMode, SslPair, StreamProto, TcpService,
    TcpServiceUpdate,
};
use crate::net::allocator::{allocate_port_in_range, AllocError, PortRange};
use crate::orchestrator::domain::service_domain;
use crate::orchestrator::ttl::expires_at_from_ttl;
use crate::orchestrator::{ControlError, ControlPlane};

impl ControlPlane {
    pub async fn get_tcp_service(&self, id: ServiceId) -> Result<TcpService, ControlError> {
        self.store
            .tcp_service(id)
            .await?
            .ok_or(ControlError::NotFound("Service"))
    }

    pub async fn tcp_services(&self, filter: &ServiceFilter) -> Result<Vec<TcpService>, ControlError> {
        Ok(self.store.tcp_services(filter).await?)
    }

    pub async fn create_tcp_service(
        &self,
        node_id: NodeId,
        new: NewTcpService,
    ) -> Result<TcpService, ControlError> {
        if new.name.trim().is_empty() {
            return Err(ControlError::validation("name", "Name is required"));
        }
        let mut domain = service_domain(new.domain)?;

        let node = self.get_node(node_id).await?;
        if new.proto == StreamProto::Tcp {
            self.check_node_port(node_id, new.backend_port, Some(&new.backend_host), false)
                .await?;
        }

        let port = match new.port {
            Some(port) => self.check_public_port(port)?,
            None => self.allocate_public_port(None).await?,
        };

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
            .insert_tcp_service(TcpService {
                id: 0,
                name: new.name,
                node_id,
                domain,
                proto: new.proto,
                backend_host: new.backend_host,
                backend_port: new.backend_port,
                port,
                ssl: new.ssl,
                access: new.access,
                enabled,
                expires_at,
            })
            .await?;
        tracing::info!(service_id = service.id, node_id, port, proto = %service.proto, "Stream service created");

        let ssl = self.stream_ssl(&service).await?;
        self.proxy
            .add_tcp_service(&service, &node, ssl.as_ref(), true)
            .await?;
        Ok(service)
    }

    pub async fn update_tcp_service(
        &self,
        id: ServiceId,
        update: TcpServiceUpdate,
    ) -> Result<TcpService, ControlError> {
        let old = self.get_tcp_service(id).await?;
        let node = self.get_node(old.node_id).await?;

        let proto = update.proto.unwrap_or(old.proto);
        if let (Some(host), Some(port)) = (&update.backend_host, update.backend_port) {
            if proto == StreamProto::Tcp {
                self.check_node_port(old.node_id, port, Some(host), false).await?;
            }
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
        next.proto = proto;
        if let Some(host) = update.backend_host {
            next.backend_host = host;
        }
        if let Some(port) = update.backend_port {
            next.backend_port = port;
        }
        if let Some(port) = update.port {
            next.port = self.check_public_port(port)?;
        }
        if let Some(ssl) = update.ssl {
            next.ssl = ssl;
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

        let saved = self.store.update_tcp_service(next).await?;
        let ssl = self.stream_ssl(&saved).await?;
        self.proxy.remove_tcp_service(&old, false).await?;
        self.proxy
            .add_tcp_service(&saved, &node, ssl.as_ref(), true)
            .await?;
        Ok(saved)
    }

    pub async fn enable_tcp_service(
        &self,
        id: ServiceId,
        ttl: Option<String>,
    ) -> Result<TcpService, ControlError> {
        self.update_tcp_service(
            id,
            TcpServiceUpdate {
                enabled: Some(true),
                ttl,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn disable_tcp_service(&self, id: ServiceId) -> Result<TcpService, ControlError> {
        self.update_tcp_service(
            id,
            TcpServiceUpdate {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete_tcp_service(&self, id: ServiceId) -> Result<(), ControlError> {
        let service = self.get_tcp_service(id).await?;
        self.store.delete_tcp_service(id).await?;
        self.proxy.remove_tcp_service(&service, true).await?;
        tracing::info!(service_id = id, port = service.port, "Stream service deleted");
        Ok(())
    }

    pub async fn node_tcp_service(&self, node_id: NodeId, id: ServiceId) -> Result<TcpService, ControlError> {
        let service = self.get_tcp_service(id).await?;
        if service.node_id != node_id {
            return Err(ControlError::NotFound("Service"));
        }
        Ok(service)
    }

    pub async fn update_tcp_service_for_node(
        &self,
        node_id: NodeId,
        id: ServiceId,
        update: TcpServiceUpdate,
    ) -> Result<TcpService, ControlError> {
        self.node_tcp_service(node_id, id).await?;
        self.update_tcp_service(id, update).await
    }

    pub async fn enable_tcp_service_for_node(
        &self,
        node_id: NodeId,
        id: ServiceId,
        ttl: Option<String>,
    ) -> Result<TcpService, ControlError> {
        self.node_tcp_service(node_id, id).await?;
        self.enable_tcp_service(id, ttl).await
    }

    pub async fn disable_tcp_service_for_node(
        &self,
        node_id: NodeId,
        id: ServiceId,
    ) -> Result<TcpService, ControlError> {
        self.node_tcp_service(node_id, id).await?;
        self.disable_tcp_service(id).await
    }

    pub async fn delete_tcp_service_for_node(&self, node_id: NodeId, id: ServiceId) -> Result<(), ControlError> {
        self.node_tcp_service(node_id, id).await?;
        self.delete_tcp_service(id).await
    }

    pub fn tcp_service_url(&self, service: &TcpService) -> String {
        service.public_url(&self.config.wireguard.host)
    }

    /// First port of the configured range no other stream service uses.
    pub async fn allocate_public_port(&self, except: Option<ServiceId>) -> Result<u16, ControlError> {
        let range = self.port_range()?;
        let busy: HashSet<u16> = self
            .store
            .tcp_services(&ServiceFilter::default())
            .await?
            .into_iter()
            .filter(|s| Some(s.id) != except)
            .map(|s| s.port)
            .collect();
        Ok(allocate_port_in_range(range, &busy)?)
    }

    fn port_range(&self) -> Result<PortRange, ControlError> {
        let raw = self
            .config
            .services
            .port_range
            .as_deref()
            .ok_or(AllocError::PortRangeUnset)?;
        Ok(raw.parse::<PortRange>()?)
    }

    /// Explicit ports must fall inside the configured range. Uniqueness is
    /// left to the store.
    fn check_public_port(&self, port: u16) -> Result<u16, ControlError> {
        let range = self.port_range()?;
        if !range.contains(port) {
            return Err(ControlError::validation(
                "port",
                format!("Port must be between {} and {}", range.min, range.max),
            ));
        }
        Ok(port)
    }

    /// The pair a stream terminates TLS with: its domain's, or the default
    /// self-signed pair.
    pub(crate) async fn stream_ssl(&self, service: &TcpService) -> Result<Option<SslPair>, ControlError> {
        if !service.ssl {
            return Ok(None);
        }
        let pair = match service.domain.as_deref() {
            Some(name) => match self.store.domain_by_name(name).await? {
                Some(domain) => domain.ssl_pair,
                None => self.certs.ssl_pair(Some(name), SslMode::SelfSigned),
            },
            None => self.certs.ssl_pair(None, SslMode::SelfSigned),
        };
        Ok(Some(pair))
    }
}
