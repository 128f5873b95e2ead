//! In-process store with an optional JSON snapshot.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::model::{
    Domain, DomainId, HttpService, Interface, Node, NodeFilter, NodeId, PersonalAccessToken,
    ServiceFilter, ServiceId, TcpService,
};
use crate::store::{Store, StoreError};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
struct State {
    next_id: u64,
    interfaces: BTreeMap<String, Interface>,
    nodes: BTreeMap<NodeId, Node>,
    http_services: BTreeMap<ServiceId, HttpService>,
    tcp_services: BTreeMap<ServiceId, TcpService>,
    domains: BTreeMap<DomainId, Domain>,
    tokens: BTreeMap<u64, PersonalAccessToken>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_node(&self, node: &Node) -> Result<(), StoreError> {
        if self
            .nodes
            .values()
            .any(|n| n.id != node.id && n.address == node.address)
        {
            return Err(StoreError::conflict(
                "address",
                format!("Address {} is already in use", node.address),
            ));
        }
        Ok(())
    }

    fn check_http(&self, service: &HttpService) -> Result<(), StoreError> {
        for other in self.http_services.values().filter(|s| s.id != service.id) {
            if same_domain(other.domain.as_deref(), service.domain.as_deref())
                && other.path_location == service.path_location
            {
                return Err(StoreError::conflict(
                    "path_location",
                    format!("Path {} is already published on this domain", service.path_location),
                ));
            }
            if other.node_id == service.node_id
                && other.backend_host == service.backend_host
                && other.backend_port == service.backend_port
            {
                return Err(StoreError::conflict(
                    "backend_port",
                    "Another service on this node already points to this backend",
                ));
            }
        }
        Ok(())
    }

    fn check_tcp(&self, service: &TcpService) -> Result<(), StoreError> {
        for other in self.tcp_services.values().filter(|s| s.id != service.id) {
            if other.port == service.port {
                return Err(StoreError::conflict(
                    "port",
                    format!("Port {} is already in use", service.port),
                ));
            }
            if other.node_id == service.node_id
                && other.backend_host == service.backend_host
                && other.backend_port == service.backend_port
            {
                return Err(StoreError::conflict(
                    "backend_port",
                    "Another service on this node already points to this backend",
                ));
            }
        }
        Ok(())
    }

    fn check_domain(&self, domain: &Domain) -> Result<(), StoreError> {
        if self
            .domains
            .values()
            .any(|d| d.id != domain.id && d.domain.eq_ignore_ascii_case(&domain.domain))
        {
            return Err(StoreError::conflict("domain", "Domain already exists"));
        }
        Ok(())
    }
}

fn same_domain(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        (None, None) => true,
        _ => false,
    }
}

/// A `Store` kept in memory, optionally mirrored to a JSON file.
pub struct MemoryStore {
    state: RwLock<State>,
    snapshot_path: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty store without a snapshot file.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            snapshot_path: None,
        }
    }

    /// Open a store backed by `path`, loading it when it exists.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let state = if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let state: State = serde_json::from_reader(reader)?;
            tracing::info!(
                path = %path.display(),
                nodes = state.nodes.len(),
                http_services = state.http_services.len(),
                tcp_services = state.tcp_services.len(),
                domains = state.domains.len(),
                "Loaded store snapshot"
            );
            state
        } else {
            State::default()
        };

        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path.to_path_buf()),
        })
    }

    async fn persist(&self, state: &State) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp = path.with_extension("json.tmp");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        tracing::debug!(path = %path.display(), "Saved store snapshot");
        Ok(())
    }

    /// Apply `change` to a copy of the state; the copy replaces the live
    /// state only once the snapshot has been written.
    async fn commit<T, F>(&self, change: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut State) -> Result<T, StoreError> + Send,
        T: Send,
    {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let out = change(&mut next)?;
        self.persist(&next).await?;
        *state = next;
        Ok(out)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn interface(&self, name: &str) -> Result<Option<Interface>, StoreError> {
        Ok(self.state.read().await.interfaces.get(name).cloned())
    }

    async fn save_interface(&self, interface: Interface) -> Result<(), StoreError> {
        self.commit(|state| {
            state.interfaces.insert(interface.name.clone(), interface);
            Ok(())
        })
        .await
    }

    async fn nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>, StoreError> {
        let state = self.state.read().await;
        Ok(state.nodes.values().filter(|n| filter.matches(n)).cloned().collect())
    }

    async fn node(&self, id: NodeId) -> Result<Option<Node>, StoreError> {
        Ok(self.state.read().await.nodes.get(&id).cloned())
    }

    async fn insert_node(&self, mut node: Node) -> Result<Node, StoreError> {
        self.commit(|state| {
            node.id = 0;
            state.check_node(&node)?;
            node.id = state.next_id();
            state.nodes.insert(node.id, node.clone());
            Ok(node)
        })
        .await
    }

    async fn update_node(&self, node: Node) -> Result<Node, StoreError> {
        self.commit(|state| {
            if !state.nodes.contains_key(&node.id) {
                return Err(StoreError::NotFound { entity: "Node", id: node.id });
            }
            state.check_node(&node)?;
            state.nodes.insert(node.id, node.clone());
            Ok(node)
        })
        .await
    }

    async fn delete_node(&self, id: NodeId) -> Result<(), StoreError> {
        self.commit(|state| {
            if state.nodes.remove(&id).is_none() {
                return Err(StoreError::NotFound { entity: "Node", id });
            }
            state.http_services.retain(|_, s| s.node_id != id);
            state.tcp_services.retain(|_, s| s.node_id != id);
            state.tokens.retain(|_, t| t.node_id != id);
            Ok(())
        })
        .await
    }

    async fn http_services(&self, filter: &ServiceFilter) -> Result<Vec<HttpService>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .http_services
            .values()
            .filter(|s| filter.matches_http(s))
            .cloned()
            .collect())
    }

    async fn http_service(&self, id: ServiceId) -> Result<Option<HttpService>, StoreError> {
        Ok(self.state.read().await.http_services.get(&id).cloned())
    }

    async fn insert_http_service(&self, mut service: HttpService) -> Result<HttpService, StoreError> {
        self.commit(|state| {
            service.id = 0;
            state.check_http(&service)?;
            service.id = state.next_id();
            state.http_services.insert(service.id, service.clone());
            Ok(service)
        })
        .await
    }

    async fn update_http_service(&self, service: HttpService) -> Result<HttpService, StoreError> {
        self.commit(|state| {
            if !state.http_services.contains_key(&service.id) {
                return Err(StoreError::NotFound { entity: "Service", id: service.id });
            }
            state.check_http(&service)?;
            state.http_services.insert(service.id, service.clone());
            Ok(service)
        })
        .await
    }

    async fn delete_http_service(&self, id: ServiceId) -> Result<(), StoreError> {
        self.commit(|state| match state.http_services.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound { entity: "Service", id }),
        })
        .await
    }

    async fn tcp_services(&self, filter: &ServiceFilter) -> Result<Vec<TcpService>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .tcp_services
            .values()
            .filter(|s| filter.matches_tcp(s))
            .cloned()
            .collect())
    }

    async fn tcp_service(&self, id: ServiceId) -> Result<Option<TcpService>, StoreError> {
        Ok(self.state.read().await.tcp_services.get(&id).cloned())
    }

    async fn insert_tcp_service(&self, mut service: TcpService) -> Result<TcpService, StoreError> {
        self.commit(|state| {
            service.id = 0;
            state.check_tcp(&service)?;
            service.id = state.next_id();
            state.tcp_services.insert(service.id, service.clone());
            Ok(service)
        })
        .await
    }

    async fn update_tcp_service(&self, service: TcpService) -> Result<TcpService, StoreError> {
        self.commit(|state| {
            if !state.tcp_services.contains_key(&service.id) {
                return Err(StoreError::NotFound { entity: "Service", id: service.id });
            }
            state.check_tcp(&service)?;
            state.tcp_services.insert(service.id, service.clone());
            Ok(service)
        })
        .await
    }

    async fn delete_tcp_service(&self, id: ServiceId) -> Result<(), StoreError> {
        self.commit(|state| match state.tcp_services.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound { entity: "Service", id }),
        })
        .await
    }

    async fn domains(&self) -> Result<Vec<Domain>, StoreError> {
        Ok(self.state.read().await.domains.values().cloned().collect())
    }

    async fn domain(&self, id: DomainId) -> Result<Option<Domain>, StoreError> {
        Ok(self.state.read().await.domains.get(&id).cloned())
    }

    async fn domain_by_name(&self, name: &str) -> Result<Option<Domain>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .domains
            .values()
            .find(|d| d.domain.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn insert_domain(&self, mut domain: Domain) -> Result<Domain, StoreError> {
        self.commit(|state| {
            domain.id = 0;
            state.check_domain(&domain)?;
            domain.id = state.next_id();
            state.domains.insert(domain.id, domain.clone());
            Ok(domain)
        })
        .await
    }

    async fn update_domain(&self, domain: Domain) -> Result<Domain, StoreError> {
        self.commit(|state| {
            if !state.domains.contains_key(&domain.id) {
                return Err(StoreError::NotFound { entity: "Domain", id: domain.id });
            }
            state.check_domain(&domain)?;
            state.domains.insert(domain.id, domain.clone());
            Ok(domain)
        })
        .await
    }

    async fn delete_domain(&self, id: DomainId) -> Result<(), StoreError> {
        self.commit(|state| match state.domains.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound { entity: "Domain", id }),
        })
        .await
    }

    async fn tokens(&self, node_id: NodeId) -> Result<Vec<PersonalAccessToken>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .tokens
            .values()
            .filter(|t| t.node_id == node_id)
            .cloned()
            .collect())
    }

    async fn insert_token(&self, mut token: PersonalAccessToken) -> Result<PersonalAccessToken, StoreError> {
        self.commit(|state| {
            if !state.nodes.contains_key(&token.node_id) {
                return Err(StoreError::NotFound { entity: "Node", id: token.node_id });
            }
            token.id = state.next_id();
            state.tokens.insert(token.id, token.clone());
            Ok(token)
        })
        .await
    }

    async fn revoke_tokens(&self, node_id: NodeId) -> Result<usize, StoreError> {
        self.commit(|state| {
            let mut revoked = 0;
            for token in state.tokens.values_mut().filter(|t| t.node_id == node_id && !t.revoked) {
                token.revoked = true;
                revoked += 1;
            }
            Ok(revoked)
        })
        .await
    }
}
