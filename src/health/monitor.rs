//! Periodic node pings.
//!
//! # Responsibilities
//! - Ping every enabled mesh peer on an interval
//! - Cache the result per address for readers

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::schema::HealthCheckConfig;
use crate::control::RouteControl;
use crate::health::state::NodeHealth;
use crate::model::NodeFilter;
use crate::observability::metrics;
use crate::store::Store;

pub struct NodeMonitor {
    store: Arc<dyn Store>,
    routes: Arc<dyn RouteControl>,
    config: HealthCheckConfig,
    cache: DashMap<Ipv4Addr, NodeHealth>,
}

impl NodeMonitor {
    pub fn new(store: Arc<dyn Store>, routes: Arc<dyn RouteControl>, config: HealthCheckConfig) -> Self {
        Self {
            store,
            routes,
            config,
            cache: DashMap::new(),
        }
    }

    pub fn get(&self, address: Ipv4Addr) -> Option<NodeHealth> {
        self.cache.get(&address).map(|entry| entry.value().clone())
    }

    /// Every cached result, ordered by address.
    pub fn snapshot(&self) -> Vec<(Ipv4Addr, NodeHealth)> {
        let mut all: Vec<_> = self
            .cache
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        all.sort_by_key(|(address, _)| *address);
        all
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Node monitor disabled");
            return;
        }

        let interval = Duration::from_secs(self.config.interval_secs);
        tracing::info!(interval_secs = interval.as_secs(), "Node monitor starting");
        let mut ticker = time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Node monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    pub async fn check_all(&self) {
        let nodes = match self.store.nodes(&NodeFilter::enabled()).await {
            Ok(nodes) => nodes,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list nodes for health check");
                return;
            }
        };

        let mut seen = Vec::with_capacity(nodes.len());
        for node in nodes.into_iter().filter(|n| n.is_peer()) {
            let latency = self.routes.ping(IpAddr::V4(node.address)).await;
            let health = NodeHealth::from_ping(latency, Utc::now());

            if let Some(previous) = self.cache.get(&node.address) {
                if previous.reachable != health.reachable {
                    tracing::info!(node_id = node.id, address = %node.address, reachable = health.reachable, "Node reachability changed");
                }
            }
            metrics::record_node_reachable(&node.address.to_string(), health.reachable);

            self.cache.insert(node.address, health);
            seen.push(node.address);
        }

        // drop nodes that were deleted or disabled since the last round
        self.cache.retain(|address, _| seen.contains(address));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;
    use ipnet::Ipv4Net;

    use super::*;
    use crate::control::CommandError;
    use crate::model::{Node, NodeKind};
    use crate::store::MemoryStore;

    /// Answers pings only for the listed addresses.
    struct FakeRoutes {
        up: HashSet<IpAddr>,
    }

    #[async_trait]
    impl RouteControl for FakeRoutes {
        async fn add_route(&self, _network: Ipv4Net, _via: Ipv4Addr, _device: &str) -> Result<(), CommandError> {
            Ok(())
        }
        async fn del_route(&self, _network: Ipv4Net) -> Result<(), CommandError> {
            Ok(())
        }
        async fn ping(&self, addr: IpAddr) -> Option<f64> {
            self.up.contains(&addr).then_some(4.2)
        }
    }

    fn node(address: [u8; 4], kind: NodeKind, enabled: bool) -> Node {
        Node {
            id: 0,
            name: format!("node-{}", address[3]),
            interface: "wg0".into(),
            address: Ipv4Addr::from(address),
            private_key: String::new(),
            public_key: String::new(),
            preshared_key: String::new(),
            allow_internet: false,
            kind,
            enabled,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_check_all_caches_peers_only() {
        let store = Arc::new(MemoryStore::new());
        store.insert_node(node([10, 0, 0, 2], NodeKind::Managed, true)).await.unwrap();
        store.insert_node(node([10, 0, 0, 3], NodeKind::Managed, true)).await.unwrap();
        store.insert_node(node([10, 0, 0, 4], NodeKind::Managed, false)).await.unwrap();
        store.insert_node(node([127, 0, 0, 1], NodeKind::SelfHosted, true)).await.unwrap();

        let routes = Arc::new(FakeRoutes {
            up: HashSet::from([IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))]),
        });
        let monitor = NodeMonitor::new(store, routes, HealthCheckConfig::default());
        monitor.check_all().await;

        let up = monitor.get(Ipv4Addr::new(10, 0, 0, 2)).unwrap();
        assert!(up.reachable);
        assert_eq!(up.latency_ms, Some(4.2));
        assert!(!monitor.get(Ipv4Addr::new(10, 0, 0, 3)).unwrap().reachable);
        assert!(monitor.get(Ipv4Addr::new(10, 0, 0, 4)).is_none());
        assert!(monitor.get(Ipv4Addr::LOCALHOST).is_none());
        assert_eq!(monitor.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_removed_nodes_leave_the_cache() {
        let store = Arc::new(MemoryStore::new());
        let created = store.insert_node(node([10, 0, 0, 2], NodeKind::Managed, true)).await.unwrap();
        let routes = Arc::new(FakeRoutes { up: HashSet::new() });
        let monitor = NodeMonitor::new(store.clone(), routes, HealthCheckConfig::default());

        monitor.check_all().await;
        assert_eq!(monitor.snapshot().len(), 1);

        store.delete_node(created.id).await.unwrap();
        monitor.check_all().await;
        assert!(monitor.snapshot().is_empty());
    }
}
