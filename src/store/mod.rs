//! Persistence contract.
//!
//! # Data Flow
//! ```text
//! orchestrator
//!     → Store trait (CRUD + uniqueness-constrained writes)
//!     → MemoryStore (tokio RwLock over maps)
//!     → JSON snapshot file after every mutation (optional)
//! ```
//!
//! # Design Decisions
//! - Uniqueness is enforced on write, not by the allocators; the loser of a
//!   race gets `StoreError::Conflict` naming the offending field
//! - Ids are assigned by the store; the `id` of a record passed to `insert_*`
//!   is ignored
//! - Deleting a node cascades to its services and tokens

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{
    Domain, DomainId, HttpService, Interface, Node, NodeFilter, NodeId, PersonalAccessToken,
    ServiceFilter, ServiceId, TcpService,
};

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{field}: {message}")]
    Conflict { field: String, message: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl StoreError {
    pub fn conflict(field: &str, message: impl Into<String>) -> Self {
        StoreError::Conflict {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// CRUD over the declarative records.
#[async_trait]
pub trait Store: Send + Sync {
    async fn interface(&self, name: &str) -> Result<Option<Interface>, StoreError>;
    async fn save_interface(&self, interface: Interface) -> Result<(), StoreError>;

    async fn nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>, StoreError>;
    async fn node(&self, id: NodeId) -> Result<Option<Node>, StoreError>;
    async fn insert_node(&self, node: Node) -> Result<Node, StoreError>;
    async fn update_node(&self, node: Node) -> Result<Node, StoreError>;
    /// Removes the node with its services and tokens.
    async fn delete_node(&self, id: NodeId) -> Result<(), StoreError>;

    async fn http_services(&self, filter: &ServiceFilter) -> Result<Vec<HttpService>, StoreError>;
    async fn http_service(&self, id: ServiceId) -> Result<Option<HttpService>, StoreError>;
    async fn insert_http_service(&self, service: HttpService) -> Result<HttpService, StoreError>;
    async fn update_http_service(&self, service: HttpService) -> Result<HttpService, StoreError>;
    async fn delete_http_service(&self, id: ServiceId) -> Result<(), StoreError>;

    async fn tcp_services(&self, filter: &ServiceFilter) -> Result<Vec<TcpService>, StoreError>;
    async fn tcp_service(&self, id: ServiceId) -> Result<Option<TcpService>, StoreError>;
    async fn insert_tcp_service(&self, service: TcpService) -> Result<TcpService, StoreError>;
    async fn update_tcp_service(&self, service: TcpService) -> Result<TcpService, StoreError>;
    async fn delete_tcp_service(&self, id: ServiceId) -> Result<(), StoreError>;

    async fn domains(&self) -> Result<Vec<Domain>, StoreError>;
    async fn domain(&self, id: DomainId) -> Result<Option<Domain>, StoreError>;
    async fn domain_by_name(&self, name: &str) -> Result<Option<Domain>, StoreError>;
    async fn insert_domain(&self, domain: Domain) -> Result<Domain, StoreError>;
    async fn update_domain(&self, domain: Domain) -> Result<Domain, StoreError>;
    async fn delete_domain(&self, id: DomainId) -> Result<(), StoreError>;

    async fn tokens(&self, node_id: NodeId) -> Result<Vec<PersonalAccessToken>, StoreError>;
    async fn insert_token(&self, token: PersonalAccessToken) -> Result<PersonalAccessToken, StoreError>;
    /// Marks every token of the node revoked. Returns how many changed.
    async fn revoke_tokens(&self, node_id: NodeId) -> Result<usize, StoreError>;
}
