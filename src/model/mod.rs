//! Declarative records the control plane reconciles into live config.
//!
//! # Ownership
//! ```text
//! Interface ── one per mesh
//! Node ─┬─ HttpService*   (cascade delete)
//!       ├─ TcpService*    (cascade delete)
//!       └─ PersonalAccessToken* (cascade delete)
//! Domain ◄── referenced by services by name, never owned
//! ```

pub mod domain;
pub mod interface;
pub mod node;
pub mod service;
pub mod token;

pub use domain::{Domain, DomainId, DomainUpdate, NewDomain, OAuthGate, SslMode, SslPair};
pub use interface::Interface;
pub use node::{NewNode, Node, NodeFilter, NodeId, NodeKind, NodeSummary, NodeUpdate};
pub use service::{
    AccessRules, BackendProto, HttpService, HttpServiceUpdate, NewHttpService, NewTcpService,
    ServiceFilter, ServiceId, StreamProto, TcpService, TcpServiceUpdate,
};
pub use token::{PersonalAccessToken, TokenId};
