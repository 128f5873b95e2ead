//! WireGuard mesh management.
//!
//! # Data Flow
//! ```text
//! Node change
//!     → mesh.rs (persist, allocate, keys via WgControl)
//!     → conf.rs (render [Interface] + one [Peer] per enabled node)
//!     → <config_dir>/<iface>.conf (0600)
//!     → wg syncconf / wg-quick up
//!
//! wg show <iface> dump → dump.rs → status.rs → NodeWithRuntime
//! ```
//!
//! # Design Decisions
//! - The interface file is always rewritten whole from persisted records
//! - Disabled nodes are omitted from the file, not commented out
//! - Status is derived on read and never persisted
//! - Route changes are best effort; a failed mesh apply restores the old route

pub mod conf;
pub mod dump;
pub mod mesh;
pub mod status;

pub use conf::ClientWgConfig;
pub use mesh::{MeshError, MeshManager};
pub use status::{NodeStatus, NodeWithRuntime};
