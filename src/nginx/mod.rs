//! nginx config synthesis and activation.
//!
//! # Data Flow
//! ```text
//! Domain / HttpService / TcpService + Node
//!     → location.rs / server.rs (compose NginxConf trees)
//!     → block.rs (serialize with stable alignment and blank lines)
//!     → layout.rs (pick conf.d / locations / stream.d path)
//!     → reconciler.rs (write → nginx -t → quarantine or reload)
//! ```
//!
//! # Design Decisions
//! - One tree type and one serializer for http and stream contexts
//! - Files are rewritten whole; there is no in-place patching
//! - A file's absence is the disabled state
//! - Applies are serialized so a config test always sees one writer's change

pub mod block;
pub mod layout;
pub mod location;
pub mod reconciler;
pub mod server;

pub use block::NginxConf;
pub use layout::NginxLayout;
pub use location::LocationOptions;
pub use reconciler::{ProxyError, ProxyReconciler};
