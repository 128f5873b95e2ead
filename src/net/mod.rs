//! Network resource subsystem.
//!
//! # Data Flow
//! ```text
//! orchestrator
//!     → allocator.rs (busy set from store → first free address / port)
//!     → probe.rs (live TCP/TLS connect with timeout, gateway-scoped DNS)
//! ```
//!
//! # Design Decisions
//! - Allocators are pure over their inputs; live probing is injected
//! - Exhaustion is a typed error, never a sentinel value
//! - Probes never error; unreachable and timed out both read as `false`

pub mod allocator;
pub mod probe;

pub use allocator::{AllocError, PortRange};
pub use probe::{probe_tcp_connect, ProbeTarget};
