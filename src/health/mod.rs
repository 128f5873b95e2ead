//! Node reachability monitoring.
//!
//! # Data Flow
//! ```text
//! Periodic timer (monitor.rs)
//!     → Store: enabled mesh peers
//!     → RouteControl::ping(node address)
//!     → NodeHealth cache (state.rs), keyed by address
//!     → gauge per node
//! ```
//!
//! # Design Decisions
//! - Reachability is informational; it never changes mesh or proxy config
//! - The cache is a concurrent map read by the admin surface while the
//!   monitor writes it
//! - Nodes are pinged one after another; each ping carries its own timeout

pub mod monitor;
pub mod state;

pub use monitor::NodeMonitor;
pub use state::NodeHealth;
