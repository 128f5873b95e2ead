//! Daemon lifecycle.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → SignalEvent::Shutdown
//!     SIGHUP         → SignalEvent::Rebuild (re-run ControlPlane::initialize)
//!
//! Shutdown (shutdown.rs):
//!     trigger → background loops (expiry, node monitor, admin) exit
//!             → drain with deadline → interface down → exit
//! ```
//!
//! # Design Decisions
//! - One broadcast channel reaches every long-running task
//! - Draining has a deadline; tasks still running after it are abandoned
//! - A rebuild never interrupts the background loops

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{wait_for_signal, SignalEvent};
