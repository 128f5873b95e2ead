//! gatewire: WireGuard mesh and nginx reverse-proxy control plane.

pub mod config;
pub mod control;
pub mod model;
pub mod net;
pub mod store;

// Reconcilers
pub mod nginx;
pub mod wireguard;

pub mod orchestrator;

// Background work and surfaces
pub mod admin;
pub mod health;
pub mod lifecycle;
pub mod observability;

pub use config::schema::GatewireConfig;
pub use lifecycle::Shutdown;
pub use orchestrator::{Adapters, ControlError, ControlPlane};
