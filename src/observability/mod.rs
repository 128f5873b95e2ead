//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges via the metrics facade)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (`node_id`, `service_id`, `file`) instead of formatted text
//! - Metric updates are no-ops until an exporter is installed, so library
//!   code records unconditionally

pub mod logging;
pub mod metrics;
