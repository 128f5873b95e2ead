//! Structured logging.
//!
//! # Responsibilities
//! - Install the global tracing subscriber
//! - Pick pretty or JSON output from config
//! - Let `RUST_LOG` override the configured level

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::schema::ObservabilityConfig;

pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("gatewire={},tower_http=info", config.log_level))
    });
    let registry = tracing_subscriber::registry().with(filter);

    if config.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
