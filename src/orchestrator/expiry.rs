//! TTL expiry sweep.
//!
//! # Responsibilities
//! - Find enabled services expiring before the next full minute
//! - Disable already-expired services at once
//! - Start one timer per service still in the future
//! - Drive the sweep periodically until shutdown

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time;

use crate::model::{ServiceFilter, ServiceId};
use crate::observability::metrics;
use crate::orchestrator::{ControlError, ControlPlane};

/// Identity of a service across both kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKey {
    Http(ServiceId),
    Tcp(ServiceId),
}

impl ServiceKey {
    fn kind(&self) -> &'static str {
        match self {
            ServiceKey::Http(_) => "http",
            ServiceKey::Tcp(_) => "tcp",
        }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExpirySweep {
    pub disabled: usize,
    pub scheduled: usize,
}

/// Start of the minute after `now`.
fn next_full_minute(now: DateTime<Utc>) -> DateTime<Utc> {
    let next = (now.timestamp().div_euclid(60) + 1) * 60;
    DateTime::from_timestamp(next, 0).unwrap_or(now)
}

impl ControlPlane {
    /// Disable everything already expired and schedule what expires before
    /// the next full minute.
    pub async fn sweep_expired(self: &Arc<Self>) -> Result<ExpirySweep, ControlError> {
        let now = Utc::now();
        let horizon = next_full_minute(now);
        let filter = ServiceFilter::enabled();

        let mut due = Vec::new();
        for service in self.store.http_services(&filter).await? {
            if let Some(at) = service.expires_at.filter(|at| *at < horizon) {
                due.push((ServiceKey::Http(service.id), at));
            }
        }
        for service in self.store.tcp_services(&filter).await? {
            if let Some(at) = service.expires_at.filter(|at| *at < horizon) {
                due.push((ServiceKey::Tcp(service.id), at));
            }
        }

        let mut sweep = ExpirySweep::default();
        for (key, at) in due {
            if at <= now {
                if self.expire(key).await {
                    sweep.disabled += 1;
                }
                continue;
            }
            if !self.pending_expiry.insert(key) {
                continue;
            }

            let delay = (at - now).to_std().unwrap_or_default();
            let plane = Arc::clone(self);
            tokio::spawn(async move {
                time::sleep(delay).await;
                plane.expire(key).await;
                plane.pending_expiry.remove(&key);
            });
            sweep.scheduled += 1;
        }

        if sweep.disabled > 0 || sweep.scheduled > 0 {
            tracing::info!(disabled = sweep.disabled, scheduled = sweep.scheduled, "Expiry sweep finished");
        }
        Ok(sweep)
    }

    /// Disable a service if it is still enabled and past its expiry. It may
    /// have been re-enabled with a new TTL since it was scheduled.
    async fn expire(&self, key: ServiceKey) -> bool {
        let now = Utc::now();
        let result = match key {
            ServiceKey::Http(id) => match self.store.http_service(id).await {
                Ok(Some(s)) if s.enabled && s.expires_at.is_some_and(|at| at <= now) => {
                    self.disable_http_service(id).await.map(|_| true)
                }
                Ok(_) => Ok(false),
                Err(e) => Err(e.into()),
            },
            ServiceKey::Tcp(id) => match self.store.tcp_service(id).await {
                Ok(Some(s)) if s.enabled && s.expires_at.is_some_and(|at| at <= now) => {
                    self.disable_tcp_service(id).await.map(|_| true)
                }
                Ok(_) => Ok(false),
                Err(e) => Err(e.into()),
            },
        };

        match result {
            Ok(true) => {
                metrics::record_expired(key.kind());
                tracing::info!(service = ?key, "Service expired and was disabled");
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::error!(service = ?key, error = %e, "Failed to disable expired service");
                false
            }
        }
    }

    /// Run the sweep every `expiry.interval_secs` until shutdown.
    pub async fn run_expiry(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.expiry.enabled {
            tracing::info!("Expiry sweep disabled");
            return;
        }

        let interval = Duration::from_secs(self.config.expiry.interval_secs);
        tracing::info!(interval_secs = interval.as_secs(), "Expiry sweep starting");
        let mut ticker = time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_expired().await {
                        tracing::error!(error = %e, "Expiry sweep failed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Expiry sweep received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
