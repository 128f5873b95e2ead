//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGTERM, SIGINT or SIGHUP
//! - Translate them into lifecycle events for the main loop

use std::io;

/// What the daemon should do after a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    Shutdown,

    /// Rebuild all generated config from the store.
    Rebuild,
}

#[cfg(unix)]
pub async fn wait_for_signal() -> io::Result<SignalEvent> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    let event = tokio::select! {
        _ = tokio::signal::ctrl_c() => SignalEvent::Shutdown,
        _ = terminate.recv() => SignalEvent::Shutdown,
        _ = hangup.recv() => SignalEvent::Rebuild,
    };
    tracing::info!(event = ?event, "Signal received");
    Ok(event)
}

#[cfg(not(unix))]
pub async fn wait_for_signal() -> io::Result<SignalEvent> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Signal received");
    Ok(SignalEvent::Shutdown)
}
