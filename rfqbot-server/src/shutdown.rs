//! Signal handling for graceful shutdown and config reload.

use tokio::signal::unix::{Signal, SignalKind, signal};

/// What the daemon should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Stop the engine and exit. Carries the stop reason.
    Shutdown(&'static str),
    /// Reload the configuration file and restart the engine.
    Reload,
}

/// SIGTERM, SIGINT (Ctrl+C) and SIGHUP listeners.
pub struct Signals {
    sigterm: Signal,
    sigint: Signal,
    sighup: Signal,
}

impl Signals {
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
            sighup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the next signal.
    pub async fn next(&mut self) -> ControlSignal {
        tokio::select! {
            _ = self.sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
                ControlSignal::Shutdown("sigterm")
            }
            _ = self.sigint.recv() => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
                ControlSignal::Shutdown("sigint")
            }
            _ = self.sighup.recv() => {
                tracing::info!("Received SIGHUP, reloading configuration");
                ControlSignal::Reload
            }
        }
    }
}
