//! Wiring of the engine and the Lightning peer guard to one HTTP bridge.

use crate::config::{BridgeConfig, FileConfig};
use rfqbot_core::bridge::HttpBridge;
use rfqbot_core::processors::{
    LnPeerGuard, StartError, TokioTcpProber, ToolLightningPeers, TradeAutomation,
};
use rfqbot_sdk::config::LnGuardConfig;
use std::sync::Arc;

pub struct Daemon {
    bridge_config: BridgeConfig,
    bridge: Arc<HttpBridge>,
    engine: TradeAutomation,
    guard: Option<Arc<LnPeerGuard>>,
}

impl Daemon {
    /// Build the bridge and an idle engine. The `[bridge]` section is fixed
    /// for the lifetime of the process.
    pub fn new(bridge_config: BridgeConfig) -> Self {
        let bridge = Arc::new(HttpBridge::new(
            bridge_config.base_url.clone(),
            bridge_config.token.clone(),
            bridge_config.timeout(),
        ));
        let engine = TradeAutomation::new(bridge.clone(), bridge.clone());
        Self {
            bridge_config,
            bridge,
            engine,
            guard: None,
        }
    }

    /// Start the engine and, when configured, the peer guard.
    pub async fn start(&mut self, config: &FileConfig) -> Result<(), StartError> {
        let status = self.engine.start(config.automation.clone()).await?;
        tracing::info!(
            local_peer = status.local_peer.as_deref().unwrap_or("unknown"),
            channels = ?status.channels,
            trades = status.trades,
            "Engine running"
        );
        if let Some(guard_config) = &config.ln_guard {
            self.start_guard(guard_config);
        }
        Ok(())
    }

    /// Stop everything, then start again with the reloaded configuration.
    pub async fn reload(&mut self, config: &FileConfig) {
        if config.bridge != self.bridge_config {
            tracing::warn!("Bridge settings changed; they take effect after a restart");
        }

        self.stop_guard().await;
        let report = self.engine.stop("config_reload").await;
        tracing::debug!(counters = ?report.counters, "Engine stopped for reload");

        match self.start(config).await {
            Ok(()) => tracing::info!("Configuration reloaded successfully"),
            Err(e) => tracing::error!(error = %e, "Failed to restart engine after reload"),
        }
    }

    pub async fn shutdown(mut self, reason: &str) {
        self.stop_guard().await;
        let report = self.engine.stop(reason).await;
        tracing::info!(
            reason,
            was_running = report.was_running,
            drained = report.drained,
            counters = ?report.counters,
            "Engine stopped"
        );
    }

    // -- Private helpers ----------------------------------------------------

    fn start_guard(&mut self, config: &LnGuardConfig) {
        let guard = Arc::new(LnPeerGuard::new(
            config,
            Arc::new(ToolLightningPeers::new(self.bridge.clone())),
            Arc::new(TokioTcpProber),
        ));
        let status = guard.start();
        tracing::info!(peer = %status.peer, interval_ms = status.interval_ms, "LN peer guard running");
        self.guard = Some(guard);
    }

    async fn stop_guard(&mut self) {
        if let Some(guard) = self.guard.take() {
            guard.stop().await;
        }
    }
}
