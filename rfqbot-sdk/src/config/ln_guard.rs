//! Lightning peer guard configuration.

use serde::{Deserialize, Serialize};

/// Options of the Lightning routing-peer guard.
///
/// Values below the guard's minimums are raised when the guard is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LnGuardConfig {
    /// `nodeid@host:port` of the peer to keep connected.
    pub peer_uri: String,
    pub interval_ms: u64,
    pub reconnect_cooldown_ms: u64,
    pub tcp_timeout_ms: u64,
}

impl LnGuardConfig {
    pub const DEFAULT_PEER_URI: &str =
        "03864ef025fde8fb587d989186ce6a4a186895ee44a926bfc370e2c366597a3f8f@3.33.236.230:9735";
}

impl Default for LnGuardConfig {
    fn default() -> Self {
        Self {
            peer_uri: Self::DEFAULT_PEER_URI.to_string(),
            interval_ms: 15_000,
            reconnect_cooldown_ms: 45_000,
            tcp_timeout_ms: 800,
        }
    }
}
