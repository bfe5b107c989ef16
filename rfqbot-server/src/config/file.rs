//! TOML file configuration structures.
//!
//! These structs map directly to the `rfqbot.toml` file format.

use rfqbot_sdk::config::{AutomationConfig, LnGuardConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    /// The Lightning peer guard runs only when this section is present.
    #[serde(default)]
    pub ln_guard: Option<LnGuardConfig>,
}

/// Where the peer's log and tool endpoints live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub base_url: Url,
    /// Sent as a bearer token when set.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl BridgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
