//! Start options of the trade automation engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lower bound applied to both timer intervals.
pub const MIN_INTERVAL_MS: u64 = 250;

/// The options object passed to `start()`.
///
/// Every `enable_*` flag gates exactly one automated action and defaults to
/// off, so an empty `[automation]` section only watches the logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Side-channels to subscribe to and poll.
    pub channels: Vec<String>,
    /// Mint of the settlement asset, forwarded with settlement terms.
    pub usdt_mint: Option<String>,
    /// Main poll cadence.
    pub poll_interval_ms: u64,
    /// Hygiene sweep cadence, independent of the poll cadence.
    pub hygiene_interval_ms: u64,
    /// Lifetime of invites this peer issues.
    pub invite_ttl_ms: u64,
    /// How long `stop` waits for a run in progress.
    pub stop_timeout_ms: u64,
    pub enable_quote_from_offers: bool,
    pub enable_accept_quotes: bool,
    pub enable_invite_from_accepts: bool,
    pub enable_join_invites: bool,
    pub enable_settlement: bool,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            usdt_mint: None,
            poll_interval_ms: 1_000,
            hygiene_interval_ms: 10_000,
            invite_ttl_ms: 600_000,
            stop_timeout_ms: 30_000,
            enable_quote_from_offers: false,
            enable_accept_quotes: false,
            enable_invite_from_accepts: false,
            enable_join_invites: false,
            enable_settlement: false,
        }
    }
}

impl AutomationConfig {
    /// The enable flags as one copyable value.
    pub fn features(&self) -> AutomationFeatures {
        AutomationFeatures {
            quote_from_offers: self.enable_quote_from_offers,
            accept_quotes: self.enable_accept_quotes,
            invite_from_accepts: self.enable_invite_from_accepts,
            join_invites: self.enable_join_invites,
            settlement: self.enable_settlement,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_INTERVAL_MS))
    }

    pub fn hygiene_interval(&self) -> Duration {
        Duration::from_millis(self.hygiene_interval_ms.max(MIN_INTERVAL_MS))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Independent toggles, one per automated action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AutomationFeatures {
    pub quote_from_offers: bool,
    pub accept_quotes: bool,
    pub invite_from_accepts: bool,
    pub join_invites: bool,
    pub settlement: bool,
}

impl AutomationFeatures {
    /// All actions enabled.
    pub const fn all() -> Self {
        Self {
            quote_from_offers: true,
            accept_quotes: true,
            invite_from_accepts: true,
            join_invites: true,
            settlement: true,
        }
    }
}
