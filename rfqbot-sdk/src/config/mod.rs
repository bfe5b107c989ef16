//! Configuration types shared by the engine and the daemon.
//!
//! These are plain serde types. Loading them from a file and applying CLI
//! overrides is handled by the server crate.

mod automation;
mod ln_guard;

pub use automation::{AutomationConfig, AutomationFeatures, MIN_INTERVAL_MS};
pub use ln_guard::LnGuardConfig;
