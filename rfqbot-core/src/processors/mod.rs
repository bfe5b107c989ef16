//! Processors of the trade automation engine.

pub mod automation;
pub mod cursor;
pub mod dispatcher;
pub mod hygiene;
pub mod ln_peer_guard;
pub mod policy;

pub use automation::{
    EngineCounters, EngineStatus, RunOutcome, StartError, StopReport, SweepOutcome, TickOutcome,
    TickReport, TradeAutomation,
};
pub use cursor::{LogCursor, ReadPlan};
pub use dispatcher::{ActionDispatcher, ActionError, SettlementTerms, TradeAction};
pub use hygiene::{HygieneSweeper, SweepReport, SweepTick};
pub use ln_peer_guard::{
    GuardStatus, GuardTick, LightningPeers, LnPeerGuard, PeerUri, PeerUriError, TcpProber,
    TokioTcpProber, ToolLightningPeers,
};
pub use policy::{LocalIdentity, Policy};
