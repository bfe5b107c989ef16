pub mod bodies;
pub mod envelope;
pub mod tools;

pub use bodies::{
    AtomicAmount, BodyError, EpochMillis, Hex32, QuoteAcceptBody, QuoteBody, RfqBody, Sats,
    SolAddress, SwapInviteBody, SwapInvitePayload, SwapInviteWire, TermsBody,
};
pub use envelope::{Envelope, EnvelopeKind, LogEntry, LogInfo, LogRead, ENVELOPE_VERSION};

/// Prefix of every private settlement channel.
pub const SWAP_CHANNEL_PREFIX: &str = "swap:";

/// Name of the private settlement channel for a trade: `swap:<trade_id>`.
pub fn swap_channel_for(trade_id: &str) -> String {
    format!("{SWAP_CHANNEL_PREFIX}{trade_id}")
}

/// Inverse of [`swap_channel_for`]. Returns `None` for channels that do not
/// follow the naming convention or carry an empty trade id.
pub fn trade_id_from_swap_channel(channel: &str) -> Option<&str> {
    channel
        .strip_prefix(SWAP_CHANNEL_PREFIX)
        .filter(|trade_id| !trade_id.is_empty())
}
