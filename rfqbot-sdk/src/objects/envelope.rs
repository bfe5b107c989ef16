//! Envelopes and the log shapes that carry them.
//!
//! An [`Envelope`] is one signed protocol message. The side-channel keeps a
//! per-channel, sequence-numbered log of received envelopes; a reader sees
//! them as [`LogEntry`] rows through the [`LogInfo`] / [`LogRead`] calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Protocol version stamped on every envelope this crate produces.
pub const ENVELOPE_VERSION: u32 = 1;

/// The closed set of envelope kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvelopeKind {
    /// Taker announces the swap it wants.
    #[serde(rename = "swap.rfq")]
    Rfq,
    /// Maker answers an RFQ with priced terms.
    #[serde(rename = "swap.quote")]
    Quote,
    /// Taker accepts one specific quote.
    #[serde(rename = "swap.quote_accept")]
    QuoteAccept,
    /// Maker invites the taker into the private settlement channel.
    #[serde(rename = "swap.swap_invite")]
    SwapInvite,
    /// Settlement terms posted on the private settlement channel.
    #[serde(rename = "swap.terms")]
    Terms,
}

impl EnvelopeKind {
    pub const ALL: [EnvelopeKind; 5] = [
        EnvelopeKind::Rfq,
        EnvelopeKind::Quote,
        EnvelopeKind::QuoteAccept,
        EnvelopeKind::SwapInvite,
        EnvelopeKind::Terms,
    ];

    /// Wire name of the kind (`swap.rfq`, ...).
    pub const fn as_str(&self) -> &'static str {
        match self {
            EnvelopeKind::Rfq => "swap.rfq",
            EnvelopeKind::Quote => "swap.quote",
            EnvelopeKind::QuoteAccept => "swap.quote_accept",
            EnvelopeKind::SwapInvite => "swap.swap_invite",
            EnvelopeKind::Terms => "swap.terms",
        }
    }

    /// Parse a wire name. Unknown names yield `None`.
    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One signed protocol message.
///
/// `kind` is kept as the raw wire string so that an unknown kind can be
/// reported precisely by the decoder instead of failing the whole envelope.
/// `sig` covers the normalized body and is verified upstream of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub v: u32,
    pub kind: String,
    pub trade_id: String,
    pub ts: i64,
    pub nonce: String,
    pub body: Value,
    pub signer: String,
    pub sig: String,
}

/// One row of a channel log.
///
/// `message` is left untyped: a malformed message must be rejected by the
/// decoder without failing the surrounding read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    #[serde(default)]
    pub ts: i64,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub kind: Option<String>,
    pub message: Value,
}

/// Cheap log summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogInfo {
    pub latest_seq: u64,
}

/// Result of a full log read: only entries newer than the requested
/// position, in ascending sequence order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRead {
    pub latest_seq: u64,
    #[serde(default)]
    pub events: Vec<LogEntry>,
}
