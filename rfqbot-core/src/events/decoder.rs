//! Log entry → [`SwapEvent`] decoding.
//!
//! Every field is checked against the schema of its kind. Nothing is coerced:
//! an amount of `"12abc"` or a 63-character key fails the entry with a
//! specific [`DecodeError`] instead of becoming a default value.

use super::types::{SwapEvent, SwapEventBody};
use rfqbot_sdk::objects::{
    BodyError, ENVELOPE_VERSION, EpochMillis, Envelope, EnvelopeKind, Hex32, LogEntry,
    SwapInviteBody, swap_channel_for,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u32),

    #[error("unknown envelope kind {0:?}")]
    UnknownKind(String),

    #[error("log entry kind {entry:?} does not match envelope kind {envelope}")]
    KindMismatch { entry: String, envelope: EnvelopeKind },

    #[error("empty trade_id")]
    EmptyTradeId,

    #[error("empty nonce")]
    EmptyNonce,

    #[error("invalid signer: {0}")]
    Signer(#[source] BodyError),

    #[error("invalid timestamp: {0}")]
    Timestamp(#[source] BodyError),

    #[error("invalid {kind} body: {source}")]
    Body {
        kind: EnvelopeKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("swap channel {found:?} does not belong to trade {trade_id:?}")]
    ChannelMismatch { trade_id: String, found: String },
}

/// Decode one log entry.
///
/// A failure concerns only this entry; callers drop it and carry on with the
/// rest of the batch.
pub fn decode_entry(entry: &LogEntry) -> Result<SwapEvent, DecodeError> {
    let envelope: Envelope =
        serde_json::from_value(entry.message.clone()).map_err(DecodeError::Envelope)?;

    if envelope.v != ENVELOPE_VERSION {
        return Err(DecodeError::UnsupportedVersion(envelope.v));
    }
    let kind = EnvelopeKind::from_wire(&envelope.kind)
        .ok_or_else(|| DecodeError::UnknownKind(envelope.kind.clone()))?;
    if let Some(entry_kind) = entry.kind.as_deref().filter(|k| *k != kind.as_str()) {
        return Err(DecodeError::KindMismatch {
            entry: entry_kind.to_string(),
            envelope: kind,
        });
    }

    let trade_id = envelope.trade_id.trim();
    if trade_id.is_empty() {
        return Err(DecodeError::EmptyTradeId);
    }
    if envelope.nonce.trim().is_empty() {
        return Err(DecodeError::EmptyNonce);
    }
    let signer = Hex32::parse(&envelope.signer).map_err(DecodeError::Signer)?;
    let ts = EpochMillis::new(envelope.ts).map_err(DecodeError::Timestamp)?;

    let body = match kind {
        EnvelopeKind::Rfq => SwapEventBody::Rfq(body_of(kind, &envelope.body)?),
        EnvelopeKind::Quote => SwapEventBody::Quote(body_of(kind, &envelope.body)?),
        EnvelopeKind::QuoteAccept => SwapEventBody::QuoteAccept(body_of(kind, &envelope.body)?),
        EnvelopeKind::SwapInvite => {
            let invite: SwapInviteBody = body_of(kind, &envelope.body)?;
            let expected = swap_channel_for(trade_id);
            let payload_channel = invite.invite.payload.channel.as_deref();
            if invite.swap_channel != expected
                || payload_channel.is_some_and(|channel| channel.trim() != expected)
            {
                return Err(DecodeError::ChannelMismatch {
                    trade_id: trade_id.to_string(),
                    found: invite.swap_channel,
                });
            }
            SwapEventBody::SwapInvite(invite)
        }
        EnvelopeKind::Terms => SwapEventBody::Terms(body_of(kind, &envelope.body)?),
    };

    Ok(SwapEvent {
        channel: entry.channel.clone(),
        seq: entry.seq,
        trade_id: trade_id.to_string(),
        signer,
        ts: ts.get(),
        nonce: envelope.nonce,
        body,
        envelope: entry.message.clone(),
    })
}

fn body_of<T: DeserializeOwned>(kind: EnvelopeKind, body: &Value) -> Result<T, DecodeError> {
    T::deserialize(body).map_err(|source| DecodeError::Body { kind, source })
}
