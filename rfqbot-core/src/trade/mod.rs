//! Per-trade context accumulated from swap events.
//!
//! A [`TradeContext`] holds at most one record per envelope kind, except for
//! quotes, of which it holds one per signer so that competing makers each
//! keep their own. The first record of a slot wins: a later event for the
//! same slot is either a redelivery (same signer and nonce, ignored) or a
//! conflict (counted and ignored). Records are never replaced, so a decision
//! taken against a record stays valid for the life of the trade.

mod store;

pub use store::{SharedTradeStore, TradeStore};

use crate::events::{SwapEvent, SwapEventBody};
use rfqbot_sdk::objects::{
    Hex32, QuoteAcceptBody, QuoteBody, RfqBody, SwapInviteBody, TermsBody, swap_channel_for,
};
use serde_json::Value;
use std::fmt;

/// One event's contribution to a trade, tagged with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded<T> {
    pub signer: Hex32,
    pub channel: String,
    pub seq: u64,
    pub ts: i64,
    pub nonce: String,
    pub body: T,
    pub envelope: Value,
}

/// Externally visible actions the automation can take for a trade.
///
/// Each kind has one dedup flag on [`TradeContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Quote,
    Accept,
    Invite,
    Join,
    Settlement,
    Leave,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Quote => "quote",
            ActionKind::Accept => "accept",
            ActionKind::Invite => "invite",
            ActionKind::Join => "join",
            ActionKind::Settlement => "settlement",
            ActionKind::Leave => "leave",
        };
        f.write_str(name)
    }
}

/// Negotiation progress, derived from the most advanced record present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TradeStatus {
    NoRfq,
    Requested,
    Quoted,
    Accepted,
    Invited,
    Settled,
}

/// Result of merging one event into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First event of a previously unseen trade.
    Created,
    /// Filled an empty slot of an existing trade.
    Recorded,
    /// Same signer and nonce as the record already held.
    Duplicate,
    /// A different event of a kind already recorded; kept the first.
    Conflict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeContext {
    pub trade_id: String,
    pub rfq: Option<Recorded<RfqBody>>,
    /// One quote per signer, in arrival order.
    pub quotes: Vec<Recorded<QuoteBody>>,
    pub accept: Option<Recorded<QuoteAcceptBody>>,
    pub invite: Option<Recorded<SwapInviteBody>>,
    pub terms: Option<Recorded<TermsBody>>,

    pub quote_sent: bool,
    pub accept_sent: bool,
    pub invite_sent: bool,
    pub join_sent: bool,
    pub settlement_sent: bool,
    pub channel_left: bool,

    /// The peer last reported itself joined to this trade's swap channel.
    pub swap_joined: bool,

    /// Number of conflicting events dropped by the first-wins merge.
    pub conflicts: u32,
}

impl TradeContext {
    pub fn new(trade_id: impl Into<String>) -> Self {
        Self {
            trade_id: trade_id.into(),
            rfq: None,
            quotes: Vec::new(),
            accept: None,
            invite: None,
            terms: None,
            quote_sent: false,
            accept_sent: false,
            invite_sent: false,
            join_sent: false,
            settlement_sent: false,
            channel_left: false,
            swap_joined: false,
            conflicts: 0,
        }
    }

    pub fn status(&self) -> TradeStatus {
        if self.settlement_sent || self.terms.is_some() {
            TradeStatus::Settled
        } else if self.invite.is_some() {
            TradeStatus::Invited
        } else if self.accept.is_some() {
            TradeStatus::Accepted
        } else if !self.quotes.is_empty() {
            TradeStatus::Quoted
        } else if self.rfq.is_some() {
            TradeStatus::Requested
        } else {
            TradeStatus::NoRfq
        }
    }

    /// The first quote received for this trade.
    pub fn quote(&self) -> Option<&Recorded<QuoteBody>> {
        self.quotes.first()
    }

    pub fn quote_from(&self, signer: &Hex32) -> Option<&Recorded<QuoteBody>> {
        self.quotes.iter().find(|quote| quote.signer == *signer)
    }

    /// `swap:<trade_id>`
    pub fn swap_channel(&self) -> String {
        swap_channel_for(&self.trade_id)
    }

    pub fn invite_expires_at(&self) -> Option<i64> {
        self.invite
            .as_ref()
            .map(|invite| invite.body.invite.payload.expires_at.get())
    }

    /// True while a recorded invite has `expiresAt > now_ms`.
    pub fn invite_live(&self, now_ms: i64) -> bool {
        self.invite_expires_at()
            .is_some_and(|expires_at| expires_at > now_ms)
    }

    /// True once a recorded invite has `expiresAt <= now_ms`. A trade without
    /// an invite is neither live nor expired.
    pub fn invite_expired(&self, now_ms: i64) -> bool {
        self.invite_expires_at()
            .is_some_and(|expires_at| expires_at <= now_ms)
    }

    pub fn is_done(&self, kind: ActionKind) -> bool {
        match kind {
            ActionKind::Quote => self.quote_sent,
            ActionKind::Accept => self.accept_sent,
            ActionKind::Invite => self.invite_sent,
            ActionKind::Join => self.join_sent,
            ActionKind::Settlement => self.settlement_sent,
            ActionKind::Leave => self.channel_left,
        }
    }

    pub fn mark_done(&mut self, kind: ActionKind) {
        let flag = match kind {
            ActionKind::Quote => &mut self.quote_sent,
            ActionKind::Accept => &mut self.accept_sent,
            ActionKind::Invite => &mut self.invite_sent,
            ActionKind::Join => &mut self.join_sent,
            ActionKind::Settlement => &mut self.settlement_sent,
            ActionKind::Leave => &mut self.channel_left,
        };
        *flag = true;
    }

    pub(crate) fn merge(&mut self, event: SwapEvent) -> MergeOutcome {
        let (provenance, body) = Provenance::split(event);
        let outcome = match body {
            SwapEventBody::Rfq(body) => merge_slot(&mut self.rfq, provenance.with(body)),
            SwapEventBody::Quote(body) => merge_quote(&mut self.quotes, provenance.with(body)),
            SwapEventBody::QuoteAccept(body) => merge_slot(&mut self.accept, provenance.with(body)),
            SwapEventBody::SwapInvite(body) => merge_slot(&mut self.invite, provenance.with(body)),
            SwapEventBody::Terms(body) => merge_slot(&mut self.terms, provenance.with(body)),
        };
        if outcome == MergeOutcome::Conflict {
            self.conflicts = self.conflicts.saturating_add(1);
        }
        outcome
    }
}

struct Provenance {
    signer: Hex32,
    channel: String,
    seq: u64,
    ts: i64,
    nonce: String,
    envelope: Value,
}

impl Provenance {
    fn split(event: SwapEvent) -> (Self, SwapEventBody) {
        let provenance = Provenance {
            signer: event.signer,
            channel: event.channel,
            seq: event.seq,
            ts: event.ts,
            nonce: event.nonce,
            envelope: event.envelope,
        };
        (provenance, event.body)
    }

    fn with<T>(self, body: T) -> Recorded<T> {
        Recorded {
            signer: self.signer,
            channel: self.channel,
            seq: self.seq,
            ts: self.ts,
            nonce: self.nonce,
            body,
            envelope: self.envelope,
        }
    }
}

fn merge_slot<T>(slot: &mut Option<Recorded<T>>, record: Recorded<T>) -> MergeOutcome {
    match slot {
        None => {
            *slot = Some(record);
            MergeOutcome::Recorded
        }
        Some(existing) => compare(existing, &record),
    }
}

fn merge_quote(
    quotes: &mut Vec<Recorded<QuoteBody>>,
    record: Recorded<QuoteBody>,
) -> MergeOutcome {
    match quotes.iter().find(|quote| quote.signer == record.signer) {
        Some(existing) => compare(existing, &record),
        None => {
            quotes.push(record);
            MergeOutcome::Recorded
        }
    }
}

fn compare<T>(existing: &Recorded<T>, record: &Recorded<T>) -> MergeOutcome {
    if existing.signer == record.signer && existing.nonce == record.nonce {
        MergeOutcome::Duplicate
    } else {
        MergeOutcome::Conflict
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Event builders shared by the unit tests of this crate.

    use crate::events::{SwapEvent, SwapEventBody};
    use rfqbot_sdk::objects::*;
    use serde_json::{Value, json};

    pub const MAKER: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    pub const TAKER: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    pub const SOL_RECIPIENT: &str = "4gRG1QE1YofRgCtTuwEDftYx9aEr9N1z5bFTJTbPNqmg";
    pub const RFQ_CHANNEL: &str = "0000intercomswapbtcusdt";

    pub fn key(hex: &str) -> Hex32 {
        Hex32::parse(hex).unwrap()
    }

    fn event(trade_id: &str, seq: u64, signer: &str, body: SwapEventBody) -> SwapEvent {
        SwapEvent {
            channel: RFQ_CHANNEL.to_string(),
            seq,
            trade_id: trade_id.to_string(),
            signer: key(signer),
            ts: 1_700_000_000_000,
            nonce: format!("{}-{seq}", body.kind()),
            envelope: json!({"kind": body.kind().as_str(), "trade_id": trade_id, "seq": seq}),
            body,
        }
    }

    fn body<T: serde::de::DeserializeOwned>(value: Value) -> T {
        serde_json::from_value(value).unwrap()
    }

    pub fn rfq(trade_id: &str, seq: u64, signer: &str) -> SwapEvent {
        event(
            trade_id,
            seq,
            signer,
            SwapEventBody::Rfq(body(json!({
                "btc_sats": 10000,
                "usdt_amount": "1000000",
                "sol_recipient": SOL_RECIPIENT,
            }))),
        )
    }

    pub fn quote(trade_id: &str, seq: u64, signer: &str) -> SwapEvent {
        event(
            trade_id,
            seq,
            signer,
            SwapEventBody::Quote(body(json!({
                "rfq_id": "d".repeat(64),
                "btc_sats": 10000,
                "usdt_amount": "1000000",
                "trade_fee_collector": SOL_RECIPIENT,
            }))),
        )
    }

    pub fn accept(trade_id: &str, seq: u64, signer: &str) -> SwapEvent {
        event(
            trade_id,
            seq,
            signer,
            SwapEventBody::QuoteAccept(body(json!({
                "rfq_id": "d".repeat(64),
                "quote_id": "e".repeat(64),
            }))),
        )
    }

    pub fn invite(
        trade_id: &str,
        seq: u64,
        inviter: &str,
        invitee: &str,
        expires_at: i64,
    ) -> SwapEvent {
        event(
            trade_id,
            seq,
            inviter,
            SwapEventBody::SwapInvite(body(json!({
                "swap_channel": swap_channel_for(trade_id),
                "invite": {
                    "payload": {
                        "inviteePubKey": invitee,
                        "inviterPubKey": inviter,
                        "expiresAt": expires_at,
                    },
                    "sig": "f".repeat(128),
                },
            }))),
        )
    }

    pub fn terms(trade_id: &str, seq: u64, signer: &str) -> SwapEvent {
        let mut event = event(
            trade_id,
            seq,
            signer,
            SwapEventBody::Terms(body(json!({"btc_sats": 10000, "usdt_amount": "1000000"}))),
        );
        event.channel = swap_channel_for(trade_id);
        event
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_status_follows_most_advanced_record() {
        let mut ctx = TradeContext::new("t1");
        assert_eq!(ctx.status(), TradeStatus::NoRfq);
        ctx.merge(rfq("t1", 1, TAKER));
        assert_eq!(ctx.status(), TradeStatus::Requested);
        ctx.merge(quote("t1", 2, MAKER));
        assert_eq!(ctx.status(), TradeStatus::Quoted);
        ctx.merge(accept("t1", 3, TAKER));
        assert_eq!(ctx.status(), TradeStatus::Accepted);
        ctx.merge(invite("t1", 4, MAKER, TAKER, 2_000));
        assert_eq!(ctx.status(), TradeStatus::Invited);
        ctx.mark_done(ActionKind::Settlement);
        assert_eq!(ctx.status(), TradeStatus::Settled);
    }

    #[test]
    fn test_invite_without_rfq_is_invited() {
        let mut ctx = TradeContext::new("t2");
        ctx.merge(invite("t2", 1, MAKER, TAKER, 2_000));
        assert_eq!(ctx.status(), TradeStatus::Invited);
    }

    #[test]
    fn test_first_record_wins() {
        let mut ctx = TradeContext::new("t1");
        assert_eq!(ctx.merge(accept("t1", 2, TAKER)), MergeOutcome::Recorded);
        // redelivery of the same envelope
        assert_eq!(ctx.merge(accept("t1", 2, TAKER)), MergeOutcome::Duplicate);
        // a competing accept
        assert_eq!(ctx.merge(accept("t1", 5, MAKER)), MergeOutcome::Conflict);
        assert_eq!(ctx.accept.as_ref().unwrap().signer.as_str(), TAKER);
        assert_eq!(ctx.accept.as_ref().unwrap().seq, 2);
        assert_eq!(ctx.conflicts, 1);
    }

    #[test]
    fn test_quotes_are_kept_per_signer() {
        let other = "cccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc";
        let mut ctx = TradeContext::new("t1");
        assert_eq!(ctx.merge(quote("t1", 2, other)), MergeOutcome::Recorded);
        assert_eq!(ctx.merge(quote("t1", 3, MAKER)), MergeOutcome::Recorded);
        assert_eq!(ctx.merge(quote("t1", 3, MAKER)), MergeOutcome::Duplicate);
        // a second, different quote from the same maker
        assert_eq!(ctx.merge(quote("t1", 4, MAKER)), MergeOutcome::Conflict);

        assert_eq!(ctx.quotes.len(), 2);
        assert_eq!(ctx.quote().unwrap().signer.as_str(), other);
        assert_eq!(ctx.quote_from(&key(MAKER)).unwrap().seq, 3);
        assert!(ctx.quote_from(&key(TAKER)).is_none());
        assert_eq!(ctx.conflicts, 1);
    }

    #[test]
    fn test_invite_expiry_boundary() {
        let mut ctx = TradeContext::new("t1");
        assert!(!ctx.invite_live(1_000));
        assert!(!ctx.invite_expired(1_000));

        ctx.merge(invite("t1", 1, MAKER, TAKER, 1_000));
        assert!(ctx.invite_live(999));
        assert!(!ctx.invite_expired(999));
        assert!(!ctx.invite_live(1_000));
        assert!(ctx.invite_expired(1_000));
    }

    #[test]
    fn test_dedup_flags_are_independent() {
        let mut ctx = TradeContext::new("t1");
        ctx.mark_done(ActionKind::Join);
        assert!(ctx.is_done(ActionKind::Join));
        for kind in [
            ActionKind::Quote,
            ActionKind::Accept,
            ActionKind::Invite,
            ActionKind::Settlement,
            ActionKind::Leave,
        ] {
            assert!(!ctx.is_done(kind), "{kind} should be unset");
        }
    }
}
