//! Next-action decisions for a trade.
//!
//! [`Policy::decide`] is a pure function of the trade context, the local
//! identity, the enabled features and the current time. The local peer's
//! role is never configured: it is read off the signers of the records
//! already held. Decisions are level-triggered. A trade whose action failed
//! yields the same action again on the next evaluation, and a trade whose
//! dedup flag is set yields nothing for that row.
//!
//! | row        | when                                                       | local role        |
//! |------------|------------------------------------------------------------|-------------------|
//! | quote      | rfq held, no quote of ours, no accept yet                  | not the requester |
//! | accept     | our rfq, someone else's quote, no accept yet               | requester         |
//! | invite     | our quote, someone else's accept, no invite yet            | quoter            |
//! | join       | live invite naming us, swap channel not joined yet         | invitee           |
//! | settlement | rfq, quote, accept and a live invite held, no terms of ours| inviter           |
//!
//! Quotes are held per signer, so a maker whose quote was not the first one
//! seen still finds its own. Settlement follows the invite: when the inviter
//! is one of the quoters, only the inviter settles. An invite from a peer
//! that never quoted falls back to the first quote's signer.

use super::dispatcher::{SettlementTerms, TradeAction};
use crate::trade::TradeContext;
use rfqbot_sdk::config::{AutomationConfig, AutomationFeatures};
use rfqbot_sdk::objects::Hex32;

/// Who the engine acts as, fetched once at start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    /// Side-channel public key; compared against envelope signers.
    pub peer: Hex32,
    /// Settlement signer public key, used as fee collector and refund
    /// address. Absent when the signer tool is unavailable.
    pub settlement_signer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Policy {
    local: LocalIdentity,
    features: AutomationFeatures,
    invite_ttl_ms: u64,
    usdt_mint: Option<String>,
}

impl Policy {
    pub fn new(local: LocalIdentity, config: &AutomationConfig) -> Self {
        Self {
            local,
            features: config.features(),
            invite_ttl_ms: config.invite_ttl_ms,
            usdt_mint: config.usdt_mint.clone(),
        }
    }

    pub fn local(&self) -> &LocalIdentity {
        &self.local
    }

    pub fn features(&self) -> AutomationFeatures {
        self.features
    }

    /// The next action for `ctx`, if any.
    ///
    /// Rows are mutually exclusive for a given context; they are tried from
    /// the most advanced stage back to the first.
    pub fn decide(&self, ctx: &TradeContext, now_ms: i64) -> Option<TradeAction> {
        self.settlement(ctx, now_ms)
            .or_else(|| self.join(ctx, now_ms))
            .or_else(|| self.invite(ctx))
            .or_else(|| self.accept(ctx))
            .or_else(|| self.quote(ctx))
    }

    fn is_local(&self, signer: &Hex32) -> bool {
        *signer == self.local.peer
    }

    fn quote(&self, ctx: &TradeContext) -> Option<TradeAction> {
        if !self.features.quote_from_offers || ctx.quote_sent || ctx.accept.is_some() {
            return None;
        }
        let rfq = ctx.rfq.as_ref()?;
        if self.is_local(&rfq.signer) {
            return None;
        }
        if ctx.quote_from(&self.local.peer).is_some() {
            return None;
        }
        Some(TradeAction::PostQuote {
            trade_id: ctx.trade_id.clone(),
            channel: rfq.channel.clone(),
            rfq_envelope: rfq.envelope.clone(),
            trade_fee_collector: self.local.settlement_signer.clone(),
        })
    }

    fn accept(&self, ctx: &TradeContext) -> Option<TradeAction> {
        if !self.features.accept_quotes || ctx.accept_sent || ctx.accept.is_some() {
            return None;
        }
        let rfq = ctx.rfq.as_ref()?;
        if !self.is_local(&rfq.signer) {
            return None;
        }
        let quote = ctx.quotes.iter().find(|quote| !self.is_local(&quote.signer))?;
        Some(TradeAction::AcceptQuote {
            trade_id: ctx.trade_id.clone(),
            channel: quote.channel.clone(),
            quote_envelope: quote.envelope.clone(),
        })
    }

    fn invite(&self, ctx: &TradeContext) -> Option<TradeAction> {
        if !self.features.invite_from_accepts || ctx.invite_sent || ctx.invite.is_some() {
            return None;
        }
        ctx.quote_from(&self.local.peer)?;
        let accept = ctx.accept.as_ref()?;
        if self.is_local(&accept.signer) {
            return None;
        }
        Some(TradeAction::SendInvite {
            trade_id: ctx.trade_id.clone(),
            channel: accept.channel.clone(),
            swap_channel: ctx.swap_channel(),
            accept_envelope: accept.envelope.clone(),
            invitee: accept.signer.clone(),
            ttl_ms: self.invite_ttl_ms,
        })
    }

    fn join(&self, ctx: &TradeContext, now_ms: i64) -> Option<TradeAction> {
        if !self.features.join_invites
            || ctx.join_sent
            || ctx.swap_joined
            || !ctx.invite_live(now_ms)
        {
            return None;
        }
        let invite = ctx.invite.as_ref()?;
        if !self.is_local(&invite.body.invite.payload.invitee_pub_key) {
            return None;
        }
        Some(TradeAction::JoinSwap {
            trade_id: ctx.trade_id.clone(),
            channel: invite.channel.clone(),
            swap_channel: invite.body.swap_channel.clone(),
            invite_envelope: invite.envelope.clone(),
        })
    }

    fn settlement(&self, ctx: &TradeContext, now_ms: i64) -> Option<TradeAction> {
        if !self.features.settlement || ctx.settlement_sent || !ctx.invite_live(now_ms) {
            return None;
        }
        let rfq = ctx.rfq.as_ref()?;
        let first_quote = ctx.quote()?;
        ctx.accept.as_ref()?;
        let invite = ctx.invite.as_ref()?;

        // Our own terms already on the swap channel count as sent.
        if ctx.terms.as_ref().is_some_and(|terms| self.is_local(&terms.signer)) {
            return None;
        }
        let inviter = &invite.body.invite.payload.inviter_pub_key;
        let maker = self.is_local(inviter)
            || (ctx.quote_from(inviter).is_none() && self.is_local(&first_quote.signer));
        if !maker {
            return None;
        }
        let quote = ctx.quote_from(&self.local.peer).unwrap_or(first_quote);

        Some(TradeAction::PostTerms(SettlementTerms {
            trade_id: ctx.trade_id.clone(),
            channel: ctx.swap_channel(),
            btc_sats: quote.body.btc_sats,
            usdt_amount: quote.body.usdt_amount.clone(),
            sol_recipient: rfq.body.sol_recipient.clone(),
            trade_fee_collector: quote.body.trade_fee_collector.clone(),
            sol_refund: self.local.settlement_signer.clone(),
            usdt_mint: self.usdt_mint.clone(),
        }))
    }
}
