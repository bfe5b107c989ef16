use super::{ActionKind, MergeOutcome, TradeContext};
use crate::events::SwapEvent;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// The store shared by the poll tick, the dispatcher and the hygiene sweep.
///
/// Holders must not keep the guard across a tool call.
pub type SharedTradeStore = Arc<Mutex<TradeStore>>;

/// In-memory table of trades keyed by `trade_id`.
///
/// Contexts live as long as the store; there is no eviction. The store also
/// keeps the last channel membership reported by the peer, mirrored onto
/// each context as [`TradeContext::swap_joined`].
#[derive(Debug, Default)]
pub struct TradeStore {
    trades: BTreeMap<String, TradeContext>,
    membership: BTreeSet<String>,
}

impl TradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedTradeStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Merge an event into the context of its trade, creating it if needed.
    pub fn apply(&mut self, event: SwapEvent) -> MergeOutcome {
        let trade_id = event.trade_id.clone();
        let kind = event.kind();
        let seq = event.seq;

        let created = !self.trades.contains_key(&trade_id);
        let membership = &self.membership;
        let ctx = self.trades.entry(trade_id.clone()).or_insert_with(|| {
            let mut ctx = TradeContext::new(trade_id.clone());
            ctx.swap_joined = membership.contains(&ctx.swap_channel());
            ctx
        });

        match ctx.merge(event) {
            MergeOutcome::Conflict => {
                debug!(
                    trade_id = %trade_id,
                    kind = %kind,
                    seq,
                    "Ignoring conflicting event, first record wins"
                );
                MergeOutcome::Conflict
            }
            MergeOutcome::Recorded if created => MergeOutcome::Created,
            outcome => outcome,
        }
    }

    pub fn get(&self, trade_id: &str) -> Option<&TradeContext> {
        self.trades.get(trade_id)
    }

    /// All trades in `trade_id` order.
    pub fn all(&self) -> impl Iterator<Item = &TradeContext> {
        self.trades.values()
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Replace the joined-channel list with the peer's latest report.
    pub fn set_membership(&mut self, channels: impl IntoIterator<Item = String>) {
        self.membership = channels.into_iter().collect();
        for ctx in self.trades.values_mut() {
            ctx.swap_joined = self.membership.contains(&ctx.swap_channel());
        }
    }

    pub fn is_member(&self, channel: &str) -> bool {
        self.membership.contains(channel)
    }

    /// Set the dedup flag of `kind` on a trade. Returns false when the trade
    /// is unknown.
    pub fn mark_done(&mut self, trade_id: &str, kind: ActionKind) -> bool {
        match self.trades.get_mut(trade_id) {
            Some(ctx) => {
                ctx.mark_done(kind);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::fixtures::*;

    #[test]
    fn test_apply_creates_then_merges() {
        let mut store = TradeStore::new();
        assert_eq!(store.apply(rfq("t1", 1, TAKER)), MergeOutcome::Created);
        assert_eq!(store.apply(quote("t1", 2, MAKER)), MergeOutcome::Recorded);
        assert_eq!(store.apply(rfq("t2", 3, TAKER)), MergeOutcome::Created);
        assert_eq!(store.len(), 2);

        let ctx = store.get("t1").unwrap();
        assert!(ctx.rfq.is_some());
        assert!(ctx.quote().is_some());
        assert!(ctx.accept.is_none());
    }

    #[test]
    fn test_redelivery_is_harmless() {
        let mut store = TradeStore::new();
        let events = [rfq("t1", 1, TAKER), quote("t1", 2, MAKER)];
        for event in events.clone() {
            store.apply(event);
        }
        let before = store.get("t1").cloned();
        for event in events {
            assert_eq!(store.apply(event), MergeOutcome::Duplicate);
        }
        assert_eq!(store.get("t1").cloned(), before);
    }

    #[test]
    fn test_all_is_ordered_and_mark_done() {
        let mut store = TradeStore::new();
        store.apply(rfq("b", 1, TAKER));
        store.apply(rfq("a", 2, TAKER));
        let ids: Vec<&str> = store.all().map(|ctx| ctx.trade_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(store.mark_done("a", ActionKind::Quote));
        assert!(store.get("a").unwrap().quote_sent);
        assert!(!store.mark_done("missing", ActionKind::Quote));
    }

    #[test]
    fn test_membership_follows_latest_report() {
        let mut store = TradeStore::new();
        store.apply(rfq("t1", 1, TAKER));
        store.set_membership(["swap:t1".to_string(), "swap:t2".to_string()]);
        assert!(store.get("t1").unwrap().swap_joined);
        assert!(store.is_member("swap:t2"));

        // trades created later pick up the known membership
        store.apply(rfq("t2", 2, TAKER));
        assert!(store.get("t2").unwrap().swap_joined);

        store.set_membership(["swap:t2".to_string()]);
        assert!(!store.get("t1").unwrap().swap_joined);
        assert!(!store.is_member("swap:t1"));
    }
}
