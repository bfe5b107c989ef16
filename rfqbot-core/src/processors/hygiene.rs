//! Hygiene sweep over joined swap channels.
//!
//! Runs on its own timer. Each sweep lists the channels the peer is joined
//! to, matches `swap:<trade_id>` channels against the store and leaves the
//! ones whose invite has expired, unless that trade's settlement is enabled
//! and already posted. Channels without a known trade or invite are left
//! alone. The listed channels also refresh the store's membership view.

use super::dispatcher::{ActionDispatcher, TradeAction};
use crate::bridge::{ToolError, ToolSurface, invoke_typed};
use crate::trade::{SharedTradeStore, TradeContext};
use kanau::processor::Processor;
use rfqbot_sdk::objects::tools::{SC_STATS, ScStats};
use rfqbot_sdk::objects::trade_id_from_swap_channel;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Trigger for one sweep, carrying the evaluation time.
#[derive(Debug, Clone, Copy)]
pub struct SweepTick {
    pub now_ms: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Channels reported as joined.
    pub joined: usize,
    /// Joined channels found stale.
    pub stale: usize,
    pub left: usize,
    pub failed: usize,
}

/// Whether a trade's swap channel should be left at `now_ms`.
pub fn is_stale(ctx: &TradeContext, now_ms: i64, settlement_enabled: bool) -> bool {
    if ctx.channel_left || !ctx.invite_expired(now_ms) {
        return false;
    }
    !(settlement_enabled && ctx.settlement_sent)
}

pub struct HygieneSweeper {
    tools: Arc<dyn ToolSurface>,
    store: SharedTradeStore,
    dispatcher: ActionDispatcher,
    settlement_enabled: bool,
}

impl HygieneSweeper {
    pub fn new(
        tools: Arc<dyn ToolSurface>,
        store: SharedTradeStore,
        dispatcher: ActionDispatcher,
        settlement_enabled: bool,
    ) -> Self {
        Self {
            tools,
            store,
            dispatcher,
            settlement_enabled,
        }
    }
}

impl Processor<SweepTick> for HygieneSweeper {
    type Output = SweepReport;
    type Error = ToolError;

    async fn process(&self, tick: SweepTick) -> Result<SweepReport, ToolError> {
        let stats: ScStats = invoke_typed(self.tools.as_ref(), SC_STATS, json!({})).await?;

        let stale: Vec<TradeAction> = {
            let mut store = self.store.lock().await;
            store.set_membership(stats.channels.iter().cloned());
            stats
                .channels
                .iter()
                .filter_map(|channel| {
                    let trade_id = trade_id_from_swap_channel(channel)?;
                    let ctx = store.get(trade_id)?;
                    is_stale(ctx, tick.now_ms, self.settlement_enabled).then(|| {
                        TradeAction::LeaveChannel {
                            trade_id: trade_id.to_string(),
                            channel: channel.clone(),
                        }
                    })
                })
                .collect()
        };

        let mut report = SweepReport {
            joined: stats.channels.len(),
            stale: stale.len(),
            ..SweepReport::default()
        };
        for action in stale {
            match self.dispatcher.process(action).await {
                Ok(_) => report.left += 1,
                Err(_) => report.failed += 1,
            }
        }

        debug!(
            joined = report.joined,
            stale = report.stale,
            left = report.left,
            failed = report.failed,
            "Hygiene sweep finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::fixtures::*;
    use crate::trade::{ActionKind, TradeStore};
    use async_trait::async_trait;
    use rfqbot_sdk::objects::tools::SC_LEAVE;
    use serde_json::Value;
    use std::sync::Mutex;

    const NOW: i64 = 1_700_000_000_000;

    struct FakePeer {
        joined: Vec<String>,
        left: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ToolSurface for FakePeer {
        async fn invoke(&self, tool: &str, args: Value) -> Result<Value, ToolError> {
            match tool {
                SC_STATS => Ok(json!({ "channels": self.joined })),
                SC_LEAVE => {
                    let channel = args["channel"].as_str().unwrap_or_default().to_string();
                    self.left.lock().unwrap().push(channel.clone());
                    Ok(json!({ "type": "left", "channel": channel }))
                }
                other => Err(ToolError::rejected(other, "unexpected tool")),
            }
        }
    }

    fn sweeper(peer: Arc<FakePeer>, store: SharedTradeStore, settlement: bool) -> HygieneSweeper {
        let dispatcher = ActionDispatcher::new(peer.clone(), store.clone());
        HygieneSweeper::new(peer, store, dispatcher, settlement)
    }

    #[test]
    fn test_is_stale() {
        let mut ctx = TradeContext::new("t1");
        assert!(!is_stale(&ctx, NOW, false));

        ctx.merge(invite("t1", 1, MAKER, TAKER, NOW + 1));
        assert!(!is_stale(&ctx, NOW, false));
        assert!(is_stale(&ctx, NOW + 1, false));

        ctx.mark_done(ActionKind::Settlement);
        assert!(!is_stale(&ctx, NOW + 1, true));
        assert!(is_stale(&ctx, NOW + 1, false));

        ctx.mark_done(ActionKind::Leave);
        assert!(!is_stale(&ctx, NOW + 1, false));
    }

    #[tokio::test]
    async fn test_leaves_only_expired_swap_channels() {
        let store = TradeStore::shared();
        {
            let mut store = store.lock().await;
            store.apply(invite("old", 1, MAKER, TAKER, NOW - 10_000));
            store.apply(invite("fresh", 2, MAKER, TAKER, NOW + 10_000));
        }
        let peer = Arc::new(FakePeer {
            joined: vec![
                "0000intercomswapbtcusdt".to_string(),
                "swap:old".to_string(),
                "swap:fresh".to_string(),
                "swap:unknown".to_string(),
            ],
            left: Mutex::new(Vec::new()),
        });
        let sweeper = sweeper(peer.clone(), store.clone(), false);

        let report = sweeper.process(SweepTick { now_ms: NOW }).await.unwrap();
        assert_eq!(report.joined, 4);
        assert_eq!(report.stale, 1);
        assert_eq!(report.left, 1);
        assert_eq!(*peer.left.lock().unwrap(), vec!["swap:old".to_string()]);

        // the peer still reports the channel; it is not left twice
        let report = sweeper.process(SweepTick { now_ms: NOW }).await.unwrap();
        assert_eq!(report.stale, 0);
        assert_eq!(peer.left.lock().unwrap().len(), 1);

        let store = store.lock().await;
        assert!(store.get("fresh").unwrap().swap_joined);
        assert!(store.is_member("swap:unknown"));
    }

    #[tokio::test]
    async fn test_keeps_settled_channel_when_settlement_enabled() {
        let store = TradeStore::shared();
        {
            let mut store = store.lock().await;
            store.apply(invite("t1", 1, MAKER, TAKER, NOW - 1));
            store.mark_done("t1", ActionKind::Settlement);
        }
        let peer = Arc::new(FakePeer {
            joined: vec!["swap:t1".to_string()],
            left: Mutex::new(Vec::new()),
        });

        let report = sweeper(peer.clone(), store.clone(), true)
            .process(SweepTick { now_ms: NOW })
            .await
            .unwrap();
        assert_eq!(report.left, 0);

        let report = sweeper(peer.clone(), store, false)
            .process(SweepTick { now_ms: NOW })
            .await
            .unwrap();
        assert_eq!(report.left, 1);
    }
}
