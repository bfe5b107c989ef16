//! Executes decided actions against the tool surface.
//!
//! [`TradeAction`] is the closed set of side effects the automation can
//! produce. Each variant maps to exactly one tool and one dedup flag; the
//! flag is set only after the tool reports success, so a failed action is
//! decided again on a later tick.

use crate::bridge::{ToolError, ToolSurface};
use crate::trade::{ActionKind, SharedTradeStore};
use kanau::processor::Processor;
use rfqbot_sdk::objects::tools::{
    JOIN_FROM_SWAP_INVITE, QUOTE_ACCEPT, QUOTE_POST_FROM_RFQ, SC_LEAVE, SWAP_INVITE_FROM_ACCEPT,
    TERMS_POST,
};
use rfqbot_sdk::objects::{AtomicAmount, Hex32, Sats, SolAddress};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Settlement terms for `swap:<trade_id>`.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementTerms {
    pub trade_id: String,
    pub channel: String,
    pub btc_sats: Sats,
    pub usdt_amount: AtomicAmount,
    pub sol_recipient: SolAddress,
    pub trade_fee_collector: SolAddress,
    pub sol_refund: Option<String>,
    pub usdt_mint: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TradeAction {
    /// Quote an RFQ seen on `channel`.
    PostQuote {
        trade_id: String,
        channel: String,
        rfq_envelope: Value,
        trade_fee_collector: Option<String>,
    },
    /// Accept a quote on our own RFQ.
    AcceptQuote {
        trade_id: String,
        channel: String,
        quote_envelope: Value,
    },
    /// Invite the accepting taker into `swap_channel`.
    SendInvite {
        trade_id: String,
        channel: String,
        swap_channel: String,
        accept_envelope: Value,
        invitee: Hex32,
        ttl_ms: u64,
    },
    /// Join the swap channel we were invited into.
    JoinSwap {
        trade_id: String,
        channel: String,
        swap_channel: String,
        invite_envelope: Value,
    },
    PostTerms(SettlementTerms),
    /// Leave a stale swap channel.
    LeaveChannel { trade_id: String, channel: String },
}

impl TradeAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            TradeAction::PostQuote { .. } => ActionKind::Quote,
            TradeAction::AcceptQuote { .. } => ActionKind::Accept,
            TradeAction::SendInvite { .. } => ActionKind::Invite,
            TradeAction::JoinSwap { .. } => ActionKind::Join,
            TradeAction::PostTerms(_) => ActionKind::Settlement,
            TradeAction::LeaveChannel { .. } => ActionKind::Leave,
        }
    }

    pub fn trade_id(&self) -> &str {
        match self {
            TradeAction::PostQuote { trade_id, .. }
            | TradeAction::AcceptQuote { trade_id, .. }
            | TradeAction::SendInvite { trade_id, .. }
            | TradeAction::JoinSwap { trade_id, .. }
            | TradeAction::LeaveChannel { trade_id, .. } => trade_id,
            TradeAction::PostTerms(terms) => &terms.trade_id,
        }
    }

    pub fn tool(&self) -> &'static str {
        match self {
            TradeAction::PostQuote { .. } => QUOTE_POST_FROM_RFQ,
            TradeAction::AcceptQuote { .. } => QUOTE_ACCEPT,
            TradeAction::SendInvite { .. } => SWAP_INVITE_FROM_ACCEPT,
            TradeAction::JoinSwap { .. } => JOIN_FROM_SWAP_INVITE,
            TradeAction::PostTerms(_) => TERMS_POST,
            TradeAction::LeaveChannel { .. } => SC_LEAVE,
        }
    }

    pub fn args(&self) -> Value {
        match self {
            TradeAction::PostQuote {
                trade_id,
                channel,
                rfq_envelope,
                trade_fee_collector,
            } => json!({
                "channel": channel,
                "trade_id": trade_id,
                "rfq_envelope": rfq_envelope,
                "trade_fee_collector": trade_fee_collector,
            }),
            TradeAction::AcceptQuote {
                trade_id,
                channel,
                quote_envelope,
            } => json!({
                "channel": channel,
                "trade_id": trade_id,
                "quote_envelope": quote_envelope,
            }),
            TradeAction::SendInvite {
                trade_id,
                channel,
                swap_channel,
                accept_envelope,
                invitee,
                ttl_ms,
            } => json!({
                "channel": channel,
                "trade_id": trade_id,
                "swap_channel": swap_channel,
                "accept_envelope": accept_envelope,
                "invitee_pubkey": invitee.as_str(),
                "ttl_ms": ttl_ms,
            }),
            TradeAction::JoinSwap {
                trade_id,
                channel,
                swap_channel,
                invite_envelope,
            } => json!({
                "channel": channel,
                "trade_id": trade_id,
                "swap_channel": swap_channel,
                "invite_envelope": invite_envelope,
            }),
            TradeAction::PostTerms(terms) => {
                let mut args = json!({
                    "trade_id": terms.trade_id,
                    "channel": terms.channel,
                    "btc_sats": terms.btc_sats,
                    "usdt_amount": terms.usdt_amount,
                    "sol_recipient": terms.sol_recipient,
                    "trade_fee_collector": terms.trade_fee_collector,
                    "sol_refund": terms.sol_refund,
                });
                if let (Some(mint), Some(map)) = (&terms.usdt_mint, args.as_object_mut()) {
                    map.insert("usdt_mint".to_string(), Value::String(mint.clone()));
                }
                args
            }
            TradeAction::LeaveChannel { channel, .. } => json!({ "channel": channel }),
        }
    }
}

#[derive(Debug, Error)]
#[error("{kind} action for trade {trade_id} failed: {source}")]
pub struct ActionError {
    pub kind: ActionKind,
    pub trade_id: String,
    #[source]
    pub source: ToolError,
}

/// Runs [`TradeAction`]s and records their success in the store.
#[derive(Clone)]
pub struct ActionDispatcher {
    tools: Arc<dyn ToolSurface>,
    store: SharedTradeStore,
}

impl ActionDispatcher {
    pub fn new(tools: Arc<dyn ToolSurface>, store: SharedTradeStore) -> Self {
        Self { tools, store }
    }
}

impl Processor<TradeAction> for ActionDispatcher {
    type Output = Value;
    type Error = ActionError;

    async fn process(&self, action: TradeAction) -> Result<Value, ActionError> {
        let kind = action.kind();
        let tool = action.tool();
        let trade_id = action.trade_id().to_string();

        match self.tools.invoke(tool, action.args()).await {
            Ok(result) => {
                self.store.lock().await.mark_done(&trade_id, kind);
                info!(trade_id = %trade_id, action = %kind, tool, "Action completed");
                Ok(result)
            }
            Err(source) => {
                warn!(
                    trade_id = %trade_id,
                    action = %kind,
                    tool,
                    error = %source,
                    "Action failed, will retry while the trigger holds"
                );
                Err(ActionError {
                    kind,
                    trade_id,
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::TradeStore;
    use crate::trade::fixtures::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingTools {
        calls: Mutex<Vec<(String, Value)>>,
        fail: bool,
    }

    #[async_trait]
    impl ToolSurface for RecordingTools {
        async fn invoke(&self, tool: &str, args: Value) -> Result<Value, ToolError> {
            self.calls.lock().unwrap().push((tool.to_string(), args));
            if self.fail {
                Err(ToolError::rejected(tool, "peer offline"))
            } else {
                Ok(json!({"type": "ok"}))
            }
        }
    }

    fn terms() -> SettlementTerms {
        SettlementTerms {
            trade_id: "t1".to_string(),
            channel: "swap:t1".to_string(),
            btc_sats: Sats(10000),
            usdt_amount: serde_json::from_value(json!("1000000")).unwrap(),
            sol_recipient: SolAddress::parse(SOL_RECIPIENT).unwrap(),
            trade_fee_collector: SolAddress::parse(SOL_RECIPIENT).unwrap(),
            sol_refund: Some(SOL_RECIPIENT.to_string()),
            usdt_mint: None,
        }
    }

    #[test]
    fn test_terms_args() {
        let action = TradeAction::PostTerms(terms());
        assert_eq!(action.tool(), TERMS_POST);
        let args = action.args();
        assert_eq!(args["trade_id"], "t1");
        assert_eq!(args["channel"], "swap:t1");
        assert_eq!(args["btc_sats"], 10000);
        assert_eq!(args["usdt_amount"], "1000000");
        assert!(args.get("usdt_mint").is_none());

        let mut with_mint = terms();
        with_mint.usdt_mint = Some("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB".to_string());
        let args = TradeAction::PostTerms(with_mint).args();
        assert_eq!(args["usdt_mint"], "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB");
    }

    #[test]
    fn test_leave_args() {
        let action = TradeAction::LeaveChannel {
            trade_id: "t2".to_string(),
            channel: "swap:t2".to_string(),
        };
        assert_eq!(action.tool(), SC_LEAVE);
        assert_eq!(action.kind(), ActionKind::Leave);
        assert_eq!(action.args(), json!({"channel": "swap:t2"}));
    }

    #[tokio::test]
    async fn test_flag_set_only_on_success() {
        let store = TradeStore::shared();
        store.lock().await.apply(rfq("t1", 1, TAKER));

        let failing = Arc::new(RecordingTools {
            calls: Mutex::new(Vec::new()),
            fail: true,
        });
        let dispatcher = ActionDispatcher::new(failing.clone(), store.clone());
        let err = dispatcher
            .process(TradeAction::PostTerms(terms()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ActionKind::Settlement);
        assert!(!store.lock().await.get("t1").unwrap().settlement_sent);

        let working = Arc::new(RecordingTools {
            calls: Mutex::new(Vec::new()),
            fail: false,
        });
        let dispatcher = ActionDispatcher::new(working.clone(), store.clone());
        dispatcher
            .process(TradeAction::PostTerms(terms()))
            .await
            .unwrap();
        assert!(store.lock().await.get("t1").unwrap().settlement_sent);
        assert_eq!(working.calls.lock().unwrap().len(), 1);
        assert_eq!(failing.calls.lock().unwrap()[0].0, TERMS_POST);
    }
}
