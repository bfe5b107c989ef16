//! Tool names and response shapes of the action surface.
//!
//! The surface is invoked as `invoke(tool, args) -> result` with JSON
//! arguments and results. Only the response fields the automation reads are
//! modelled here; unknown fields are ignored.

use serde::{Deserialize, Serialize};

pub const SC_SUBSCRIBE: &str = "intercomswap_sc_subscribe";
pub const SC_INFO: &str = "intercomswap_sc_info";
pub const SC_STATS: &str = "intercomswap_sc_stats";
pub const SC_LEAVE: &str = "intercomswap_sc_leave";
pub const SOL_SIGNER_PUBKEY: &str = "intercomswap_sol_signer_pubkey";

pub const QUOTE_POST_FROM_RFQ: &str = "intercomswap_quote_post_from_rfq";
pub const QUOTE_ACCEPT: &str = "intercomswap_quote_accept";
pub const SWAP_INVITE_FROM_ACCEPT: &str = "intercomswap_swap_invite_from_accept";
pub const JOIN_FROM_SWAP_INVITE: &str = "intercomswap_join_from_swap_invite";
pub const TERMS_POST: &str = "intercomswap_terms_post";

pub const LN_LISTPEERS: &str = "intercomswap_ln_listpeers";
pub const LN_CONNECT: &str = "intercomswap_ln_connect";

/// Response of [`SC_INFO`]: the local side-channel identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScInfo {
    pub peer: String,
}

/// Response of [`SOL_SIGNER_PUBKEY`]: the settlement signer's public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerPubkey {
    pub pubkey: String,
}

/// Response of [`SC_STATS`]: the channels currently joined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScStats {
    #[serde(default)]
    pub channels: Vec<String>,
}
