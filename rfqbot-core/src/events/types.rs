use rfqbot_sdk::objects::{
    EnvelopeKind, Hex32, QuoteAcceptBody, QuoteBody, RfqBody, SwapInviteBody, TermsBody,
};
use serde_json::Value;

/// A validated envelope, tied to the log position it was read from.
///
/// `envelope` is the message exactly as it appeared in the log. Response
/// tools receive it verbatim so that they can hash and reference it.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapEvent {
    pub channel: String,
    pub seq: u64,
    pub trade_id: String,
    pub signer: Hex32,
    pub ts: i64,
    pub nonce: String,
    pub body: SwapEventBody,
    pub envelope: Value,
}

/// The closed set of typed bodies, one per [`EnvelopeKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum SwapEventBody {
    Rfq(RfqBody),
    Quote(QuoteBody),
    QuoteAccept(QuoteAcceptBody),
    SwapInvite(SwapInviteBody),
    Terms(TermsBody),
}

impl SwapEventBody {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            SwapEventBody::Rfq(_) => EnvelopeKind::Rfq,
            SwapEventBody::Quote(_) => EnvelopeKind::Quote,
            SwapEventBody::QuoteAccept(_) => EnvelopeKind::QuoteAccept,
            SwapEventBody::SwapInvite(_) => EnvelopeKind::SwapInvite,
            SwapEventBody::Terms(_) => EnvelopeKind::Terms,
        }
    }
}

impl SwapEvent {
    pub fn kind(&self) -> EnvelopeKind {
        self.body.kind()
    }
}
