//! Per-kind envelope bodies with strict field schemas.
//!
//! Untrusted fields are never coerced: an amount is either a JSON integer or
//! a string of ASCII digits, a key is exactly 64 hex characters, and an
//! expiry is a positive epoch-milliseconds value. Anything else fails to
//! deserialize with a [`BodyError`] message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest accepted epoch-milliseconds value (year 9999).
pub const MAX_EPOCH_MILLIS: u64 = 253_402_300_799_999;

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Validation failures for individual body fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BodyError {
    #[error("amount must be a non-negative integer, got {0:?}")]
    InvalidAmount(String),
    #[error("amount does not fit in 64 bits: {0}")]
    AmountOverflow(String),
    #[error("expected 64 hex characters, got {0:?}")]
    InvalidHex32(String),
    #[error("invalid epoch milliseconds: {0}")]
    InvalidEpochMillis(String),
    #[error("invalid base58 address: {0:?}")]
    InvalidSolAddress(String),
}

/// A JSON integer or a string that should contain one. Only used as the
/// intermediate form of the validated field types below.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawInteger {
    Int(u64),
    Text(String),
}

impl RawInteger {
    /// The decimal digits of the value, rejecting signs, spaces, and fractions.
    fn into_digits(self) -> Result<String, BodyError> {
        match self {
            RawInteger::Int(value) => Ok(value.to_string()),
            RawInteger::Text(text) => {
                if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(BodyError::InvalidAmount(text));
                }
                Ok(text)
            }
        }
    }

    fn into_u64(self) -> Result<u64, BodyError> {
        match self {
            RawInteger::Int(value) => Ok(value),
            other => {
                let digits = other.into_digits()?;
                digits
                    .parse()
                    .map_err(|_| BodyError::AmountOverflow(digits))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Field types
// ---------------------------------------------------------------------------

/// Bitcoin amount in satoshis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInteger", into = "u64")]
pub struct Sats(pub u64);

impl TryFrom<RawInteger> for Sats {
    type Error = BodyError;
    fn try_from(raw: RawInteger) -> Result<Self, BodyError> {
        raw.into_u64().map(Sats)
    }
}

impl From<Sats> for u64 {
    fn from(value: Sats) -> Self {
        value.0
    }
}

impl fmt::Display for Sats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable-asset amount in atomic units, kept as a digit string because it
/// can exceed the range of a JSON number on the other side of the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInteger", into = "String")]
pub struct AtomicAmount(String);

impl AtomicAmount {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<RawInteger> for AtomicAmount {
    type Error = BodyError;
    fn try_from(raw: RawInteger) -> Result<Self, BodyError> {
        raw.into_digits().map(AtomicAmount)
    }
}

impl From<AtomicAmount> for String {
    fn from(value: AtomicAmount) -> Self {
        value.0
    }
}

impl fmt::Display for AtomicAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A 32-byte value in lowercase hex: peer public keys and envelope ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hex32(String);

impl Hex32 {
    pub fn parse(value: &str) -> Result<Self, BodyError> {
        let trimmed = value.trim();
        if trimmed.len() != 64 || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(BodyError::InvalidHex32(value.to_string()));
        }
        Ok(Hex32(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Hex32 {
    type Error = BodyError;
    fn try_from(value: String) -> Result<Self, BodyError> {
        Hex32::parse(&value)
    }
}

impl From<Hex32> for String {
    fn from(value: Hex32) -> Self {
        value.0
    }
}

impl fmt::Display for Hex32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInteger", into = "i64")]
pub struct EpochMillis(i64);

impl EpochMillis {
    pub fn new(value: i64) -> Result<Self, BodyError> {
        if value <= 0 || value as u64 > MAX_EPOCH_MILLIS {
            return Err(BodyError::InvalidEpochMillis(value.to_string()));
        }
        Ok(EpochMillis(value))
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl TryFrom<RawInteger> for EpochMillis {
    type Error = BodyError;
    fn try_from(raw: RawInteger) -> Result<Self, BodyError> {
        let value = raw
            .into_u64()
            .map_err(|e| BodyError::InvalidEpochMillis(e.to_string()))?;
        let value =
            i64::try_from(value).map_err(|_| BodyError::InvalidEpochMillis(value.to_string()))?;
        EpochMillis::new(value)
    }
}

impl From<EpochMillis> for i64 {
    fn from(value: EpochMillis) -> Self {
        value.0
    }
}

/// Base58 account address on the settlement chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SolAddress(String);

impl SolAddress {
    pub fn parse(value: &str) -> Result<Self, BodyError> {
        let valid_len = (32..=44).contains(&value.len());
        if !valid_len || !value.chars().all(|c| BASE58_ALPHABET.contains(c)) {
            return Err(BodyError::InvalidSolAddress(value.to_string()));
        }
        Ok(SolAddress(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SolAddress {
    type Error = BodyError;
    fn try_from(value: String) -> Result<Self, BodyError> {
        SolAddress::parse(&value)
    }
}

impl From<SolAddress> for String {
    fn from(value: SolAddress) -> Self {
        value.0
    }
}

impl fmt::Display for SolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

/// Body of `swap.rfq`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfqBody {
    pub btc_sats: Sats,
    pub usdt_amount: AtomicAmount,
    pub sol_recipient: SolAddress,
}

/// Body of `swap.quote`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteBody {
    pub rfq_id: Hex32,
    pub btc_sats: Sats,
    pub usdt_amount: AtomicAmount,
    pub trade_fee_collector: SolAddress,
}

/// Body of `swap.quote_accept`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteAcceptBody {
    pub rfq_id: Hex32,
    pub quote_id: Hex32,
}

/// The signed payload inside a swap invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInvitePayload {
    pub invitee_pub_key: Hex32,
    pub inviter_pub_key: Hex32,
    pub expires_at: EpochMillis,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub issued_at: Option<EpochMillis>,
    #[serde(default)]
    pub nonce: Option<String>,
}

/// Invite capability as carried in a `swap.swap_invite` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapInviteWire {
    pub payload: SwapInvitePayload,
    pub sig: String,
}

/// Body of `swap.swap_invite`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapInviteBody {
    pub swap_channel: String,
    pub invite: SwapInviteWire,
}

/// Body of `swap.terms`. Only the amounts are read; the remaining fields are
/// owned by the settlement tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermsBody {
    #[serde(default)]
    pub btc_sats: Option<Sats>,
    #[serde(default)]
    pub usdt_amount: Option<AtomicAmount>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_amounts_accept_integers_and_digit_strings() {
        let sats: Sats = serde_json::from_value(json!(10000)).unwrap();
        assert_eq!(sats, Sats(10000));
        let sats: Sats = serde_json::from_value(json!("10000")).unwrap();
        assert_eq!(sats, Sats(10000));

        let amount: AtomicAmount = serde_json::from_value(json!("1000000")).unwrap();
        assert_eq!(amount.as_str(), "1000000");
        let amount: AtomicAmount = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(amount.as_str(), "42");
    }

    #[test]
    fn test_amounts_reject_coercible_garbage() {
        let cases = [
            json!(-1),
            json!(1.5),
            json!("-1"),
            json!(" 10"),
            json!(""),
            json!("1e3"),
            json!(null),
            json!(true),
        ];
        for bad in cases {
            assert!(serde_json::from_value::<Sats>(bad.clone()).is_err(), "{bad}");
            assert!(serde_json::from_value::<AtomicAmount>(bad.clone()).is_err(), "{bad}");
        }
        assert!(serde_json::from_value::<Sats>(json!("99999999999999999999999")).is_err());
    }

    #[test]
    fn test_hex32_lowercases_and_checks_length() {
        let key = Hex32::parse(&"AB".repeat(32)).unwrap();
        assert_eq!(key.as_str(), "ab".repeat(32));
        assert!(Hex32::parse(&"a".repeat(63)).is_err());
        assert!(Hex32::parse(&"g".repeat(64)).is_err());
    }

    #[test]
    fn test_epoch_millis_bounds() {
        assert!(serde_json::from_value::<EpochMillis>(json!(1_700_000_000_000u64)).is_ok());
        assert!(serde_json::from_value::<EpochMillis>(json!(0)).is_err());
        assert!(serde_json::from_value::<EpochMillis>(json!(MAX_EPOCH_MILLIS + 1)).is_err());
    }

    #[test]
    fn test_sol_address() {
        assert!(SolAddress::parse("4gRG1QE1YofRgCtTuwEDftYx9aEr9N1z5bFTJTbPNqmg").is_ok());
        // '0' and 'l' are not in the base58 alphabet.
        assert!(SolAddress::parse("0gRG1QE1YofRgCtTuwEDftYx9aEr9N1z5bFTJTbPNqml").is_err());
        assert!(SolAddress::parse("short").is_err());
    }

    #[test]
    fn test_invite_body_camel_case_payload() {
        let body: SwapInviteBody = serde_json::from_value(json!({
            "swap_channel": "swap:t1",
            "invite": {
                "payload": {
                    "inviteePubKey": "b".repeat(64),
                    "inviterPubKey": "a".repeat(64),
                    "expiresAt": 1_700_000_060_000u64,
                },
                "sig": "f".repeat(128),
            }
        }))
        .unwrap();
        assert_eq!(body.invite.payload.expires_at.get(), 1_700_000_060_000);
        assert_eq!(body.invite.payload.invitee_pub_key.as_str(), "b".repeat(64));
        assert!(body.invite.payload.nonce.is_none());
    }
}
