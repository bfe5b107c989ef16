//! Invite and welcome capabilities for private side-channels.
//!
//! A capability is a normalized payload plus an Ed25519 signature over its
//! deterministic JSON encoding:
//!
//! ```text
//! sig = ed25519_sign(stable_json(normalize(payload)), secret)
//! ```
//!
//! `stable_json` sorts object keys lexicographically at every level, so the
//! signer and every verifier produce the same bytes regardless of field order.

use rand::Rng;
use rand::distr::Alphanumeric;
use ring::signature::{self, Ed25519KeyPair, KeyPair};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors produced by capability operations.
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("invite needs either expires_at or ttl_ms")]
    MissingExpiry,
    #[error("invalid signature")]
    SignatureMismatch,
}

impl From<ring::error::Unspecified> for CapabilityError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Normalized invite payload, the exact object that gets signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitePayload {
    pub channel: String,
    pub invitee_pub_key: String,
    pub inviter_pub_key: String,
    pub inviter_address: Option<String>,
    pub issued_at: i64,
    pub expires_at: i64,
    pub nonce: String,
    pub version: u32,
}

impl InvitePayload {
    /// Trim the channel, lowercase the keys, and default the version to 1.
    pub fn normalize(self) -> Self {
        Self {
            channel: self.channel.trim().to_string(),
            invitee_pub_key: normalize_key_hex(&self.invitee_pub_key),
            inviter_pub_key: normalize_key_hex(&self.inviter_pub_key),
            inviter_address: self.inviter_address,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            nonce: self.nonce,
            version: if self.version == 0 { 1 } else { self.version },
        }
    }
}

/// Normalized welcome payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomePayload {
    pub channel: String,
    pub owner_pub_key: String,
    pub text: String,
    pub issued_at: i64,
    pub version: u32,
}

impl WelcomePayload {
    pub fn normalize(self) -> Self {
        Self {
            channel: self.channel.trim().to_string(),
            owner_pub_key: normalize_key_hex(&self.owner_pub_key),
            text: self.text,
            issued_at: self.issued_at,
            version: if self.version == 0 { 1 } else { self.version },
        }
    }
}

/// A signed welcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedWelcome {
    pub payload: WelcomePayload,
    pub sig: String,
}

/// A signed invite, optionally carrying the channel's welcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInvite {
    pub payload: InvitePayload,
    pub sig: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome: Option<SignedWelcome>,
}

fn normalize_key_hex(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// Encoding and signing
// ---------------------------------------------------------------------------

/// Deterministic encoding used for signing: compact JSON with sorted keys.
pub fn encode_for_signing<T: Serialize>(payload: &T) -> Result<String, CapabilityError> {
    let value = sort_keys(serde_json::to_value(payload)?);
    Ok(serde_json::to_string(&value)?)
}

/// Rebuild every object with its keys inserted in lexicographic order.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Something that can produce a detached signature over bytes.
pub trait PayloadSigner {
    /// Hex-encoded public key of the signer.
    fn public_key_hex(&self) -> String;

    /// Raw signature bytes over `message`.
    fn sign(&self, message: &[u8]) -> Vec<u8>;
}

impl PayloadSigner for Ed25519KeyPair {
    fn public_key_hex(&self) -> String {
        hex::encode(self.public_key().as_ref())
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        Ed25519KeyPair::sign(self, message).as_ref().to_vec()
    }
}

/// Sign the stable encoding of `payload` and return the signature as hex.
pub fn sign_payload_hex<T: Serialize>(
    payload: &T,
    signer: &impl PayloadSigner,
) -> Result<String, CapabilityError> {
    let message = encode_for_signing(payload)?;
    Ok(hex::encode(signer.sign(message.as_bytes())))
}

/// Verify a hex signature over the stable encoding of `payload`.
pub fn verify_payload_hex<T: Serialize>(
    payload: &T,
    sig_hex: &str,
    public_key_hex: &str,
) -> Result<(), CapabilityError> {
    let message = encode_for_signing(payload)?;
    let sig = hex::decode(sig_hex.trim())?;
    let public_key = hex::decode(public_key_hex.trim())?;
    signature::UnparsedPublicKey::new(&signature::ED25519, public_key)
        .verify(message.as_bytes(), &sig)?;
    Ok(())
}

/// Base64 (padded) of the compact JSON encoding of `value`.
pub fn to_b64_json<T: Serialize>(value: &T) -> Result<String, CapabilityError> {
    let json = serde_json::to_vec(value)?;
    Ok(fast32::base64::RFC4648.encode(&json))
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Inputs for [`create_signed_welcome`].
#[derive(Debug, Clone)]
pub struct WelcomeParams {
    pub channel: String,
    pub owner_pub_key: String,
    pub text: String,
    pub issued_at: Option<i64>,
    pub version: Option<u32>,
}

/// Inputs for [`create_signed_invite`].
///
/// The expiry is `expires_at` when given, otherwise `issued_at + ttl_ms`
/// with a negative TTL treated as zero.
#[derive(Debug, Clone, Default)]
pub struct InviteParams {
    pub channel: String,
    pub invitee_pub_key: String,
    pub inviter_pub_key: String,
    pub inviter_address: Option<String>,
    pub issued_at: Option<i64>,
    pub expires_at: Option<i64>,
    pub ttl_ms: Option<i64>,
    pub nonce: Option<String>,
    pub version: Option<u32>,
}

pub fn create_signed_welcome(
    params: WelcomeParams,
    signer: &impl PayloadSigner,
) -> Result<SignedWelcome, CapabilityError> {
    let payload = WelcomePayload {
        channel: params.channel,
        owner_pub_key: params.owner_pub_key,
        text: params.text,
        issued_at: params.issued_at.unwrap_or_else(now_ms),
        version: params.version.unwrap_or(1),
    }
    .normalize();
    let sig = sign_payload_hex(&payload, signer)?;
    Ok(SignedWelcome { payload, sig })
}

pub fn create_signed_invite(
    params: InviteParams,
    signer: &impl PayloadSigner,
    welcome: Option<SignedWelcome>,
) -> Result<SignedInvite, CapabilityError> {
    let issued_at = params.issued_at.unwrap_or_else(now_ms);
    let expires_at = match (params.expires_at, params.ttl_ms) {
        (Some(expires_at), _) => expires_at,
        (None, Some(ttl_ms)) => issued_at.saturating_add(ttl_ms.max(0)),
        (None, None) => return Err(CapabilityError::MissingExpiry),
    };
    let nonce = params
        .nonce
        .filter(|nonce| !nonce.is_empty())
        .unwrap_or_else(random_nonce);

    let payload = InvitePayload {
        channel: params.channel,
        invitee_pub_key: params.invitee_pub_key,
        inviter_pub_key: params.inviter_pub_key,
        inviter_address: params.inviter_address,
        issued_at,
        expires_at,
        nonce,
        version: params.version.unwrap_or(1),
    }
    .normalize();
    let sig = sign_payload_hex(&payload, signer)?;
    Ok(SignedInvite {
        payload,
        sig,
        welcome,
    })
}

fn random_nonce() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
