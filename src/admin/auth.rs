use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

use crate::store::Store;

/// Mutations must be signed within this window.
pub const MUTATION_WINDOW_SECS: i64 = 300;
/// Read sessions get a little more slack.
pub const SESSION_WINDOW_SECS: i64 = 600;

const MESSAGE_PREFIX: &str = "curvewheel-admin";

/// What `/admin/nonce` hands back; the client signs `message` verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct NonceIssue {
    pub message: String,
    pub timestamp: i64,
    pub nonce: String,
    #[serde(rename = "configHash")]
    pub config_hash: String,
}

/// The signed envelope every admin mutation carries.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedRequest {
    pub message: String,
    pub signature: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
    pub payload: serde_json::Value,
}

/// Hash of the change being authorized. Signing the hash (inside the
/// message) makes the nonce single-purpose: it cannot be replayed against
/// a different payload.
pub fn payload_hash(payload: &serde_json::Value) -> String {
    let canonical = serde_json::to_string(payload).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    hex_encode(&digest)
}

pub fn build_message(action: &str, nonce: &str, timestamp: i64, config_hash: &str) -> String {
    format!("{MESSAGE_PREFIX}|{action}|{nonce}|{timestamp}|{config_hash}")
}

/// Issue a nonce bound to `payload` for `action`.
pub async fn issue_nonce(
    store: &Store,
    action: &str,
    payload: &serde_json::Value,
) -> Result<NonceIssue> {
    let now = Utc::now();
    // Opportunistic cleanup; expired nonces are useless anyway.
    store
        .prune_nonces(now - chrono::Duration::seconds(SESSION_WINDOW_SECS * 2))
        .await?;

    let nonce = uuid::Uuid::new_v4().to_string();
    let config_hash = payload_hash(payload);
    store.insert_nonce(&nonce, &config_hash, now).await?;

    let timestamp = now.timestamp();
    Ok(NonceIssue {
        message: build_message(action, &nonce, timestamp, &config_hash),
        timestamp,
        nonce,
        config_hash,
    })
}

/// Verify a signed admin request end to end: message shape, action match,
/// recency, payload-hash equality, single-use nonce, allowlisted key, and
/// the ed25519 signature itself.
pub async fn verify(
    store: &Store,
    admin_pubkeys: &[String],
    request: &SignedRequest,
    action: &str,
    window_secs: i64,
) -> Result<()> {
    let parts: Vec<&str> = request.message.split('|').collect();
    let [prefix, msg_action, nonce, timestamp, msg_hash] = parts.as_slice() else {
        bail!("malformed admin message");
    };
    if *prefix != MESSAGE_PREFIX {
        bail!("unexpected message prefix");
    }
    if *msg_action != action {
        bail!("message action {msg_action:?} does not match {action:?}");
    }

    let timestamp: i64 = timestamp.parse().context("message timestamp")?;
    let age = (Utc::now().timestamp() - timestamp).abs();
    if age > window_secs {
        bail!("message expired ({age}s old, window {window_secs}s)");
    }

    // Tamper check: the payload the server sees must hash to what was
    // signed.
    let derived = payload_hash(&request.payload);
    if derived != *msg_hash {
        bail!("payload hash mismatch");
    }

    // Replay check: the nonce burns on first use and must carry the same
    // hash it was issued for.
    let Some((issued_hash, _issued_at)) = store.consume_nonce(nonce).await? else {
        bail!("unknown or already-used nonce");
    };
    if issued_hash != derived {
        bail!("nonce was issued for a different payload");
    }

    if !admin_pubkeys.iter().any(|k| k == &request.public_key) {
        bail!("public key is not an admin");
    }

    let pubkey = Pubkey::from_str(&request.public_key).context("admin public key")?;
    let signature = Signature::from_str(&request.signature).context("admin signature")?;
    if !signature.verify(pubkey.as_ref(), request.message.as_bytes()) {
        bail!("signature verification failed");
    }
    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}
