use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Commitment level forwarded to the RPC node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Default for Commitment {
    fn default() -> Self {
        Self::Confirmed
    }
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

/// The `{ context, value }` envelope most account-level RPC methods use.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse<T> {
    #[allow(dead_code)]
    pub context: ResponseContext,
    pub value: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseContext {
    pub slot: u64,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A blockhash paired with the height after which it stops being valid.
/// Freshness is the caller's responsibility for each signing attempt.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockhashInfo {
    pub blockhash: String,
    pub last_valid_block_height: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    pub err: Option<serde_json::Value>,
    pub confirmation_status: Option<String>,
}

impl SignatureStatus {
    pub fn is_at_least(&self, commitment: Commitment) -> bool {
        let reached = match self.confirmation_status.as_deref() {
            Some("processed") => Commitment::Processed,
            Some("confirmed") => Commitment::Confirmed,
            Some("finalized") => Commitment::Finalized,
            _ => return false,
        };
        reached >= commitment
    }
}

/// One entry from `getSignaturesForAddress`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    pub err: Option<serde_json::Value>,
    pub block_time: Option<i64>,
}

/// A parsed system-program transfer extracted from `getTransaction`.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemTransfer {
    pub source: String,
    pub destination: String,
    pub lamports: u64,
}

/// Options for `sendTransaction`. `max_retries` here is the node-side
/// rebroadcast count, distinct from the executor's own attempts.
#[derive(Debug, Clone, Copy)]
pub struct SendOpts {
    pub skip_preflight: bool,
    pub max_retries: u32,
}

impl Default for SendOpts {
    fn default() -> Self {
        SendOpts { skip_preflight: true, max_retries: 5 }
    }
}
