use thiserror::Error;

/// Engine-wide error taxonomy. Every fallible path in the trading core maps
/// onto one of these kinds; the schedulers classify and record, they never
/// rethrow across a tick boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Timeouts, connection resets, 5xx. Retried with backoff.
    #[error("transient network error: {0}")]
    Transient(String),

    /// 429 / RPC quota. Retried with longer backoff.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Blockhash expired or confirmation never arrived. Retried from
    /// scratch with a fresh blockhash.
    #[error("stale blockhash / not confirmed: {0}")]
    StaleBlockhash(String),

    /// Explicit on-chain program error in the confirmation result.
    #[error("on-chain error: {0}")]
    OnChain(String),

    /// AMM returned no route for the requested pair/amount.
    #[error("quote unavailable: {0}")]
    QuoteUnavailable(String),

    /// Custody refused: not authorized, wallet unknown, or the
    /// transaction itself was rejected as malformed.
    #[error("custody error: {0}")]
    Custody(String),

    /// Persistence failure.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration invariant violated. Rejected at the admin boundary;
    /// fatal only at startup.
    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Whether a fresh attempt may succeed. Mirrors the Tx Executor's
    /// attempt-level classification.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Transient(_) | EngineError::RateLimited(_) | EngineError::StaleBlockhash(_)
        )
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Store(e.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            EngineError::Transient(e.to_string())
        } else if e.status().is_some_and(|s| s.as_u16() == 429) {
            EngineError::RateLimited(e.to_string())
        } else if e.status().is_some_and(|s| s.is_server_error()) {
            EngineError::Transient(e.to_string())
        } else {
            EngineError::Other(e.to_string())
        }
    }
}

/// Classify an error message from the RPC node or AMM by substring, the way
/// the confirmation loop sees them. Used by the Tx Executor to decide
/// whether an attempt is worth repeating.
pub fn is_retryable_message(msg: &str) -> bool {
    let m = msg.to_ascii_lowercase();
    const RETRYABLE: &[&str] = &[
        "blockhash not found",
        "block height exceeded",
        "not confirmed",
        "timed out",
        "timeout",
        "429",
        "too many requests",
        "503",
        "502",
        "service unavailable",
        "bad gateway",
        "connection reset",
        "simulation failed",
    ];
    RETRYABLE.iter().any(|s| m.contains(s))
}
