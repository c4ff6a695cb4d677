use std::time::Duration;

use anyhow::{Context, Result};

/// Mint address of wrapped SOL; the "SOL side" of every quote.
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Engine settings, resolved once at startup from environment variables.
/// A malformed value here is the only error that aborts the process.
#[derive(Debug, Clone)]
pub struct Settings {
    // Endpoints
    pub rpc_url: String,
    pub amm_base_url: String,
    pub custody_base_url: String,
    pub launcher_base_url: String,
    /// Shared secret expected in `x-helius-secret` (or bearer token) on
    /// webhook ingest. Empty disables verification.
    pub webhook_secret: String,
    /// Base58 public keys allowed to sign admin requests. Empty locks the
    /// admin surface.
    pub admin_pubkeys: Vec<String>,

    // Scheduler cadences
    pub flywheel_interval: Duration,
    pub claim_fast_interval: Duration,
    pub claim_slow_interval: Duration,
    pub deposit_poll_interval: Duration,

    // Budgets and thresholds
    pub max_trades_per_minute: u32,
    pub claim_fast_threshold_sol: f64,
    pub dev_wallet_min_reserve_sol: f64,
    pub min_fee_threshold_sol: f64,
    pub platform_fee_percent: f64,
    pub rent_reserve_sol: f64,
    pub min_deposit_sol: f64,
    pub max_launch_retries: u32,
    pub launch_expiry_hours: i64,
    pub max_claim_tokens_per_cycle: usize,

    // Flywheel cycle shape
    pub buys_per_cycle: u32,
    pub sells_per_cycle: u32,
    pub smart_mode_cooldown: Duration,

    // Platform token loop (self-signed; keys stay in env, never in the store)
    pub platform_token_mint: Option<String>,
    pub platform_ops_wallet: Option<String>,
    pub platform_dev_keypair: Option<String>,
    pub platform_ops_keypair: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Settings {
            rpc_url: var_or("RPC_URL", "https://api.mainnet-beta.solana.com"),
            amm_base_url: var_or("AMM_BASE_URL", "https://api.pump.fun"),
            custody_base_url: var_or("CUSTODY_BASE_URL", "http://127.0.0.1:9100"),
            launcher_base_url: var_or("LAUNCHER_BASE_URL", "http://127.0.0.1:9200"),
            webhook_secret: var_or("WEBHOOK_SECRET", ""),
            admin_pubkeys: var_or("ADMIN_PUBKEYS", "")
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),

            flywheel_interval: Duration::from_secs(
                parse("FLYWHEEL_INTERVAL_MIN", 1u64)? * 60,
            ),
            claim_fast_interval: Duration::from_secs(parse("CLAIM_FAST_INTERVAL_SEC", 30u64)?),
            claim_slow_interval: Duration::from_secs(
                parse("CLAIM_SLOW_INTERVAL_MIN", 60u64)? * 60,
            ),
            deposit_poll_interval: Duration::from_secs(parse("DEPOSIT_POLL_INTERVAL_SEC", 30u64)?),

            max_trades_per_minute: parse("MAX_TRADES_PER_MINUTE", 30u32)?,
            claim_fast_threshold_sol: parse("CLAIM_FAST_THRESHOLD_SOL", 0.15f64)?,
            dev_wallet_min_reserve_sol: parse("DEV_WALLET_MIN_RESERVE_SOL", 0.01f64)?,
            min_fee_threshold_sol: parse("MIN_FEE_THRESHOLD_SOL", 0.01f64)?,
            platform_fee_percent: parse("PLATFORM_FEE_PERCENT", 10.0f64)?,
            rent_reserve_sol: parse("RENT_RESERVE_SOL", 0.001f64)?,
            min_deposit_sol: parse("MIN_DEPOSIT_SOL", 0.1f64)?,
            max_launch_retries: parse("MAX_LAUNCH_RETRIES", 3u32)?,
            launch_expiry_hours: parse("LAUNCH_EXPIRY_HOURS", 24i64)?,
            max_claim_tokens_per_cycle: parse("MAX_CLAIM_TOKENS_PER_CYCLE", 50usize)?,

            buys_per_cycle: parse("BUYS_PER_CYCLE", 5u32)?,
            sells_per_cycle: parse("SELLS_PER_CYCLE", 5u32)?,
            smart_mode_cooldown: Duration::from_millis(parse("SMART_MODE_COOLDOWN_MS", 300_000u64)?),

            platform_token_mint: var_opt("PLATFORM_TOKEN_MINT"),
            platform_ops_wallet: var_opt("PLATFORM_OPS_WALLET"),
            platform_dev_keypair: var_opt("PLATFORM_DEV_KEYPAIR"),
            platform_ops_keypair: var_opt("PLATFORM_OPS_KEYPAIR"),
        })
    }
}

impl Default for Settings {
    /// What `from_env` yields in an empty environment.
    fn default() -> Self {
        Settings {
            rpc_url: "https://api.mainnet-beta.solana.com".into(),
            amm_base_url: "https://api.pump.fun".into(),
            custody_base_url: "http://127.0.0.1:9100".into(),
            launcher_base_url: "http://127.0.0.1:9200".into(),
            webhook_secret: String::new(),
            admin_pubkeys: Vec::new(),

            flywheel_interval: Duration::from_secs(60),
            claim_fast_interval: Duration::from_secs(30),
            claim_slow_interval: Duration::from_secs(3600),
            deposit_poll_interval: Duration::from_secs(30),

            max_trades_per_minute: 30,
            claim_fast_threshold_sol: 0.15,
            dev_wallet_min_reserve_sol: 0.01,
            min_fee_threshold_sol: 0.01,
            platform_fee_percent: 10.0,
            rent_reserve_sol: 0.001,
            min_deposit_sol: 0.1,
            max_launch_retries: 3,
            launch_expiry_hours: 24,
            max_claim_tokens_per_cycle: 50,

            buys_per_cycle: 5,
            sells_per_cycle: 5,
            smart_mode_cooldown: Duration::from_millis(300_000),

            platform_token_mint: None,
            platform_ops_wallet: None,
            platform_dev_keypair: None,
            platform_ops_keypair: None,
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn var_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid value for {name}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_stable() {
        let s = Settings::default();
        assert_eq!(s.flywheel_interval, Duration::from_secs(60));
        assert_eq!(s.max_trades_per_minute, 30);
        assert_eq!(s.claim_fast_interval, Duration::from_secs(30));
        assert_eq!(s.claim_fast_threshold_sol, 0.15);
        assert_eq!(s.claim_slow_interval, Duration::from_secs(3600));
        assert_eq!(s.deposit_poll_interval, Duration::from_secs(30));
        assert_eq!(s.dev_wallet_min_reserve_sol, 0.01);
        assert_eq!(s.min_fee_threshold_sol, 0.01);
        assert_eq!(s.platform_fee_percent, 10.0);
        assert_eq!(s.rent_reserve_sol, 0.001);
        assert_eq!(s.max_launch_retries, 3);
        assert_eq!(s.launch_expiry_hours, 24);
        assert_eq!(s.buys_per_cycle, 5);
        assert_eq!(s.sells_per_cycle, 5);
        assert_eq!(s.smart_mode_cooldown, Duration::from_millis(300_000));
    }
}
