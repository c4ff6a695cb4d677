#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;

use curvewheel::amm::{
    Amm, ClaimablePosition, LifetimeFees, MarketStats, Quote, SwapTx, TokenMetadata,
};
use curvewheel::chain::{
    BlockhashInfo, ChainRpc, Commitment, SendOpts, SignatureInfo, SignatureStatus, SystemTransfer,
};
use curvewheel::config::SOL_MINT;
use curvewheel::custody::Custody;
use curvewheel::error::EngineError;
use curvewheel::launcher::{LaunchedToken, TokenLauncher};
use curvewheel::model::{PendingLaunch, Token, TokenConfig, TokenSource, Wallet, WalletKind};
use curvewheel::notify::Notifier;
use curvewheel::store::Store;

pub const DECIMALS: u8 = 6;

// ── Mock chain ──────────────────────────────────────────────────────
//
// Holds SOL and token balances in memory. Broadcasts are decoded: real
// system transfers (bincode) move lamports, swap markers (JSON from the
// mock AMM) move both legs. Everything confirms instantly.

pub struct MockChain {
    pub sol: Mutex<HashMap<String, f64>>,
    pub tokens: Mutex<HashMap<(String, String), f64>>,
    pub sent: Mutex<Vec<String>>,
    /// Address history served to `signatures_for_address`.
    pub history: Mutex<HashMap<String, Vec<SignatureInfo>>>,
    /// Parsed transfers served per signature.
    pub parsed: Mutex<HashMap<String, Vec<SystemTransfer>>>,
    next_sig: AtomicU64,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(MockChain {
            sol: Mutex::new(HashMap::new()),
            tokens: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            history: Mutex::new(HashMap::new()),
            parsed: Mutex::new(HashMap::new()),
            next_sig: AtomicU64::new(1),
        })
    }

    pub async fn set_sol(&self, address: &str, amount: f64) {
        self.sol.lock().await.insert(address.to_string(), amount);
    }

    pub async fn set_tokens(&self, owner: &str, mint: &str, amount: f64) {
        self.tokens
            .lock()
            .await
            .insert((owner.to_string(), mint.to_string()), amount);
    }

    pub async fn sol_of(&self, address: &str) -> f64 {
        self.sol.lock().await.get(address).copied().unwrap_or(0.0)
    }

    pub async fn tokens_of(&self, owner: &str, mint: &str) -> f64 {
        self.tokens
            .lock()
            .await
            .get(&(owner.to_string(), mint.to_string()))
            .copied()
            .unwrap_or(0.0)
    }

    fn fresh_signature(&self) -> String {
        format!("sig-{}", self.next_sig.fetch_add(1, Ordering::Relaxed))
    }

    async fn apply_system_transfer(&self, tx: &solana_sdk::transaction::Transaction) {
        let system = solana_sdk::system_program::id();
        for ix in &tx.message.instructions {
            let program = tx.message.account_keys[ix.program_id_index as usize];
            if program != system || ix.data.len() < 12 || ix.data[0] != 2 {
                continue;
            }
            let lamports = u64::from_le_bytes(ix.data[4..12].try_into().unwrap());
            let from = tx.message.account_keys[ix.accounts[0] as usize].to_string();
            let to = tx.message.account_keys[ix.accounts[1] as usize].to_string();
            let sol = lamports as f64 / 1e9;
            let mut balances = self.sol.lock().await;
            *balances.entry(from).or_insert(0.0) -= sol;
            *balances.entry(to).or_insert(0.0) += sol;
        }
    }

    async fn apply_swap_marker(&self, marker: &serde_json::Value) {
        let wallet = marker["wallet"].as_str().unwrap_or_default().to_string();
        let input_mint = marker["inputMint"].as_str().unwrap_or_default().to_string();
        let output_mint = marker["outputMint"].as_str().unwrap_or_default().to_string();
        if wallet.is_empty() || input_mint.is_empty() {
            // claim markers and the like: no balance effect
            return;
        }
        let in_amount = marker["inAmount"].as_u64().unwrap_or(0);
        let out_amount = marker["outAmount"].as_u64().unwrap_or(0);

        let scale = 10f64.powi(DECIMALS as i32);
        if input_mint == SOL_MINT {
            *self.sol.lock().await.entry(wallet.clone()).or_insert(0.0) -=
                in_amount as f64 / 1e9;
            *self
                .tokens
                .lock()
                .await
                .entry((wallet, output_mint))
                .or_insert(0.0) += out_amount as f64 / scale;
        } else {
            *self
                .tokens
                .lock()
                .await
                .entry((wallet.clone(), input_mint))
                .or_insert(0.0) -= in_amount as f64 / scale;
            *self.sol.lock().await.entry(wallet).or_insert(0.0) += out_amount as f64 / 1e9;
        }
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn get_sol_balance(&self, address: &str) -> Result<f64, EngineError> {
        Ok(self.sol_of(address).await)
    }

    async fn get_token_balance(&self, owner: &str, mint: &str) -> Result<f64, EngineError> {
        Ok(self.tokens_of(owner, mint).await)
    }

    async fn latest_blockhash(
        &self,
        _commitment: Commitment,
    ) -> Result<BlockhashInfo, EngineError> {
        Ok(BlockhashInfo {
            blockhash: solana_sdk::hash::Hash::new_unique().to_string(),
            last_valid_block_height: u64::MAX,
        })
    }

    async fn send_raw_transaction(
        &self,
        serialized: &[u8],
        _opts: SendOpts,
    ) -> Result<String, EngineError> {
        if let Ok(marker) = serde_json::from_slice::<serde_json::Value>(serialized) {
            self.apply_swap_marker(&marker).await;
        } else if let Ok(tx) =
            bincode::deserialize::<solana_sdk::transaction::Transaction>(serialized)
        {
            self.apply_system_transfer(&tx).await;
        }
        let signature = self.fresh_signature();
        self.sent.lock().await.push(signature.clone());
        Ok(signature)
    }

    async fn get_signature_status(
        &self,
        _signature: &str,
    ) -> Result<Option<SignatureStatus>, EngineError> {
        Ok(Some(SignatureStatus {
            err: None,
            confirmation_status: Some("confirmed".into()),
        }))
    }

    async fn get_block_height(&self, _commitment: Commitment) -> Result<u64, EngineError> {
        Ok(0)
    }

    async fn confirm_transaction(
        &self,
        _signature: &str,
        _blockhash: &BlockhashInfo,
        _commitment: Commitment,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    async fn signatures_for_address(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, EngineError> {
        let history = self.history.lock().await;
        Ok(history
            .get(address)
            .map(|sigs| sigs.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn transaction_transfers(
        &self,
        signature: &str,
    ) -> Result<Vec<SystemTransfer>, EngineError> {
        Ok(self.parsed.lock().await.get(signature).cloned().unwrap_or_default())
    }
}

// ── Mock AMM ────────────────────────────────────────────────────────
//
// A flat price book: `tokens_per_sol` per mint, no impact, no fees. The
// swap "transaction" is a base64 JSON marker the mock chain interprets.

pub struct MockAmm {
    pub tokens_per_sol: Mutex<HashMap<String, f64>>,
    pub claimable: Mutex<HashMap<String, f64>>,
    pub quotes_served: AtomicU64,
}

impl MockAmm {
    pub fn new() -> Arc<Self> {
        Arc::new(MockAmm {
            tokens_per_sol: Mutex::new(HashMap::new()),
            claimable: Mutex::new(HashMap::new()),
            quotes_served: AtomicU64::new(0),
        })
    }

    pub async fn set_price(&self, mint: &str, tokens_per_sol: f64) {
        self.tokens_per_sol
            .lock()
            .await
            .insert(mint.to_string(), tokens_per_sol);
    }

    pub async fn set_claimable(&self, mint: &str, sol: f64) {
        self.claimable.lock().await.insert(mint.to_string(), sol);
    }
}

#[async_trait]
impl Amm for MockAmm {
    async fn token_metadata(&self, _mint: &str) -> Result<TokenMetadata, EngineError> {
        Ok(TokenMetadata { name: None, symbol: None, image: None, creator: None })
    }

    async fn lifetime_fees(&self, _mint: &str) -> Result<LifetimeFees, EngineError> {
        Ok(LifetimeFees::default())
    }

    async fn claimable_positions(
        &self,
        _wallet: &str,
    ) -> Result<Vec<ClaimablePosition>, EngineError> {
        let claimable = self.claimable.lock().await;
        Ok(claimable
            .iter()
            .map(|(mint, sol)| ClaimablePosition {
                mint: mint.clone(),
                symbol: None,
                claimable_amount_sol: *sol,
                last_claim_time: None,
            })
            .collect())
    }

    async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount_atomic: u64,
        _slippage_bps: u16,
    ) -> Result<Quote, EngineError> {
        self.quotes_served.fetch_add(1, Ordering::Relaxed);
        let book = self.tokens_per_sol.lock().await;
        let scale = 10f64.powi(DECIMALS as i32);

        let out_amount = if input_mint == SOL_MINT {
            let tps = book
                .get(output_mint)
                .copied()
                .ok_or_else(|| EngineError::QuoteUnavailable(output_mint.into()))?;
            (amount_atomic as f64 / 1e9 * tps * scale) as u64
        } else {
            let tps = book
                .get(input_mint)
                .copied()
                .ok_or_else(|| EngineError::QuoteUnavailable(input_mint.into()))?;
            (amount_atomic as f64 / scale / tps * 1e9) as u64
        };

        Ok(Quote {
            raw: json!({
                "inputMint": input_mint,
                "outputMint": output_mint,
                "inAmount": amount_atomic,
                "outAmount": out_amount,
            }),
            in_amount: amount_atomic,
            out_amount,
            price_impact_pct: 0.0,
            fee_amount: 0,
        })
    }

    async fn swap_tx(&self, wallet_address: &str, quote: &Quote) -> Result<SwapTx, EngineError> {
        let mut marker = quote.raw.clone();
        marker["wallet"] = json!(wallet_address);
        let bytes = serde_json::to_vec(&marker).unwrap();
        Ok(SwapTx {
            swap_transaction: BASE64.encode(bytes),
            last_valid_block_height: u64::MAX,
        })
    }

    async fn claim_txs(
        &self,
        wallet_address: &str,
        mints: &[String],
    ) -> Result<Vec<String>, EngineError> {
        // One marker per claim; moves nothing on its own (the test sets
        // the post-claim dev balance explicitly).
        let marker = json!({ "claimFor": wallet_address, "mints": mints });
        Ok(vec![BASE64.encode(serde_json::to_vec(&marker).unwrap())])
    }

    async fn market_stats(&self, _mint: &str) -> MarketStats {
        MarketStats::default()
    }
}

// ── Mock custody ────────────────────────────────────────────────────

pub struct MockCustody {
    pub signed: Mutex<Vec<String>>,
}

impl MockCustody {
    pub fn new() -> Arc<Self> {
        Arc::new(MockCustody { signed: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl Custody for MockCustody {
    async fn sign(&self, wallet_address: &str, tx_base64: &str) -> Result<String, EngineError> {
        self.signed.lock().await.push(wallet_address.to_string());
        Ok(tx_base64.to_string())
    }

    async fn sign_and_send(
        &self,
        wallet_address: &str,
        _tx_base64: &str,
    ) -> Result<String, EngineError> {
        self.signed.lock().await.push(wallet_address.to_string());
        Ok(format!("custody-sig-{wallet_address}"))
    }
}

// ── Mock launcher / notifier ────────────────────────────────────────

pub struct MockLauncher {
    pub fail_times: AtomicU64,
    pub launched: Mutex<Vec<String>>,
}

impl MockLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(MockLauncher { fail_times: AtomicU64::new(0), launched: Mutex::new(Vec::new()) })
    }

    pub fn failing(times: u64) -> Arc<Self> {
        Arc::new(MockLauncher {
            fail_times: AtomicU64::new(times),
            launched: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TokenLauncher for MockLauncher {
    async fn launch(&self, launch: &PendingLaunch) -> Result<LaunchedToken, EngineError> {
        let remaining = self.fail_times.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_times.store(remaining - 1, Ordering::Relaxed);
            return Err(EngineError::Transient("launcher unavailable".into()));
        }
        let mint = format!("Mint-{}", launch.id);
        self.launched.lock().await.push(mint.clone());
        Ok(LaunchedToken { mint, signature: Some("launch-sig".into()) })
    }
}

pub struct MockNotifier {
    pub messages: Mutex<Vec<(String, String)>>,
}

impl MockNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(MockNotifier { messages: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, user_id: &str, detail: &str) {
        self.messages
            .lock()
            .await
            .push((user_id.to_string(), detail.to_string()));
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

pub async fn seed_token(
    store: &Store,
    id: &str,
    mint: &str,
    source: TokenSource,
) -> (Token, TokenConfig) {
    for (address, kind) in
        [(format!("Dev-{id}"), WalletKind::Dev), (format!("Ops-{id}"), WalletKind::Ops)]
    {
        store
            .insert_wallet(&Wallet {
                address: address.clone(),
                kind,
                custody_id: address,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    let token = Token {
        id: id.to_string(),
        mint: mint.to_string(),
        name: format!("Token {id}"),
        symbol: id.to_uppercase(),
        decimals: DECIMALS,
        image: None,
        source,
        owner_id: "user-1".to_string(),
        dev_wallet: format!("Dev-{id}"),
        ops_wallet: format!("Ops-{id}"),
        is_active: true,
        is_suspended: false,
        suspend_reason: None,
        is_verified: false,
        daily_trade_limit_sol: None,
        max_position_size_sol: None,
        risk_level: None,
        created_at: Utc::now(),
    };
    let config = TokenConfig::defaults_for(id);
    store.insert_token(&token, &config).await.unwrap();
    (token, config)
}

pub fn pending_launch(id: &str, min_deposit: f64, expires_in_hours: i64) -> PendingLaunch {
    let now = Utc::now();
    PendingLaunch {
        id: id.to_string(),
        owner_id: "user-1".into(),
        name: "New Token".into(),
        symbol: "NEW".into(),
        image: None,
        description: None,
        deposit_address: format!("Dep-{id}"),
        ops_address: format!("DepOps-{id}"),
        min_deposit_sol: min_deposit,
        status: curvewheel::model::LaunchStatus::AwaitingDeposit,
        retry_count: 0,
        expires_at: now + chrono::Duration::hours(expires_in_hours),
        last_error: None,
        created_at: now,
        updated_at: now,
    }
}
