use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use tracing::{debug, warn};

use crate::chain::{ChainRpc, Commitment, SendOpts};
use crate::custody::Custody;
use crate::error::{EngineError, is_retryable_message};

/// Attempt backoff schedule. Attempt n sleeps `BACKOFF[n-1]` before
/// retrying; attempts beyond the table reuse the last entry.
const BACKOFF: [Duration; 3] =
    [Duration::from_secs(2), Duration::from_secs(5), Duration::from_secs(10)];

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(2);
const STATUS_POLL_CEILING: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub signature: String,
    pub attempts: u32,
}

/// Unified outbound-transaction routine: sign (delegated or local),
/// broadcast, confirm, retry. The executor never replays a transaction
/// past its polling window — semantic idempotency stays with the caller.
pub struct TxExecutor {
    chain: Arc<dyn ChainRpc>,
    custody: Arc<dyn Custody>,
    max_attempts: u32,
}

impl TxExecutor {
    pub fn new(chain: Arc<dyn ChainRpc>, custody: Arc<dyn Custody>) -> Self {
        TxExecutor { chain, custody, max_attempts: DEFAULT_MAX_ATTEMPTS }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delegated sign-then-broadcast of a prebuilt transaction (blockhash
    /// and fee payer already set, e.g. by the AMM's swap builder).
    pub async fn execute_delegated(
        &self,
        wallet_address: &str,
        tx_base64: &str,
    ) -> Result<ExecOutcome, EngineError> {
        self.with_retries("delegated", async |_| {
            let signed = self.custody.sign(wallet_address, tx_base64).await?;
            let bytes = BASE64
                .decode(&signed)
                .map_err(|e| EngineError::Custody(format!("signed tx not base64: {e}")))?;
            let signature = self.chain.send_raw_transaction(&bytes, SendOpts::default()).await?;
            self.poll_until_confirmed(&signature).await?;
            Ok(signature)
        })
        .await
    }

    /// Delegated sign-and-send: custody broadcasts, we poll the signature.
    pub async fn execute_delegated_send(
        &self,
        wallet_address: &str,
        tx_base64: &str,
    ) -> Result<ExecOutcome, EngineError> {
        self.with_retries("delegated-send", async |_| {
            let signature = self.custody.sign_and_send(wallet_address, tx_base64).await?;
            self.poll_until_confirmed(&signature).await?;
            Ok(signature)
        })
        .await
    }

    /// System-program SOL transfer from a custody wallet. Built fresh per
    /// attempt so every retry carries a current blockhash.
    pub async fn transfer_sol_delegated(
        &self,
        from_address: &str,
        to_address: &str,
        lamports: u64,
    ) -> Result<ExecOutcome, EngineError> {
        let from = parse_pubkey(from_address)?;
        let to = parse_pubkey(to_address)?;
        self.with_retries("transfer", async |_| {
            let blockhash = self.chain.latest_blockhash(Commitment::Confirmed).await?;
            let tx_base64 = build_transfer_base64(&from, &to, lamports, &blockhash.blockhash)?;
            let signed = self.custody.sign(from_address, &tx_base64).await?;
            let bytes = BASE64
                .decode(&signed)
                .map_err(|e| EngineError::Custody(format!("signed tx not base64: {e}")))?;
            let signature = self.chain.send_raw_transaction(&bytes, SendOpts::default()).await?;
            self.chain
                .confirm_transaction(&signature, &blockhash, Commitment::Confirmed)
                .await?;
            Ok(signature)
        })
        .await
    }

    /// Self-signed SOL transfer; platform loop only.
    pub async fn transfer_sol_local(
        &self,
        keypair: &Keypair,
        to_address: &str,
        lamports: u64,
    ) -> Result<ExecOutcome, EngineError> {
        let to = parse_pubkey(to_address)?;
        self.with_retries("transfer-local", async |_| {
            let blockhash = self.chain.latest_blockhash(Commitment::Confirmed).await?;
            let hash = parse_hash(&blockhash.blockhash)?;
            let ix = system_instruction::transfer(&keypair.pubkey(), &to, lamports);
            let tx = Transaction::new_signed_with_payer(
                &[ix],
                Some(&keypair.pubkey()),
                &[keypair],
                hash,
            );
            let bytes = bincode::serialize(&tx)
                .map_err(|e| EngineError::Other(format!("serializing transfer: {e}")))?;
            let signature = self.chain.send_raw_transaction(&bytes, SendOpts::default()).await?;
            self.chain
                .confirm_transaction(&signature, &blockhash, Commitment::Confirmed)
                .await?;
            Ok(signature)
        })
        .await
    }

    /// Self-signed execution of a prebuilt transaction (base64, legacy
    /// format); platform loop only.
    pub async fn execute_local(
        &self,
        keypair: &Keypair,
        tx_base64: &str,
    ) -> Result<ExecOutcome, EngineError> {
        self.with_retries("local", async |_| {
            let bytes = BASE64
                .decode(tx_base64)
                .map_err(|e| EngineError::Other(format!("tx not base64: {e}")))?;
            let mut tx: Transaction = bincode::deserialize(&bytes)
                .map_err(|e| EngineError::Other(format!("tx not deserializable: {e}")))?;
            let blockhash = self.chain.latest_blockhash(Commitment::Confirmed).await?;
            let hash = parse_hash(&blockhash.blockhash)?;
            tx.try_sign(&[keypair], hash)
                .map_err(|e| EngineError::Other(format!("signing: {e}")))?;
            let signed = bincode::serialize(&tx)
                .map_err(|e| EngineError::Other(format!("serializing: {e}")))?;
            let signature = self.chain.send_raw_transaction(&signed, SendOpts::default()).await?;
            self.chain
                .confirm_transaction(&signature, &blockhash, Commitment::Confirmed)
                .await?;
            Ok(signature)
        })
        .await
    }

    async fn with_retries<F, Fut>(&self, op: &str, mut attempt_fn: F) -> Result<ExecOutcome, EngineError>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<String, EngineError>>,
    {
        let mut last_err = EngineError::Other("no attempts made".into());
        for attempt in 1..=self.max_attempts {
            match attempt_fn(attempt).await {
                Ok(signature) => {
                    debug!(op, attempt, %signature, "transaction confirmed");
                    return Ok(ExecOutcome { signature, attempts: attempt });
                }
                Err(e) => {
                    let retryable =
                        e.is_retryable() || is_retryable_message(&e.to_string());
                    warn!(op, attempt, retryable, "attempt failed: {e}");
                    if !retryable || attempt == self.max_attempts {
                        return Err(e);
                    }
                    last_err = e;
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
            }
        }
        Err(last_err)
    }

    async fn poll_until_confirmed(&self, signature: &str) -> Result<(), EngineError> {
        let deadline = tokio::time::Instant::now() + STATUS_POLL_CEILING;
        loop {
            if let Some(status) = self.chain.get_signature_status(signature).await? {
                if let Some(err) = status.err {
                    return Err(EngineError::OnChain(format!("{signature}: {err}")));
                }
                if status.is_at_least(Commitment::Confirmed) {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(EngineError::StaleBlockhash(format!(
                    "{signature}: not confirmed within {}s",
                    STATUS_POLL_CEILING.as_secs()
                )));
            }
            tokio::time::sleep(STATUS_POLL_INTERVAL).await;
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let index = (attempt as usize).saturating_sub(1).min(BACKOFF.len() - 1);
    BACKOFF[index]
}

fn parse_pubkey(address: &str) -> Result<Pubkey, EngineError> {
    Pubkey::from_str(address)
        .map_err(|e| EngineError::Other(format!("invalid address {address}: {e}")))
}

fn parse_hash(blockhash: &str) -> Result<Hash, EngineError> {
    Hash::from_str(blockhash)
        .map_err(|e| EngineError::Other(format!("invalid blockhash {blockhash}: {e}")))
}

/// Unsigned system transfer with fee payer and blockhash set, base64 over
/// the legacy wire format. Custody applies the signature.
fn build_transfer_base64(
    from: &Pubkey,
    to: &Pubkey,
    lamports: u64,
    blockhash: &str,
) -> Result<String, EngineError> {
    let ix = system_instruction::transfer(from, to, lamports);
    let mut tx = Transaction::new_with_payer(&[ix], Some(from));
    tx.message.recent_blockhash = parse_hash(blockhash)?;
    let bytes = bincode::serialize(&tx)
        .map_err(|e| EngineError::Other(format!("serializing transfer: {e}")))?;
    Ok(BASE64.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(5));
        assert_eq!(backoff_delay(3), Duration::from_secs(10));
        assert_eq!(backoff_delay(7), Duration::from_secs(10));
    }

    #[test]
    fn transfer_tx_sets_payer_and_blockhash() {
        let from = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        let blockhash = Hash::new_unique().to_string();
        let encoded = build_transfer_base64(&from, &to, 1_000_000, &blockhash).unwrap();

        let bytes = BASE64.decode(&encoded).unwrap();
        let tx: Transaction = bincode::deserialize(&bytes).unwrap();
        assert_eq!(tx.message.account_keys[0], from);
        assert_eq!(tx.message.recent_blockhash.to_string(), blockhash);
        // unsigned: custody fills this in
        assert!(tx.signatures.iter().all(|s| *s == solana_sdk::signature::Signature::default()));
    }
}
