use chrono::Utc;

use crate::model::{Token, TokenConfig, TokenSource, Wallet, WalletKind};

use super::Store;

pub fn wallet(address: &str, kind: WalletKind) -> Wallet {
    Wallet {
        address: address.to_string(),
        kind,
        custody_id: format!("cust-{address}"),
        created_at: Utc::now(),
    }
}

/// Insert a token with fresh dev/ops wallets, default config, and initial
/// state. Returns the token as stored.
pub async fn seed_token(store: &Store, id: &str, mint: &str, source: TokenSource) -> Token {
    let dev = wallet(&format!("Dev-{id}"), WalletKind::Dev);
    let ops = wallet(&format!("Ops-{id}"), WalletKind::Ops);
    store.insert_wallet(&dev).await.unwrap();
    store.insert_wallet(&ops).await.unwrap();

    let token = Token {
        id: id.to_string(),
        mint: mint.to_string(),
        name: format!("Token {id}"),
        symbol: id.to_uppercase(),
        decimals: 6,
        image: None,
        source,
        owner_id: "user-1".to_string(),
        dev_wallet: dev.address,
        ops_wallet: ops.address,
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
    token
}
