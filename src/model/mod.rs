pub mod launch;
pub mod record;
pub mod state;
pub mod token;
pub mod token_config;
pub mod wallet;

pub use launch::{LaunchStatus, PendingLaunch};
pub use record::{AuditEvent, BalanceSnapshot, ClaimRecord, TransactionRecord, TxKind, TxStatus};
pub use state::{FlywheelState, MarketCondition, TradePhase};
pub use token::{Token, TokenSource};
pub use token_config::{Algorithm, TokenConfig};
pub use wallet::{Wallet, WalletKind};
