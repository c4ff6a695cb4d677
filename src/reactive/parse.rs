use solana_sdk::native_token::lamports_to_sol;

use crate::amm::Side;
use crate::config::SOL_MINT;

use super::event::EnhancedTransaction;

/// What the engine needs from an observed swap.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSwap {
    pub mint: String,
    pub sol_amount: f64,
    pub side: Side,
}

/// Extract `(mint, SOL size, side)` from an enhanced transaction.
///
/// Preference order:
/// 1. `events.swap` — nativeInput means SOL went in (a buy, mint from the
///    token outputs); nativeOutput means SOL came out (a sell, mint from
///    the token inputs).
/// 2. `tokenTransfers` for the mint, largest `nativeTransfers` entry for
///    the SOL size, the fee payer's balance delta for the side.
pub fn parse_swap(tx: &EnhancedTransaction) -> Option<ParsedSwap> {
    if let Some(parsed) = parse_from_swap_event(tx) {
        return Some(parsed);
    }
    parse_from_transfers(tx)
}

fn parse_from_swap_event(tx: &EnhancedTransaction) -> Option<ParsedSwap> {
    let swap = tx.events.as_ref()?.swap.as_ref()?;

    if let Some(input) = &swap.native_input
        && input.amount > 0
    {
        let mint = swap
            .token_outputs
            .iter()
            .map(|t| t.mint.clone())
            .find(|m| !m.is_empty() && m != SOL_MINT)?;
        return Some(ParsedSwap {
            mint,
            sol_amount: lamports_to_sol(input.amount),
            side: Side::Buy,
        });
    }

    if let Some(output) = &swap.native_output
        && output.amount > 0
    {
        let mint = swap
            .token_inputs
            .iter()
            .map(|t| t.mint.clone())
            .find(|m| !m.is_empty() && m != SOL_MINT)?;
        return Some(ParsedSwap {
            mint,
            sol_amount: lamports_to_sol(output.amount),
            side: Side::Sell,
        });
    }

    None
}

fn parse_from_transfers(tx: &EnhancedTransaction) -> Option<ParsedSwap> {
    let mint = tx
        .token_transfers
        .iter()
        .map(|t| t.mint.clone())
        .find(|m| !m.is_empty() && m != SOL_MINT)?;

    // Largest native movement stands in for the swap size; fall back to
    // the fee payer's balance delta when no transfer entries exist.
    let max_native = tx.native_transfers.iter().map(|t| t.amount).max();
    let sol_lamports = match max_native {
        Some(amount) if amount > 0 => amount,
        _ => tx
            .account_data
            .iter()
            .find(|a| a.account == tx.fee_payer)
            .map(|a| a.native_balance_change.unsigned_abs())
            .filter(|v| *v > 0)?,
    };

    // SOL flowing out of the fee payer marks a buy.
    let side = match tx
        .account_data
        .iter()
        .find(|a| a.account == tx.fee_payer)
        .map(|a| a.native_balance_change)
    {
        Some(delta) if delta > 0 => Side::Sell,
        _ => Side::Buy,
    };

    Some(ParsedSwap { mint, sol_amount: lamports_to_sol(sol_lamports), side })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_tx(value: serde_json::Value) -> EnhancedTransaction {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn swap_event_buy() {
        let tx = base_tx(serde_json::json!({
            "signature": "s1",
            "type": "SWAP",
            "feePayer": "Payer",
            "events": {"swap": {
                "nativeInput": {"account": "Payer", "amount": 300_000_000u64},
                "tokenOutputs": [{"mint": "MintM", "userAccount": "Payer"}]
            }}
        }));
        assert_eq!(
            parse_swap(&tx),
            Some(ParsedSwap { mint: "MintM".into(), sol_amount: 0.3, side: Side::Buy })
        );
    }

    #[test]
    fn swap_event_sell() {
        let tx = base_tx(serde_json::json!({
            "signature": "s2",
            "type": "SWAP",
            "feePayer": "Payer",
            "events": {"swap": {
                "nativeOutput": {"account": "Payer", "amount": 150_000_000u64},
                "tokenInputs": [{"mint": "MintM", "userAccount": "Payer"}]
            }}
        }));
        assert_eq!(
            parse_swap(&tx),
            Some(ParsedSwap { mint: "MintM".into(), sol_amount: 0.15, side: Side::Sell })
        );
    }

    #[test]
    fn transfer_fallback_buy() {
        let tx = base_tx(serde_json::json!({
            "signature": "s3",
            "type": "SWAP",
            "feePayer": "Payer",
            "nativeTransfers": [
                {"fromUserAccount": "Payer", "toUserAccount": "Pool", "amount": 50_000_000u64},
                {"fromUserAccount": "Payer", "toUserAccount": "Fee", "amount": 5_000u64}
            ],
            "tokenTransfers": [
                {"fromUserAccount": "Pool", "toUserAccount": "Payer",
                 "mint": "MintM", "tokenAmount": 1000.0}
            ],
            "accountData": [
                {"account": "Payer", "nativeBalanceChange": -50_005_000i64}
            ]
        }));
        let parsed = parse_swap(&tx).unwrap();
        assert_eq!(parsed.mint, "MintM");
        assert_eq!(parsed.side, Side::Buy);
        assert!((parsed.sol_amount - 0.05).abs() < 1e-9);
    }

    #[test]
    fn account_data_fallback_sell() {
        let tx = base_tx(serde_json::json!({
            "signature": "s4",
            "type": "SELL",
            "feePayer": "Payer",
            "tokenTransfers": [
                {"fromUserAccount": "Payer", "toUserAccount": "Pool",
                 "mint": "MintM", "tokenAmount": 1000.0}
            ],
            "accountData": [
                {"account": "Payer", "nativeBalanceChange": 75_000_000i64}
            ]
        }));
        let parsed = parse_swap(&tx).unwrap();
        assert_eq!(parsed.side, Side::Sell);
        assert!((parsed.sol_amount - 0.075).abs() < 1e-9);
    }

    #[test]
    fn no_token_leg_yields_nothing() {
        let tx = base_tx(serde_json::json!({
            "signature": "s5",
            "type": "SWAP",
            "feePayer": "Payer",
            "nativeTransfers": [
                {"fromUserAccount": "A", "toUserAccount": "B", "amount": 1_000_000u64}
            ]
        }));
        assert_eq!(parse_swap(&tx), None);
    }

    #[test]
    fn sol_mint_ignored_as_token_leg() {
        let tx = base_tx(serde_json::json!({
            "signature": "s6",
            "type": "SWAP",
            "feePayer": "Payer",
            "events": {"swap": {
                "nativeInput": {"account": "Payer", "amount": 100u64},
                "tokenOutputs": [{"mint": SOL_MINT, "userAccount": "Payer"}]
            }}
        }));
        assert_eq!(parse_swap(&tx), None);
    }
}
