// 5.0: derived views over an account snapshot. pure folds, nothing stored.
// equity = balance + unrealized; stats come from the closed log.

use crate::account::Account;
use crate::types::{AssetId, Price, Quote};
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    // winning / total * 100, zero when the closed log is empty
    pub win_rate_pct: Decimal,
    pub realized_pnl: Quote,
}

// Sum of unrealized pnl over open positions. A position whose asset has no
// price in the map contributes zero: read-only views never fail, mutating
// paths are the ones that demand a live price.
pub fn unrealized_total(account: &Account, prices: &HashMap<AssetId, Price>) -> Quote {
    account
        .positions
        .values()
        .filter_map(|p| prices.get(&p.asset_id).map(|mark| p.unrealized_pnl(*mark)))
        .sum()
}

pub fn equity(account: &Account, prices: &HashMap<AssetId, Price>) -> Quote {
    account.balance.add(unrealized_total(account, prices))
}

// Realized over the closed log plus unrealized over open positions.
pub fn total_pnl(account: &Account, prices: &HashMap<AssetId, Price>) -> Quote {
    let realized: Quote = account.closed.iter().map(|t| t.realized_pnl).sum();
    realized.add(unrealized_total(account, prices))
}

pub fn account_stats(account: &Account) -> AccountStats {
    let total_trades = account.closed.len();
    let winning_trades = account.closed.iter().filter(|t| t.is_win()).count();
    let losing_trades = total_trades - winning_trades;

    let win_rate_pct = if total_trades == 0 {
        Decimal::ZERO
    } else {
        Decimal::from(winning_trades) / Decimal::from(total_trades) * Decimal::from(100)
    };

    AccountStats {
        total_trades,
        winning_trades,
        losing_trades,
        win_rate_pct,
        realized_pnl: account.closed.iter().map(|t| t.realized_pnl).sum(),
    }
}
