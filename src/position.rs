// 3.0: open position tracking. pnl = (mark - entry) * amount * side * leverage.
// 3.2 has the close/reduce math at the bottom.

use crate::types::{
    AssetId, ContractDuration, Leverage, PositionId, Price, Quote, Side, Timestamp, TradeMode,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// Terms fixed at open time for a timed contract. The payout rate is captured
// from the schedule in force when the order was placed, so later config
// reloads cannot change a live contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractTerms {
    pub duration: ContractDuration,
    pub payout_rate: Decimal,
    pub expires_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub asset_id: AssetId,
    pub side: Side,
    pub mode: TradeMode,
    pub entry_price: Price,
    pub amount: Decimal,
    pub leverage: Leverage,
    // Cash debited from the balance when this position was opened: full cost
    // for spot, cost / leverage for futures, the stake for contracts.
    pub margin: Quote,
    pub stop_loss: Option<Price>,
    pub take_profit: Option<Price>,
    pub contract: Option<ContractTerms>,
    pub opened_at: Timestamp,
}

impl Position {
    pub fn is_contract(&self) -> bool {
        self.contract.is_some()
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.contract.map(|c| now >= c.expires_at).unwrap_or(false)
    }

    // 3.1: paper gains/losses at the current price. pending contracts carry no
    // unrealized pnl: the stake left the balance at order time and resolves
    // discretely at expiry.
    pub fn unrealized_pnl(&self, mark: Price) -> Quote {
        if self.is_contract() {
            return Quote::zero();
        }
        calculate_unrealized_pnl(self.side, self.entry_price, mark, self.amount, self.leverage)
    }

    pub fn entry_value(&self) -> Quote {
        Quote::new(self.amount * self.entry_price.value())
    }
}

// 3.2: the pnl formula. (mark - entry) * amount * side * leverage.
pub fn calculate_unrealized_pnl(
    side: Side,
    entry_price: Price,
    mark: Price,
    amount: Decimal,
    leverage: Leverage,
) -> Quote {
    let pnl = (mark.value() - entry_price.value()) * amount * side.sign() * leverage.multiplier();
    Quote::new(pnl)
}

// Terminal outcome of a trade. Spot/futures closes are Closed; contract
// settlement is Win or Loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Closed,
    Win,
    Loss,
}

// 3.3: append-only record of a terminal trade, kept for statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub position_id: PositionId,
    pub asset_id: AssetId,
    pub side: Side,
    pub mode: TradeMode,
    pub entry_price: Price,
    pub exit_price: Option<Price>,
    pub amount: Decimal,
    pub leverage: Leverage,
    pub realized_pnl: Quote,
    pub outcome: Outcome,
    pub opened_at: Timestamp,
    pub closed_at: Timestamp,
}

impl ClosedTrade {
    pub fn from_position(
        position: &Position,
        exit_price: Option<Price>,
        realized_pnl: Quote,
        outcome: Outcome,
        closed_at: Timestamp,
    ) -> Self {
        Self {
            position_id: position.id,
            asset_id: position.asset_id,
            side: position.side,
            mode: position.mode,
            entry_price: position.entry_price,
            exit_price,
            amount: position.amount,
            leverage: position.leverage,
            realized_pnl,
            outcome,
            opened_at: position.opened_at,
            closed_at,
        }
    }

    pub fn is_win(&self) -> bool {
        match self.outcome {
            Outcome::Win => true,
            Outcome::Loss => false,
            Outcome::Closed => self.realized_pnl.value() > Decimal::ZERO,
        }
    }
}

// 3.4: full close of a spot or futures position. Realized loss is floored at
// the margin: the position's stake is the most that can be lost, so the
// credit never goes negative and the balance invariant holds.
#[derive(Debug, Clone)]
pub struct CloseProceeds {
    pub realized_pnl: Quote,
    pub credit: Quote,
}

pub fn close_proceeds(position: &Position, exit_price: Price) -> CloseProceeds {
    debug_assert!(!position.is_contract(), "contracts settle via the scheduler");

    let raw = calculate_unrealized_pnl(
        position.side,
        position.entry_price,
        exit_price,
        position.amount,
        position.leverage,
    );
    let floor = position.margin.negate();
    let realized_pnl = if raw < floor { floor } else { raw };
    CloseProceeds {
        realized_pnl,
        credit: position.margin.add(realized_pnl),
    }
}

// 3.5: partial or full reduction of an open spot position by a sell order.
// Proceeds are amount * exit price; the remaining position keeps its entry
// price with amount and margin scaled down.
#[derive(Debug, Clone)]
pub struct SpotReduction {
    pub remaining: Option<Position>,
    pub closed_amount: Decimal,
    pub realized_pnl: Quote,
    pub credit: Quote,
}

pub fn reduce_spot_position(
    position: &Position,
    sell_amount: Decimal,
    exit_price: Price,
) -> SpotReduction {
    debug_assert!(position.mode == TradeMode::Spot);
    debug_assert!(sell_amount > Decimal::ZERO);

    let closed_amount = sell_amount.min(position.amount);
    let realized_pnl =
        Quote::new((exit_price.value() - position.entry_price.value()) * closed_amount);
    let credit = Quote::new(closed_amount * exit_price.value());

    let remaining_amount = position.amount - closed_amount;
    let remaining = if remaining_amount > Decimal::ZERO {
        let fraction = remaining_amount / position.amount;
        let mut rest = position.clone();
        rest.amount = remaining_amount;
        rest.margin = position.margin.mul(fraction);
        Some(rest)
    } else {
        None
    };

    SpotReduction {
        remaining,
        closed_amount,
        realized_pnl,
        credit,
    }
}
