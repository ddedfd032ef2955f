// 4.0: order admissibility. pure function over an account snapshot, an order
// request and the captured price. never mutates state; rules run in a fixed
// order and the first failure wins.

use crate::account::Account;
use crate::order::OrderRequest;
use crate::types::{Leverage, OrderKind, Price, Quote, Side, TradeMode, MAX_LEVERAGE};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// Terminal rejection taxonomy. Reported to the caller verbatim, never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum RejectReason {
    #[error("invalid amount")]
    InvalidAmount,

    #[error("invalid price")]
    InvalidPrice,

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("invalid parameters")]
    InvalidParameters,
}

// 4.1: a validated order. Carries the price captured at validation time and
// the derived amounts; the executor consumes these without re-deriving, so
// the whole transaction sees one point-in-time price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissibleOrder {
    pub request: OrderRequest,
    pub effective_price: Price,
    // Required capital: amount * price, or the bare stake for contracts.
    pub total: Quote,
    // Cash leaving the balance at open: full cost for spot buys, cost /
    // leverage for futures, the stake for contracts, nothing for spot sells.
    pub cash_debit: Quote,
    pub leverage: Leverage,
}

pub fn validate(
    account: &Account,
    order: &OrderRequest,
    current_price: Price,
) -> Result<AdmissibleOrder, RejectReason> {
    // Rule 1: amount must be positive.
    if order.amount <= Decimal::ZERO {
        return Err(RejectReason::InvalidAmount);
    }

    // Rule 2: market orders take the captured price, limit orders must carry
    // a positive one of their own.
    let effective_price = match order.kind {
        OrderKind::Market => current_price,
        OrderKind::Limit => order
            .limit_price
            .and_then(Price::new)
            .ok_or(RejectReason::InvalidPrice)?,
    };

    // Rule 3: required capital.
    let total = match order.mode {
        TradeMode::Contract => Quote::new(order.amount),
        _ => Quote::new(order.amount * effective_price.value()),
    };

    // Rule 4: buying power. Spot sells are capped by held units of the
    // asset, everything else by balance scaled with leverage (1 outside
    // futures). An order that uses buying power exactly is admissible.
    if order.mode == TradeMode::Spot && order.side == Side::Sell {
        if order.amount > account.spot_holdings(order.asset_id) {
            return Err(RejectReason::InsufficientBalance);
        }
    } else {
        let scale = match order.mode {
            TradeMode::Futures => Decimal::from(order.leverage.unwrap_or(1)),
            _ => Decimal::ONE,
        };
        let buying_power = account.balance.mul(scale);
        if total > buying_power {
            return Err(RejectReason::InsufficientBalance);
        }
    }

    // Rule 5: mode-specific parameters.
    let leverage = match order.mode {
        TradeMode::Futures => {
            let raw = order.leverage.ok_or(RejectReason::InvalidParameters)?;
            if !(1..=MAX_LEVERAGE).contains(&raw) {
                return Err(RejectReason::InvalidParameters);
            }
            Leverage::new(raw).ok_or(RejectReason::InvalidParameters)?
        }
        TradeMode::Contract => {
            if order.duration.is_none() {
                return Err(RejectReason::InvalidParameters);
            }
            Leverage::ONE
        }
        TradeMode::Spot => Leverage::ONE,
    };

    if order.mode != TradeMode::Contract {
        for protective in [order.stop_loss, order.take_profit].into_iter().flatten() {
            if protective <= Decimal::ZERO {
                return Err(RejectReason::InvalidParameters);
            }
        }
    }

    let cash_debit = match order.mode {
        TradeMode::Spot => {
            if order.side == Side::Sell {
                Quote::zero()
            } else {
                total
            }
        }
        TradeMode::Futures => Quote::new(total.value() / leverage.multiplier()),
        TradeMode::Contract => total,
    };

    Ok(AdmissibleOrder {
        request: order.clone(),
        effective_price,
        total,
        cash_debit,
        leverage,
    })
}
