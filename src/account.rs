//! Account ledger state.
//!
//! An account holds a cash balance, the set of open positions and an
//! append-only log of terminal trades. Every cash-reducing operation checks
//! the balance before touching any field, so a failed debit leaves the
//! account exactly as it was and the balance can never go negative.

use crate::position::{ClosedTrade, Position};
use crate::types::{AccountId, AssetId, PositionId, Quote, Timestamp, TradeMode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub balance: Quote,
    pub positions: HashMap<PositionId, Position>,
    pub closed: Vec<ClosedTrade>,
    pub total_deposited: Quote,
    // Sum of every credit event (sell proceeds, close credits, contract
    // payouts). Together with total_deposited this bounds the value the
    // account can hold: no mutation path mints cash outside these two.
    pub total_credited: Quote,
    pub created_at: Timestamp,
}

impl Account {
    pub fn new(id: AccountId, timestamp: Timestamp) -> Self {
        Self {
            id,
            balance: Quote::zero(),
            positions: HashMap::new(),
            closed: Vec::new(),
            total_deposited: Quote::zero(),
            total_credited: Quote::zero(),
            created_at: timestamp,
        }
    }

    pub fn deposit(&mut self, amount: Quote) {
        self.balance = self.balance.add(amount);
        self.total_deposited = self.total_deposited.add(amount);
    }

    pub fn credit(&mut self, amount: Quote) {
        self.balance = self.balance.add(amount);
        self.total_credited = self.total_credited.add(amount);
    }

    pub fn debit(&mut self, amount: Quote) -> Result<(), AccountError> {
        if amount > self.balance {
            return Err(AccountError::InsufficientBalance {
                requested: amount,
                available: self.balance,
            });
        }
        self.balance = self.balance.sub(amount);
        Ok(())
    }

    pub fn open_position(&mut self, position: Position) {
        self.positions.insert(position.id, position);
    }

    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(&id)
    }

    pub fn take_position(&mut self, id: PositionId) -> Option<Position> {
        self.positions.remove(&id)
    }

    pub fn record_closed(&mut self, trade: ClosedTrade) {
        self.closed.push(trade);
    }

    // Total units of an asset held across open spot positions. This, not the
    // cash balance, caps a spot sell.
    pub fn spot_holdings(&self, asset_id: AssetId) -> Decimal {
        self.positions
            .values()
            .filter(|p| p.mode == TradeMode::Spot && p.asset_id == asset_id)
            .map(|p| p.amount)
            .sum()
    }

    // Open spot position ids for an asset, oldest first. Sells consume
    // positions in this order.
    pub fn spot_position_ids_fifo(&self, asset_id: AssetId) -> Vec<PositionId> {
        let mut ids: Vec<(Timestamp, PositionId)> = self
            .positions
            .values()
            .filter(|p| p.mode == TradeMode::Spot && p.asset_id == asset_id)
            .map(|p| (p.opened_at, p.id))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    // Sum of margin locked in open positions, used by the conservation
    // invariant checks.
    pub fn open_margin(&self) -> Quote {
        self.positions.values().map(|p| p.margin).sum()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AccountError {
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Quote, available: Quote },

    #[error("position {0:?} not found")]
    PositionNotFound(PositionId),
}
