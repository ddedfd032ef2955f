//! Order requests.
//!
//! An order is a request, not persisted state: the validator turns it into an
//! admissible order or a rejection, the executor turns an admissible order
//! into ledger mutations. Raw numeric fields (limit price, leverage) stay
//! unvalidated here so the validator owns the full rejection taxonomy.

use crate::types::{AssetId, ContractDuration, OrderKind, Side, TradeMode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub asset_id: AssetId,
    pub side: Side,
    pub mode: TradeMode,
    pub kind: OrderKind,
    pub amount: Decimal,
    /// Required for limit orders; ignored for market orders.
    pub limit_price: Option<Decimal>,
    /// Futures only.
    pub leverage: Option<u32>,
    /// Contract only.
    pub duration: Option<ContractDuration>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

impl OrderRequest {
    pub fn market(asset_id: AssetId, side: Side, mode: TradeMode, amount: Decimal) -> Self {
        Self {
            asset_id,
            side,
            mode,
            kind: OrderKind::Market,
            amount,
            limit_price: None,
            leverage: None,
            duration: None,
            stop_loss: None,
            take_profit: None,
        }
    }

    pub fn limit(
        asset_id: AssetId,
        side: Side,
        mode: TradeMode,
        amount: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            kind: OrderKind::Limit,
            limit_price: Some(price),
            ..Self::market(asset_id, side, mode, amount)
        }
    }

    pub fn with_leverage(mut self, leverage: u32) -> Self {
        self.leverage = Some(leverage);
        self
    }

    pub fn with_duration(mut self, duration: ContractDuration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_stop_loss(mut self, price: Decimal) -> Self {
        self.stop_loss = Some(price);
        self
    }

    pub fn with_take_profit(mut self, price: Decimal) -> Self {
        self.take_profit = Some(price);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn market_order_defaults() {
        let order = OrderRequest::market(AssetId(1), Side::Buy, TradeMode::Spot, dec!(10));
        assert_eq!(order.kind, OrderKind::Market);
        assert!(order.limit_price.is_none());
        assert!(order.leverage.is_none());
    }

    #[test]
    fn limit_order_carries_price() {
        let order = OrderRequest::limit(AssetId(1), Side::Sell, TradeMode::Futures, dec!(2), dec!(50000))
            .with_leverage(10)
            .with_stop_loss(dec!(52000));
        assert_eq!(order.kind, OrderKind::Limit);
        assert_eq!(order.limit_price, Some(dec!(50000)));
        assert_eq!(order.leverage, Some(10));
        assert_eq!(order.stop_loss, Some(dec!(52000)));
    }

    #[test]
    fn contract_order_carries_duration() {
        let order = OrderRequest::market(AssetId(1), Side::Buy, TradeMode::Contract, dec!(100))
            .with_duration(ContractDuration::Secs60);
        assert_eq!(order.duration, Some(ContractDuration::Secs60));
    }
}
