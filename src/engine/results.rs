// 9.0.2: result types and errors for ledger operations.

use crate::oracle::OracleError;
use crate::position::Outcome;
use crate::types::{AccountId, PositionId, Price, Quote, Timestamp};
use crate::validator::RejectReason;

// Outcome of a successful order placement or close.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    // Position opened by this order, if one was opened.
    pub position_id: Option<PositionId>,
    // Positions fully removed from the open set by this order.
    pub closed: Vec<PositionId>,
    pub effective_price: Price,
    pub realized_pnl: Quote,
    pub balance_after: Quote,
}

// One settled contract from a scheduler tick.
#[derive(Debug, Clone)]
pub struct SettlementReport {
    pub account_id: AccountId,
    pub position_id: PositionId,
    pub outcome: Outcome,
    // Amount credited back to the balance: stake * (1 + payout rate) on a
    // win, zero on a loss.
    pub payout: Quote,
    pub settled_at: Timestamp,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("order rejected: {0}")]
    Rejected(#[from] RejectReason),

    #[error("price unavailable: {0}")]
    PriceUnavailable(#[from] OracleError),

    #[error("account {0:?} not found")]
    AccountNotFound(AccountId),

    #[error("position {0:?} not found")]
    PositionNotFound(PositionId),

    #[error("position {0:?} is past expiry and owned by settlement")]
    PositionExpired(PositionId),

    #[error("execution failure: {0}")]
    ExecutionFailure(String),
}
