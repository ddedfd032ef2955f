// 8.0: every state change produces an event for external observers. delivery
// is fire-and-forget: a sink that fails or panics never rolls back or blocks
// the ledger mutation that produced the event. the EventPayload enum lists
// all event types.

use crate::position::Outcome;
use crate::types::{AccountId, AssetId, PositionId, Price, Quote, Side, Timestamp, TradeMode};
use crate::validator::RejectReason;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Order events
    OrderPlaced(OrderPlacedEvent),
    OrderRejected(OrderRejectedEvent),

    // Position events
    PositionOpened(PositionOpenedEvent),
    PositionClosed(PositionClosedEvent),

    // Contract events
    ContractSettled(ContractSettledEvent),

    // Account events
    Deposit(DepositEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedEvent {
    pub account_id: AccountId,
    pub asset_id: AssetId,
    pub side: Side,
    pub mode: TradeMode,
    pub amount: rust_decimal::Decimal,
    pub price: Price,
    pub position_id: Option<PositionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRejectedEvent {
    pub account_id: AccountId,
    pub asset_id: AssetId,
    pub mode: TradeMode,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionOpenedEvent {
    pub account_id: AccountId,
    pub position_id: PositionId,
    pub asset_id: AssetId,
    pub side: Side,
    pub mode: TradeMode,
    pub amount: rust_decimal::Decimal,
    pub entry_price: Price,
    pub margin: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    pub account_id: AccountId,
    pub position_id: PositionId,
    pub asset_id: AssetId,
    pub exit_price: Price,
    pub realized_pnl: Quote,
    pub close_reason: CloseReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    UserClosed,
    SpotSell,
    StopLoss,
    TakeProfit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractSettledEvent {
    pub account_id: AccountId,
    pub position_id: PositionId,
    pub asset_id: AssetId,
    pub outcome: Outcome,
    pub stake: Quote,
    pub payout: Quote,
    pub settled_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositEvent {
    pub account_id: AccountId,
    pub amount: Quote,
    pub new_balance: Quote,
}

/// External notification sink. Implementations must tolerate being called
/// from multiple threads; the ledger ignores anything they do wrong.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, event: &Event);
}

/// Sink that drops everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn deliver(&self, _event: &Event) {}
}

/// Collecting sink for tests and audit trails.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Mutex<Vec<Event>>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }
}

impl NotificationSink for EventCollector {
    fn deliver(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}
