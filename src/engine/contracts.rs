// 9.3 engine/contracts.rs: settlement scheduler for timed contracts. each
// pending contract is resolved exactly once after its expiry. entries leave
// the registry before their commit is attempted and return to it only when
// resolution must be deferred (no settlement price, commit contention), so
// two concurrent polls can never settle the same contract twice. the
// account-level position check backstops that: a contract no longer in the
// open set is already terminal and settling it again is a no-op.

use super::core::Ledger;
use super::results::{LedgerError, SettlementReport};
use crate::config::SettlementPolicy;
use crate::events::{ContractSettledEvent, EventPayload};
use crate::position::{ClosedTrade, Outcome};
use crate::store::{AccountMutation, LedgerOp};
use crate::types::{AccountId, AssetId, PositionId, Price, Quote, Side, Timestamp};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub(super) struct PendingContract {
    pub account_id: AccountId,
    pub position_id: PositionId,
    pub asset_id: AssetId,
    pub side: Side,
    pub entry_price: Price,
    pub stake: Quote,
    pub payout_rate: Decimal,
    // Captured at open time. A config reload does not reach into here.
    pub policy: SettlementPolicy,
    pub expires_at: Timestamp,
}

// Resolution could not run this tick; keep the entry for the next one.
struct Deferred;

impl Ledger {
    pub(super) fn register_contract(&self, contract: PendingContract) {
        tracing::debug!(
            account = contract.account_id.0,
            position = contract.position_id.0,
            expires_at = contract.expires_at.as_millis(),
            "contract registered for settlement"
        );
        self.pending
            .lock()
            .insert((contract.expires_at, contract.position_id), contract);
    }

    /// Contracts still waiting for settlement.
    pub fn pending_settlements(&self) -> usize {
        self.pending.lock().len()
    }

    /// Settle every contract whose expiry has passed, at the engine clock.
    pub fn poll_settlements(&self) -> Vec<SettlementReport> {
        self.poll_settlements_at(self.time())
    }

    /// Settle every contract with `expires_at <= now`. Deferred contracts
    /// stay registered and are retried on the next poll; a contract never
    /// stays pending indefinitely while polls keep coming.
    pub fn poll_settlements_at(&self, now: Timestamp) -> Vec<SettlementReport> {
        let due: Vec<PendingContract> = {
            let mut pending = self.pending.lock();
            let later = pending.split_off(&(now.plus_millis(1), PositionId(0)));
            let due = std::mem::replace(&mut *pending, later);
            due.into_values().collect()
        };

        let mut reports = Vec::new();
        for contract in due {
            match self.settle_contract(&contract, now) {
                Ok(Some(report)) => reports.push(report),
                Ok(None) => {}
                Err(Deferred) => self.register_contract(contract),
            }
        }
        reports
    }

    // Ok(None) means the contract was already terminal: nothing to do.
    fn settle_contract(
        &self,
        contract: &PendingContract,
        now: Timestamp,
    ) -> Result<Option<SettlementReport>, Deferred> {
        // Resolve the outcome before touching any state. A missing
        // settlement price defers; it never resolves with a guessed one.
        let (outcome, settle_price) = match contract.policy {
            SettlementPolicy::AlwaysWin => (Outcome::Win, None),
            SettlementPolicy::AlwaysLoss => (Outcome::Loss, None),
            SettlementPolicy::Fair => {
                match self.oracle.price_at(contract.asset_id, contract.expires_at) {
                    Ok(price) => (
                        fair_outcome(contract.side, contract.entry_price, price),
                        Some(price),
                    ),
                    Err(e) => {
                        tracing::warn!(
                            position = contract.position_id.0,
                            error = %e,
                            "settlement price unavailable, deferring"
                        );
                        return Err(Deferred);
                    }
                }
            }
        };

        let payout = match outcome {
            Outcome::Win => contract.stake.mul(Decimal::ONE + contract.payout_rate),
            _ => Quote::zero(),
        };
        let realized = match outcome {
            Outcome::Win => contract.stake.mul(contract.payout_rate),
            _ => contract.stake.negate(),
        };

        let result = self.try_commit(contract.account_id, |account| {
            let position = account
                .position(contract.position_id)
                .ok_or(LedgerError::PositionNotFound(contract.position_id))?;

            let trade = ClosedTrade::from_position(position, settle_price, realized, outcome, now);
            let mut mutation = AccountMutation::new();
            if payout > Quote::zero() {
                mutation.ops.push(LedgerOp::Credit(payout));
            }
            mutation.ops.push(LedgerOp::RemovePosition(contract.position_id));
            mutation.ops.push(LedgerOp::AppendClosed(trade));
            Ok((mutation, ()))
        });

        match result {
            Ok(()) => {
                tracing::info!(
                    account = contract.account_id.0,
                    position = contract.position_id.0,
                    outcome = ?outcome,
                    payout = %payout,
                    "contract settled"
                );
                self.emit(EventPayload::ContractSettled(ContractSettledEvent {
                    account_id: contract.account_id,
                    position_id: contract.position_id,
                    asset_id: contract.asset_id,
                    outcome,
                    stake: contract.stake,
                    payout,
                    settled_at: now,
                }));
                Ok(Some(SettlementReport {
                    account_id: contract.account_id,
                    position_id: contract.position_id,
                    outcome,
                    payout,
                    settled_at: now,
                }))
            }
            // settled by an earlier poll already, or the account vanished:
            // the registry entry is simply dropped
            Err(LedgerError::PositionNotFound(_)) => Ok(None),
            Err(LedgerError::AccountNotFound(_)) => {
                tracing::error!(
                    account = contract.account_id.0,
                    position = contract.position_id.0,
                    "account missing at settlement, dropping contract"
                );
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(
                    position = contract.position_id.0,
                    error = %e,
                    "settlement commit failed, deferring"
                );
                Err(Deferred)
            }
        }
    }
}

// Price moved strictly in the order's favor: win. A tie is a loss.
fn fair_outcome(side: Side, entry: Price, settle: Price) -> Outcome {
    let moved = (settle.value() - entry.value()) * side.sign();
    if moved > Decimal::ZERO {
        Outcome::Win
    } else {
        Outcome::Loss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn price(value: Decimal) -> Price {
        Price::new_unchecked(value)
    }

    #[test]
    fn fair_outcome_buy_side() {
        assert_eq!(fair_outcome(Side::Buy, price(dec!(100)), price(dec!(101))), Outcome::Win);
        assert_eq!(fair_outcome(Side::Buy, price(dec!(100)), price(dec!(99))), Outcome::Loss);
    }

    #[test]
    fn fair_outcome_sell_side() {
        assert_eq!(fair_outcome(Side::Sell, price(dec!(100)), price(dec!(99))), Outcome::Win);
        assert_eq!(fair_outcome(Side::Sell, price(dec!(100)), price(dec!(101))), Outcome::Loss);
    }

    #[test]
    fn fair_outcome_tie_is_loss() {
        assert_eq!(fair_outcome(Side::Buy, price(dec!(100)), price(dec!(100))), Outcome::Loss);
        assert_eq!(fair_outcome(Side::Sell, price(dec!(100)), price(dec!(100))), Outcome::Loss);
    }
}
