//! Order execution and position closes.
//!
//! The flow for every mutation: capture a point-in-time price, load a
//! snapshot, validate against it, build an atomic delta, commit. A stale
//! snapshot re-runs the whole cycle, so the validation that admits an order
//! always saw the balance it commits over.

use super::contracts::PendingContract;
use super::core::Ledger;
use super::results::{ExecutionReport, LedgerError};
use crate::events::{
    CloseReason, EventPayload, OrderPlacedEvent, OrderRejectedEvent, PositionClosedEvent,
    PositionOpenedEvent,
};
use crate::order::OrderRequest;
use crate::position::{
    close_proceeds, reduce_spot_position, ClosedTrade, ContractTerms, Outcome, Position,
};
use crate::store::{AccountMutation, LedgerOp};
use crate::types::{AccountId, AssetId, PositionId, Price, Quote, Side, Timestamp, TradeMode};
use crate::validator::{validate, AdmissibleOrder, RejectReason};
use rust_decimal::Decimal;

impl Ledger {
    /// Place an order. Validation failures are terminal and reported
    /// verbatim; commit races retry internally with a fresh snapshot.
    pub fn place_order(
        &self,
        account_id: AccountId,
        order: OrderRequest,
    ) -> Result<ExecutionReport, LedgerError> {
        let now = self.time();
        let current_price = self.oracle.current_price(order.asset_id)?;

        let result = if order.mode == TradeMode::Spot && order.side == Side::Sell {
            self.execute_spot_sell(account_id, &order, current_price, now)
        } else if order.mode == TradeMode::Contract {
            self.execute_contract_open(account_id, &order, current_price, now)
        } else {
            self.execute_open(account_id, &order, current_price, now)
        };

        match &result {
            Ok(report) => {
                tracing::info!(
                    account = account_id.0,
                    asset = order.asset_id.0,
                    mode = ?order.mode,
                    price = %report.effective_price,
                    "order placed"
                );
                self.emit(EventPayload::OrderPlaced(OrderPlacedEvent {
                    account_id,
                    asset_id: order.asset_id,
                    side: order.side,
                    mode: order.mode,
                    amount: order.amount,
                    price: report.effective_price,
                    position_id: report.position_id,
                }));
            }
            Err(LedgerError::Rejected(reason)) => {
                tracing::debug!(
                    account = account_id.0,
                    asset = order.asset_id.0,
                    reason = %reason,
                    "order rejected"
                );
                self.emit(EventPayload::OrderRejected(OrderRejectedEvent {
                    account_id,
                    asset_id: order.asset_id,
                    mode: order.mode,
                    reason: *reason,
                }));
            }
            Err(_) => {}
        }

        result
    }

    // Spot buys and futures opens: debit the cash requirement, open the
    // position.
    fn execute_open(
        &self,
        account_id: AccountId,
        order: &OrderRequest,
        current_price: Price,
        now: Timestamp,
    ) -> Result<ExecutionReport, LedgerError> {
        let position_id = self.next_position_id();

        let (position, balance_after) = self.try_commit(account_id, |account| {
            let admitted = validate(account, order, current_price)?;
            let position = open_position_record(position_id, &admitted, None, now);
            let mutation = AccountMutation::new()
                .push(LedgerOp::Debit(admitted.cash_debit))
                .push(LedgerOp::OpenPosition(position.clone()));
            let balance_after = account.balance.sub(admitted.cash_debit);
            Ok((mutation, (position, balance_after)))
        })?;

        self.emit(EventPayload::PositionOpened(PositionOpenedEvent {
            account_id,
            position_id,
            asset_id: position.asset_id,
            side: position.side,
            mode: position.mode,
            amount: position.amount,
            entry_price: position.entry_price,
            margin: position.margin,
        }));

        Ok(ExecutionReport {
            position_id: Some(position_id),
            closed: Vec::new(),
            effective_price: position.entry_price,
            realized_pnl: Quote::zero(),
            balance_after,
        })
    }

    // Contract opens: debit the stake, open a pending position whose payout
    // rate and settlement policy are captured from the config in force right
    // now, and hand the position to the scheduler.
    fn execute_contract_open(
        &self,
        account_id: AccountId,
        order: &OrderRequest,
        current_price: Price,
        now: Timestamp,
    ) -> Result<ExecutionReport, LedgerError> {
        let position_id = self.next_position_id();

        let (position, terms, policy, balance_after) = self.try_commit(account_id, |account| {
            let admitted = validate(account, order, current_price)?;
            let duration = admitted.request.duration.expect("validated contract order");

            // capture the payout rate and policy in force right now; a later
            // config reload must not touch this contract
            let (payout_rate, policy) = {
                let config = self.config.read();
                let rate = config.payouts.rate(duration).ok_or_else(|| {
                    LedgerError::ExecutionFailure(format!(
                        "no payout rate configured for {duration}"
                    ))
                })?;
                (rate, config.policy)
            };

            let terms = ContractTerms {
                duration,
                payout_rate,
                expires_at: now.plus_duration(duration),
            };
            let position = open_position_record(position_id, &admitted, Some(terms), now);
            let mutation = AccountMutation::new()
                .push(LedgerOp::Debit(admitted.cash_debit))
                .push(LedgerOp::OpenPosition(position.clone()));
            let balance_after = account.balance.sub(admitted.cash_debit);
            Ok((mutation, (position, terms, policy, balance_after)))
        })?;

        self.register_contract(PendingContract {
            account_id,
            position_id,
            asset_id: position.asset_id,
            side: position.side,
            entry_price: position.entry_price,
            stake: position.margin,
            payout_rate: terms.payout_rate,
            policy,
            expires_at: terms.expires_at,
        });

        self.emit(EventPayload::PositionOpened(PositionOpenedEvent {
            account_id,
            position_id,
            asset_id: position.asset_id,
            side: position.side,
            mode: position.mode,
            amount: position.amount,
            entry_price: position.entry_price,
            margin: position.margin,
        }));

        Ok(ExecutionReport {
            position_id: Some(position_id),
            closed: Vec::new(),
            effective_price: position.entry_price,
            realized_pnl: Quote::zero(),
            balance_after,
        })
    }

    // Spot sells: credit the proceeds and consume open spot positions for
    // the asset oldest-first. Each consumed chunk lands in the closed log.
    fn execute_spot_sell(
        &self,
        account_id: AccountId,
        order: &OrderRequest,
        current_price: Price,
        now: Timestamp,
    ) -> Result<ExecutionReport, LedgerError> {
        let (admitted, closed_ids, realized, credit, balance_after) =
            self.try_commit(account_id, |account| {
                let admitted: AdmissibleOrder = validate(account, order, current_price)?;
                let exit = admitted.effective_price;

                let mut mutation = AccountMutation::new();
                let mut remaining = order.amount;
                let mut closed_ids = Vec::new();
                let mut realized = Quote::zero();
                let mut credit = Quote::zero();

                for id in account.spot_position_ids_fifo(order.asset_id) {
                    if remaining <= Decimal::ZERO {
                        break;
                    }
                    let position = account.position(id).expect("listed id is open");
                    let reduction = reduce_spot_position(position, remaining, exit);
                    remaining -= reduction.closed_amount;
                    realized = realized.add(reduction.realized_pnl);
                    credit = credit.add(reduction.credit);

                    let mut chunk = position.clone();
                    chunk.amount = reduction.closed_amount;
                    let trade = ClosedTrade::from_position(
                        &chunk,
                        Some(exit),
                        reduction.realized_pnl,
                        Outcome::Closed,
                        now,
                    );

                    match reduction.remaining {
                        Some(rest) => mutation.ops.push(LedgerOp::UpdatePosition(rest)),
                        None => {
                            mutation.ops.push(LedgerOp::RemovePosition(id));
                            closed_ids.push(id);
                        }
                    }
                    mutation.ops.push(LedgerOp::AppendClosed(trade));
                }

                mutation.ops.push(LedgerOp::Credit(credit));
                let balance_after = account.balance.add(credit);
                Ok((mutation, (admitted, closed_ids, realized, credit, balance_after)))
            })?;

        for position_id in &closed_ids {
            self.emit(EventPayload::PositionClosed(PositionClosedEvent {
                account_id,
                position_id: *position_id,
                asset_id: order.asset_id,
                exit_price: admitted.effective_price,
                realized_pnl: realized,
                close_reason: CloseReason::SpotSell,
            }));
        }

        tracing::debug!(
            account = account_id.0,
            credited = %credit,
            "spot sell settled"
        );

        Ok(ExecutionReport {
            position_id: None,
            closed: closed_ids,
            effective_price: admitted.effective_price,
            realized_pnl: realized,
            balance_after,
        })
    }

    /// Close an open spot or futures position at the current market price.
    /// Contracts are not user-closable: before expiry the request is
    /// rejected, after expiry the scheduler owns the position exclusively.
    pub fn close_position(
        &self,
        account_id: AccountId,
        position_id: PositionId,
    ) -> Result<ExecutionReport, LedgerError> {
        let now = self.time();
        let snapshot = self.snapshot(account_id)?;
        let position = snapshot
            .account
            .position(position_id)
            .ok_or(LedgerError::PositionNotFound(position_id))?;

        reject_contract_close(position, now)?;

        let exit = self.oracle.current_price(position.asset_id)?;
        self.close_open_position(account_id, position_id, exit, CloseReason::UserClosed, now)
    }

    /// Close every open spot/futures position on the asset whose stop-loss
    /// or take-profit threshold is crossed at the current price. Runs on
    /// scheduler ticks and on demand.
    pub fn check_protective_triggers(
        &self,
        asset_id: AssetId,
    ) -> Result<Vec<ExecutionReport>, LedgerError> {
        let price = self.oracle.current_price(asset_id)?;
        let now = self.time();
        let mut reports = Vec::new();

        for account_id in self.store.accounts() {
            let Ok(snapshot) = self.store.load(account_id) else {
                continue;
            };
            let triggered: Vec<(PositionId, CloseReason)> = snapshot
                .account
                .positions
                .values()
                .filter(|p| p.asset_id == asset_id && !p.is_contract())
                .filter_map(|p| trigger_reason(p, price).map(|r| (p.id, r)))
                .collect();

            for (position_id, reason) in triggered {
                match self.close_open_position(account_id, position_id, price, reason, now) {
                    Ok(report) => reports.push(report),
                    // a concurrent close got there first; nothing to do
                    Err(LedgerError::PositionNotFound(_)) => {}
                    Err(e) => {
                        tracing::warn!(
                            account = account_id.0,
                            position = position_id.0,
                            error = %e,
                            "protective close failed"
                        );
                    }
                }
            }
        }

        Ok(reports)
    }

    fn close_open_position(
        &self,
        account_id: AccountId,
        position_id: PositionId,
        exit: Price,
        reason: CloseReason,
        now: Timestamp,
    ) -> Result<ExecutionReport, LedgerError> {
        let (asset_id, realized, balance_after) = self.try_commit(account_id, |account| {
            let position = account
                .position(position_id)
                .ok_or(LedgerError::PositionNotFound(position_id))?;
            reject_contract_close(position, now)?;

            let proceeds = close_proceeds(position, exit);
            let trade = ClosedTrade::from_position(
                position,
                Some(exit),
                proceeds.realized_pnl,
                Outcome::Closed,
                now,
            );
            let mutation = AccountMutation::new()
                .push(LedgerOp::Credit(proceeds.credit))
                .push(LedgerOp::RemovePosition(position_id))
                .push(LedgerOp::AppendClosed(trade));
            let balance_after = account.balance.add(proceeds.credit);
            Ok((mutation, (position.asset_id, proceeds.realized_pnl, balance_after)))
        })?;

        self.emit(EventPayload::PositionClosed(PositionClosedEvent {
            account_id,
            position_id,
            asset_id,
            exit_price: exit,
            realized_pnl: realized,
            close_reason: reason,
        }));

        Ok(ExecutionReport {
            position_id: None,
            closed: vec![position_id],
            effective_price: exit,
            realized_pnl: realized,
            balance_after,
        })
    }
}

fn reject_contract_close(position: &Position, now: Timestamp) -> Result<(), LedgerError> {
    if position.is_contract() {
        if position.is_expired(now) {
            return Err(LedgerError::PositionExpired(position.id));
        }
        return Err(LedgerError::Rejected(RejectReason::InvalidParameters));
    }
    Ok(())
}

fn open_position_record(
    position_id: PositionId,
    admitted: &AdmissibleOrder,
    contract: Option<ContractTerms>,
    now: Timestamp,
) -> Position {
    let request = &admitted.request;
    Position {
        id: position_id,
        asset_id: request.asset_id,
        side: request.side,
        mode: request.mode,
        entry_price: admitted.effective_price,
        amount: request.amount,
        leverage: admitted.leverage,
        margin: admitted.cash_debit,
        stop_loss: request.stop_loss.and_then(Price::new),
        take_profit: request.take_profit.and_then(Price::new),
        contract,
        opened_at: now,
    }
}

// Stop-loss fires when the price moves against the position, take-profit
// when it moves in favor. Stop-loss wins if both are crossed in one tick.
fn trigger_reason(position: &Position, price: Price) -> Option<CloseReason> {
    if let Some(stop) = position.stop_loss {
        let crossed = match position.side {
            Side::Buy => price <= stop,
            Side::Sell => price >= stop,
        };
        if crossed {
            return Some(CloseReason::StopLoss);
        }
    }
    if let Some(take) = position.take_profit {
        let crossed = match position.side {
            Side::Buy => price >= take,
            Side::Sell => price <= take,
        };
        if crossed {
            return Some(CloseReason::TakeProfit);
        }
    }
    None
}
