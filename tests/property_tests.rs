//! Property-based tests for the ledger invariants.
//!
//! These tests verify that the balance can never go negative and that no
//! value is created or destroyed outside defined credit events, under
//! arbitrary interleavings of orders, closes, price moves and settlements.

use ledger_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

const BTC: AssetId = AssetId(1);

// Strategies for generating test data
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000i64).prop_map(|x| Decimal::new(x, 4)) // 0.0001 to 1.0
}

fn price_strategy() -> impl Strategy<Value = Decimal> {
    (100i64..10_000_000i64).prop_map(|x| Decimal::new(x, 2)) // $1 to $100,000
}

fn leverage_strategy() -> impl Strategy<Value = u32> {
    1u32..=100u32
}

#[derive(Debug, Clone)]
enum Op {
    SpotBuy(Decimal),
    SpotSell(Decimal),
    FuturesOpen { amount: Decimal, leverage: u32, sell: bool },
    ContractOpen { stake: Decimal, duration_idx: u8 },
    CloseNewest,
    MovePrice(i64),
    Advance(i64),
    Poll,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..200i64).prop_map(|a| Op::SpotBuy(Decimal::new(a, 2))),
        (1i64..200i64).prop_map(|a| Op::SpotSell(Decimal::new(a, 2))),
        ((1i64..100i64), leverage_strategy(), any::<bool>()).prop_map(|(a, l, s)| {
            Op::FuturesOpen {
                amount: Decimal::new(a, 3),
                leverage: l,
                sell: s,
            }
        }),
        ((1i64..500i64), (0u8..3u8)).prop_map(|(s, d)| Op::ContractOpen {
            stake: Decimal::new(s, 0),
            duration_idx: d,
        }),
        Just(Op::CloseNewest),
        (-2_000i64..=2_000i64).prop_map(Op::MovePrice),
        (1_000i64..40_000i64).prop_map(Op::Advance),
        Just(Op::Poll),
    ]
}

fn policy_strategy() -> impl Strategy<Value = SettlementPolicy> {
    prop_oneof![
        Just(SettlementPolicy::Fair),
        Just(SettlementPolicy::AlwaysWin),
        Just(SettlementPolicy::AlwaysLoss),
    ]
}

fn check_invariants(account: &Account) {
    // balance >= 0 for every reachable state
    assert!(
        !account.balance.is_negative(),
        "balance went negative: {}",
        account.balance
    );

    // conservation: cash on hand plus cash locked in open positions never
    // exceeds what deposits and credit events put in
    let held = account.balance.add(account.open_margin());
    let sourced = account.total_deposited.add(account.total_credited);
    assert!(
        held <= sourced,
        "value created from nothing: held {} > sourced {}",
        held,
        sourced
    );

    let stats = account_stats(account);
    assert!(stats.win_rate_pct >= dec!(0) && stats.win_rate_pct <= dec!(100));
    assert_eq!(stats.winning_trades + stats.losing_trades, stats.total_trades);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The two ledger invariants hold after every step of any op sequence.
    #[test]
    fn balance_and_conservation_invariants(
        ops in proptest::collection::vec(op_strategy(), 1..40),
        policy in policy_strategy(),
    ) {
        let oracle = Arc::new(StaticOracle::new());
        let store = Arc::new(InMemoryStore::new());
        let ledger = Ledger::new(store, oracle.clone(), LedgerConfig::with_policy(policy));
        ledger.set_time(Timestamp::from_millis(0));

        let mut price = dec!(50000);
        oracle.set_price(BTC, Price::new_unchecked(price));
        oracle.record_at(BTC, Timestamp::from_millis(0), Price::new_unchecked(price));

        let account_id = ledger.create_account();
        ledger.deposit(account_id, Quote::new(dec!(10_000))).unwrap();

        for op in ops {
            match op {
                Op::SpotBuy(amount) => {
                    let _ = ledger.place_order(
                        account_id,
                        OrderRequest::market(BTC, Side::Buy, TradeMode::Spot, amount),
                    );
                }
                Op::SpotSell(amount) => {
                    let _ = ledger.place_order(
                        account_id,
                        OrderRequest::market(BTC, Side::Sell, TradeMode::Spot, amount),
                    );
                }
                Op::FuturesOpen { amount, leverage, sell } => {
                    let side = if sell { Side::Sell } else { Side::Buy };
                    let _ = ledger.place_order(
                        account_id,
                        OrderRequest::market(BTC, side, TradeMode::Futures, amount)
                            .with_leverage(leverage),
                    );
                }
                Op::ContractOpen { stake, duration_idx } => {
                    let duration = ContractDuration::ALL[duration_idx as usize];
                    let _ = ledger.place_order(
                        account_id,
                        OrderRequest::market(BTC, Side::Buy, TradeMode::Contract, stake)
                            .with_duration(duration),
                    );
                }
                Op::CloseNewest => {
                    let snapshot = ledger.snapshot(account_id).unwrap();
                    let newest = snapshot
                        .account
                        .positions
                        .values()
                        .filter(|p| !p.is_contract())
                        .map(|p| p.id)
                        .max();
                    if let Some(id) = newest {
                        let _ = ledger.close_position(account_id, id);
                    }
                }
                Op::MovePrice(delta) => {
                    price = (price + Decimal::new(delta, 2)).max(dec!(1));
                    oracle.set_price(BTC, Price::new_unchecked(price));
                    oracle.record_at(BTC, ledger.time(), Price::new_unchecked(price));
                }
                Op::Advance(millis) => {
                    ledger.advance_time(millis);
                    oracle.record_at(BTC, ledger.time(), Price::new_unchecked(price));
                }
                Op::Poll => {
                    ledger.poll_settlements();
                }
            }

            let snapshot = ledger.snapshot(account_id).unwrap();
            check_invariants(&snapshot.account);
        }

        // settle whatever is still pending and check the final state
        ledger.advance_time(200_000);
        oracle.record_at(BTC, ledger.time(), Price::new_unchecked(price));
        ledger.poll_settlements();
        prop_assert_eq!(ledger.pending_settlements(), 0);

        let snapshot = ledger.snapshot(account_id).unwrap();
        check_invariants(&snapshot.account);
    }

    /// An order whose cost equals the balance exactly is admissible; any
    /// more is rejected with InsufficientBalance.
    #[test]
    fn buying_power_boundary(
        amount in amount_strategy(),
        price in price_strategy(),
    ) {
        let oracle = Arc::new(StaticOracle::new());
        let store = Arc::new(InMemoryStore::new());
        let ledger = Ledger::new(store, oracle.clone(), LedgerConfig::default());
        ledger.set_time(Timestamp::from_millis(0));
        oracle.set_price(BTC, Price::new_unchecked(price));

        // fund with the exact cost of the order
        let exact = ledger.create_account();
        ledger.deposit(exact, Quote::new(amount * price)).unwrap();
        let result = ledger.place_order(
            exact,
            OrderRequest::market(BTC, Side::Buy, TradeMode::Spot, amount),
        );
        prop_assert!(result.is_ok(), "exact buying power must be admissible");
        let balance = ledger.snapshot(exact).unwrap().account.balance;
        prop_assert_eq!(balance.value(), Decimal::ZERO);

        // a hair less funding is rejected before any state change
        let short = ledger.create_account();
        ledger.deposit(short, Quote::new(amount * price - dec!(0.0001))).unwrap();
        let result = ledger.place_order(
            short,
            OrderRequest::market(BTC, Side::Buy, TradeMode::Spot, amount),
        );
        prop_assert!(matches!(
            result,
            Err(LedgerError::Rejected(RejectReason::InsufficientBalance))
        ));
        let snapshot = ledger.snapshot(short).unwrap();
        prop_assert!(snapshot.account.positions.is_empty());
    }

    /// Unrealized pnl is zero at the entry price and its sign follows the
    /// side and the direction of the move.
    #[test]
    fn pnl_sign_matches_side(
        amount in amount_strategy(),
        entry in price_strategy(),
        delta in -50_000i64..=50_000i64,
        leverage in leverage_strategy(),
    ) {
        let entry_price = Price::new_unchecked(entry);
        let lev = Leverage::new(leverage).unwrap();
        let mark_val = entry + Decimal::new(delta, 2);
        prop_assume!(mark_val > Decimal::ZERO);
        let mark = Price::new_unchecked(mark_val);

        let long = calculate_unrealized_pnl(Side::Buy, entry_price, mark, amount, lev);
        let short = calculate_unrealized_pnl(Side::Sell, entry_price, mark, amount, lev);

        if mark_val > entry {
            prop_assert!(long.value() > Decimal::ZERO);
            prop_assert!(short.value() < Decimal::ZERO);
        } else if mark_val < entry {
            prop_assert!(long.value() < Decimal::ZERO);
            prop_assert!(short.value() > Decimal::ZERO);
        } else {
            prop_assert_eq!(long.value(), Decimal::ZERO);
            prop_assert_eq!(short.value(), Decimal::ZERO);
        }

        // long and short mirror each other
        prop_assert_eq!(long.value(), -short.value());
    }

    /// Leverage scales pnl linearly.
    #[test]
    fn pnl_scales_with_leverage(
        amount in amount_strategy(),
        entry in price_strategy(),
        delta in 1i64..=10_000i64,
        leverage in 2u32..=100u32,
    ) {
        let entry_price = Price::new_unchecked(entry);
        let mark = Price::new_unchecked(entry + Decimal::new(delta, 2));

        let base = calculate_unrealized_pnl(Side::Buy, entry_price, mark, amount, Leverage::ONE);
        let levered = calculate_unrealized_pnl(
            Side::Buy,
            entry_price,
            mark,
            amount,
            Leverage::new(leverage).unwrap(),
        );

        prop_assert_eq!(levered.value(), base.value() * Decimal::from(leverage));
    }

    /// Win rate is always a percentage and never NaN, whatever the log.
    #[test]
    fn win_rate_is_always_defined(outcomes in proptest::collection::vec(any::<bool>(), 0..50)) {
        let mut account = Account::new(AccountId(1), Timestamp::from_millis(0));
        for (i, win) in outcomes.iter().enumerate() {
            let position = Position {
                id: PositionId(i as u64 + 1),
                asset_id: BTC,
                side: Side::Buy,
                mode: TradeMode::Contract,
                entry_price: Price::new_unchecked(dec!(50000)),
                amount: dec!(100),
                leverage: Leverage::ONE,
                margin: Quote::new(dec!(100)),
                stop_loss: None,
                take_profit: None,
                contract: None,
                opened_at: Timestamp::from_millis(0),
            };
            let (outcome, pnl) = if *win {
                (Outcome::Win, Quote::new(dec!(25)))
            } else {
                (Outcome::Loss, Quote::new(dec!(-100)))
            };
            account.record_closed(ClosedTrade::from_position(
                &position,
                None,
                pnl,
                outcome,
                Timestamp::from_millis(1),
            ));
        }

        let stats = account_stats(&account);
        let wins = outcomes.iter().filter(|w| **w).count();
        prop_assert_eq!(stats.total_trades, outcomes.len());
        prop_assert_eq!(stats.winning_trades, wins);
        prop_assert!(stats.win_rate_pct >= dec!(0) && stats.win_rate_pct <= dec!(100));
        if outcomes.is_empty() {
            prop_assert_eq!(stats.win_rate_pct, dec!(0));
        }
    }
}
