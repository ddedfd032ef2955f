//! Trading Ledger Simulation.
//!
//! Demonstrates the full ledger lifecycle including spot round trips,
//! leveraged futures, timed contract settlement, and the per-account
//! commit protocol under concurrent orders.

use ledger_core::*;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("Trading Ledger Engine Simulation");
    println!("Spot, Futures, Timed Contracts, Atomic Accounts\n");

    scenario_1_spot_round_trip();
    scenario_2_leveraged_futures();
    scenario_3_contract_settlement();
    scenario_4_protective_triggers();
    scenario_5_concurrent_orders();

    println!("\nAll simulations completed successfully.");
}

const BTC: AssetId = AssetId(1);

fn new_ledger(policy: SettlementPolicy) -> (Arc<Ledger>, Arc<StaticOracle>) {
    let oracle = Arc::new(StaticOracle::new());
    let store = Arc::new(InMemoryStore::new());
    let ledger = Ledger::new(store, oracle.clone(), LedgerConfig::with_policy(policy));
    ledger.set_time(Timestamp::from_millis(0));
    (Arc::new(ledger), oracle)
}

/// Buy spot, watch the price move, sell at a profit.
fn scenario_1_spot_round_trip() {
    println!("Scenario 1: Spot Round Trip\n");

    let (ledger, oracle) = new_ledger(SettlementPolicy::Fair);
    oracle.set_price(BTC, Price::new_unchecked(dec!(50000)));

    let alice = ledger.create_account();
    ledger.deposit(alice, Quote::new(dec!(100000))).unwrap();
    println!("  Alice deposits $100,000, BTC at $50,000");

    let report = ledger
        .place_order(alice, OrderRequest::market(BTC, Side::Buy, TradeMode::Spot, dec!(1.5)))
        .unwrap();
    println!("  Alice buys 1.5 BTC, balance now ${}", report.balance_after);

    oracle.set_price(BTC, Price::new_unchecked(dec!(54000)));
    println!("  BTC rises to $54,000, equity ${}", ledger.equity(alice).unwrap());

    let report = ledger
        .place_order(alice, OrderRequest::market(BTC, Side::Sell, TradeMode::Spot, dec!(1.5)))
        .unwrap();
    println!(
        "  Alice sells 1.5 BTC, realized ${}, balance ${}\n",
        report.realized_pnl, report.balance_after
    );
}

/// Open a 10x long, ride a small move, close for a leveraged gain.
fn scenario_2_leveraged_futures() {
    println!("Scenario 2: Leveraged Futures\n");

    let (ledger, oracle) = new_ledger(SettlementPolicy::Fair);
    oracle.set_price(BTC, Price::new_unchecked(dec!(50000)));

    let bob = ledger.create_account();
    ledger.deposit(bob, Quote::new(dec!(10000))).unwrap();
    println!("  Bob deposits $10,000, BTC at $50,000");

    let report = ledger
        .place_order(
            bob,
            OrderRequest::market(BTC, Side::Buy, TradeMode::Futures, dec!(1)).with_leverage(10),
        )
        .unwrap();
    let position_id = report.position_id.unwrap();
    println!(
        "  Bob opens 1 BTC long at 10x, margin debited, balance ${}",
        report.balance_after
    );

    oracle.set_price(BTC, Price::new_unchecked(dec!(50500)));
    let report = ledger.close_position(bob, position_id).unwrap();
    println!(
        "  BTC at $50,500, Bob closes: realized ${} (1% move at 10x), balance ${}\n",
        report.realized_pnl, report.balance_after
    );
}

/// Timed contracts: a fair win and a fair loss, settled by the scheduler.
fn scenario_3_contract_settlement() {
    println!("Scenario 3: Timed Contract Settlement\n");

    let (ledger, oracle) = new_ledger(SettlementPolicy::Fair);
    oracle.set_price(BTC, Price::new_unchecked(dec!(50000)));

    let carol = ledger.create_account();
    ledger.deposit(carol, Quote::new(dec!(1000))).unwrap();
    println!("  Carol deposits $1,000, BTC at $50,000");

    ledger
        .place_order(
            carol,
            OrderRequest::market(BTC, Side::Buy, TradeMode::Contract, dec!(100))
                .with_duration(ContractDuration::Secs60),
        )
        .unwrap();
    println!("  Carol stakes $100 on a 60s up contract (25% payout)");

    // price at expiry decides the outcome
    oracle.record_at(BTC, Timestamp::from_millis(60_000), Price::new_unchecked(dec!(50200)));
    ledger.advance_time(60_000);
    let reports = ledger.poll_settlements();
    let settled = &reports[0];
    println!(
        "  60s later BTC is at $50,200: {:?}, payout ${}",
        settled.outcome, settled.payout
    );

    ledger
        .place_order(
            carol,
            OrderRequest::market(BTC, Side::Buy, TradeMode::Contract, dec!(100))
                .with_duration(ContractDuration::Secs30),
        )
        .unwrap();
    oracle.record_at(BTC, Timestamp::from_millis(90_000), Price::new_unchecked(dec!(49900)));
    ledger.advance_time(30_000);
    let reports = ledger.poll_settlements();
    println!(
        "  A second $100 stake expires under water: {:?}, payout ${}",
        reports[0].outcome, reports[0].payout
    );

    let stats = ledger.stats(carol).unwrap();
    println!(
        "  Carol: {} trades, win rate {}%, balance ${}\n",
        stats.total_trades,
        stats.win_rate_pct,
        ledger.snapshot(carol).unwrap().account.balance
    );
}

/// Stop-loss and take-profit closes driven by price moves.
fn scenario_4_protective_triggers() {
    println!("Scenario 4: Protective Triggers\n");

    let (ledger, oracle) = new_ledger(SettlementPolicy::Fair);
    oracle.set_price(BTC, Price::new_unchecked(dec!(50000)));

    let dave = ledger.create_account();
    ledger.deposit(dave, Quote::new(dec!(20000))).unwrap();

    ledger
        .place_order(
            dave,
            OrderRequest::market(BTC, Side::Buy, TradeMode::Futures, dec!(1))
                .with_leverage(5)
                .with_stop_loss(dec!(49000))
                .with_take_profit(dec!(52000)),
        )
        .unwrap();
    println!("  Dave opens 1 BTC long at 5x, stop $49,000 / take $52,000");

    oracle.set_price(BTC, Price::new_unchecked(dec!(52100)));
    let closed = ledger.check_protective_triggers(BTC).unwrap();
    println!(
        "  BTC spikes to $52,100: {} position(s) closed, realized ${}\n",
        closed.len(),
        closed[0].realized_pnl
    );
}

/// Two orders race for the same balance; exactly one wins.
fn scenario_5_concurrent_orders() {
    println!("Scenario 5: Concurrent Orders on One Account\n");

    let (ledger, oracle) = new_ledger(SettlementPolicy::Fair);
    oracle.set_price(BTC, Price::new_unchecked(dec!(50000)));

    let erin = ledger.create_account();
    ledger.deposit(erin, Quote::new(dec!(60000))).unwrap();
    println!("  Erin deposits $60,000; two $50,000 spot buys race");

    let mut handles = Vec::new();
    for _ in 0..2 {
        let ledger = Arc::clone(&ledger);
        handles.push(std::thread::spawn(move || {
            ledger.place_order(erin, OrderRequest::market(BTC, Side::Buy, TradeMode::Spot, dec!(1)))
        }));
    }
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results.iter().filter(|r| r.is_err()).count();
    println!("  Accepted: {accepted}, rejected: {rejected}");
    println!(
        "  Final balance ${} (never negative)\n",
        ledger.snapshot(erin).unwrap().account.balance
    );
}
