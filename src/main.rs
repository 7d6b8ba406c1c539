//! Paper-trading engine simulation.
//!
//! Runs the engine against an in-memory store and a scripted price feed:
//! opens, merges, flips, resting limit orders, and a liquidation picked up by
//! the background scanner.

use anyhow::Context;
use papertrade_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "papertrade_core=info,papertrade_sim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env();
    config.validate().context("invalid engine configuration")?;
    info!(
        taker = %config.fees.taker_fee_rate,
        maker = %config.fees.maker_fee_rate,
        "starting paper-trading simulation"
    );

    scenario_1_open_and_mark(&config).await?;
    scenario_2_merge_and_flip(&config).await?;
    scenario_3_limit_orders(&config).await?;
    scenario_4_scanner_liquidation(&config).await?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn px(value: Decimal) -> Price {
    Price::new_unchecked(value)
}

fn engine_with(config: &EngineConfig, feed: Arc<MockPriceFeed>) -> TradingEngine {
    TradingEngine::new(config.clone(), Arc::new(MemoryStore::new()), feed)
}

async fn print_snapshot(engine: &TradingEngine, account: AccountId) -> anyhow::Result<()> {
    let snap = engine.latest_snapshot(account).await?;
    println!(
        "  cash {} | equity {} | available {} | margin {} | upnl {}",
        snap.cash_balance, snap.total_equity, snap.available_balance, snap.margin_used, snap.unrealized_pnl
    );
    for view in &snap.positions {
        let p = &view.position;
        println!(
            "    {} {} {} @ {} ({}) liq {} roe {}%",
            p.symbol,
            p.side,
            p.size,
            p.entry_price,
            p.leverage,
            p.liquidation_price,
            view.roe.round_dp(2)
        );
    }
    Ok(())
}

/// Market open at 10x, then mark the position to a higher price.
async fn scenario_1_open_and_mark(config: &EngineConfig) -> anyhow::Result<()> {
    println!("Scenario 1: Open and Mark\n");

    let feed = Arc::new(MockPriceFeed::new("sim").with_price("BTC", px(dec!(50000))));
    let engine = engine_with(config, feed.clone());
    let alice = engine.open_account(Quote::new(dec!(10000))).await?.id;

    engine
        .place_order(alice, OrderRequest::market("BTC", Side::Long, dec!(1), dec!(10)))
        .await?;
    println!("  Alice buys 1 BTC @ 50,000 at 10x");
    print_snapshot(&engine, alice).await?;

    feed.set_price("BTC", px(dec!(52000)));
    engine.current_price(&Symbol::new("BTC")).await?;
    println!("  BTC moves to 52,000");
    print_snapshot(&engine, alice).await?;

    let trade = engine.close_position(alice, &Symbol::new("BTC"), Decimal::ONE).await?;
    println!("  Alice closes: pnl {} fee {}\n", trade.pnl, trade.fee);
    print_snapshot(&engine, alice).await?;
    println!();
    Ok(())
}

/// Same-side add averages the entry; an oversized opposite order flips.
async fn scenario_2_merge_and_flip(config: &EngineConfig) -> anyhow::Result<()> {
    println!("Scenario 2: Merge and Flip\n");

    let feed = Arc::new(MockPriceFeed::new("sim").with_price("SOL", px(dec!(100))));
    let engine = engine_with(config, feed.clone());
    let bob = engine.open_account(Quote::new(dec!(5000))).await?.id;

    engine
        .place_order(bob, OrderRequest::market("SOL", Side::Long, dec!(1), dec!(5)))
        .await?;
    feed.set_price("SOL", px(dec!(120)));
    engine
        .place_order(bob, OrderRequest::market("SOL", Side::Long, dec!(1), dec!(5)))
        .await?;
    println!("  Bob buys 1 SOL @ 100, then 1 SOL @ 120");
    print_snapshot(&engine, bob).await?;

    let placement = engine
        .place_order(bob, OrderRequest::market("SOL", Side::Short, dec!(5), dec!(5)))
        .await?;
    if let Some(exec) = placement.execution() {
        println!("  Bob sells 5 SOL @ 120: {} (fee {})", exec.change.label(), exec.fee);
    }
    print_snapshot(&engine, bob).await?;

    for trade in engine.trade_history(bob).await? {
        println!("    closed {} {} {} pnl {}", trade.symbol, trade.side, trade.size, trade.pnl);
    }
    println!();
    Ok(())
}

/// A resting buy limit fills when the scanner sees the price reach it.
async fn scenario_3_limit_orders(config: &EngineConfig) -> anyhow::Result<()> {
    println!("Scenario 3: Limit Orders\n");

    let feed = Arc::new(MockPriceFeed::new("sim").with_price("ETH", px(dec!(3000))));
    let engine = engine_with(config, feed.clone());
    let carol = engine.open_account(Quote::new(dec!(2000))).await?.id;

    let buy = engine
        .place_order(carol, OrderRequest::limit("ETH", Side::Long, dec!(1), dec!(5), px(dec!(2900))))
        .await?;
    let sell = engine
        .place_order(carol, OrderRequest::limit("ETH", Side::Short, dec!(1), dec!(5), px(dec!(3500))))
        .await?;
    println!("  Carol rests BUY 1 ETH @ 2900 and SELL 1 ETH @ 3500");
    print_snapshot(&engine, carol).await?;

    if let Some(order) = sell.resting_order() {
        engine.cancel_order(carol, order.id).await?;
        println!("  Carol cancels the sell");
    }

    feed.set_price("ETH", px(dec!(2890)));
    let report = engine.scan_once().await?;
    println!("  ETH trades 2890, scanner filled {} order(s)", report.orders_filled.len());
    if let Some(order) = buy.resting_order() {
        if let Some(stored) = engine.store().get_order(order.id).await? {
            println!("  buy order is {} with fee {}", stored.status, stored.fee);
        }
    }
    print_snapshot(&engine, carol).await?;
    println!();
    Ok(())
}

/// The background scanner liquidates a 10x long once price crosses 90.5.
async fn scenario_4_scanner_liquidation(config: &EngineConfig) -> anyhow::Result<()> {
    println!("Scenario 4: Scanner Liquidation\n");

    let mut config = config.clone();
    config.scanner.scan_interval_ms = 50;

    let feed = Arc::new(MockPriceFeed::new("sim").with_price("XRP", px(dec!(100))));
    let engine = Arc::new(engine_with(&config, feed.clone()));
    let dave = engine.open_account(Quote::new(dec!(1000))).await?.id;

    engine
        .place_order(dave, OrderRequest::market("XRP", Side::Long, dec!(10), dec!(10)))
        .await?;
    println!("  Dave buys 10 XRP @ 100 at 10x, liquidation at 90.5");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scanner = Arc::clone(&engine).spawn_scanner(shutdown_rx);

    feed.set_price("XRP", px(dec!(90)));
    println!("  XRP drops to 90");
    tokio::time::sleep(Duration::from_millis(200)).await;

    shutdown_tx.send(true).context("scanner already stopped")?;
    scanner.await.context("scanner task panicked")?;

    let history = engine.trade_history(dave).await?;
    for trade in &history {
        println!(
            "  closed {} {} liquidated={} exit {} pnl {}",
            trade.symbol, trade.size, trade.liquidated, trade.exit_price, trade.pnl
        );
    }
    print_snapshot(&engine, dave).await?;
    Ok(())
}
