// 8.5 engine/scanner.rs: background pass over open positions and resting orders.
// liquidations first, then limit fills oldest first. a failure on one position or
// order is logged and counted; it is looked at again on the next pass.

use super::core::TradingEngine;
use super::orders::FillOutcome;
use super::results::{EngineError, LiquidationResult, ScanReport};
use crate::executor::liquidate;
use crate::position::Position;
use crate::price_feed::PriceQuote;
use crate::types::{AccountId, PositionId, Price, Symbol, Timestamp};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

impl TradingEngine {
    pub async fn scan_once(&self) -> Result<ScanReport, EngineError> {
        let positions = self.store.list_open_positions().await?;
        let mut orders = self.store.list_pending_orders().await?;
        let mut report = ScanReport::default();

        let symbols: BTreeSet<Symbol> = positions
            .iter()
            .map(|p| p.symbol.clone())
            .chain(orders.iter().map(|o| o.symbol.clone()))
            .collect();

        let now = Timestamp::now();
        let mut prices: HashMap<Symbol, PriceQuote> = HashMap::new();
        for symbol in symbols {
            match self.resolve_price(&symbol, now).await {
                Some(quote) => {
                    prices.insert(symbol, quote);
                }
                None => report.symbols_skipped.push(symbol),
            }
        }

        for position in &positions {
            let Some(quote) = prices.get(&position.symbol) else {
                continue;
            };
            report.positions_checked += 1;
            if !position.is_liquidatable_at(quote.price) {
                continue;
            }

            match self.liquidate_position(position, quote.price).await {
                Ok(Some(result)) => report.liquidations.push(result),
                Ok(None) => {}
                Err(err) => {
                    report.failures += 1;
                    warn!(account = %position.account_id, position = %position.id, error = %err, "liquidation failed");
                }
            }
        }

        // stable: equal timestamps keep store order
        orders.sort_by_key(|o| o.created_at);
        for order in &orders {
            let Some(quote) = prices.get(&order.symbol) else {
                continue;
            };
            report.orders_checked += 1;
            if !order.is_triggered_by(quote.price) {
                continue;
            }

            match self.fill_order(order.account_id, order.id, quote.price).await {
                Ok(FillOutcome::Filled(_)) => report.orders_filled.push(order.id),
                Ok(FillOutcome::Cancelled(_)) => report.orders_cancelled.push(order.id),
                Ok(FillOutcome::Skipped) => {}
                Err(err) => {
                    report.failures += 1;
                    warn!(account = %order.account_id, order = %order.id, error = %err, "limit fill failed");
                }
            }
        }

        Ok(report)
    }

    /// Liquidates the position if, reloaded under the account lock, it is
    /// still the same position and still past its liquidation price.
    pub async fn liquidate_position(&self, position: &Position, price: Price) -> Result<Option<LiquidationResult>, EngineError> {
        let account_id = position.account_id;
        let result = self
            .with_account(account_id, || self.try_liquidate(account_id, position.id, &position.symbol, price))
            .await?;

        if let Some(liq) = &result {
            info!(
                account = %liq.account_id,
                position = %liq.position_id,
                symbol = %liq.symbol,
                size = %liq.size,
                %price,
                margin_lost = %liq.margin_lost,
                "position liquidated"
            );
        }
        Ok(result)
    }

    async fn try_liquidate(
        &self,
        account_id: AccountId,
        position_id: PositionId,
        symbol: &Symbol,
        price: Price,
    ) -> Result<Option<LiquidationResult>, EngineError> {
        let account = self.load_account(account_id).await?;
        let Some(position) = self
            .store
            .get_position(account_id, symbol)
            .await?
            .filter(|p| p.id == position_id)
        else {
            debug!(account = %account_id, position = %position_id, "position gone before liquidation");
            return Ok(None);
        };

        if !position.is_liquidatable_at(price) {
            return Ok(None);
        }

        let exec = liquidate(&account, &position, Timestamp::now());
        self.commit_execution(exec, None).await?;

        Ok(Some(LiquidationResult {
            account_id,
            position_id,
            symbol: position.symbol.clone(),
            size: position.size,
            margin_lost: position.margin,
        }))
    }

    /// Runs `scan_once` every scan interval until `shutdown` turns true or its
    /// sender is dropped.
    pub fn spawn_scanner(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.scanner.scan_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_ms = self.config.scanner.scan_interval_ms, "scanner started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.scan_once().await {
                            Ok(report) if !report.is_quiet() => info!(
                                liquidations = report.liquidations.len(),
                                filled = report.orders_filled.len(),
                                cancelled = report.orders_cancelled.len(),
                                failures = report.failures,
                                "scan pass"
                            ),
                            Ok(report) => debug!(
                                positions = report.positions_checked,
                                orders = report.orders_checked,
                                skipped = report.symbols_skipped.len(),
                                "scan pass"
                            ),
                            Err(err) => warn!(error = %err, "scan pass failed"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("scanner stopped");
        })
    }
}
