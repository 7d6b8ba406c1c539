// 8.2 engine/orders.rs: order entry. market orders execute now at the reference price,
// limit orders rest after a margin check and fill from the scanner.

use super::core::TradingEngine;
use super::results::{EngineError, OrderPlacement};
use crate::account::total_unrealized_pnl;
use crate::executor::{execute, Execution};
use crate::order::{OrderIntent, OrderRequest, OrderType, PendingOrder};
use crate::price_feed::PriceQuote;
use crate::risk::{available_balance, checked_notional};
use crate::store::AccountCommit;
use crate::types::{AccountId, Leverage, OrderId, OrderKind, Price, Timestamp};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// What happened to a triggered limit order.
#[derive(Debug, Clone)]
pub enum FillOutcome {
    Filled(Execution),
    /// Could not be executed against the account; the order was cancelled.
    Cancelled(PendingOrder),
    /// Already filled or cancelled, or the price moved back.
    Skipped,
}

impl TradingEngine {
    pub async fn place_order(&self, account_id: AccountId, request: OrderRequest) -> Result<OrderPlacement, EngineError> {
        let leverage = self.validate_request(&request)?;

        match request.order_type {
            OrderType::Market => {
                let quote = self.current_price(&request.symbol).await?;
                let exec = self
                    .with_account(account_id, || self.try_market_order(account_id, &request, leverage, quote))
                    .await?;

                info!(
                    account = %account_id,
                    symbol = %request.symbol,
                    side = %request.side,
                    size = %request.size,
                    price = %quote.price,
                    fee = %exec.fee,
                    change = exec.change.label(),
                    "market order executed"
                );
                Ok(OrderPlacement::Executed(exec))
            }
            OrderType::Limit { price } => {
                let order = self
                    .with_account(account_id, || self.try_rest_order(account_id, &request, leverage, price))
                    .await?;

                info!(
                    account = %account_id,
                    order = %order.id,
                    symbol = %order.symbol,
                    side = %order.side,
                    size = %order.size,
                    limit = %order.limit_price,
                    "limit order resting"
                );
                Ok(OrderPlacement::Resting(order))
            }
        }
    }

    /// Cancels a pending order. Filled and cancelled orders are left untouched.
    pub async fn cancel_order(&self, account_id: AccountId, order_id: OrderId) -> Result<PendingOrder, EngineError> {
        let order = self
            .with_account(account_id, || self.try_cancel_order(account_id, order_id))
            .await?;
        info!(account = %account_id, order = %order_id, "limit order cancelled");
        Ok(order)
    }

    /// Fills `order_id` at its limit if `price` still triggers it.
    pub async fn fill_order(&self, account_id: AccountId, order_id: OrderId, price: Price) -> Result<FillOutcome, EngineError> {
        let outcome = self
            .with_account(account_id, || self.try_fill_order(account_id, order_id, price))
            .await?;

        match &outcome {
            FillOutcome::Filled(exec) => info!(
                account = %account_id,
                order = %order_id,
                fee = %exec.fee,
                change = exec.change.label(),
                "limit order filled"
            ),
            FillOutcome::Cancelled(_) => warn!(account = %account_id, order = %order_id, "limit order could not fill, cancelled"),
            FillOutcome::Skipped => debug!(account = %account_id, order = %order_id, "limit order no longer fillable"),
        }
        Ok(outcome)
    }

    fn validate_request(&self, request: &OrderRequest) -> Result<Leverage, EngineError> {
        if request.size <= Decimal::ZERO {
            return Err(EngineError::InvalidOrder(format!("size must be positive, got {}", request.size)));
        }
        if let OrderType::Limit { price } = request.order_type {
            if price.value() <= Decimal::ZERO {
                return Err(EngineError::InvalidOrder(format!("limit price must be positive, got {price}")));
            }
            // a resting order's reservation is priced at its limit
            if checked_notional(request.size, price).is_none() {
                return Err(EngineError::InvalidOrder(format!(
                    "{} {} @ {price} is too large to price",
                    request.symbol, request.size
                )));
            }
        }
        self.config
            .markets
            .validate_leverage(&request.symbol, request.leverage)
            .ok_or_else(|| EngineError::InvalidLeverage {
                requested: request.leverage,
                max: self.config.markets.max_leverage(&request.symbol),
            })
    }

    async fn try_market_order(
        &self,
        account_id: AccountId,
        request: &OrderRequest,
        leverage: Leverage,
        quote: PriceQuote,
    ) -> Result<Execution, EngineError> {
        let now = Timestamp::now();
        let account = self.load_account(account_id).await?;
        let existing = self.store.get_position(account_id, &request.symbol).await?;
        let ctx = self.execution_context(&account, &request.symbol, None, now).await?;

        let intent = OrderIntent {
            symbol: request.symbol.clone(),
            side: request.side,
            size: request.size,
            execution_price: quote.price,
            leverage,
            margin_mode: request.margin_mode,
            kind: OrderKind::Market,
        };

        let exec = execute(&account, existing.as_ref(), &intent, &ctx)?;
        self.commit_execution(exec, None).await
    }

    // margin + maker fee at the limit must fit in available balance; nothing is debited yet
    async fn try_rest_order(
        &self,
        account_id: AccountId,
        request: &OrderRequest,
        leverage: Leverage,
        limit_price: Price,
    ) -> Result<PendingOrder, EngineError> {
        let now = Timestamp::now();
        let account = self.load_account(account_id).await?;
        let positions = self.store.list_positions(account_id).await?;
        let ctx = self.execution_context(&account, &request.symbol, None, now).await?;

        let prices = self.prices.snapshot();
        let unrealized = ctx
            .other_unrealized_pnl
            .add(total_unrealized_pnl(positions.iter().filter(|p| p.symbol == request.symbol), &prices));
        let available = available_balance(account.cash_balance, unrealized, ctx.pending_order_margin);

        let order = PendingOrder::new(
            account_id,
            request.symbol.clone(),
            request.side,
            request.size,
            limit_price,
            leverage,
            request.margin_mode,
            now,
        );
        let required = order.reserved_margin(self.config.fees.maker_fee_rate);
        if required > available {
            return Err(EngineError::InsufficientMargin { required, available });
        }

        self.store
            .commit(AccountCommit::new(account).write_order(order.clone()))
            .await?;
        Ok(order)
    }

    async fn try_cancel_order(&self, account_id: AccountId, order_id: OrderId) -> Result<PendingOrder, EngineError> {
        let account = self.load_account(account_id).await?;
        let mut order = self
            .store
            .get_order(order_id)
            .await?
            .filter(|o| o.account_id == account_id)
            .ok_or(EngineError::OrderNotFound(order_id))?;

        order.cancel(Timestamp::now())?;
        self.store
            .commit(AccountCommit::new(account).write_order(order.clone()))
            .await?;
        Ok(order)
    }

    async fn try_fill_order(&self, account_id: AccountId, order_id: OrderId, price: Price) -> Result<FillOutcome, EngineError> {
        let now = Timestamp::now();
        let account = self.load_account(account_id).await?;
        let Some(mut order) = self
            .store
            .get_order(order_id)
            .await?
            .filter(|o| o.account_id == account_id)
        else {
            return Err(EngineError::OrderNotFound(order_id));
        };

        if !order.is_pending() || !order.is_triggered_by(price) {
            return Ok(FillOutcome::Skipped);
        }

        let existing = self.store.get_position(account_id, &order.symbol).await?;
        let ctx = self.execution_context(&account, &order.symbol, Some(order.id), now).await?;

        match execute(&account, existing.as_ref(), &order.to_intent(), &ctx) {
            Ok(exec) => {
                order.mark_filled(exec.fee, now)?;
                let exec = self.commit_execution(exec, Some(order)).await?;
                Ok(FillOutcome::Filled(exec))
            }
            Err(err) => {
                warn!(account = %account_id, order = %order_id, error = %err, "limit fill rejected");
                order.cancel(now)?;
                self.store
                    .commit(AccountCommit::new(account).write_order(order.clone()))
                    .await?;
                Ok(FillOutcome::Cancelled(order))
            }
        }
    }
}
