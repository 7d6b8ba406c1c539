//! Order requests, executor intents and resting limit orders.
//!
//! Nothing is matched against other participants. Market orders fill at the
//! current reference price; limit orders rest until the reference price
//! crosses their limit and then fill at the limit.

use crate::risk::{notional, required_margin, trading_fee};
use crate::types::{AccountId, Leverage, MarginMode, OrderId, OrderKind, Price, Quote, Side, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the caller wants the order priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderType {
    /// Fill now at the current reference price.
    Market,
    /// Rest until the reference price reaches `price`.
    Limit { price: Price },
}

impl OrderType {
    pub fn kind(&self) -> OrderKind {
        match self {
            OrderType::Market => OrderKind::Market,
            OrderType::Limit { .. } => OrderKind::Limit,
        }
    }
}

/// An order as submitted by the session layer. Leverage is raw user input and
/// is validated against the symbol's limit by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub size: Decimal,
    pub leverage: Decimal,
    #[serde(default)]
    pub margin_mode: MarginMode,
    pub order_type: OrderType,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<Symbol>, side: Side, size: Decimal, leverage: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size,
            leverage,
            margin_mode: MarginMode::Cross,
            order_type: OrderType::Market,
        }
    }

    pub fn limit(symbol: impl Into<Symbol>, side: Side, size: Decimal, leverage: Decimal, price: Price) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size,
            leverage,
            margin_mode: MarginMode::Cross,
            order_type: OrderType::Limit { price },
        }
    }
}

/// Fully priced order handed to the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: Symbol,
    pub side: Side,
    pub size: Decimal,
    pub execution_price: Price,
    pub leverage: Leverage,
    pub margin_mode: MarginMode,
    pub kind: OrderKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Pending => f.write_str("pending"),
            OrderStatus::Filled => f.write_str("filled"),
            OrderStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Rejected status transition. Carries the status the order actually had.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("order {order_id} is {status}, expected pending")]
pub struct TransitionError {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub id: OrderId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub size: Decimal,
    pub limit_price: Price,
    pub leverage: Leverage,
    pub margin_mode: MarginMode,
    pub status: OrderStatus,
    /// Maker fee charged on fill; zero until then.
    pub fee: Quote,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PendingOrder {
    pub fn new(
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        size: Decimal,
        limit_price: Price,
        leverage: Leverage,
        margin_mode: MarginMode,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: OrderId::new(),
            account_id,
            symbol,
            side,
            size,
            limit_price,
            leverage,
            margin_mode,
            status: OrderStatus::Pending,
            fee: Quote::zero(),
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    /// Buy limits fill at or below the limit, sell limits at or above.
    pub fn is_triggered_by(&self, price: Price) -> bool {
        match self.side {
            Side::Long => price <= self.limit_price,
            Side::Short => price >= self.limit_price,
        }
    }

    /// Margin plus expected maker fee held back from available balance while resting.
    pub fn reserved_margin(&self, maker_fee_rate: Decimal) -> Quote {
        let margin = required_margin(self.size, self.limit_price, self.leverage);
        let fee = trading_fee(notional(self.size, self.limit_price), maker_fee_rate);
        margin.add(fee)
    }

    pub fn to_intent(&self) -> OrderIntent {
        OrderIntent {
            symbol: self.symbol.clone(),
            side: self.side,
            size: self.size,
            execution_price: self.limit_price,
            leverage: self.leverage,
            margin_mode: self.margin_mode,
            kind: OrderKind::Limit,
        }
    }

    // compare-and-set: only a pending order moves, terminal states are final
    fn transition(&mut self, to: OrderStatus, timestamp: Timestamp) -> Result<(), TransitionError> {
        if self.status != OrderStatus::Pending {
            return Err(TransitionError {
                order_id: self.id,
                status: self.status,
            });
        }
        self.status = to;
        self.updated_at = timestamp;
        Ok(())
    }

    pub fn mark_filled(&mut self, fee: Quote, timestamp: Timestamp) -> Result<(), TransitionError> {
        self.transition(OrderStatus::Filled, timestamp)?;
        self.fee = fee;
        Ok(())
    }

    pub fn cancel(&mut self, timestamp: Timestamp) -> Result<(), TransitionError> {
        self.transition(OrderStatus::Cancelled, timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn buy_limit() -> PendingOrder {
        PendingOrder::new(
            AccountId::new(),
            Symbol::new("ETH"),
            Side::Long,
            dec!(2),
            Price::new_unchecked(dec!(2000)),
            Leverage::new(dec!(5)).unwrap(),
            MarginMode::Isolated,
            Timestamp::from_millis(10),
        )
    }

    #[test]
    fn buy_limit_triggers_at_or_below() {
        let order = buy_limit();
        assert!(order.is_triggered_by(Price::new_unchecked(dec!(1999))));
        assert!(order.is_triggered_by(Price::new_unchecked(dec!(2000))));
        assert!(!order.is_triggered_by(Price::new_unchecked(dec!(2001))));
    }

    #[test]
    fn sell_limit_triggers_at_or_above() {
        let mut order = buy_limit();
        order.side = Side::Short;
        assert!(order.is_triggered_by(Price::new_unchecked(dec!(2001))));
        assert!(order.is_triggered_by(Price::new_unchecked(dec!(2000))));
        assert!(!order.is_triggered_by(Price::new_unchecked(dec!(1999))));
    }

    #[test]
    fn reserved_margin_includes_fee() {
        // 4000 / 5 = 800 margin, 4000 * 0.0002 = 0.8 fee
        let order = buy_limit();
        assert_eq!(order.reserved_margin(dec!(0.0002)).value(), dec!(800.8));
    }

    #[test]
    fn fill_records_fee_once() {
        let mut order = buy_limit();
        order.mark_filled(Quote::new(dec!(0.6)), Timestamp::from_millis(20)).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.fee.value(), dec!(0.6));

        let err = order.mark_filled(Quote::new(dec!(9)), Timestamp::from_millis(30)).unwrap_err();
        assert_eq!(err.status, OrderStatus::Filled);
        assert_eq!(order.fee.value(), dec!(0.6));
        assert_eq!(order.updated_at, Timestamp::from_millis(20));
    }

    #[test]
    fn cancel_after_fill_is_rejected() {
        let mut order = buy_limit();
        order.mark_filled(Quote::zero(), Timestamp::from_millis(20)).unwrap();
        assert!(order.cancel(Timestamp::from_millis(30)).is_err());
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[test]
    fn intent_fills_at_limit_as_maker() {
        let order = buy_limit();
        let intent = order.to_intent();
        assert_eq!(intent.execution_price, order.limit_price);
        assert_eq!(intent.kind, OrderKind::Limit);
        assert_eq!(intent.margin_mode, MarginMode::Isolated);
    }

    #[test]
    fn request_round_trips_through_json() {
        let req = OrderRequest::limit("btc", Side::Short, dec!(0.5), dec!(20), Price::new_unchecked(dec!(65000)));
        let json = serde_json::to_string(&req).unwrap();
        let back: OrderRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, req);
        assert_eq!(back.order_type.kind(), OrderKind::Limit);
    }
}
