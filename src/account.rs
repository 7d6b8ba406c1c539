//! Account cash and snapshot metrics.
//!
//! `cash_balance` holds free cash only. Margin leaves it when a position opens
//! and comes back when the position closes, so equity is always cash plus
//! committed margin plus open PnL. Cash never goes below zero: every debit is
//! floored and the floored-away amount is handed back to the caller.

use crate::order::PendingOrder;
use crate::position::Position;
use crate::risk::{available_balance, total_equity};
use crate::types::{AccountId, Price, Quote, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub cash_balance: Quote,
    /// Bumped by the store on every commit; used for optimistic concurrency.
    pub version: u64,
    pub created_at: Timestamp,
}

impl Account {
    pub fn new(id: AccountId, initial_balance: Quote, timestamp: Timestamp) -> Self {
        Self {
            id,
            cash_balance: initial_balance.floor_zero(),
            version: 0,
            created_at: timestamp,
        }
    }

    /// Applies a signed cash change and floors the result at zero.
    /// Returns the part of the change that could not be applied.
    pub fn apply_clamped(&mut self, delta: Quote) -> Quote {
        let computed = self.cash_balance.add(delta);
        if computed.is_negative() {
            self.cash_balance = Quote::zero();
            computed.abs()
        } else {
            self.cash_balance = computed;
            Quote::zero()
        }
    }
}

/// Position with its mark-to-market figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionView {
    pub position: Position,
    pub mark_price: Option<Price>,
    pub unrealized_pnl: Quote,
    pub roe: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account_id: AccountId,
    pub cash_balance: Quote,
    pub total_equity: Quote,
    pub available_balance: Quote,
    pub margin_used: Quote,
    pub unrealized_pnl: Quote,
    pub pending_order_margin: Quote,
    pub positions: Vec<PositionView>,
    pub pending_orders: Vec<PendingOrder>,
}

/// Margin reserved by resting orders, including their expected maker fee.
pub fn pending_order_margin(orders: &[PendingOrder], maker_fee_rate: Decimal) -> Quote {
    orders
        .iter()
        .filter(|o| o.is_pending())
        .map(|o| o.reserved_margin(maker_fee_rate))
        .sum()
}

/// Sum of unrealized PnL across positions that have a price. Positions without
/// one count as flat.
pub fn total_unrealized_pnl<'a>(
    positions: impl IntoIterator<Item = &'a Position>,
    prices: &HashMap<Symbol, Price>,
) -> Quote {
    positions
        .into_iter()
        .filter_map(|p| prices.get(&p.symbol).map(|mark| p.unrealized_pnl(*mark)))
        .sum()
}

pub fn calculate_snapshot(
    account: &Account,
    positions: Vec<Position>,
    orders: Vec<PendingOrder>,
    prices: &HashMap<Symbol, Price>,
    maker_fee_rate: Decimal,
) -> AccountSnapshot {
    let views: Vec<PositionView> = positions
        .into_iter()
        .map(|position| {
            let mark_price = prices.get(&position.symbol).copied();
            let (unrealized_pnl, roe) = match mark_price {
                Some(mark) => (position.unrealized_pnl(mark), position.roe(mark)),
                None => (Quote::zero(), Decimal::ZERO),
            };
            PositionView {
                position,
                mark_price,
                unrealized_pnl,
                roe,
            }
        })
        .collect();

    let margin_used: Quote = views.iter().map(|v| v.position.margin).sum();
    let unrealized_pnl: Quote = views.iter().map(|v| v.unrealized_pnl).sum();

    let pending_orders: Vec<PendingOrder> = orders.into_iter().filter(|o| o.is_pending()).collect();
    let reserved = pending_order_margin(&pending_orders, maker_fee_rate);

    AccountSnapshot {
        account_id: account.id,
        cash_balance: account.cash_balance,
        total_equity: total_equity(account.cash_balance, margin_used, unrealized_pnl),
        available_balance: available_balance(account.cash_balance, unrealized_pnl, reserved),
        margin_used,
        unrealized_pnl,
        pending_order_margin: reserved,
        positions: views,
        pending_orders,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderStatus;
    use crate::types::{Leverage, MarginMode, OrderId, Side};
    use rust_decimal_macros::dec;

    fn test_account() -> Account {
        Account::new(AccountId::new(), Quote::new(dec!(10000)), Timestamp::from_millis(0))
    }

    fn btc_long(account: &Account) -> Position {
        Position::open(
            account.id,
            Symbol::new("BTC"),
            Side::Long,
            dec!(1),
            Price::new_unchecked(dec!(50000)),
            Leverage::new(dec!(10)).unwrap(),
            MarginMode::Cross,
            Timestamp::from_millis(0),
        )
    }

    fn resting_order(account: &Account, status: OrderStatus) -> PendingOrder {
        PendingOrder {
            id: OrderId::new(),
            account_id: account.id,
            symbol: Symbol::new("ETH"),
            side: Side::Long,
            size: dec!(1),
            limit_price: Price::new_unchecked(dec!(2000)),
            leverage: Leverage::new(dec!(10)).unwrap(),
            margin_mode: MarginMode::Cross,
            status,
            fee: Quote::zero(),
            created_at: Timestamp::from_millis(0),
            updated_at: Timestamp::from_millis(0),
        }
    }

    #[test]
    fn clamped_debit_reports_shortfall() {
        let mut account = test_account();
        let shortfall = account.apply_clamped(Quote::new(dec!(-10500)));
        assert_eq!(account.cash_balance, Quote::zero());
        assert_eq!(shortfall.value(), dec!(500));

        let shortfall = account.apply_clamped(Quote::new(dec!(250)));
        assert_eq!(account.cash_balance.value(), dec!(250));
        assert!(shortfall.is_zero());
    }

    #[test]
    fn negative_initial_balance_is_floored() {
        let account = Account::new(AccountId::new(), Quote::new(dec!(-5)), Timestamp::from_millis(0));
        assert_eq!(account.cash_balance, Quote::zero());
    }

    #[test]
    fn snapshot_no_positions() {
        let account = test_account();
        let snap = calculate_snapshot(&account, vec![], vec![], &HashMap::new(), dec!(0.00015));

        assert_eq!(snap.total_equity.value(), dec!(10000));
        assert_eq!(snap.available_balance.value(), dec!(10000));
        assert!(snap.positions.is_empty());
    }

    #[test]
    fn snapshot_with_profitable_position() {
        let mut account = test_account();
        account.cash_balance = Quote::new(dec!(4977.5));
        let pos = btc_long(&account);

        let mut prices = HashMap::new();
        prices.insert(Symbol::new("BTC"), Price::new_unchecked(dec!(52000)));

        let snap = calculate_snapshot(&account, vec![pos], vec![], &prices, dec!(0.00015));

        assert_eq!(snap.unrealized_pnl.value(), dec!(2000));
        assert_eq!(snap.total_equity.value(), dec!(11977.5));
        // profit is not spendable
        assert_eq!(snap.available_balance.value(), dec!(4977.5));
        assert_eq!(snap.positions[0].roe, dec!(40));
    }

    #[test]
    fn snapshot_with_losing_position() {
        let mut account = test_account();
        account.cash_balance = Quote::new(dec!(5000));
        let pos = btc_long(&account);

        let mut prices = HashMap::new();
        prices.insert(Symbol::new("BTC"), Price::new_unchecked(dec!(49000)));

        let snap = calculate_snapshot(&account, vec![pos], vec![], &prices, dec!(0.00015));
        assert_eq!(snap.total_equity.value(), dec!(9000));
        assert_eq!(snap.available_balance.value(), dec!(4000));
    }

    #[test]
    fn snapshot_missing_price_counts_flat() {
        let account = test_account();
        let pos = btc_long(&account);
        let snap = calculate_snapshot(&account, vec![pos], vec![], &HashMap::new(), dec!(0.00015));
        assert!(snap.positions[0].mark_price.is_none());
        assert!(snap.unrealized_pnl.is_zero());
    }

    #[test]
    fn snapshot_reserves_pending_orders_only() {
        let account = test_account();
        let orders = vec![
            resting_order(&account, OrderStatus::Pending),
            resting_order(&account, OrderStatus::Cancelled),
        ];
        let snap = calculate_snapshot(&account, vec![], orders, &HashMap::new(), dec!(0.00015));

        // 2000 / 10 + 2000 * 0.00015
        assert_eq!(snap.pending_order_margin.value(), dec!(200.3));
        assert_eq!(snap.available_balance.value(), dec!(9799.7));
        assert_eq!(snap.pending_orders.len(), 1);
    }
}
