//! Risk calculator: margin, fees, PnL and liquidation math.
//!
//! Every function here is pure. Callers pass explicit inputs and get a value
//! back; nothing reads clocks, stores or prices.
//!
//! Liquidation happens once the position has lost `MAINTENANCE_FACTOR` of its
//! margin, so the trigger sits at `entry * (1 -/+ 0.95 / leverage)`.

use crate::types::{Leverage, Price, Quote, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Fraction of margin that may be lost before the position is liquidated.
pub const MAINTENANCE_FACTOR: Decimal = dec!(0.95);

pub fn notional(size: Decimal, price: Price) -> Quote {
    Quote::new(size * price.value())
}

/// `size * price`, or `None` when the product does not fit in a `Decimal`.
/// Margin, fee and PnL for a fill are all bounded by this value, so callers
/// check it once before using the unchecked helpers.
pub fn checked_notional(size: Decimal, price: Price) -> Option<Quote> {
    size.checked_mul(price.value()).map(Quote::new)
}

/// Margin committed for `size` at `price`: notional / leverage.
pub fn required_margin(size: Decimal, price: Price, leverage: Leverage) -> Quote {
    notional(size, price).mul(leverage.initial_margin_fraction())
}

pub fn trading_fee(notional: Quote, rate: Decimal) -> Quote {
    notional.mul(rate)
}

// 2.1: higher leverage pulls the liquidation price toward entry
pub fn liquidation_price(entry_price: Price, side: Side, leverage: Leverage) -> Price {
    let buffer = MAINTENANCE_FACTOR / leverage.value();
    let liq = match side {
        Side::Long => entry_price.value() * (Decimal::ONE - buffer),
        Side::Short => entry_price.value() * (Decimal::ONE + buffer),
    };
    // 1x long lands at 5% of entry, never at or below zero
    Price::new_unchecked(liq)
}

// 2.2: symmetric, zero at entry
pub fn unrealized_pnl(entry_price: Price, current_price: Price, size: Decimal, side: Side) -> Quote {
    let pnl = (current_price.value() - entry_price.value()) * size;
    Quote::new(pnl * side.sign())
}

/// Return on equity in percent. Zero when the margin denominator is zero.
pub fn roe(pnl: Quote, entry_price: Price, size: Decimal, leverage: Leverage) -> Decimal {
    let margin = size * entry_price.value() / leverage.value();
    if margin.is_zero() {
        return Decimal::ZERO;
    }
    pnl.value() / margin * dec!(100)
}

/// Cash that can back new margin. Unrealized profit is not spendable until
/// realized, unrealized loss is.
pub fn available_balance(cash_balance: Quote, unrealized_pnl: Quote, pending_order_margin: Quote) -> Quote {
    cash_balance
        .add(unrealized_pnl.losses_only())
        .sub(pending_order_margin)
        .floor_zero()
}

/// Headline account value: free cash + committed margin + open PnL.
pub fn total_equity(cash_balance: Quote, position_margin: Quote, unrealized_pnl: Quote) -> Quote {
    cash_balance.add(position_margin).add(unrealized_pnl)
}

/// Size-weighted average of two fills on the same side.
pub fn weighted_entry(old_size: Decimal, old_entry: Price, added_size: Decimal, fill_price: Price) -> Price {
    let total = old_size + added_size;
    if total.is_zero() {
        return old_entry;
    }
    let weighted = old_size * old_entry.value() + added_size * fill_price.value();
    Price::new_unchecked(weighted / total)
}

// 2.3: scanner trigger. the entry comparison rejects positions whose stored
// liquidation price sits on the wrong side of entry.
pub fn should_liquidate(side: Side, price: Price, liquidation_price: Price, entry_price: Price) -> bool {
    match side {
        Side::Long => price <= liquidation_price && liquidation_price < entry_price,
        Side::Short => price >= liquidation_price && liquidation_price > entry_price,
    }
}
