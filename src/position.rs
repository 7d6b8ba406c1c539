// 4.0: open position tracking. pnl = (mark - entry) * size, sign flipped for shorts.
// 4.1 has merge/reduce logic at the bottom; flip is composed from them in the executor.

use crate::risk::{self, liquidation_price, required_margin, unrealized_pnl, weighted_entry};
use crate::types::{AccountId, Leverage, MarginMode, Price, PositionId, Quote, Side, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub size: Decimal,
    pub entry_price: Price,
    pub leverage: Leverage,
    pub margin_mode: MarginMode,
    // cash locked by this position; returned on close, forfeited on liquidation
    pub margin: Quote,
    pub liquidation_price: Price,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Position {
    pub fn open(
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        size: Decimal,
        entry_price: Price,
        leverage: Leverage,
        margin_mode: MarginMode,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: PositionId::new(),
            account_id,
            symbol,
            side,
            size,
            entry_price,
            leverage,
            margin_mode,
            margin: required_margin(size, entry_price, leverage),
            liquidation_price: liquidation_price(entry_price, side, leverage),
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    // 4.1: paper gains/losses at the given price
    pub fn unrealized_pnl(&self, mark_price: Price) -> Quote {
        unrealized_pnl(self.entry_price, mark_price, self.size, self.side)
    }

    pub fn roe(&self, mark_price: Price) -> Decimal {
        risk::roe(self.unrealized_pnl(mark_price), self.entry_price, self.size, self.leverage)
    }

    pub fn is_liquidatable_at(&self, price: Price) -> bool {
        risk::should_liquidate(self.side, price, self.liquidation_price, self.entry_price)
    }

    // the side invariant every stored position must satisfy
    pub fn liquidation_price_is_sane(&self) -> bool {
        match self.side {
            Side::Long => self.liquidation_price < self.entry_price,
            Side::Short => self.liquidation_price > self.entry_price,
        }
    }
}

/// What a reduction leaves behind and what it hands back to the account.
#[derive(Debug, Clone)]
pub struct PositionReduction {
    pub remaining: Option<Position>,
    pub closed_size: Decimal,
    pub realized_pnl: Quote,
    pub margin_returned: Quote,
}

// 4.2: adds to existing position. averages the entry price, liquidation price follows it.
// margin for the added size is charged at the position's own leverage.
pub fn merge_position(position: &Position, added_size: Decimal, fill_price: Price, timestamp: Timestamp) -> Position {
    debug_assert!(added_size > Decimal::ZERO, "merge size must be positive");

    let new_entry = weighted_entry(position.size, position.entry_price, added_size, fill_price);
    let added_margin = required_margin(added_size, fill_price, position.leverage);

    Position {
        size: position.size + added_size,
        entry_price: new_entry,
        margin: position.margin.add(added_margin),
        liquidation_price: liquidation_price(new_entry, position.side, position.leverage),
        updated_at: timestamp,
        ..position.clone()
    }
}

// 4.3: closes part or all of a position at fill_price. entry price unchanged on reduction.
pub fn reduce_position(
    position: &Position,
    reduce_amount: Decimal,
    fill_price: Price,
    timestamp: Timestamp,
) -> PositionReduction {
    debug_assert!(reduce_amount > Decimal::ZERO, "reduce amount must be positive");

    let closed_size = reduce_amount.min(position.size);
    let realized = unrealized_pnl(position.entry_price, fill_price, closed_size, position.side);
    let remaining_size = position.size - closed_size;

    if remaining_size.is_zero() {
        return PositionReduction {
            remaining: None,
            closed_size,
            realized_pnl: realized,
            margin_returned: position.margin,
        };
    }

    // margin returned proportionally
    let margin_returned = position.margin.mul(closed_size / position.size);

    let remaining = Position {
        size: remaining_size,
        margin: position.margin.sub(margin_returned),
        updated_at: timestamp,
        ..position.clone()
    };

    PositionReduction {
        remaining: Some(remaining),
        closed_size,
        realized_pnl: realized,
        margin_returned,
    }
}
