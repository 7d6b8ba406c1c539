//! Closed-trade history.
//!
//! One record per full close, partial close or liquidation. Records are built
//! once and never modified; the store only appends them.

use crate::position::Position;
use crate::types::{AccountId, Leverage, PositionId, Price, Quote, Side, Symbol, Timestamp, TradeId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub id: TradeId,
    pub account_id: AccountId,
    pub position_id: PositionId,
    pub symbol: Symbol,
    pub side: Side,
    pub size: Decimal,
    pub entry_price: Price,
    pub exit_price: Price,
    pub pnl: Quote,
    /// Fee charged on the closing fill. Zero for liquidations.
    pub fee: Quote,
    pub leverage: Leverage,
    pub liquidated: bool,
    pub closed_at: Timestamp,
}

impl ClosedTrade {
    /// Record for `size` units of `position` closed at `exit_price`.
    pub fn from_close(
        position: &Position,
        size: Decimal,
        exit_price: Price,
        pnl: Quote,
        fee: Quote,
        closed_at: Timestamp,
    ) -> Self {
        Self {
            id: TradeId::new(),
            account_id: position.account_id,
            position_id: position.id,
            symbol: position.symbol.clone(),
            side: position.side,
            size,
            entry_price: position.entry_price,
            exit_price,
            pnl,
            fee,
            leverage: position.leverage,
            liquidated: false,
            closed_at,
        }
    }

    // forced close: exits at the liquidation price and forfeits the whole margin
    pub fn from_liquidation(position: &Position, closed_at: Timestamp) -> Self {
        Self {
            liquidated: true,
            ..Self::from_close(
                position,
                position.size,
                position.liquidation_price,
                position.margin.negate(),
                Quote::zero(),
                closed_at,
            )
        }
    }

    /// Realized PnL after the closing fee.
    pub fn net_pnl(&self) -> Quote {
        self.pnl.sub(self.fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarginMode;
    use rust_decimal_macros::dec;

    fn ten_x_long() -> Position {
        Position::open(
            AccountId::new(),
            Symbol::new("SOL"),
            Side::Long,
            dec!(4),
            Price::new_unchecked(dec!(100)),
            Leverage::new(dec!(10)).unwrap(),
            MarginMode::Cross,
            Timestamp::from_millis(0),
        )
    }

    #[test]
    fn liquidation_forfeits_margin() {
        let pos = ten_x_long();
        let trade = ClosedTrade::from_liquidation(&pos, Timestamp::from_millis(5));

        assert!(trade.liquidated);
        assert_eq!(trade.exit_price.value(), dec!(90.5));
        assert_eq!(trade.pnl.value(), dec!(-40));
        assert_eq!(trade.size, dec!(4));
        assert_eq!(trade.position_id, pos.id);
        assert!(trade.fee.is_zero());
    }

    #[test]
    fn close_record_keeps_entry() {
        let pos = ten_x_long();
        let trade = ClosedTrade::from_close(
            &pos,
            dec!(1),
            Price::new_unchecked(dec!(110)),
            Quote::new(dec!(10)),
            Quote::new(dec!(0.05)),
            Timestamp::from_millis(9),
        );
        assert!(!trade.liquidated);
        assert_eq!(trade.entry_price.value(), dec!(100));
        assert_eq!(trade.net_pnl().value(), dec!(9.95));
    }
}
