// 8.4 engine/positions.rs: user-initiated closes. a close is a market order on the
// opposite side for a fraction of the size, so it always lands in reduce or close.

use super::core::TradingEngine;
use super::results::EngineError;
use crate::executor::execute;
use crate::order::OrderIntent;
use crate::price_feed::PriceQuote;
use crate::trade::ClosedTrade;
use crate::types::{AccountId, OrderKind, Symbol, Timestamp};
use rust_decimal::Decimal;
use tracing::info;

impl TradingEngine {
    /// Market-closes `fraction` of the position in `symbol`. 1 closes it fully.
    pub async fn close_position(
        &self,
        account_id: AccountId,
        symbol: &Symbol,
        fraction: Decimal,
    ) -> Result<ClosedTrade, EngineError> {
        if fraction <= Decimal::ZERO || fraction > Decimal::ONE {
            return Err(EngineError::InvalidFraction(fraction));
        }

        let quote = self.current_price(symbol).await?;
        let trade = self
            .with_account(account_id, || self.try_close_position(account_id, symbol, fraction, quote))
            .await?;

        info!(
            account = %account_id,
            %symbol,
            size = %trade.size,
            exit = %trade.exit_price,
            pnl = %trade.pnl,
            fee = %trade.fee,
            "position closed"
        );
        Ok(trade)
    }

    async fn try_close_position(
        &self,
        account_id: AccountId,
        symbol: &Symbol,
        fraction: Decimal,
        quote: PriceQuote,
    ) -> Result<ClosedTrade, EngineError> {
        let now = Timestamp::now();
        let account = self.load_account(account_id).await?;
        let position = self
            .store
            .get_position(account_id, symbol)
            .await?
            .ok_or_else(|| EngineError::PositionNotFound {
                account: account_id,
                symbol: symbol.clone(),
            })?;

        let size = if fraction == Decimal::ONE {
            position.size
        } else {
            position.size * fraction
        };
        if size <= Decimal::ZERO {
            return Err(EngineError::InvalidFraction(fraction));
        }

        let intent = OrderIntent {
            symbol: symbol.clone(),
            side: position.side.opposite(),
            size,
            execution_price: quote.price,
            leverage: position.leverage,
            margin_mode: position.margin_mode,
            kind: OrderKind::Market,
        };
        let ctx = self.execution_context(&account, symbol, None, now).await?;

        let exec = execute(&account, Some(&position), &intent, &ctx)?;
        let exec = self.commit_execution(exec, None).await?;

        exec.closed_trade
            .ok_or_else(|| EngineError::InvalidOrder(format!("close of {} produced no trade", position.id)))
    }
}
