// 8.3 engine/pricing.rs: price lookup. feed first (bounded by the timeout), then the
// last known quote. quotes older than max_price_age_ms are never acted on.

use super::core::TradingEngine;
use super::results::EngineError;
use crate::price_feed::PriceQuote;
use crate::types::{Symbol, Timestamp};
use tracing::{debug, warn};

impl TradingEngine {
    pub async fn current_price(&self, symbol: &Symbol) -> Result<PriceQuote, EngineError> {
        self.resolve_price(symbol, Timestamp::now())
            .await
            .ok_or_else(|| EngineError::PriceUnavailable(symbol.clone()))
    }

    pub(super) async fn resolve_price(&self, symbol: &Symbol, now: Timestamp) -> Option<PriceQuote> {
        let timeout = self.config.scanner.price_timeout();
        let fetched = match tokio::time::timeout(timeout, self.feed.get_price(symbol)).await {
            Ok(Some(quote)) => {
                self.prices.record(symbol, quote);
                Some(quote)
            }
            Ok(None) => {
                debug!(%symbol, feed = self.feed.name(), "feed has no price");
                None
            }
            Err(_) => {
                warn!(%symbol, feed = self.feed.name(), timeout_ms = timeout.as_millis() as u64, "price fetch timed out");
                None
            }
        };

        let quote = match fetched {
            Some(quote) => quote,
            None => {
                let cached = self.prices.get(symbol)?;
                warn!(%symbol, price = %cached.price, age_ms = cached.age_ms(now), "using last known price");
                cached
            }
        };

        if quote.is_stale(now, self.config.scanner.max_price_age_ms) {
            warn!(%symbol, age_ms = quote.age_ms(now), "price too old to act on");
            return None;
        }
        Some(quote)
    }
}
