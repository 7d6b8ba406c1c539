// Price Feed Integration
//
// The engine never talks to a market directly. It asks a PriceFeed for the
// latest reference price of a symbol and remembers the last good answer so a
// slow or failing source can be bridged. Any source (exchange websocket, REST
// poller, replay file) can sit behind the trait.

use crate::types::{Price, Symbol, Timestamp};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// A reference price with the time it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: Price,
    pub timestamp: Timestamp,
}

impl PriceQuote {
    pub fn new(price: Price, timestamp: Timestamp) -> Self {
        Self { price, timestamp }
    }

    pub fn age_ms(&self, now: Timestamp) -> u64 {
        now.millis_since(self.timestamp)
    }

    /// No limit means never stale.
    pub fn is_stale(&self, now: Timestamp, max_age_ms: Option<u64>) -> bool {
        max_age_ms.is_some_and(|max| self.age_ms(now) > max)
    }
}

/// Source of current reference prices. `None` means the source has nothing
/// usable for the symbol right now.
#[async_trait::async_trait]
pub trait PriceFeed: Send + Sync {
    fn name(&self) -> &str;

    async fn get_price(&self, symbol: &Symbol) -> Option<PriceQuote>;
}

/// Last good price per symbol. Used as the fallback when the feed fails and
/// as the price map for account snapshots.
#[derive(Debug, Default)]
pub struct PriceCache {
    prices: DashMap<Symbol, PriceQuote>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps whichever quote is newer.
    pub fn record(&self, symbol: &Symbol, quote: PriceQuote) {
        self.prices
            .entry(symbol.clone())
            .and_modify(|existing| {
                if quote.timestamp >= existing.timestamp {
                    *existing = quote;
                }
            })
            .or_insert(quote);
    }

    pub fn get(&self, symbol: &Symbol) -> Option<PriceQuote> {
        self.prices.get(symbol).map(|q| *q.value())
    }

    pub fn snapshot(&self) -> HashMap<Symbol, Price> {
        self.prices
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().price))
            .collect()
    }
}

/// Settable feed for tests and the simulator. Can be switched unhealthy and
/// slowed down to exercise the fallback path.
#[derive(Debug)]
pub struct MockPriceFeed {
    name: String,
    prices: DashMap<Symbol, PriceQuote>,
    healthy: AtomicBool,
    delay_ms: AtomicU64,
}

impl MockPriceFeed {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            prices: DashMap::new(),
            healthy: AtomicBool::new(true),
            delay_ms: AtomicU64::new(0),
        }
    }

    pub fn with_price(self, symbol: impl Into<Symbol>, price: Price) -> Self {
        self.set_price(symbol, price);
        self
    }

    /// Stamps the price with the current wall clock.
    pub fn set_price(&self, symbol: impl Into<Symbol>, price: Price) {
        self.set_quote(symbol, PriceQuote::new(price, Timestamp::now()));
    }

    pub fn set_quote(&self, symbol: impl Into<Symbol>, quote: PriceQuote) {
        self.prices.insert(symbol.into(), quote);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl PriceFeed for MockPriceFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_price(&self, symbol: &Symbol) -> Option<PriceQuote> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if !self.is_healthy() {
            return None;
        }
        self.prices.get(symbol).map(|q| *q.value())
    }
}
