// papertrade-core: position & risk engine for a paper-trading simulator.
// margin-first: every order is checked against available balance before state moves.
// the executor and risk math are pure; storage and prices sit behind async traits.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: ids, Symbol, Side, Price, Quote, Leverage, Timestamp
//   2.x  risk.rs: margin, fee, pnl, roe, liquidation price, available balance
//   3.x  order.rs: order requests, executor intents, resting limit orders
//   4.x  position.rs: position struct, pnl, merge/reduce
//   5.x  executor.rs: open/merge/reduce/close/flip decision + liquidation
//   6.x  trade.rs: closed trade records
//   7.x  config.rs: fees, leverage caps, scanner timing, env overrides
//   8.x  engine/: trading engine: orders, closes, pricing, scanner
//   9.x  price_feed.rs: price source trait, last-known cache, mock feed
//   10.x account.rs: account cash + snapshot metrics
//   11.x store.rs: account store trait + in-memory store

pub mod account;
pub mod config;
pub mod engine;
pub mod executor;
pub mod order;
pub mod position;
pub mod price_feed;
pub mod risk;
pub mod store;
pub mod trade;
pub mod types;

// re exports for convenience
pub use account::{Account, AccountSnapshot, PositionView};
pub use config::{ConfigError, EngineConfig, FeeConfig, MarketLimits, ScannerConfig};
pub use engine::{EngineError, FillOutcome, LiquidationResult, OrderPlacement, ScanReport, TradingEngine};
pub use executor::{Execution, ExecutionContext, ExecutionError, ExecutionPlan, PositionChange};
pub use order::{OrderIntent, OrderRequest, OrderStatus, OrderType, PendingOrder};
pub use position::Position;
pub use price_feed::{MockPriceFeed, PriceCache, PriceFeed, PriceQuote};
pub use store::{AccountCommit, AccountStore, MemoryStore, StoreError};
pub use trade::ClosedTrade;
pub use types::*;
