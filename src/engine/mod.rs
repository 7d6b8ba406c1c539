// 8.0: trading engine. the async service around the pure executor: price lookup,
// per-account serialization, versioned commits with retry, and the background scanner.

mod core;
mod orders;
mod positions;
mod pricing;
mod results;
mod scanner;

pub use core::TradingEngine;
pub use orders::FillOutcome;
pub use results::{EngineError, LiquidationResult, OrderPlacement, ScanReport};
