// 7.0 config.rs: all settings in one place. fees, leverage limits, scanner timing.
// 7.1 EngineConfig::from_env reads PAPERTRADE_* overrides on top of the defaults.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::types::{Leverage, Symbol};

/** 7.2: fee rates as plain fractions. 0.00045 = 4.5 bps */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    // Charged on resting limit orders when they fill
    pub maker_fee_rate: Decimal,
    // Charged on market orders and market closes
    pub taker_fee_rate: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            maker_fee_rate: dec!(0.00015), // 0.015%
            taker_fee_rate: dec!(0.00045), // 0.045%
        }
    }
}

// Per-symbol leverage caps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketLimits {
    // Cap for symbols not listed in max_leverage
    pub default_max_leverage: Decimal,
    pub max_leverage: HashMap<Symbol, Decimal>,
}

impl Default for MarketLimits {
    fn default() -> Self {
        let mut max_leverage = HashMap::new();
        max_leverage.insert(Symbol::new("BTC"), dec!(40));
        max_leverage.insert(Symbol::new("ETH"), dec!(25));
        max_leverage.insert(Symbol::new("SOL"), dec!(20));

        Self {
            default_max_leverage: dec!(10),
            max_leverage,
        }
    }
}

impl MarketLimits {
    pub fn max_leverage(&self, symbol: &Symbol) -> Decimal {
        self.max_leverage
            .get(symbol)
            .copied()
            .unwrap_or(self.default_max_leverage)
    }

    // Some only when 1 <= requested <= cap for the symbol
    pub fn validate_leverage(&self, symbol: &Symbol, requested: Decimal) -> Option<Leverage> {
        Leverage::new(requested).filter(|l| l.value() <= self.max_leverage(symbol))
    }
}

// Background scanner and price fetch timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    // Time between liquidation/fill passes
    pub scan_interval_ms: u64,
    // Price feed calls give up after this and fall back to the last known price
    pub price_timeout_ms: u64,
    // Prices older than this are not acted on. None accepts any age.
    pub max_price_age_ms: Option<u64>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: 5_000,
            price_timeout_ms: 5_000,
            max_price_age_ms: None,
        }
    }
}

impl ScannerConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn price_timeout(&self) -> Duration {
        Duration::from_millis(self.price_timeout_ms)
    }
}

// The complete engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub fees: FeeConfig,
    pub markets: MarketLimits,
    pub scanner: ScannerConfig,
    // Read-decide-write attempts before a version conflict reaches the caller
    pub max_write_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fees: FeeConfig::default(),
            markets: MarketLimits::default(),
            scanner: ScannerConfig::default(),
            max_write_attempts: 3,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by PAPERTRADE_* environment variables.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse::<Decimal>("PAPERTRADE_MAKER_FEE") {
            config.fees.maker_fee_rate = v;
        }
        if let Some(v) = env_parse::<Decimal>("PAPERTRADE_TAKER_FEE") {
            config.fees.taker_fee_rate = v;
        }
        if let Some(v) = env_parse::<Decimal>("PAPERTRADE_DEFAULT_MAX_LEVERAGE") {
            config.markets.default_max_leverage = v;
        }
        if let Some(v) = env_parse::<u64>("PAPERTRADE_SCAN_INTERVAL_MS") {
            config.scanner.scan_interval_ms = v;
        }
        if let Some(v) = env_parse::<u64>("PAPERTRADE_PRICE_TIMEOUT_MS") {
            config.scanner.price_timeout_ms = v;
        }
        if let Some(v) = env_parse::<u64>("PAPERTRADE_MAX_PRICE_AGE_MS") {
            config.scanner.max_price_age_ms = Some(v);
        }
        if let Some(v) = env_parse::<u32>("PAPERTRADE_MAX_WRITE_ATTEMPTS") {
            config.max_write_attempts = v;
        }

        config
    }

    pub fn with_max_leverage(mut self, symbol: impl Into<Symbol>, max_leverage: Decimal) -> Self {
        self.markets.max_leverage.insert(symbol.into(), max_leverage);
        self
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        // fee checks
        for (name, rate) in [
            ("maker", self.fees.maker_fee_rate),
            ("taker", self.fees.taker_fee_rate),
        ] {
            if rate < Decimal::ZERO || rate >= dec!(0.01) {
                return Err(ConfigError::InvalidFees {
                    reason: format!("{name} fee rate {rate} outside [0, 1%)"),
                });
            }
        }

        // leverage checks
        if self.markets.default_max_leverage < Decimal::ONE {
            return Err(ConfigError::InvalidLeverage {
                reason: "default max leverage must be >= 1".to_string(),
            });
        }
        if let Some((symbol, lev)) = self.markets.max_leverage.iter().find(|(_, l)| **l < Decimal::ONE) {
            return Err(ConfigError::InvalidLeverage {
                reason: format!("max leverage {lev} for {symbol} must be >= 1"),
            });
        }

        // scanner checks
        if self.scanner.scan_interval_ms == 0 {
            return Err(ConfigError::InvalidScanner {
                reason: "scan interval must be positive".to_string(),
            });
        }
        if self.scanner.price_timeout_ms == 0 {
            return Err(ConfigError::InvalidScanner {
                reason: "price timeout must be positive".to_string(),
            });
        }

        if self.max_write_attempts == 0 {
            return Err(ConfigError::InvalidRetry {
                reason: "need at least one write attempt".to_string(),
            });
        }

        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid fees: {reason}")]
    InvalidFees { reason: String },
    #[error("invalid leverage limits: {reason}")]
    InvalidLeverage { reason: String },
    #[error("invalid scanner settings: {reason}")]
    InvalidScanner { reason: String },
    #[error("invalid retry settings: {reason}")]
    InvalidRetry { reason: String },
}
