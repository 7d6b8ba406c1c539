// 8.0.2: result types and errors for engine operations.

use crate::executor::{Execution, ExecutionError};
use crate::order::{OrderStatus, PendingOrder, TransitionError};
use crate::store::StoreError;
use crate::types::{AccountId, OrderId, PositionId, Quote, Symbol};
use rust_decimal::Decimal;

/// What `place_order` did with the request.
#[derive(Debug, Clone)]
pub enum OrderPlacement {
    /// Market order filled immediately.
    Executed(Execution),
    /// Limit order accepted and resting.
    Resting(PendingOrder),
}

impl OrderPlacement {
    pub fn execution(&self) -> Option<&Execution> {
        match self {
            OrderPlacement::Executed(exec) => Some(exec),
            OrderPlacement::Resting(_) => None,
        }
    }

    pub fn resting_order(&self) -> Option<&PendingOrder> {
        match self {
            OrderPlacement::Executed(_) => None,
            OrderPlacement::Resting(order) => Some(order),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LiquidationResult {
    pub account_id: AccountId,
    pub position_id: PositionId,
    pub symbol: Symbol,
    pub size: Decimal,
    pub margin_lost: Quote,
}

/// Outcome of one scanner pass.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub positions_checked: usize,
    pub orders_checked: usize,
    pub liquidations: Vec<LiquidationResult>,
    pub orders_filled: Vec<OrderId>,
    // fills rejected for margin; the order was cancelled
    pub orders_cancelled: Vec<OrderId>,
    /// Symbols with no usable price this pass.
    pub symbols_skipped: Vec<Symbol>,
    pub failures: usize,
}

impl ScanReport {
    pub fn is_quiet(&self) -> bool {
        self.liquidations.is_empty() && self.orders_filled.is_empty() && self.orders_cancelled.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Insufficient margin: required {required}, available {available}")]
    InsufficientMargin { required: Quote, available: Quote },

    #[error("No usable price for {0}")]
    PriceUnavailable(Symbol),

    #[error("Account {account} has no open position in {symbol}")]
    PositionNotFound { account: AccountId, symbol: Symbol },

    #[error("Order {0} not found")]
    OrderNotFound(OrderId),

    #[error("Order {order_id} is {status}, not pending")]
    OrderNotPending { order_id: OrderId, status: OrderStatus },

    #[error("Leverage {requested} outside [1, {max}]")]
    InvalidLeverage { requested: Decimal, max: Decimal },

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Close fraction {0} outside (0, 1]")]
    InvalidFraction(Decimal),

    #[error("Account {0} not found")]
    AccountNotFound(AccountId),

    #[error("Account {account} kept changing underneath version {expected}")]
    StaleWrite { account: AccountId, expected: u64 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ExecutionError> for EngineError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::InsufficientMargin { required, available } => {
                EngineError::InsufficientMargin { required, available }
            }
            ExecutionError::InvalidLeverage { requested, max } => EngineError::InvalidLeverage { requested, max },
            ExecutionError::InvalidOrder(reason) => EngineError::InvalidOrder(reason),
        }
    }
}

impl From<TransitionError> for EngineError {
    fn from(err: TransitionError) -> Self {
        EngineError::OrderNotPending {
            order_id: err.order_id,
            status: err.status,
        }
    }
}
