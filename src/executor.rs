//! Order executor.
//!
//! Given an account, the account's position in the intent's symbol (if any)
//! and a priced order intent, decides which of the five position transitions
//! applies and returns the resulting state. Nothing is written here; the
//! caller commits the returned [`Execution`] atomically.

use crate::account::Account;
use crate::config::FeeConfig;
use crate::order::OrderIntent;
use crate::position::{merge_position, reduce_position, Position};
use crate::risk::{available_balance, checked_notional, notional, required_margin, trading_fee};
use crate::trade::ClosedTrade;
use crate::types::{OrderKind, Quote, Timestamp};
use rust_decimal::Decimal;
use tracing::{debug, warn};

/// Account-wide inputs the executor cannot derive from the single position.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub now: Timestamp,
    pub fees: FeeConfig,
    pub max_leverage: Decimal,
    /// Unrealized PnL of the account's positions in other symbols.
    pub other_unrealized_pnl: Quote,
    /// Margin held back by the account's resting limit orders.
    pub pending_order_margin: Quote,
}

impl ExecutionContext {
    pub fn new(now: Timestamp, fees: FeeConfig, max_leverage: Decimal) -> Self {
        Self {
            now,
            fees,
            max_leverage,
            other_unrealized_pnl: Quote::zero(),
            pending_order_margin: Quote::zero(),
        }
    }

    pub fn with_unrealized_pnl(mut self, pnl: Quote) -> Self {
        self.other_unrealized_pnl = pnl;
        self
    }

    pub fn with_pending_order_margin(mut self, margin: Quote) -> Self {
        self.pending_order_margin = margin;
        self
    }

    pub fn fee_rate(&self, kind: OrderKind) -> Decimal {
        match kind {
            OrderKind::Market => self.fees.taker_fee_rate,
            OrderKind::Limit => self.fees.maker_fee_rate,
        }
    }
}

/// Which transition an intent causes against the existing position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExecutionPlan<'a> {
    Open,
    Merge(&'a Position),
    Reduce(&'a Position),
    Close(&'a Position),
    Flip { position: &'a Position, remainder: Decimal },
}

pub fn plan<'a>(existing: Option<&'a Position>, intent: &OrderIntent) -> ExecutionPlan<'a> {
    let Some(position) = existing else {
        return ExecutionPlan::Open;
    };

    if position.side == intent.side {
        return ExecutionPlan::Merge(position);
    }

    match intent.size.cmp(&position.size) {
        std::cmp::Ordering::Less => ExecutionPlan::Reduce(position),
        std::cmp::Ordering::Equal => ExecutionPlan::Close(position),
        std::cmp::Ordering::Greater => ExecutionPlan::Flip {
            position,
            remainder: intent.size - position.size,
        },
    }
}

/// How the position set changed.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionChange {
    Opened(Position),
    Merged(Position),
    Reduced(Position),
    /// Holds the position as it was before removal.
    Closed(Position),
    Flipped { closed: Position, opened: Position },
    Liquidated(Position),
}

impl PositionChange {
    pub fn label(&self) -> &'static str {
        match self {
            PositionChange::Opened(_) => "opened",
            PositionChange::Merged(_) => "merged",
            PositionChange::Reduced(_) => "reduced",
            PositionChange::Closed(_) => "closed",
            PositionChange::Flipped { .. } => "flipped",
            PositionChange::Liquidated(_) => "liquidated",
        }
    }

    /// Position left open afterwards, if any.
    pub fn resulting_position(&self) -> Option<&Position> {
        match self {
            PositionChange::Opened(p) | PositionChange::Merged(p) | PositionChange::Reduced(p) => Some(p),
            PositionChange::Flipped { opened, .. } => Some(opened),
            PositionChange::Closed(_) | PositionChange::Liquidated(_) => None,
        }
    }

    /// Position removed from the store, if any.
    pub fn removed_position(&self) -> Option<&Position> {
        match self {
            PositionChange::Closed(p) | PositionChange::Liquidated(p) => Some(p),
            PositionChange::Flipped { closed, .. } => Some(closed),
            PositionChange::Opened(_) | PositionChange::Merged(_) | PositionChange::Reduced(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Execution {
    pub account: Account,
    pub change: PositionChange,
    pub closed_trade: Option<ClosedTrade>,
    /// Total fee charged by this execution.
    pub fee: Quote,
    /// Cash that the zero floor swallowed. Non-zero only when a close lost
    /// more than the account could pay.
    pub shortfall: Quote,
}

impl Execution {
    pub fn position(&self) -> Option<&Position> {
        self.change.resulting_position()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("Insufficient margin: required {required}, available {available}")]
    InsufficientMargin { required: Quote, available: Quote },

    #[error("Leverage {requested} outside [1, {max}]")]
    InvalidLeverage { requested: Decimal, max: Decimal },

    #[error("Invalid order: {0}")]
    InvalidOrder(String),
}

/// Applies `intent` against `existing` and returns the new state.
pub fn execute(
    account: &Account,
    existing: Option<&Position>,
    intent: &OrderIntent,
    ctx: &ExecutionContext,
) -> Result<Execution, ExecutionError> {
    if intent.size <= Decimal::ZERO {
        return Err(ExecutionError::InvalidOrder(format!("size must be positive, got {}", intent.size)));
    }
    if intent.execution_price.value() <= Decimal::ZERO {
        return Err(ExecutionError::InvalidOrder(format!(
            "execution price must be positive, got {}",
            intent.execution_price
        )));
    }
    if let Some(position) = existing {
        if position.symbol != intent.symbol || position.account_id != account.id {
            return Err(ExecutionError::InvalidOrder(format!(
                "position {} does not belong to {} on {}",
                position.id, account.id, intent.symbol
            )));
        }
    }

    ensure_representable(existing, intent)?;

    let plan = plan(existing, intent);
    debug!(account = %account.id, symbol = %intent.symbol, ?plan, "executing order intent");

    // only a new position is sized at the intent's leverage
    let opens_position = matches!(plan, ExecutionPlan::Open | ExecutionPlan::Flip { .. });
    if opens_position && intent.leverage.value() > ctx.max_leverage {
        return Err(ExecutionError::InvalidLeverage {
            requested: intent.leverage.value(),
            max: ctx.max_leverage,
        });
    }

    let mut next = account.clone();

    let execution = match plan {
        ExecutionPlan::Open => {
            let (position, fee) = open_leg(&mut next, intent, intent.size, ctx.other_unrealized_pnl, ctx)?;
            Execution {
                account: next,
                change: PositionChange::Opened(position),
                closed_trade: None,
                fee,
                shortfall: Quote::zero(),
            }
        }
        ExecutionPlan::Merge(position) => {
            let (merged, fee) = merge_leg(&mut next, position, intent, ctx)?;
            Execution {
                account: next,
                change: PositionChange::Merged(merged),
                closed_trade: None,
                fee,
                shortfall: Quote::zero(),
            }
        }
        ExecutionPlan::Reduce(position) => {
            let leg = close_leg(&mut next, position, intent.size, intent, ctx);
            let change = match leg.remaining {
                Some(remaining) => PositionChange::Reduced(remaining),
                None => PositionChange::Closed(position.clone()),
            };
            Execution {
                account: next,
                change,
                closed_trade: Some(leg.trade),
                fee: leg.fee,
                shortfall: leg.shortfall,
            }
        }
        ExecutionPlan::Close(position) => {
            let leg = close_leg(&mut next, position, position.size, intent, ctx);
            Execution {
                account: next,
                change: PositionChange::Closed(position.clone()),
                closed_trade: Some(leg.trade),
                fee: leg.fee,
                shortfall: leg.shortfall,
            }
        }
        ExecutionPlan::Flip { position, remainder } => {
            let leg = close_leg(&mut next, position, position.size, intent, ctx);
            // the closed position no longer weighs on available balance
            let (opened, open_fee) = open_leg(&mut next, intent, remainder, ctx.other_unrealized_pnl, ctx)?;
            Execution {
                account: next,
                change: PositionChange::Flipped {
                    closed: position.clone(),
                    opened,
                },
                closed_trade: Some(leg.trade),
                fee: leg.fee.add(open_fee),
                shortfall: leg.shortfall,
            }
        }
    };

    if !execution.shortfall.is_zero() {
        warn!(
            account = %account.id,
            symbol = %intent.symbol,
            shortfall = %execution.shortfall,
            "close loss exceeded cash, balance floored at zero"
        );
    }

    Ok(execution)
}

/// Forced close at the position's liquidation price. The margin was taken
/// from cash at open and is not returned, so the account is left unchanged.
pub fn liquidate(account: &Account, position: &Position, now: Timestamp) -> Execution {
    Execution {
        account: account.clone(),
        change: PositionChange::Liquidated(position.clone()),
        closed_trade: Some(ClosedTrade::from_liquidation(position, now)),
        fee: Quote::zero(),
        shortfall: Quote::zero(),
    }
}

// every margin, fee and pnl figure below is at most the intent's notional, or
// for a merge the combined size at the higher of entry and fill price
fn ensure_representable(existing: Option<&Position>, intent: &OrderIntent) -> Result<(), ExecutionError> {
    let too_large = || {
        ExecutionError::InvalidOrder(format!(
            "{} {} @ {} is too large to price",
            intent.symbol, intent.size, intent.execution_price
        ))
    };

    checked_notional(intent.size, intent.execution_price).ok_or_else(too_large)?;
    if let Some(position) = existing.filter(|p| p.side == intent.side) {
        let size = position.size.checked_add(intent.size).ok_or_else(too_large)?;
        checked_notional(size, position.entry_price.max(intent.execution_price)).ok_or_else(too_large)?;
    }
    Ok(())
}

fn ensure_affordable(account: &Account, required: Quote, unrealized: Quote, ctx: &ExecutionContext) -> Result<(), ExecutionError> {
    let available = available_balance(account.cash_balance, unrealized, ctx.pending_order_margin);
    if required > available {
        return Err(ExecutionError::InsufficientMargin { required, available });
    }
    Ok(())
}

fn open_leg(
    account: &mut Account,
    intent: &OrderIntent,
    size: Decimal,
    unrealized: Quote,
    ctx: &ExecutionContext,
) -> Result<(Position, Quote), ExecutionError> {
    let price = intent.execution_price;
    let margin = required_margin(size, price, intent.leverage);
    let fee = trading_fee(notional(size, price), ctx.fee_rate(intent.kind));
    let required = margin.add(fee);

    ensure_affordable(account, required, unrealized, ctx)?;
    account.apply_clamped(required.negate());

    let position = Position::open(
        account.id,
        intent.symbol.clone(),
        intent.side,
        size,
        price,
        intent.leverage,
        intent.margin_mode,
        ctx.now,
    );
    Ok((position, fee))
}

fn merge_leg(
    account: &mut Account,
    position: &Position,
    intent: &OrderIntent,
    ctx: &ExecutionContext,
) -> Result<(Position, Quote), ExecutionError> {
    if intent.leverage != position.leverage {
        debug!(
            position = %position.id,
            requested = %intent.leverage,
            kept = %position.leverage,
            "merge keeps the position's leverage"
        );
    }

    let price = intent.execution_price;
    let merged = merge_position(position, intent.size, price, ctx.now);
    let added_margin = merged.margin.sub(position.margin);
    let fee = trading_fee(notional(intent.size, price), ctx.fee_rate(intent.kind));
    let required = added_margin.add(fee);

    let unrealized = ctx.other_unrealized_pnl.add(position.unrealized_pnl(price));
    ensure_affordable(account, required, unrealized, ctx)?;
    account.apply_clamped(required.negate());

    Ok((merged, fee))
}

struct CloseLeg {
    remaining: Option<Position>,
    trade: ClosedTrade,
    fee: Quote,
    shortfall: Quote,
}

fn close_leg(
    account: &mut Account,
    position: &Position,
    size: Decimal,
    intent: &OrderIntent,
    ctx: &ExecutionContext,
) -> CloseLeg {
    let price = intent.execution_price;
    let reduction = reduce_position(position, size, price, ctx.now);
    let fee = trading_fee(notional(reduction.closed_size, price), ctx.fee_rate(intent.kind));

    let delta = reduction.margin_returned.add(reduction.realized_pnl).sub(fee);
    let shortfall = account.apply_clamped(delta);

    let trade = ClosedTrade::from_close(position, reduction.closed_size, price, reduction.realized_pnl, fee, ctx.now);

    CloseLeg {
        remaining: reduction.remaining,
        trade,
        fee,
        shortfall,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountId, Leverage, MarginMode, Price, Side, Symbol};
    use rust_decimal_macros::dec;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(Timestamp::from_millis(1_000), FeeConfig::default(), dec!(40))
    }

    fn zero_fee_ctx() -> ExecutionContext {
        let fees = FeeConfig {
            maker_fee_rate: Decimal::ZERO,
            taker_fee_rate: Decimal::ZERO,
        };
        ExecutionContext::new(Timestamp::from_millis(1_000), fees, dec!(40))
    }

    fn account(cash: Decimal) -> Account {
        Account::new(AccountId::new(), Quote::new(cash), Timestamp::from_millis(0))
    }

    fn intent(side: Side, size: Decimal, price: Decimal, leverage: Decimal) -> OrderIntent {
        OrderIntent {
            symbol: Symbol::new("BTC"),
            side,
            size,
            execution_price: Price::new_unchecked(price),
            leverage: Leverage::new(leverage).unwrap(),
            margin_mode: MarginMode::Cross,
            kind: OrderKind::Market,
        }
    }

    fn run(acc: &Account, pos: Option<&Position>, i: &OrderIntent, c: &ExecutionContext) -> Execution {
        execute(acc, pos, i, c).unwrap()
    }

    #[test]
    fn open_reference_scenario() {
        let acc = account(dec!(10000));
        let exec = run(&acc, None, &intent(Side::Long, dec!(1), dec!(50000), dec!(10)), &ctx());

        assert_eq!(exec.account.cash_balance.value(), dec!(4977.5));
        assert_eq!(exec.fee.value(), dec!(22.5));
        let pos = exec.position().unwrap();
        assert_eq!(pos.margin.value(), dec!(5000));
        assert_eq!(pos.liquidation_price.value(), dec!(45250));
        assert!(matches!(exec.change, PositionChange::Opened(_)));
        assert!(exec.closed_trade.is_none());
    }

    #[test]
    fn limit_fill_pays_maker() {
        let acc = account(dec!(10000));
        let mut i = intent(Side::Long, dec!(1), dec!(50000), dec!(10));
        i.kind = OrderKind::Limit;
        let exec = run(&acc, None, &i, &ctx());
        // 50000 * 0.00015
        assert_eq!(exec.fee.value(), dec!(7.5));
        assert_eq!(exec.account.cash_balance.value(), dec!(4992.5));
    }

    #[test]
    fn open_rejects_when_margin_plus_fee_exceeds_available() {
        let acc = account(dec!(5000));
        let err = execute(&acc, None, &intent(Side::Long, dec!(1), dec!(50000), dec!(10)), &ctx()).unwrap_err();
        assert_eq!(
            err,
            ExecutionError::InsufficientMargin {
                required: Quote::new(dec!(5022.5)),
                available: Quote::new(dec!(5000)),
            }
        );
    }

    #[test]
    fn open_counts_losses_and_reservations() {
        let acc = account(dec!(6000));
        let c = ctx()
            .with_unrealized_pnl(Quote::new(dec!(-500)))
            .with_pending_order_margin(Quote::new(dec!(600)));
        let err = execute(&acc, None, &intent(Side::Long, dec!(1), dec!(50000), dec!(10)), &c).unwrap_err();
        assert!(matches!(err, ExecutionError::InsufficientMargin { .. }));

        // profits elsewhere do not help
        let c = ctx().with_unrealized_pnl(Quote::new(dec!(100000)));
        let acc = account(dec!(5000));
        assert!(execute(&acc, None, &intent(Side::Long, dec!(1), dec!(50000), dec!(10)), &c).is_err());
    }

    #[test]
    fn leverage_above_cap_rejected() {
        let acc = account(dec!(10000));
        let err = execute(&acc, None, &intent(Side::Long, dec!(0.1), dec!(50000), dec!(50)), &ctx()).unwrap_err();
        assert_eq!(
            err,
            ExecutionError::InvalidLeverage {
                requested: dec!(50),
                max: dec!(40)
            }
        );
    }

    #[test]
    fn zero_size_rejected() {
        let acc = account(dec!(10000));
        let err = execute(&acc, None, &intent(Side::Long, dec!(0), dec!(100), dec!(2)), &ctx()).unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidOrder(_)));
    }

    #[test]
    fn foreign_position_rejected() {
        let acc = account(dec!(10000));
        let other = account(dec!(10000));
        let opened = run(&other, None, &intent(Side::Long, dec!(1), dec!(100), dec!(2)), &ctx());
        let err = execute(&acc, opened.position(), &intent(Side::Long, dec!(1), dec!(100), dec!(2)), &ctx()).unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidOrder(_)));
    }

    #[test]
    fn merge_weighted_entry() {
        let acc = account(dec!(10000));
        let c = zero_fee_ctx();
        let first = run(&acc, None, &intent(Side::Long, dec!(1), dec!(100), dec!(10)), &c);
        let second = run(&first.account, first.position(), &intent(Side::Long, dec!(1), dec!(120), dec!(10)), &c);

        let pos = second.position().unwrap();
        assert_eq!(pos.size, dec!(2));
        assert_eq!(pos.entry_price.value(), dec!(110));
        assert_eq!(pos.id, first.position().unwrap().id);
        assert_eq!(pos.liquidation_price.value(), dec!(99.55));
        // 10 + 12 margin
        assert_eq!(pos.margin.value(), dec!(22));
        assert_eq!(second.account.cash_balance.value(), dec!(9978));
    }

    #[test]
    fn merge_keeps_position_leverage() {
        let acc = account(dec!(10000));
        let c = zero_fee_ctx();
        let first = run(&acc, None, &intent(Side::Short, dec!(1), dec!(100), dec!(5)), &c);
        let second = run(&first.account, first.position(), &intent(Side::Short, dec!(1), dec!(100), dec!(20)), &c);
        let pos = second.position().unwrap();
        assert_eq!(pos.leverage.value(), dec!(5));
        assert_eq!(pos.margin.value(), dec!(40));
    }

    #[test]
    fn reduce_realizes_slice_only() {
        let acc = account(dec!(10000));
        let c = ctx();
        let open = run(&acc, None, &intent(Side::Long, dec!(2), dec!(100), dec!(10)), &c);
        let cash_after_open = open.account.cash_balance;

        let reduce = run(&open.account, open.position(), &intent(Side::Short, dec!(0.5), dec!(110), dec!(10)), &c);

        let pos = reduce.position().unwrap();
        assert_eq!(pos.size, dec!(1.5));
        assert_eq!(pos.entry_price.value(), dec!(100));
        assert_eq!(pos.margin.value(), dec!(15));

        let trade = reduce.closed_trade.as_ref().unwrap();
        assert_eq!(trade.size, dec!(0.5));
        assert_eq!(trade.pnl.value(), dec!(5));
        assert!(!trade.liquidated);

        // margin 5 + pnl 5 - fee (55 * 0.00045)
        let expected = cash_after_open.value() + dec!(5) + dec!(5) - dec!(0.02475);
        assert_eq!(reduce.account.cash_balance.value(), expected);
    }

    #[test]
    fn open_then_close_same_price_costs_two_fees() {
        let acc = account(dec!(10000));
        let c = ctx();
        let open = run(&acc, None, &intent(Side::Short, dec!(3), dec!(2000), dec!(5)), &c);
        let close = run(&open.account, open.position(), &intent(Side::Long, dec!(3), dec!(2000), dec!(5)), &c);

        let trade = close.closed_trade.as_ref().unwrap();
        assert!(trade.pnl.is_zero());
        assert!(close.position().is_none());
        assert!(matches!(close.change, PositionChange::Closed(_)));

        // 6000 notional each side at 0.045%
        let fees = dec!(2.7) + dec!(2.7);
        assert_eq!(close.account.cash_balance.value(), dec!(10000) - fees);
    }

    #[test]
    fn flip_closes_and_reopens_remainder() {
        let acc = account(dec!(10000));
        let c = ctx();
        let open = run(&acc, None, &intent(Side::Long, dec!(2), dec!(100), dec!(10)), &c);
        let flip = run(&open.account, open.position(), &intent(Side::Short, dec!(5), dec!(100), dec!(10)), &c);

        let pos = flip.position().unwrap();
        assert_eq!(pos.side, Side::Short);
        assert_eq!(pos.size, dec!(3));
        assert_eq!(pos.entry_price.value(), dec!(100));
        assert!(pos.liquidation_price > pos.entry_price);
        assert_ne!(pos.id, open.position().unwrap().id);

        let trade = flip.closed_trade.as_ref().unwrap();
        assert_eq!(trade.size, dec!(2));
        assert!(trade.pnl.is_zero());
        assert_eq!(trade.side, Side::Long);

        let removed = flip.change.removed_position().unwrap();
        assert_eq!(removed.id, open.position().unwrap().id);

        // fees on 200 closed + 300 opened notional
        assert_eq!(flip.fee.value(), dec!(0.225));
    }

    #[test]
    fn flip_is_atomic_when_remainder_unaffordable() {
        let acc = account(dec!(100));
        let c = zero_fee_ctx();
        let open = run(&acc, None, &intent(Side::Long, dec!(1), dec!(100), dec!(1)), &c);
        assert!(open.account.cash_balance.is_zero());

        // closing returns 100, reopening 2 @100 at 1x needs 200
        let err = execute(&open.account, open.position(), &intent(Side::Short, dec!(3), dec!(100), dec!(1)), &c).unwrap_err();
        assert!(matches!(err, ExecutionError::InsufficientMargin { .. }));
    }

    #[test]
    fn losing_close_floors_cash() {
        let acc = account(dec!(10));
        let c = zero_fee_ctx();
        let open = run(&acc, None, &intent(Side::Long, dec!(1), dec!(100), dec!(10)), &c);
        assert_eq!(open.account.cash_balance.value(), dec!(0));

        // price gapped far through liquidation: loss 50 against margin 10
        let close = run(&open.account, open.position(), &intent(Side::Short, dec!(1), dec!(50), dec!(10)), &c);
        assert_eq!(close.account.cash_balance, Quote::zero());
        assert_eq!(close.shortfall.value(), dec!(40));
        assert_eq!(close.closed_trade.unwrap().pnl.value(), dec!(-50));
    }

    #[test]
    fn liquidation_keeps_cash_and_forfeits_margin() {
        let acc = account(dec!(1000));
        let open = run(&acc, None, &intent(Side::Long, dec!(10), dec!(100), dec!(10)), &ctx());
        let pos = open.position().unwrap().clone();
        assert_eq!(pos.liquidation_price.value(), dec!(90.5));

        let exec = liquidate(&open.account, &pos, Timestamp::from_millis(2_000));
        assert_eq!(exec.account.cash_balance, open.account.cash_balance);
        assert!(exec.position().is_none());
        let trade = exec.closed_trade.unwrap();
        assert!(trade.liquidated);
        assert_eq!(trade.pnl, pos.margin.negate());
        assert_eq!(trade.exit_price.value(), dec!(90.5));
    }

    #[test]
    fn plan_covers_all_cases() {
        let acc = account(dec!(10000));
        let open = run(&acc, None, &intent(Side::Long, dec!(2), dec!(100), dec!(10)), &ctx());
        let pos = open.position();

        assert_eq!(plan(None, &intent(Side::Long, dec!(1), dec!(1), dec!(1))), ExecutionPlan::Open);
        assert!(matches!(plan(pos, &intent(Side::Long, dec!(1), dec!(1), dec!(1))), ExecutionPlan::Merge(_)));
        assert!(matches!(plan(pos, &intent(Side::Short, dec!(1), dec!(1), dec!(1))), ExecutionPlan::Reduce(_)));
        assert!(matches!(plan(pos, &intent(Side::Short, dec!(2), dec!(1), dec!(1))), ExecutionPlan::Close(_)));
        assert!(matches!(
            plan(pos, &intent(Side::Short, dec!(2.5), dec!(1), dec!(1))),
            ExecutionPlan::Flip { remainder, .. } if remainder == dec!(0.5)
        ));
    }

    #[test]
    fn unpriceable_orders_are_rejected() {
        let acc = account(dec!(10000));
        let huge = intent(Side::Long, dec!(100000000000000000000), dec!(10000000000), dec!(10));
        assert!(matches!(execute(&acc, None, &huge, &ctx()), Err(ExecutionError::InvalidOrder(_))));

        // each fill fits on its own, the merged position would not
        let rich = account(dec!(1000000000000000000000000000));
        let open = run(&rich, None, &intent(Side::Long, dec!(1000000000000000000), dec!(10000000000), dec!(40)), &ctx());
        let add = intent(Side::Long, dec!(1000000000000000000), dec!(50000000000), dec!(40));
        let err = execute(&open.account, open.position(), &add, &ctx()).unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidOrder(msg) if msg.contains("too large")));
    }
}
