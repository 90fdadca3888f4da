//! Margin and PnL calculation.
//!
//! Every value here is priced against the live curve: the notional of a position is what a
//! full close would exchange at the current reserves, not `size * spot`. Nothing is cached;
//! reserves and the funding index can move between two reads in the same block.

use crate::market::{Market, MarketParams};
use crate::numeric::{self, ArithmeticError};
use crate::position::Position;
use crate::types::{Quote, Side};
use crate::vamm::{CurveError, Direction, TradeLimit, VirtualPool};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Quote a full close would move at the current reserves. Never held to the trade limit.
pub fn position_notional(pool: &VirtualPool, position: &Position) -> Result<Quote, CurveError> {
    let direction = match position.side {
        Side::Long => Direction::AddToPool,
        Side::Short => Direction::RemoveFromPool,
    };
    let swap = pool.get_quote_amount(direction, position.size, TradeLimit::Skip)?;
    Ok(Quote::new(swap.amount))
}

pub fn unrealized_pnl(pool: &VirtualPool, position: &Position) -> Result<Quote, CurveError> {
    let notional = position_notional(pool, position)?;
    Ok(position.pnl_at(notional)?)
}

/// `equity / notional`. A zero notional has nothing at risk.
pub fn margin_ratio(equity: Quote, notional: Quote) -> Result<Decimal, ArithmeticError> {
    if notional.is_zero() {
        return Ok(Decimal::MAX);
    }
    numeric::div(equity.value(), notional.value())
}

/// Equity above what the initial margin ratio requires. Negative when under-collateralized.
pub fn free_margin(equity: Quote, notional: Quote, initial_margin_ratio: Decimal) -> Result<Quote, ArithmeticError> {
    let required = numeric::mul(notional.value(), initial_margin_ratio)?;
    Ok(Quote::new(numeric::sub(equity.value(), required)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginStatus {
    /// At or above initial margin.
    Healthy,
    /// Between maintenance and initial: cannot withdraw margin, cannot be liquidated.
    Warning,
    Liquidatable,
}

/// Point-in-time health of one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionHealth {
    pub notional: Quote,
    pub unrealized_pnl: Quote,
    /// Margin plus unrealized pnl.
    pub equity: Quote,
    pub margin_ratio: Decimal,
    pub status: MarginStatus,
}

pub fn evaluate_margin_status(ratio: Decimal, params: &MarketParams) -> MarginStatus {
    if ratio < params.maintenance_margin_ratio {
        MarginStatus::Liquidatable
    } else if ratio < params.initial_margin_ratio {
        MarginStatus::Warning
    } else {
        MarginStatus::Healthy
    }
}

pub fn evaluate_health(market: &Market, position: &Position) -> Result<PositionHealth, CurveError> {
    let notional = position_notional(&market.pool, position)?;
    let unrealized_pnl = position.pnl_at(notional)?;
    let equity = position.margin.checked_add(unrealized_pnl)?;
    let margin_ratio = margin_ratio(equity, notional)?;
    let status = evaluate_margin_status(margin_ratio, &market.params);

    Ok(PositionHealth {
        notional,
        unrealized_pnl,
        equity,
        margin_ratio,
        status,
    })
}

pub fn is_liquidatable(market: &Market, position: &Position) -> Result<bool, CurveError> {
    Ok(evaluate_health(market, position)?.status == MarginStatus::Liquidatable)
}

/// Realized leverage of a fresh or grown position against the market cap.
pub fn within_max_leverage(open_notional: Quote, margin: Quote, params: &MarketParams) -> Result<bool, ArithmeticError> {
    if !margin.is_positive() {
        return Ok(false);
    }
    let leverage = numeric::div(open_notional.value(), margin.value())?;
    Ok(leverage <= params.max_leverage.value())
}
