// 4.0: open position tracking. one record per (trader, pair). size is an unsigned base
// magnitude, the side carries direction. pnl = close value - open notional, signed by side.
// 4.1 touch (funding). 4.2 increase. 4.3 reduce.

use crate::funding::{calculate_funding_payment, margin_after_funding};
use crate::numeric::{self, floor_amount, ArithmeticError};
use crate::types::{Address, Pair, Quote, Side, Timestamp};
use crate::vamm::Direction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub trader: Address,
    pub pair: Pair,
    pub side: Side,
    /// Base asset size. Always > 0 while the record exists.
    pub size: Decimal,
    /// Posted collateral in quote, after funding and realized pnl.
    pub margin: Quote,
    /// Quote value at entry.
    pub open_notional: Quote,
    /// Market funding index at last touch.
    pub last_funding_index: Decimal,
    pub opened_at: Timestamp,
    pub updated_at: Timestamp,
    /// Pnl realized by partial closes and liquidations while the position stayed open.
    pub realized_pnl: Quote,
}

impl Position {
    pub fn new(
        trader: Address,
        pair: Pair,
        side: Side,
        size: Decimal,
        margin: Quote,
        open_notional: Quote,
        funding_index: Decimal,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            trader,
            pair,
            side,
            size,
            margin,
            open_notional,
            last_funding_index: funding_index,
            opened_at: timestamp,
            updated_at: timestamp,
            realized_pnl: Quote::zero(),
        }
    }

    /// Direction the quote leg moves when this side opens or grows.
    pub fn open_direction(&self) -> Direction {
        open_direction(self.side)
    }

    /// Direction the base leg moves when this side unwinds.
    pub fn close_direction(&self) -> Direction {
        match self.side {
            Side::Long => Direction::AddToPool,
            Side::Short => Direction::RemoveFromPool,
        }
    }

    /// open notional / margin. None once margin is gone.
    pub fn realized_leverage(&self) -> Option<Decimal> {
        if !self.margin.is_positive() {
            return None;
        }
        numeric::div(self.open_notional.value(), self.margin.value()).ok()
    }

    /// Funding owed since the last touch, without applying it.
    pub fn pending_funding(&self, current_index: Decimal) -> Result<Quote, ArithmeticError> {
        calculate_funding_payment(self.side, self.size, self.last_funding_index, current_index)
    }

    // 4.1: applies outstanding funding to margin and moves the stored index forward.
    // touching twice against the same index is a no-op the second time.
    pub fn touch(&mut self, current_index: Decimal, now: Timestamp) -> Result<Quote, ArithmeticError> {
        let payment = self.pending_funding(current_index)?;
        if !payment.is_zero() {
            self.margin = margin_after_funding(self.margin, payment)?;
        }
        self.last_funding_index = current_index;
        self.updated_at = now;
        Ok(payment)
    }

    /// Signed pnl of unwinding at `close_value` (quote received for a long, paid for a short).
    pub fn pnl_at(&self, close_value: Quote) -> Result<Quote, ArithmeticError> {
        let pnl = match self.side {
            Side::Long => numeric::sub(close_value.value(), self.open_notional.value())?,
            Side::Short => numeric::sub(self.open_notional.value(), close_value.value())?,
        };
        Ok(Quote::new(pnl))
    }

    // 4.2: grows the position. margin and notional add up; funding index is already current.
    pub fn increase(
        &self,
        base_delta: Decimal,
        notional_delta: Quote,
        margin_delta: Quote,
        now: Timestamp,
    ) -> Result<Position, ArithmeticError> {
        Ok(Position {
            size: numeric::add(self.size, base_delta)?,
            margin: self.margin.checked_add(margin_delta)?,
            open_notional: self.open_notional.checked_add(notional_delta)?,
            updated_at: now,
            ..self.clone()
        })
    }

    // 4.3: closes `base_closed` of size that unwound for `exchanged` quote. the closed slice
    // takes its proportional share of open notional; pnl on it moves into margin.
    pub fn reduce(
        &self,
        base_closed: Decimal,
        exchanged: Quote,
        now: Timestamp,
    ) -> Result<PositionUpdate, ArithmeticError> {
        debug_assert!(base_closed > Decimal::ZERO && base_closed <= self.size);

        let closed_notional = if base_closed >= self.size {
            self.open_notional
        } else {
            Quote::new(floor_amount(numeric::div(
                numeric::mul(self.open_notional.value(), base_closed)?,
                self.size,
            )?))
        };

        let realized = match self.side {
            Side::Long => exchanged.checked_sub(closed_notional)?,
            Side::Short => closed_notional.checked_sub(exchanged)?,
        };

        let remaining_size = numeric::sub(self.size, base_closed)?;
        let margin = self.margin.checked_add(realized)?;

        let new_position = if remaining_size > Decimal::ZERO {
            Some(Position {
                size: remaining_size,
                margin,
                open_notional: self.open_notional.checked_sub(closed_notional)?,
                realized_pnl: self.realized_pnl.checked_add(realized)?,
                updated_at: now,
                ..self.clone()
            })
        } else {
            None
        };

        Ok(PositionUpdate {
            new_position,
            realized_pnl: realized,
            equity_released: margin,
        })
    }
}

pub fn open_direction(side: Side) -> Direction {
    match side {
        Side::Long => Direction::AddToPool,
        Side::Short => Direction::RemoveFromPool,
    }
}

#[derive(Debug, Clone)]
pub struct PositionUpdate {
    /// What stays open, if anything.
    pub new_position: Option<Position>,
    pub realized_pnl: Quote,
    /// Margin plus realized pnl. For a full close this is what the trader is owed before fees.
    pub equity_released: Quote,
}
