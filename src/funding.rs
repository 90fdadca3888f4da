// 5.0: funding. once per epoch the gap between the vamm mark and the oracle index is folded
// into a cumulative index; positions settle lazily against it whenever they are touched.
// 5.0 has the state struct. 5.1 has the premium math. 5.2 has per-position settlement.

use crate::market::MarketParams;
use crate::numeric::{self, floor_amount, ArithmeticError};
use crate::types::{Price, Quote, Side, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingState {
    /// Quote owed per unit of long base since market creation. Shorts receive it.
    pub cumulative_premium_fraction: Decimal,
    /// Premium added by the most recent epoch.
    pub last_premium_fraction: Decimal,
    pub last_settlement: Timestamp,
    pub epoch: u64,
}

impl FundingState {
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            cumulative_premium_fraction: Decimal::ZERO,
            last_premium_fraction: Decimal::ZERO,
            last_settlement: timestamp,
            epoch: 0,
        }
    }

    pub fn is_due(&self, now: Timestamp, params: &MarketParams) -> bool {
        now.millis_since(&self.last_settlement) >= params.funding_epoch_ms
    }
}

// 5.1: mark above index = longs pay. capped at max_funding_rate of the index price.
pub fn calculate_premium_fraction(
    mark_price: Price,
    index_price: Price,
    params: &MarketParams,
) -> Result<Decimal, ArithmeticError> {
    let spread = numeric::sub(mark_price.value(), index_price.value())?;
    let cap = numeric::mul(index_price.value(), params.max_funding_rate)?;
    let clamped = spread.max(-cap).min(cap);
    numeric::div(clamped, Decimal::from(params.epochs_per_funding_period))
}

/// Advances the state by exactly one epoch. The settlement time moves by one epoch length, not
/// to the block time, so boundaries stay on the grid and a late block still owes every epoch
/// it slept through.
pub fn advance_epoch(
    state: &FundingState,
    mark_price: Price,
    index_price: Price,
    params: &MarketParams,
) -> Result<FundingState, ArithmeticError> {
    let premium = calculate_premium_fraction(mark_price, index_price, params)?;
    Ok(FundingState {
        cumulative_premium_fraction: numeric::add(state.cumulative_premium_fraction, premium)?,
        last_premium_fraction: premium,
        last_settlement: state.last_settlement.plus_millis(params.funding_epoch_ms),
        epoch: state.epoch + 1,
    })
}

// 5.2: (current - entry) * size * sign. positive = the position pays.
pub fn calculate_funding_payment(
    side: Side,
    size: Decimal,
    entry_index: Decimal,
    current_index: Decimal,
) -> Result<Quote, ArithmeticError> {
    let delta = numeric::sub(current_index, entry_index)?;
    let payment = numeric::mul(numeric::mul(delta, size)?, side.sign())?;
    Ok(Quote::new(payment))
}

/// Margin after paying (or receiving) `payment`. Floored, so payers round up and receivers down.
pub fn margin_after_funding(margin: Quote, payment: Quote) -> Result<Quote, ArithmeticError> {
    Ok(Quote::new(floor_amount(numeric::sub(margin.value(), payment.value())?)))
}

/// Funding rate as a fraction of the index price, for display.
pub fn premium_as_rate(premium_fraction: Decimal, index_price: Price) -> Result<Decimal, ArithmeticError> {
    numeric::div(premium_fraction, index_price.value())
}
