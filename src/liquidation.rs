//! Liquidation policy and fee distribution.
//!
//! A position below maintenance margin is either trimmed (partial) or closed outright (full),
//! depending on how deep it sits. The liquidation fee is charged on the quote exchanged by the
//! unwind and split between the liquidator and the ecosystem fund.

use crate::market::MarketParams;
use crate::numeric::{self, ceil_amount, floor_amount, ArithmeticError};
use crate::types::Quote;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationKind {
    Partial,
    Full,
}

/// Above the full-liquidation ratio only a slice is closed; at or below it everything goes.
pub fn choose_liquidation(margin_ratio: Decimal, params: &MarketParams) -> LiquidationKind {
    if margin_ratio > params.full_liquidation_ratio {
        LiquidationKind::Partial
    } else {
        LiquidationKind::Full
    }
}

/// Base size a partial liquidation closes. `None` when the slice rounds to nothing or to the
/// whole position, in which case the liquidation is full.
pub fn partial_liquidation_size(size: Decimal, params: &MarketParams) -> Result<Option<Decimal>, ArithmeticError> {
    let slice = floor_amount(numeric::mul(size, params.partial_liquidation_ratio)?);
    if slice <= Decimal::ZERO || slice >= size {
        return Ok(None);
    }
    Ok(Some(slice))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationPenalty {
    pub total: Quote,
    pub liquidator_reward: Quote,
    pub ecosystem_fund_share: Quote,
}

// fee is ceiled (the trader pays), the liquidator's cut floored, the fund keeps the dust.
pub fn calculate_liquidation_penalty(
    exchanged_quote: Quote,
    params: &MarketParams,
) -> Result<LiquidationPenalty, ArithmeticError> {
    let total = ceil_amount(numeric::mul(exchanged_quote.value(), params.liquidation_fee_ratio)?);
    let liquidator_share = numeric::sub(Decimal::ONE, params.ecosystem_fund_fee_split)?;
    let liquidator_reward = floor_amount(numeric::mul(total, liquidator_share)?);
    let ecosystem_fund_share = numeric::sub(total, liquidator_reward)?;

    Ok(LiquidationPenalty {
        total: Quote::new(total),
        liquidator_reward: Quote::new(liquidator_reward),
        ecosystem_fund_share: Quote::new(ecosystem_fund_share),
    })
}

/// Exchange fee on traded notional. Ceiled: the trader pays it.
pub fn calculate_exchange_fee(notional: Quote, params: &MarketParams) -> Result<Quote, ArithmeticError> {
    Ok(Quote::new(ceil_amount(numeric::mul(
        notional.value(),
        params.exchange_fee_ratio,
    )?)))
}
