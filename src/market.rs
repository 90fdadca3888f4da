//! Market configuration and state.
//!
//! A market represents a single trading pair with its own virtual pool,
//! funding state, and risk parameters. Risk parameters are per market and
//! set at creation; nothing here is a hard-coded protocol constant.

use crate::funding::FundingState;
use crate::numeric;
use crate::types::{Leverage, Pair, Price, Timestamp};
use crate::vamm::{CurveError, VirtualPool};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Per-market risk and fee parameters. Missing fields in a config document take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketParams {
    pub max_leverage: Leverage,
    /// Margin ratio a position must keep after margin is withdrawn.
    pub initial_margin_ratio: Decimal,
    /// Below this a position is liquidatable.
    pub maintenance_margin_ratio: Decimal,
    /// At or below this a liquidation closes the whole position.
    pub full_liquidation_ratio: Decimal,
    /// Fraction of size closed by a partial liquidation.
    pub partial_liquidation_ratio: Decimal,
    /// Fee on liquidated notional.
    pub liquidation_fee_ratio: Decimal,
    /// Share of the liquidation fee routed to the ecosystem fund; the liquidator keeps the rest.
    pub ecosystem_fund_fee_split: Decimal,
    /// Fee on traded notional, paid into the ecosystem fund.
    pub exchange_fee_ratio: Decimal,
    pub trade_limit_ratio: Decimal,
    pub funding_epoch_ms: i64,
    pub epochs_per_funding_period: u32,
    /// Cap on |mark - index| / index fed into one epoch's premium.
    pub max_funding_rate: Decimal,
}

impl Default for MarketParams {
    fn default() -> Self {
        Self {
            max_leverage: Leverage::TEN,
            initial_margin_ratio: dec!(0.1),
            maintenance_margin_ratio: dec!(0.0625),
            full_liquidation_ratio: dec!(0.025),
            partial_liquidation_ratio: dec!(0.25),
            liquidation_fee_ratio: dec!(0.025),
            ecosystem_fund_fee_split: dec!(0.5),
            exchange_fee_ratio: Decimal::ZERO,
            trade_limit_ratio: dec!(0.1),
            funding_epoch_ms: 60 * 60 * 1000,
            epochs_per_funding_period: 24,
            max_funding_rate: dec!(0.01),
        }
    }
}

impl MarketParams {
    pub fn validate(&self) -> Result<(), MarketError> {
        let fraction = |name: &'static str, v: Decimal, allow_zero: bool| {
            let low_ok = if allow_zero { v >= Decimal::ZERO } else { v > Decimal::ZERO };
            if low_ok && v <= Decimal::ONE {
                Ok(())
            } else {
                Err(MarketError::InvalidParams {
                    reason: format!("{name} must be in (0, 1], got {v}"),
                })
            }
        };

        if self.max_leverage.value() <= Decimal::ZERO {
            return Err(MarketError::InvalidParams {
                reason: "max_leverage must be positive".to_string(),
            });
        }
        fraction("initial_margin_ratio", self.initial_margin_ratio, false)?;
        fraction("maintenance_margin_ratio", self.maintenance_margin_ratio, false)?;
        fraction("full_liquidation_ratio", self.full_liquidation_ratio, false)?;
        fraction("partial_liquidation_ratio", self.partial_liquidation_ratio, false)?;
        fraction("liquidation_fee_ratio", self.liquidation_fee_ratio, true)?;
        fraction("ecosystem_fund_fee_split", self.ecosystem_fund_fee_split, true)?;
        fraction("exchange_fee_ratio", self.exchange_fee_ratio, true)?;
        fraction("trade_limit_ratio", self.trade_limit_ratio, false)?;
        fraction("max_funding_rate", self.max_funding_rate, true)?;

        if self.full_liquidation_ratio >= self.maintenance_margin_ratio {
            return Err(MarketError::InvalidParams {
                reason: "full liquidation ratio must sit below maintenance".to_string(),
            });
        }
        if self.maintenance_margin_ratio >= self.initial_margin_ratio {
            return Err(MarketError::InvalidParams {
                reason: "maintenance ratio must sit below initial".to_string(),
            });
        }
        if self.funding_epoch_ms <= 0 || self.epochs_per_funding_period == 0 {
            return Err(MarketError::InvalidParams {
                reason: "funding epoch settings must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub pair: Pair,
    pub pool: VirtualPool,
    pub params: MarketParams,
    pub funding: FundingState,
    /// Total open long size, in base.
    pub open_interest_long: Decimal,
    /// Total open short size, in base.
    pub open_interest_short: Decimal,
    pub created_at: Timestamp,
}

impl Market {
    pub fn new(
        pair: Pair,
        base_reserve: Decimal,
        quote_reserve: Decimal,
        params: MarketParams,
        timestamp: Timestamp,
    ) -> Result<Self, MarketError> {
        params.validate()?;
        let pool = VirtualPool::new(base_reserve, quote_reserve, params.trade_limit_ratio)?;
        Ok(Self {
            pair,
            pool,
            params,
            funding: FundingState::new(timestamp),
            open_interest_long: Decimal::ZERO,
            open_interest_short: Decimal::ZERO,
            created_at: timestamp,
        })
    }

    pub fn mark_price(&self) -> Result<Price, CurveError> {
        self.pool.spot_price()
    }

    /// Current cumulative funding index.
    pub fn funding_index(&self) -> Decimal {
        self.funding.cumulative_premium_fraction
    }

    pub fn add_open_interest(&mut self, long_delta: Decimal, short_delta: Decimal) -> Result<(), numeric::ArithmeticError> {
        self.open_interest_long = numeric::add(self.open_interest_long, long_delta)?;
        self.open_interest_short = numeric::add(self.open_interest_short, short_delta)?;

        // rounding on partial closes can leave dust below zero
        if self.open_interest_long < Decimal::ZERO {
            self.open_interest_long = Decimal::ZERO;
        }
        if self.open_interest_short < Decimal::ZERO {
            self.open_interest_short = Decimal::ZERO;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarketError {
    #[error("invalid market params: {reason}")]
    InvalidParams { reason: String },

    #[error(transparent)]
    Curve(#[from] CurveError),
}
