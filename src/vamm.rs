//! Virtual constant-product market.
//!
//! Each market prices trades against synthetic reserves with `base * quote = k`. Nobody
//! deposits into these reserves; they only exist to give every trade a deterministic
//! price impact. The leg the curve computes is always rounded up on the reserve side,
//! which floors what the trader receives and ceils what the trader pays.

use crate::numeric::{self, ceil_amount, ArithmeticError};
use crate::types::Price;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which way the named asset moves relative to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    AddToPool,
    RemoveFromPool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CurveError {
    #[error("insufficient liquidity: swap would drain the {reserve} reserve")]
    InsufficientLiquidity { reserve: &'static str },

    #[error("swap of {amount} exceeds trade limit of {limit} on the {reserve} reserve")]
    TradeLimitExceeded {
        reserve: &'static str,
        amount: Decimal,
        limit: Decimal,
    },

    #[error("swap amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
}

/// Whether a swap is held to the per-trade size limit. Liquidations skip it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeLimit {
    Enforce,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualPool {
    pub base_reserve: Decimal,
    pub quote_reserve: Decimal,
    /// Fixed at creation. Reserves are re-derived from it on every swap.
    pub k: Decimal,
    /// Largest fraction of a reserve a single swap may move.
    pub trade_limit_ratio: Decimal,
}

/// Result of a curve computation: the trader's leg plus the reserves it leaves behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapQuote {
    pub amount: Decimal,
    pub base_reserve: Decimal,
    pub quote_reserve: Decimal,
}

impl VirtualPool {
    pub fn new(
        base_reserve: Decimal,
        quote_reserve: Decimal,
        trade_limit_ratio: Decimal,
    ) -> Result<Self, CurveError> {
        if base_reserve <= Decimal::ZERO {
            return Err(CurveError::InsufficientLiquidity { reserve: "base" });
        }
        if quote_reserve <= Decimal::ZERO {
            return Err(CurveError::InsufficientLiquidity { reserve: "quote" });
        }
        let k = numeric::mul(base_reserve, quote_reserve)?;
        Ok(Self {
            base_reserve,
            quote_reserve,
            k,
            trade_limit_ratio,
        })
    }

    /// Mark price used for margin and funding.
    pub fn spot_price(&self) -> Result<Price, CurveError> {
        let price = numeric::div(self.quote_reserve, self.base_reserve)?;
        Price::new(price).ok_or(CurveError::InsufficientLiquidity { reserve: "quote" })
    }

    fn check_trade_limit(
        &self,
        reserve_name: &'static str,
        reserve: Decimal,
        amount: Decimal,
        limit: TradeLimit,
    ) -> Result<(), CurveError> {
        if limit == TradeLimit::Skip {
            return Ok(());
        }
        let max = numeric::mul(reserve, self.trade_limit_ratio)?;
        if amount > max {
            return Err(CurveError::TradeLimitExceeded {
                reserve: reserve_name,
                amount,
                limit: max,
            });
        }
        Ok(())
    }

    /// Base amount moved when `quote_amount` of quote goes `direction`.
    /// AddToPool: trader pays quote, receives base. RemoveFromPool: trader receives quote, pays base.
    pub fn get_base_amount(
        &self,
        direction: Direction,
        quote_amount: Decimal,
        limit: TradeLimit,
    ) -> Result<SwapQuote, CurveError> {
        if quote_amount <= Decimal::ZERO {
            return Err(CurveError::NonPositiveAmount(quote_amount));
        }
        self.check_trade_limit("quote", self.quote_reserve, quote_amount, limit)?;

        let quote_after = match direction {
            Direction::AddToPool => numeric::add(self.quote_reserve, quote_amount)?,
            Direction::RemoveFromPool => numeric::sub(self.quote_reserve, quote_amount)?,
        };
        if quote_after <= Decimal::ZERO {
            return Err(CurveError::InsufficientLiquidity { reserve: "quote" });
        }

        let base_after = ceil_amount(numeric::div(self.k, quote_after)?);
        let amount = match direction {
            Direction::AddToPool => numeric::sub(self.base_reserve, base_after)?,
            Direction::RemoveFromPool => numeric::sub(base_after, self.base_reserve)?,
        };
        if amount <= Decimal::ZERO {
            // quote leg too small to move base by one unit
            return Err(CurveError::NonPositiveAmount(amount));
        }

        Ok(SwapQuote {
            amount,
            base_reserve: base_after,
            quote_reserve: quote_after,
        })
    }

    /// Quote amount moved when `base_amount` of base goes `direction`.
    /// AddToPool: trader pays base, receives quote. RemoveFromPool: trader receives base, pays quote.
    pub fn get_quote_amount(
        &self,
        direction: Direction,
        base_amount: Decimal,
        limit: TradeLimit,
    ) -> Result<SwapQuote, CurveError> {
        if base_amount <= Decimal::ZERO {
            return Err(CurveError::NonPositiveAmount(base_amount));
        }
        self.check_trade_limit("base", self.base_reserve, base_amount, limit)?;

        let base_after = match direction {
            Direction::AddToPool => numeric::add(self.base_reserve, base_amount)?,
            Direction::RemoveFromPool => numeric::sub(self.base_reserve, base_amount)?,
        };
        if base_after <= Decimal::ZERO {
            return Err(CurveError::InsufficientLiquidity { reserve: "base" });
        }

        let quote_after = ceil_amount(numeric::div(self.k, base_after)?);
        let amount = match direction {
            Direction::AddToPool => numeric::sub(self.quote_reserve, quote_after)?,
            Direction::RemoveFromPool => numeric::sub(quote_after, self.quote_reserve)?,
        };

        Ok(SwapQuote {
            amount: amount.max(Decimal::ZERO),
            base_reserve: base_after,
            quote_reserve: quote_after,
        })
    }

    pub fn swap_quote_for_base(
        &mut self,
        direction: Direction,
        quote_amount: Decimal,
        limit: TradeLimit,
    ) -> Result<Decimal, CurveError> {
        let quote = self.get_base_amount(direction, quote_amount, limit)?;
        self.apply(&quote);
        Ok(quote.amount)
    }

    pub fn swap_base_for_quote(
        &mut self,
        direction: Direction,
        base_amount: Decimal,
        limit: TradeLimit,
    ) -> Result<Decimal, CurveError> {
        let quote = self.get_quote_amount(direction, base_amount, limit)?;
        self.apply(&quote);
        Ok(quote.amount)
    }

    /// Commits a previously computed quote. Both reserves move together.
    pub fn apply(&mut self, quote: &SwapQuote) {
        self.base_reserve = quote.base_reserve;
        self.quote_reserve = quote.quote_reserve;
    }

    /// `base * quote - k`. Never negative; bounded by rounding on the derived leg.
    pub fn invariant_surplus(&self) -> Result<Decimal, ArithmeticError> {
        numeric::sub(numeric::mul(self.base_reserve, self.quote_reserve)?, self.k)
    }
}
