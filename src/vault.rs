//! Per-market vault.
//!
//! `collateral` holds every posted margin and is the counterparty to realized pnl.
//! `ecosystem_fund` collects the protocol's fee share and backs bad debt. Quote never appears
//! or disappears: each movement here is matched by one on a trader balance, a liquidator
//! reward, or the other bucket.

use crate::numeric::ArithmeticError;
use crate::types::{Pair, Quote};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vault {
    pub pair: Pair,
    pub collateral: Quote,
    pub ecosystem_fund: Quote,
    /// Lifetime fees routed to the ecosystem fund.
    pub total_fees: Quote,
    /// Lifetime shortfall the ecosystem fund absorbed.
    pub total_bad_debt: Quote,
}

impl Vault {
    pub fn new(pair: Pair) -> Self {
        Self {
            pair,
            collateral: Quote::zero(),
            ecosystem_fund: Quote::zero(),
            total_fees: Quote::zero(),
            total_bad_debt: Quote::zero(),
        }
    }

    /// Seeds the ecosystem fund from outside the market (genesis, treasury top-ups).
    pub fn fund(&mut self, amount: Quote) -> Result<(), ArithmeticError> {
        self.ecosystem_fund = self.ecosystem_fund.checked_add(amount)?;
        Ok(())
    }

    pub fn lock_margin(&mut self, amount: Quote) -> Result<(), ArithmeticError> {
        self.collateral = self.collateral.checked_add(amount)?;
        Ok(())
    }

    /// Pays out of collateral: trader proceeds, returned margin, liquidator rewards.
    pub fn release(&mut self, amount: Quote) -> Result<(), ArithmeticError> {
        self.collateral = self.collateral.checked_sub(amount)?;
        if self.collateral.is_negative() {
            warn!(pair = %self.pair, collateral = %self.collateral, "vault collateral below zero");
        }
        Ok(())
    }

    /// Fee paid straight from a trader balance.
    pub fn collect_fee(&mut self, amount: Quote) -> Result<(), ArithmeticError> {
        self.ecosystem_fund = self.ecosystem_fund.checked_add(amount)?;
        self.total_fees = self.total_fees.checked_add(amount)?;
        Ok(())
    }

    /// Fee carved out of margin already sitting in collateral.
    pub fn collect_fee_from_collateral(&mut self, amount: Quote) -> Result<(), ArithmeticError> {
        self.collateral = self.collateral.checked_sub(amount)?;
        self.collect_fee(amount)
    }

    /// Moves a shortfall from the ecosystem fund into collateral. Never fails on an empty fund:
    /// the fund goes negative and the deficit is logged.
    pub fn absorb_bad_debt(&mut self, amount: Quote) -> Result<(), ArithmeticError> {
        if !amount.is_positive() {
            return Ok(());
        }
        let covered = self.can_cover(amount);
        self.ecosystem_fund = self.ecosystem_fund.checked_sub(amount)?;
        self.collateral = self.collateral.checked_add(amount)?;
        self.total_bad_debt = self.total_bad_debt.checked_add(amount)?;

        if !covered {
            warn!(
                pair = %self.pair,
                bad_debt = %amount,
                ecosystem_fund = %self.ecosystem_fund,
                "ecosystem fund in deficit after absorbing bad debt"
            );
        }
        Ok(())
    }

    pub fn can_cover(&self, amount: Quote) -> bool {
        self.ecosystem_fund >= amount
    }

    /// Collateral plus ecosystem fund.
    pub fn total(&self) -> Result<Quote, ArithmeticError> {
        self.collateral.checked_add(self.ecosystem_fund)
    }
}

/// How a position's final equity is split when it leaves the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EquitySettlement {
    pub fee: Quote,
    pub payout: Quote,
    pub bad_debt: Quote,
}

/// Voluntary close. The fee is capped by whatever equity is left; only a negative equity
/// becomes bad debt.
pub fn settle_close(equity: Quote, fee: Quote) -> Result<EquitySettlement, ArithmeticError> {
    let fee = fee.min(equity.floor_zero());
    let payout = equity.checked_sub(fee)?.floor_zero();
    let bad_debt = equity.negate().floor_zero();
    Ok(EquitySettlement { fee, payout, bad_debt })
}

/// Full liquidation. The fee is always collected; equity short of it is bad debt.
pub fn settle_liquidation(equity: Quote, fee: Quote) -> Result<EquitySettlement, ArithmeticError> {
    let remainder = equity.checked_sub(fee)?;
    Ok(EquitySettlement {
        fee,
        payout: remainder.floor_zero(),
        bad_debt: remainder.negate().floor_zero(),
    })
}
