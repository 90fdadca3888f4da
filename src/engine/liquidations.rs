//! Liquidation execution.
//!
//! A liquidation always completes once the position is under maintenance margin: the unwind
//! skips the per-trade limit and any shortfall is charged to the ecosystem fund.

use super::core::{Engine, Tx};
use super::results::{EngineError, LiquidationResult};
use crate::events::{BadDebtEvent, EventPayload, PositionLiquidatedEvent};
use crate::liquidation::{
    calculate_liquidation_penalty, choose_liquidation, partial_liquidation_size, LiquidationKind,
};
use crate::margin::evaluate_health;
use crate::market::Market;
use crate::msgs::LiquidateRequest;
use crate::position::Position;
use crate::store::KvStore;
use crate::types::{Quote, Side};
use crate::vamm::TradeLimit;
use crate::vault::settle_liquidation;
use rust_decimal::Decimal;
use tracing::{info, warn};

impl<S: KvStore> Engine<S> {
    pub fn liquidate(&mut self, req: LiquidateRequest) -> Result<LiquidationResult, EngineError> {
        self.execute("liquidate", |tx| tx.liquidate(&req))
    }
}

fn closed_interest(side: Side, base: Decimal) -> (Decimal, Decimal) {
    match side {
        Side::Long => (-base, Decimal::ZERO),
        Side::Short => (Decimal::ZERO, -base),
    }
}

impl<S: KvStore> Tx<'_, S> {
    fn liquidate(&mut self, req: &LiquidateRequest) -> Result<LiquidationResult, EngineError> {
        let market = self.market(&req.pair)?;
        let mut position = self.existing_position(&req.pair, &req.trader)?;
        self.touch(&market, &mut position)?;

        let health = evaluate_health(&market, &position)?;
        let maintenance = market.params.maintenance_margin_ratio;
        if health.margin_ratio >= maintenance {
            return Err(EngineError::PositionHealthy {
                margin_ratio: health.margin_ratio,
                maintenance,
            });
        }

        if choose_liquidation(health.margin_ratio, &market.params) == LiquidationKind::Partial {
            if let Some(result) = self.liquidate_partial(&market, &position, req, health.margin_ratio)? {
                return Ok(result);
            }
        }
        self.liquidate_full(market, position, req, health.margin_ratio)
    }

    /// Closes a slice of the position. `None` when the slice cannot stand on its own and the
    /// whole position has to go instead.
    fn liquidate_partial(
        &mut self,
        market: &Market,
        position: &Position,
        req: &LiquidateRequest,
        ratio_before: Decimal,
    ) -> Result<Option<LiquidationResult>, EngineError> {
        let Some(slice) = partial_liquidation_size(position.size, &market.params)? else {
            return Ok(None);
        };
        let preview = market
            .pool
            .get_quote_amount(position.close_direction(), slice, TradeLimit::Skip)?;
        let exchanged = Quote::new(preview.amount);
        let update = position.reduce(slice, exchanged, self.now)?;
        let penalty = calculate_liquidation_penalty(exchanged, &market.params)?;

        let Some(mut remaining) = update.new_position else {
            return Ok(None);
        };
        remaining.margin = remaining.margin.checked_sub(penalty.total)?;
        if !remaining.margin.is_positive() {
            return Ok(None);
        }

        let mut market = market.clone();
        market.pool.apply(&preview);
        let (long, short) = closed_interest(position.side, slice);
        market.add_open_interest(long, short)?;

        let mut vault = self.vault(&req.pair)?;
        vault.release(penalty.liquidator_reward)?;
        vault.collect_fee_from_collateral(penalty.ecosystem_fund_share)?;
        let mut liquidator = self.account(&req.liquidator)?;
        liquidator.deposit(penalty.liquidator_reward)?;

        let ratio_after = evaluate_health(&market, &remaining)?.margin_ratio;

        self.put_market(&market)?;
        self.put_position(&remaining)?;
        self.put_vault(&vault)?;
        self.put_account(&liquidator)?;

        self.emit(EventPayload::PositionLiquidated(PositionLiquidatedEvent {
            trader: req.trader.clone(),
            liquidator: req.liquidator.clone(),
            pair: req.pair.clone(),
            kind: LiquidationKind::Partial,
            size_liquidated: slice,
            exchanged_quote: exchanged,
            realized_pnl: update.realized_pnl,
            liquidation_fee: penalty.total,
            liquidator_reward: penalty.liquidator_reward,
            ecosystem_fund_share: penalty.ecosystem_fund_share,
            margin_ratio_before: ratio_before,
            margin_ratio_after: Some(ratio_after),
        }));
        info!(
            trader = %req.trader,
            liquidator = %req.liquidator,
            pair = %req.pair,
            size = %slice,
            ratio_before = %ratio_before,
            ratio_after = %ratio_after,
            "position partially liquidated"
        );

        Ok(Some(LiquidationResult {
            kind: LiquidationKind::Partial,
            trader: req.trader.clone(),
            liquidator: req.liquidator.clone(),
            pair: req.pair.clone(),
            position: Some(remaining),
            size_liquidated: slice,
            exchanged_quote: exchanged,
            realized_pnl: update.realized_pnl,
            penalty,
            margin_to_trader: Quote::zero(),
            bad_debt: Quote::zero(),
            margin_ratio_before: ratio_before,
            margin_ratio_after: Some(ratio_after),
        }))
    }

    fn liquidate_full(
        &mut self,
        mut market: Market,
        position: Position,
        req: &LiquidateRequest,
        ratio_before: Decimal,
    ) -> Result<LiquidationResult, EngineError> {
        let size = position.size;
        let exchanged = Quote::new(market.pool.swap_base_for_quote(
            position.close_direction(),
            size,
            TradeLimit::Skip,
        )?);
        let update = position.reduce(size, exchanged, self.now)?;
        let penalty = calculate_liquidation_penalty(exchanged, &market.params)?;
        let settlement = settle_liquidation(update.equity_released, penalty.total)?;

        let mut vault = self.vault(&req.pair)?;
        if settlement.bad_debt.is_positive() {
            vault.absorb_bad_debt(settlement.bad_debt)?;
            warn!(
                trader = %req.trader,
                pair = %req.pair,
                bad_debt = %settlement.bad_debt,
                ecosystem_fund = %vault.ecosystem_fund,
                "liquidation left bad debt"
            );
            self.emit(EventPayload::BadDebt(BadDebtEvent {
                trader: req.trader.clone(),
                pair: req.pair.clone(),
                amount: settlement.bad_debt,
                ecosystem_fund_after: vault.ecosystem_fund,
            }));
        }
        vault.release(penalty.liquidator_reward)?;
        vault.collect_fee_from_collateral(penalty.ecosystem_fund_share)?;
        vault.release(settlement.payout)?;

        // one account at a time: trader and liquidator may be the same address
        let mut trader = self.account(&req.trader)?;
        trader.deposit(settlement.payout)?;
        self.put_account(&trader)?;
        let mut liquidator = self.account(&req.liquidator)?;
        liquidator.deposit(penalty.liquidator_reward)?;
        self.put_account(&liquidator)?;

        let (long, short) = closed_interest(position.side, size);
        market.add_open_interest(long, short)?;
        self.put_market(&market)?;
        self.put_vault(&vault)?;
        self.remove_position(&req.pair, &req.trader);

        self.emit(EventPayload::PositionLiquidated(PositionLiquidatedEvent {
            trader: req.trader.clone(),
            liquidator: req.liquidator.clone(),
            pair: req.pair.clone(),
            kind: LiquidationKind::Full,
            size_liquidated: size,
            exchanged_quote: exchanged,
            realized_pnl: update.realized_pnl,
            liquidation_fee: penalty.total,
            liquidator_reward: penalty.liquidator_reward,
            ecosystem_fund_share: penalty.ecosystem_fund_share,
            margin_ratio_before: ratio_before,
            margin_ratio_after: None,
        }));
        info!(
            trader = %req.trader,
            liquidator = %req.liquidator,
            pair = %req.pair,
            size = %size,
            payout = %settlement.payout,
            "position fully liquidated"
        );

        Ok(LiquidationResult {
            kind: LiquidationKind::Full,
            trader: req.trader.clone(),
            liquidator: req.liquidator.clone(),
            pair: req.pair.clone(),
            position: None,
            size_liquidated: size,
            exchanged_quote: exchanged,
            realized_pnl: update.realized_pnl,
            penalty,
            margin_to_trader: settlement.payout,
            bad_debt: settlement.bad_debt,
            margin_ratio_before: ratio_before,
            margin_ratio_after: None,
        })
    }
}
