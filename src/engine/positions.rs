//! Position lifecycle: open, increase, decrease, close, margin top-ups and withdrawals.
//!
//! Every entry point loads what it needs into a `Tx`, touches the position for funding first,
//! previews swaps before applying them and only writes once every check has passed.

use super::core::{Engine, Tx};
use super::results::{EngineError, PositionResult};
use crate::events::{
    BadDebtEvent, EventPayload, MarginChangedEvent, PositionChangedEvent, PositionClosedEvent,
    PositionOpenedEvent,
};
use crate::liquidation::calculate_exchange_fee;
use crate::margin::{evaluate_health, free_margin, margin_ratio, position_notional, within_max_leverage};
use crate::market::Market;
use crate::msgs::{
    ClosePositionRequest, DecreasePositionRequest, IncreasePositionRequest, MarginRequest,
    OpenPositionRequest,
};
use crate::numeric::{self, floor_amount};
use crate::position::{open_direction, Position};
use crate::store::KvStore;
use crate::types::{Address, Leverage, Pair, Quote, Side};
use crate::vamm::{Direction, TradeLimit};
use crate::vault::settle_close;
use rust_decimal::Decimal;
use tracing::info;

impl<S: KvStore> Engine<S> {
    pub fn open_position(&mut self, req: OpenPositionRequest) -> Result<PositionResult, EngineError> {
        self.execute("open_position", |tx| tx.open(&req))
    }

    pub fn increase_position(&mut self, req: IncreasePositionRequest) -> Result<PositionResult, EngineError> {
        self.execute("increase_position", |tx| tx.increase(&req))
    }

    pub fn decrease_position(&mut self, req: DecreasePositionRequest) -> Result<PositionResult, EngineError> {
        self.execute("decrease_position", |tx| tx.decrease(&req))
    }

    pub fn close_position(&mut self, req: ClosePositionRequest) -> Result<PositionResult, EngineError> {
        self.execute("close_position", |tx| {
            let market = tx.market(&req.pair)?;
            let mut position = tx.existing_position(&req.pair, &req.trader)?;
            let funding_payment = tx.touch(&market, &mut position)?;
            tx.close_touched(market, position, funding_payment, Decimal::ZERO)
        })
    }

    pub fn add_margin(&mut self, req: MarginRequest) -> Result<Position, EngineError> {
        self.execute("add_margin", |tx| tx.add_margin(&req))
    }

    pub fn remove_margin(&mut self, req: MarginRequest) -> Result<Position, EngineError> {
        self.execute("remove_margin", |tx| tx.remove_margin(&req))
    }

    /// Settles outstanding funding on one position without trading.
    pub fn touch_position(&mut self, pair: &Pair, trader: &Address) -> Result<Position, EngineError> {
        self.execute("touch_position", |tx| {
            let market = tx.market(pair)?;
            let mut position = tx.existing_position(pair, trader)?;
            tx.touch(&market, &mut position)?;
            tx.put_position(&position)?;
            Ok(position)
        })
    }
}

// Long: at least `limit` base. Short: at most `limit` base. Zero disables.
fn check_slippage(side: Side, base: Decimal, limit: Decimal) -> Result<(), EngineError> {
    if limit.is_zero() {
        return Ok(());
    }
    let within = match side {
        Side::Long => base >= limit,
        Side::Short => base <= limit,
    };
    if within {
        Ok(())
    } else {
        Err(EngineError::SlippageExceeded { base, limit })
    }
}

fn check_leverage(leverage: Leverage, market: &Market) -> Result<(), EngineError> {
    let max = market.params.max_leverage.value();
    if leverage.value() > max {
        return Err(EngineError::LeverageExceeded {
            leverage: leverage.value(),
            max,
        });
    }
    Ok(())
}

/// Quote leg direction when a position gives back notional.
fn reduce_direction(side: Side) -> Direction {
    match side {
        Side::Long => Direction::RemoveFromPool,
        Side::Short => Direction::AddToPool,
    }
}

/// (long, short) open interest change for `base` on `side`.
fn open_interest_delta(side: Side, base: Decimal) -> (Decimal, Decimal) {
    match side {
        Side::Long => (base, Decimal::ZERO),
        Side::Short => (Decimal::ZERO, base),
    }
}

impl<S: KvStore> Tx<'_, S> {
    fn open(&mut self, req: &OpenPositionRequest) -> Result<PositionResult, EngineError> {
        let mut market = self.market(&req.pair)?;
        if self.position(&req.pair, &req.trader)?.is_some() {
            return Err(EngineError::PositionAlreadyOpen {
                trader: req.trader.clone(),
                pair: req.pair.clone(),
            });
        }
        check_leverage(req.leverage, &market)?;

        let notional = Quote::new(floor_amount(numeric::mul(
            req.quote_margin.value(),
            req.leverage.value(),
        )?));
        let fee = calculate_exchange_fee(notional, &market.params)?;

        let mut account = self.account(&req.trader)?;
        account.withdraw(req.quote_margin.checked_add(fee)?)?;

        let base = market
            .pool
            .swap_quote_for_base(open_direction(req.side), notional.value(), TradeLimit::Enforce)?;
        check_slippage(req.side, base, req.base_limit)?;

        let position = Position::new(
            req.trader.clone(),
            req.pair.clone(),
            req.side,
            base,
            req.quote_margin,
            notional,
            market.funding_index(),
            self.now,
        );
        let (long, short) = open_interest_delta(req.side, base);
        market.add_open_interest(long, short)?;

        let mut vault = self.vault(&req.pair)?;
        vault.lock_margin(req.quote_margin)?;
        vault.collect_fee(fee)?;

        let mark_price = market.mark_price()?;
        self.put_market(&market)?;
        self.put_position(&position)?;
        self.put_vault(&vault)?;
        self.put_account(&account)?;

        self.emit(EventPayload::PositionOpened(PositionOpenedEvent {
            trader: req.trader.clone(),
            pair: req.pair.clone(),
            side: req.side,
            size: base,
            margin: req.quote_margin,
            open_notional: notional,
            exchange_fee: fee,
            mark_price,
        }));
        info!(
            trader = %req.trader,
            pair = %req.pair,
            side = ?req.side,
            size = %base,
            margin = %req.quote_margin,
            notional = %notional,
            "position opened"
        );

        Ok(PositionResult {
            position: Some(position),
            exchanged_base: base,
            exchanged_quote: notional,
            realized_pnl: Quote::zero(),
            exchange_fee: fee,
            funding_payment: Quote::zero(),
            margin_to_trader: Quote::zero(),
            bad_debt: Quote::zero(),
            mark_price,
        })
    }

    fn increase(&mut self, req: &IncreasePositionRequest) -> Result<PositionResult, EngineError> {
        let mut market = self.market(&req.pair)?;
        let mut position = self.existing_position(&req.pair, &req.trader)?;
        check_leverage(req.leverage, &market)?;
        let funding_payment = self.touch(&market, &mut position)?;

        let notional = Quote::new(floor_amount(numeric::mul(
            req.quote_margin.value(),
            req.leverage.value(),
        )?));
        let fee = calculate_exchange_fee(notional, &market.params)?;

        let mut account = self.account(&req.trader)?;
        account.withdraw(req.quote_margin.checked_add(fee)?)?;

        let base = market
            .pool
            .swap_quote_for_base(position.open_direction(), notional.value(), TradeLimit::Enforce)?;
        check_slippage(position.side, base, req.base_limit)?;

        let grown = position.increase(base, notional, req.quote_margin, self.now)?;
        if !within_max_leverage(grown.open_notional, grown.margin, &market.params)? {
            return Err(EngineError::LeverageExceeded {
                leverage: grown.realized_leverage().unwrap_or(Decimal::MAX),
                max: market.params.max_leverage.value(),
            });
        }

        let (long, short) = open_interest_delta(position.side, base);
        market.add_open_interest(long, short)?;

        let mut vault = self.vault(&req.pair)?;
        vault.lock_margin(req.quote_margin)?;
        vault.collect_fee(fee)?;

        let mark_price = market.mark_price()?;
        self.put_market(&market)?;
        self.put_position(&grown)?;
        self.put_vault(&vault)?;
        self.put_account(&account)?;

        self.emit(EventPayload::PositionChanged(PositionChangedEvent {
            trader: req.trader.clone(),
            pair: req.pair.clone(),
            size_delta: base,
            exchanged_quote: notional,
            realized_pnl: Quote::zero(),
            exchange_fee: fee,
            new_size: grown.size,
            new_margin: grown.margin,
            mark_price,
        }));
        info!(trader = %req.trader, pair = %req.pair, size = %grown.size, margin = %grown.margin, "position increased");

        Ok(PositionResult {
            position: Some(grown),
            exchanged_base: base,
            exchanged_quote: notional,
            realized_pnl: Quote::zero(),
            exchange_fee: fee,
            funding_payment,
            margin_to_trader: Quote::zero(),
            bad_debt: Quote::zero(),
            mark_price,
        })
    }

    fn decrease(&mut self, req: &DecreasePositionRequest) -> Result<PositionResult, EngineError> {
        let mut market = self.market(&req.pair)?;
        let mut position = self.existing_position(&req.pair, &req.trader)?;
        let funding_payment = self.touch(&market, &mut position)?;

        let notional = position_notional(&market.pool, &position)?;
        if req.quote_amount >= notional {
            return self.close_touched(market, position, funding_payment, req.base_limit);
        }

        let preview = market.pool.get_base_amount(
            reduce_direction(position.side),
            req.quote_amount.value(),
            TradeLimit::Enforce,
        )?;
        let base = preview.amount;
        if base >= position.size {
            return self.close_touched(market, position, funding_payment, req.base_limit);
        }
        check_slippage(position.side.opposite(), base, req.base_limit)?;

        let update = position.reduce(base, req.quote_amount, self.now)?;
        let fee = calculate_exchange_fee(req.quote_amount, &market.params)?;
        let mut remaining = match update.new_position {
            Some(remaining) => remaining,
            None => return self.close_touched(market, position, funding_payment, req.base_limit),
        };
        remaining.margin = remaining.margin.checked_sub(fee)?;
        if !remaining.margin.is_positive() {
            return self.close_touched(market, position, funding_payment, req.base_limit);
        }

        market.pool.apply(&preview);
        let (long, short) = open_interest_delta(position.side, -base);
        market.add_open_interest(long, short)?;

        let mut vault = self.vault(&req.pair)?;
        vault.collect_fee_from_collateral(fee)?;

        let mark_price = market.mark_price()?;
        self.put_market(&market)?;
        self.put_position(&remaining)?;
        self.put_vault(&vault)?;

        self.emit(EventPayload::PositionChanged(PositionChangedEvent {
            trader: req.trader.clone(),
            pair: req.pair.clone(),
            size_delta: -base,
            exchanged_quote: req.quote_amount,
            realized_pnl: update.realized_pnl,
            exchange_fee: fee,
            new_size: remaining.size,
            new_margin: remaining.margin,
            mark_price,
        }));
        info!(
            trader = %req.trader,
            pair = %req.pair,
            size = %remaining.size,
            realized_pnl = %update.realized_pnl,
            "position decreased"
        );

        Ok(PositionResult {
            position: Some(remaining),
            exchanged_base: base,
            exchanged_quote: req.quote_amount,
            realized_pnl: update.realized_pnl,
            exchange_fee: fee,
            funding_payment,
            margin_to_trader: Quote::zero(),
            bad_debt: Quote::zero(),
            mark_price,
        })
    }

    /// Unwinds the whole position. `position` must already be touched. A full unwind is never
    /// held to the trade limit, so any open position can be closed in one call.
    fn close_touched(
        &mut self,
        mut market: Market,
        position: Position,
        funding_payment: Quote,
        base_limit: Decimal,
    ) -> Result<PositionResult, EngineError> {
        let size = position.size;
        check_slippage(position.side.opposite(), size, base_limit)?;

        let exchanged = Quote::new(market.pool.swap_base_for_quote(
            position.close_direction(),
            size,
            TradeLimit::Skip,
        )?);
        let update = position.reduce(size, exchanged, self.now)?;
        let fee = calculate_exchange_fee(exchanged, &market.params)?;
        let settlement = settle_close(update.equity_released, fee)?;

        let mut vault = self.vault(&position.pair)?;
        if settlement.bad_debt.is_positive() {
            vault.absorb_bad_debt(settlement.bad_debt)?;
            self.emit(EventPayload::BadDebt(BadDebtEvent {
                trader: position.trader.clone(),
                pair: position.pair.clone(),
                amount: settlement.bad_debt,
                ecosystem_fund_after: vault.ecosystem_fund,
            }));
        }
        vault.collect_fee_from_collateral(settlement.fee)?;
        vault.release(settlement.payout)?;

        let mut account = self.account(&position.trader)?;
        account.deposit(settlement.payout)?;

        let (long, short) = open_interest_delta(position.side, -size);
        market.add_open_interest(long, short)?;

        let mark_price = market.mark_price()?;
        self.put_market(&market)?;
        self.put_vault(&vault)?;
        self.put_account(&account)?;
        self.remove_position(&position.pair, &position.trader);

        self.emit(EventPayload::PositionClosed(PositionClosedEvent {
            trader: position.trader.clone(),
            pair: position.pair.clone(),
            side: position.side,
            size,
            exchanged_quote: exchanged,
            realized_pnl: update.realized_pnl,
            exchange_fee: settlement.fee,
            payout: settlement.payout,
            bad_debt: settlement.bad_debt,
        }));
        info!(
            trader = %position.trader,
            pair = %position.pair,
            realized_pnl = %update.realized_pnl,
            payout = %settlement.payout,
            "position closed"
        );

        Ok(PositionResult {
            position: None,
            exchanged_base: size,
            exchanged_quote: exchanged,
            realized_pnl: update.realized_pnl,
            exchange_fee: settlement.fee,
            funding_payment,
            margin_to_trader: settlement.payout,
            bad_debt: settlement.bad_debt,
            mark_price,
        })
    }

    fn add_margin(&mut self, req: &MarginRequest) -> Result<Position, EngineError> {
        let market = self.market(&req.pair)?;
        let mut position = self.existing_position(&req.pair, &req.trader)?;
        self.touch(&market, &mut position)?;

        let mut account = self.account(&req.trader)?;
        account.withdraw(req.amount)?;
        position.margin = position.margin.checked_add(req.amount)?;

        let mut vault = self.vault(&req.pair)?;
        vault.lock_margin(req.amount)?;

        self.put_position(&position)?;
        self.put_vault(&vault)?;
        self.put_account(&account)?;
        self.emit(EventPayload::MarginChanged(MarginChangedEvent {
            trader: req.trader.clone(),
            pair: req.pair.clone(),
            delta: req.amount,
            new_margin: position.margin,
        }));
        Ok(position)
    }

    fn remove_margin(&mut self, req: &MarginRequest) -> Result<Position, EngineError> {
        let market = self.market(&req.pair)?;
        let mut position = self.existing_position(&req.pair, &req.trader)?;
        self.touch(&market, &mut position)?;

        let health = evaluate_health(&market, &position)?;
        let required = market.params.initial_margin_ratio;
        let free = free_margin(health.equity, health.notional, required)?;
        position.margin = position.margin.checked_sub(req.amount)?;
        if !position.margin.is_positive() || req.amount > free {
            let equity_after = health.equity.checked_sub(req.amount)?;
            return Err(EngineError::MarginTooLow {
                margin_ratio: margin_ratio(equity_after, health.notional)?,
                required,
            });
        }

        let mut vault = self.vault(&req.pair)?;
        vault.release(req.amount)?;
        let mut account = self.account(&req.trader)?;
        account.deposit(req.amount)?;

        self.put_position(&position)?;
        self.put_vault(&vault)?;
        self.put_account(&account)?;
        self.emit(EventPayload::MarginChanged(MarginChangedEvent {
            trader: req.trader.clone(),
            pair: req.pair.clone(),
            delta: req.amount.negate(),
            new_margin: position.margin,
        }));
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::market::MarketParams;
    use crate::types::Timestamp;
    use rust_decimal_macros::dec;

    fn pair() -> Pair {
        "NIBI:USDN".parse().unwrap()
    }

    fn engine(params: MarketParams) -> Engine {
        let mut engine = Engine::new(EngineConfig::default());
        engine
            .add_market(pair(), dec!(1_000_000), dec!(1_000_000), params)
            .unwrap();
        engine
    }

    fn funded(engine: &mut Engine, seed: u64, amount: Decimal) -> Address {
        let trader = Address::sample(seed);
        engine.deposit(&trader, Quote::new(amount)).unwrap();
        trader
    }

    fn open_req(trader: &Address, side: Side, margin: Decimal, leverage: Decimal) -> OpenPositionRequest {
        OpenPositionRequest {
            trader: trader.clone(),
            pair: pair(),
            side,
            quote_margin: Quote::new(margin),
            leverage: Leverage::new(leverage).unwrap(),
            base_limit: Decimal::ZERO,
        }
    }

    #[test]
    fn open_long_moves_reserves() {
        let mut engine = engine(MarketParams::default());
        let trader = funded(&mut engine, 1, dec!(1000));

        let result = engine
            .open_position(open_req(&trader, Side::Long, dec!(100), dec!(10)))
            .unwrap();

        // 10^12 / 1_001_000 = 999000.999000999.. ceiled to 999000.999001
        assert_eq!(result.exchanged_base, dec!(999.000999));
        let market = engine.market(&pair()).unwrap();
        assert_eq!(market.pool.quote_reserve, dec!(1_001_000));
        assert_eq!(market.pool.base_reserve, dec!(999000.999001));
        assert_eq!(market.open_interest_long, dec!(999.000999));
        assert_eq!(engine.account(&trader).unwrap().balance.value(), dec!(900));
        assert_eq!(engine.vault(&pair()).unwrap().collateral.value(), dec!(100));
    }

    #[test]
    fn second_open_rejected() {
        let mut engine = engine(MarketParams::default());
        let trader = funded(&mut engine, 1, dec!(1000));
        engine
            .open_position(open_req(&trader, Side::Long, dec!(100), dec!(5)))
            .unwrap();

        let err = engine
            .open_position(open_req(&trader, Side::Short, dec!(100), dec!(5)))
            .unwrap_err();
        assert!(matches!(err, EngineError::PositionAlreadyOpen { .. }));
    }

    #[test]
    fn leverage_above_max() {
        let mut engine = engine(MarketParams::default());
        let trader = funded(&mut engine, 1, dec!(1000));
        let err = engine
            .open_position(open_req(&trader, Side::Long, dec!(100), dec!(11)))
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::LeverageExceeded {
                leverage: dec!(11),
                max: dec!(10)
            }
        );
    }

    #[test]
    fn slippage_reverts_swap() {
        let mut engine = engine(MarketParams::default());
        let trader = funded(&mut engine, 1, dec!(1000));
        let before = engine.market(&pair()).unwrap();

        let mut req = open_req(&trader, Side::Long, dec!(100), dec!(10));
        req.base_limit = dec!(1000);
        let err = engine.open_position(req).unwrap_err();

        assert!(matches!(err, EngineError::SlippageExceeded { .. }));
        assert_eq!(engine.market(&pair()).unwrap(), before);
        assert_eq!(engine.account(&trader).unwrap().balance.value(), dec!(1000));
    }

    #[test]
    fn short_slippage_is_an_upper_bound() {
        let mut engine = engine(MarketParams::default());
        let trader = funded(&mut engine, 1, dec!(1000));

        let mut req = open_req(&trader, Side::Short, dec!(100), dec!(10));
        req.base_limit = dec!(1000);
        let err = engine.open_position(req.clone()).unwrap_err();
        assert!(matches!(err, EngineError::SlippageExceeded { .. }));

        req.base_limit = dec!(1002);
        let result = engine.open_position(req).unwrap();
        assert!(result.exchanged_base > dec!(1000));
    }

    #[test]
    fn insufficient_balance() {
        let mut engine = engine(MarketParams::default());
        let trader = funded(&mut engine, 1, dec!(50));
        let err = engine
            .open_position(open_req(&trader, Side::Long, dec!(100), dec!(2)))
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));
    }

    #[test]
    fn trade_limit_enforced_on_open() {
        let mut engine = engine(MarketParams::default());
        let trader = funded(&mut engine, 1, dec!(100_000));
        let err = engine
            .open_position(open_req(&trader, Side::Long, dec!(20_000), dec!(10)))
            .unwrap_err();
        assert!(matches!(err, EngineError::TradeLimitExceeded { reserve: "quote", .. }));
    }

    #[test]
    fn close_ignores_trade_limit() {
        let mut engine = engine(MarketParams::default());
        let whale = funded(&mut engine, 1, dec!(18_000));
        engine
            .open_position(open_req(&whale, Side::Long, dec!(9_000), dec!(10)))
            .unwrap();
        engine
            .increase_position(IncreasePositionRequest {
                trader: whale.clone(),
                pair: pair(),
                quote_margin: Quote::new(dec!(9_000)),
                leverage: Leverage::new(dec!(10)).unwrap(),
                base_limit: Decimal::ZERO,
            })
            .unwrap();

        // one swap of the whole size is over 10% of what is left in the base reserve
        let size = engine.position(&pair(), &whale).unwrap().size;
        let pool = engine.market(&pair()).unwrap().pool;
        assert!(matches!(
            pool.get_quote_amount(Direction::AddToPool, size, TradeLimit::Enforce),
            Err(crate::vamm::CurveError::TradeLimitExceeded { reserve: "base", .. })
        ));

        let result = engine
            .close_position(ClosePositionRequest {
                trader: whale.clone(),
                pair: pair(),
            })
            .unwrap();
        assert_eq!(result.exchanged_base, size);
        assert!(engine.position(&pair(), &whale).is_err());
        let balance = engine.account(&whale).unwrap().balance.value();
        assert!((balance - dec!(18_000)).abs() <= dec!(0.00001));
    }

    #[test]
    fn close_returns_margin_without_price_move() {
        let mut engine = engine(MarketParams::default());
        let trader = funded(&mut engine, 1, dec!(1000));
        engine
            .open_position(open_req(&trader, Side::Long, dec!(100), dec!(10)))
            .unwrap();

        let result = engine
            .close_position(ClosePositionRequest {
                trader: trader.clone(),
                pair: pair(),
            })
            .unwrap();

        assert!(result.position.is_none());
        let balance = engine.account(&trader).unwrap().balance.value();
        assert!(balance <= dec!(1000));
        assert!(balance >= dec!(999.999999));
        assert!(engine.position(&pair(), &trader).is_err());
        assert_eq!(engine.market(&pair()).unwrap().open_interest_long, Decimal::ZERO);
    }

    #[test]
    fn close_without_position() {
        let mut engine = engine(MarketParams::default());
        let err = engine
            .close_position(ClosePositionRequest {
                trader: Address::sample(9),
                pair: pair(),
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::NoOpenPosition { .. }));
    }

    #[test]
    fn increase_grows_position() {
        let mut engine = engine(MarketParams::default());
        let trader = funded(&mut engine, 1, dec!(1000));
        engine
            .open_position(open_req(&trader, Side::Long, dec!(100), dec!(5)))
            .unwrap();

        let result = engine
            .increase_position(IncreasePositionRequest {
                trader: trader.clone(),
                pair: pair(),
                quote_margin: Quote::new(dec!(50)),
                leverage: Leverage::new(dec!(4)).unwrap(),
                base_limit: Decimal::ZERO,
            })
            .unwrap();

        let position = result.position.unwrap();
        assert_eq!(position.margin.value(), dec!(150));
        assert_eq!(position.open_notional.value(), dec!(700));
        assert!(position.size > dec!(699));
        assert_eq!(engine.account(&trader).unwrap().balance.value(), dec!(850));
    }

    #[test]
    fn decrease_realizes_partial_pnl() {
        let mut engine = engine(MarketParams::default());
        let trader = funded(&mut engine, 1, dec!(1000));
        let opened = engine
            .open_position(open_req(&trader, Side::Long, dec!(100), dec!(10)))
            .unwrap();

        let result = engine
            .decrease_position(DecreasePositionRequest {
                trader: trader.clone(),
                pair: pair(),
                quote_amount: Quote::new(dec!(400)),
                base_limit: Decimal::ZERO,
            })
            .unwrap();

        let position = result.position.unwrap();
        assert!(position.size < opened.exchanged_base);
        assert!(position.open_notional.value() < dec!(1000));
        // the first slice sold back sits at the top of the curve
        assert!(result.realized_pnl.is_positive());
        assert!(result.realized_pnl.value() < dec!(1));
        assert_eq!(engine.account(&trader).unwrap().balance.value(), dec!(900));
    }

    #[test]
    fn decrease_past_notional_closes() {
        let mut engine = engine(MarketParams::default());
        let trader = funded(&mut engine, 1, dec!(1000));
        engine
            .open_position(open_req(&trader, Side::Short, dec!(100), dec!(10)))
            .unwrap();

        let result = engine
            .decrease_position(DecreasePositionRequest {
                trader: trader.clone(),
                pair: pair(),
                quote_amount: Quote::new(dec!(5000)),
                base_limit: Decimal::ZERO,
            })
            .unwrap();
        assert!(result.position.is_none());
        assert!(engine.position(&pair(), &trader).is_err());
    }

    #[test]
    fn remove_margin_respects_initial_ratio() {
        let mut engine = engine(MarketParams::default());
        let trader = funded(&mut engine, 1, dec!(1000));
        engine
            .open_position(open_req(&trader, Side::Long, dec!(200), dec!(2)))
            .unwrap();

        let removed = engine
            .remove_margin(MarginRequest {
                trader: trader.clone(),
                pair: pair(),
                amount: Quote::new(dec!(100)),
            })
            .unwrap();
        assert_eq!(removed.margin.value(), dec!(100));

        let err = engine
            .remove_margin(MarginRequest {
                trader: trader.clone(),
                pair: pair(),
                amount: Quote::new(dec!(80)),
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::MarginTooLow { .. }));
        assert_eq!(engine.account(&trader).unwrap().balance.value(), dec!(900));
    }

    #[test]
    fn remove_margin_down_to_free_margin() {
        let mut engine = engine(MarketParams::default());
        let trader = funded(&mut engine, 1, dec!(1000));
        let bear = funded(&mut engine, 2, dec!(1000));
        engine
            .open_position(open_req(&trader, Side::Long, dec!(200), dec!(2)))
            .unwrap();
        engine
            .open_position(open_req(&bear, Side::Short, dec!(500), dec!(10)))
            .unwrap();

        let health = engine.position_health(&pair(), &trader).unwrap();
        assert!(health.unrealized_pnl.is_negative());
        let free = health.equity.value() - health.notional.value() * dec!(0.1);
        let request = |amount: Decimal| MarginRequest {
            trader: trader.clone(),
            pair: pair(),
            amount: Quote::new(amount),
        };

        engine.remove_margin(request(floor_amount(free))).unwrap();
        let ratio = engine.margin_ratio(&pair(), &trader).unwrap();
        assert!(ratio >= dec!(0.1) && ratio < dec!(0.1000001));

        let err = engine.remove_margin(request(dec!(0.000001))).unwrap_err();
        let EngineError::MarginTooLow { margin_ratio, required } = err else {
            panic!("expected MarginTooLow, got {err:?}");
        };
        assert!(margin_ratio < required);
    }

    #[test]
    fn add_margin_locks_collateral() {
        let mut engine = engine(MarketParams::default());
        let trader = funded(&mut engine, 1, dec!(1000));
        engine
            .open_position(open_req(&trader, Side::Long, dec!(100), dec!(10)))
            .unwrap();

        let position = engine
            .add_margin(MarginRequest {
                trader: trader.clone(),
                pair: pair(),
                amount: Quote::new(dec!(25)),
            })
            .unwrap();
        assert_eq!(position.margin.value(), dec!(125));
        assert_eq!(engine.vault(&pair()).unwrap().collateral.value(), dec!(125));
    }

    #[test]
    fn exchange_fee_goes_to_fund() {
        let params = MarketParams {
            exchange_fee_ratio: dec!(0.001),
            ..MarketParams::default()
        };
        let mut engine = engine(params);
        let trader = funded(&mut engine, 1, dec!(1000));
        let result = engine
            .open_position(open_req(&trader, Side::Long, dec!(100), dec!(10)))
            .unwrap();

        assert_eq!(result.exchange_fee.value(), dec!(1));
        assert_eq!(engine.account(&trader).unwrap().balance.value(), dec!(899));
        let vault = engine.vault(&pair()).unwrap();
        assert_eq!(vault.ecosystem_fund.value(), dec!(1));
        assert_eq!(vault.total_fees.value(), dec!(1));
    }

    #[test]
    fn touch_settles_funding_once() {
        let mut engine = engine(MarketParams::default());
        let trader = funded(&mut engine, 1, dec!(1000));
        engine.set_time(Timestamp::from_millis(0));
        engine
            .open_position(open_req(&trader, Side::Long, dec!(100), dec!(10)))
            .unwrap();

        engine.advance_time(60 * 60 * 1000);
        let index = crate::types::Price::new_unchecked(dec!(0.99));
        engine.settle_funding(&pair(), index).unwrap().unwrap();

        let first = engine.touch_position(&pair(), &trader).unwrap();
        assert!(first.margin.value() < dec!(100));
        let second = engine.touch_position(&pair(), &trader).unwrap();
        assert_eq!(first.margin, second.margin);
    }
}
