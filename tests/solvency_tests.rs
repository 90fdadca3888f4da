//! Solvency invariant tests.
//!
//! Quote never appears or disappears: whatever traders, keepers and outside funders put in is
//! always somewhere in a trader balance, vault collateral or the ecosystem fund.

use perp_settlement::msgs::{
    ClosePositionRequest, DecreasePositionRequest, IncreasePositionRequest, LiquidateRequest,
    MarginRequest, OpenPositionRequest,
};
use perp_settlement::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const HOUR: i64 = 60 * 60 * 1000;

fn nibi() -> Pair {
    "NIBI:USDN".parse().unwrap()
}

fn params() -> MarketParams {
    MarketParams {
        exchange_fee_ratio: dec!(0.001),
        ..MarketParams::default()
    }
}

struct World {
    engine: Engine,
    traders: Vec<Address>,
    keeper: Address,
    injected: Decimal,
}

impl World {
    fn new(traders: usize) -> Self {
        let mut engine = Engine::new(EngineConfig::default());
        engine
            .add_market(nibi(), dec!(1_000_000), dec!(1_000_000), params())
            .unwrap();
        engine.fund_ecosystem(&nibi(), Quote::new(dec!(5_000))).unwrap();

        let traders: Vec<Address> = (1..=traders as u64).map(Address::sample).collect();
        for trader in &traders {
            engine.deposit(trader, Quote::new(dec!(20_000))).unwrap();
        }
        let injected = dec!(5_000) + Decimal::from(traders.len() as u64) * dec!(20_000);

        Self {
            engine,
            traders,
            keeper: Address::sample(10_000),
            injected,
        }
    }

    fn total_quote(&self) -> Decimal {
        let balances: Decimal = self
            .traders
            .iter()
            .chain(std::iter::once(&self.keeper))
            .map(|a| self.engine.account(a).unwrap().balance.value())
            .sum();
        balances + self.engine.vault(&nibi()).unwrap().total().unwrap().value()
    }
}

#[derive(Debug, Clone)]
enum Op {
    Open { who: usize, long: bool, margin: i64, leverage: i64 },
    Increase { who: usize, margin: i64 },
    Decrease { who: usize, quote: i64 },
    Close { who: usize },
    AddMargin { who: usize, amount: i64 },
    RemoveMargin { who: usize, amount: i64 },
    Liquidate { who: usize },
    Funding { index_bps: i64 },
}

fn op_strategy(traders: usize) -> impl Strategy<Value = Op> {
    let who = 0..traders;
    prop_oneof![
        4 => (who.clone(), any::<bool>(), 10i64..3_000, 1i64..=10)
            .prop_map(|(who, long, margin, leverage)| Op::Open { who, long, margin, leverage }),
        2 => (who.clone(), 10i64..1_000).prop_map(|(who, margin)| Op::Increase { who, margin }),
        2 => (who.clone(), 10i64..5_000).prop_map(|(who, quote)| Op::Decrease { who, quote }),
        2 => who.clone().prop_map(|who| Op::Close { who }),
        1 => (who.clone(), 1i64..500).prop_map(|(who, amount)| Op::AddMargin { who, amount }),
        1 => (who.clone(), 1i64..500).prop_map(|(who, amount)| Op::RemoveMargin { who, amount }),
        2 => who.prop_map(|who| Op::Liquidate { who }),
        1 => (9_000i64..11_000).prop_map(|index_bps| Op::Funding { index_bps }),
    ]
}

fn apply(world: &mut World, op: &Op) {
    let pair = nibi();
    let engine = &mut world.engine;
    // rejected operations are fine here; they must simply leave no trace
    let _ = match op {
        Op::Open { who, long, margin, leverage } => engine
            .open_position(OpenPositionRequest {
                trader: world.traders[*who].clone(),
                pair,
                side: if *long { Side::Long } else { Side::Short },
                quote_margin: Quote::new(Decimal::from(*margin)),
                leverage: Leverage::new(Decimal::from(*leverage)).unwrap(),
                base_limit: Decimal::ZERO,
            })
            .map(|_| ()),
        Op::Increase { who, margin } => engine
            .increase_position(IncreasePositionRequest {
                trader: world.traders[*who].clone(),
                pair,
                quote_margin: Quote::new(Decimal::from(*margin)),
                leverage: Leverage::new(dec!(5)).unwrap(),
                base_limit: Decimal::ZERO,
            })
            .map(|_| ()),
        Op::Decrease { who, quote } => engine
            .decrease_position(DecreasePositionRequest {
                trader: world.traders[*who].clone(),
                pair,
                quote_amount: Quote::new(Decimal::from(*quote)),
                base_limit: Decimal::ZERO,
            })
            .map(|_| ()),
        Op::Close { who } => engine
            .close_position(ClosePositionRequest {
                trader: world.traders[*who].clone(),
                pair,
            })
            .map(|_| ()),
        Op::AddMargin { who, amount } => engine
            .add_margin(MarginRequest {
                trader: world.traders[*who].clone(),
                pair,
                amount: Quote::new(Decimal::from(*amount)),
            })
            .map(|_| ()),
        Op::RemoveMargin { who, amount } => engine
            .remove_margin(MarginRequest {
                trader: world.traders[*who].clone(),
                pair,
                amount: Quote::new(Decimal::from(*amount)),
            })
            .map(|_| ()),
        Op::Liquidate { who } => engine
            .liquidate(LiquidateRequest {
                liquidator: world.keeper.clone(),
                pair,
                trader: world.traders[*who].clone(),
            })
            .map(|_| ()),
        Op::Funding { index_bps } => {
            engine.advance_time(HOUR);
            engine
                .settle_funding(&pair, Price::new_unchecked(Decimal::new(*index_bps, 4)))
                .map(|_| ())
        }
    };
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Balances + collateral + ecosystem fund equals everything ever put in
    #[test]
    fn quote_is_conserved(ops in prop::collection::vec(op_strategy(6), 1..40)) {
        let mut world = World::new(6);
        prop_assert_eq!(world.total_quote(), world.injected);

        for op in &ops {
            apply(&mut world, op);
            prop_assert_eq!(world.total_quote(), world.injected, "after {:?}", op);
        }
    }

    /// Open interest tracks the sizes of the open positions
    #[test]
    fn open_interest_matches_positions(ops in prop::collection::vec(op_strategy(4), 1..30)) {
        let mut world = World::new(4);
        for op in &ops {
            apply(&mut world, op);
        }

        let market = world.engine.market(&nibi()).unwrap();
        let positions = world.engine.positions(&nibi()).unwrap();
        let long: Decimal = positions.iter().filter(|p| p.side == Side::Long).map(|p| p.size).sum();
        let short: Decimal = positions.iter().filter(|p| p.side == Side::Short).map(|p| p.size).sum();
        prop_assert_eq!(market.open_interest_long, long);
        prop_assert_eq!(market.open_interest_short, short);
    }

    /// Every stored position keeps a positive size and a live record per trader
    #[test]
    fn positions_stay_well_formed(ops in prop::collection::vec(op_strategy(4), 1..30)) {
        let mut world = World::new(4);
        for op in &ops {
            apply(&mut world, op);
        }
        for position in world.engine.positions(&nibi()).unwrap() {
            prop_assert!(position.size > Decimal::ZERO);
            prop_assert!(world.traders.contains(&position.trader));
        }
    }
}

#[test]
fn bad_debt_drawn_from_ecosystem_fund() {
    let mut world = World::new(2);
    let alice = world.traders[0].clone();
    let bob = world.traders[1].clone();

    world
        .engine
        .open_position(OpenPositionRequest {
            trader: alice.clone(),
            pair: nibi(),
            side: Side::Long,
            quote_margin: Quote::new(dec!(100)),
            leverage: Leverage::new(dec!(10)).unwrap(),
            base_limit: Decimal::ZERO,
        })
        .unwrap();
    world
        .engine
        .open_position(OpenPositionRequest {
            trader: bob,
            pair: nibi(),
            side: Side::Short,
            quote_margin: Quote::new(dec!(9_000)),
            leverage: Leverage::new(dec!(10)).unwrap(),
            base_limit: Decimal::ZERO,
        })
        .unwrap();
    let fund_before = world.engine.vault(&nibi()).unwrap().ecosystem_fund;

    let result = world
        .engine
        .liquidate(LiquidateRequest {
            liquidator: world.keeper.clone(),
            pair: nibi(),
            trader: alice,
        })
        .unwrap();

    assert_eq!(result.kind, LiquidationKind::Full);
    assert!(result.bad_debt.is_positive());
    let vault = world.engine.vault(&nibi()).unwrap();
    let expected = fund_before.value() - result.bad_debt.value() + result.penalty.ecosystem_fund_share.value();
    assert_eq!(vault.ecosystem_fund.value(), expected);
    assert_eq!(vault.total_bad_debt, result.bad_debt);
    assert_eq!(world.total_quote(), world.injected);

    let bad_debt_events = world
        .engine
        .events()
        .filter(|e| matches!(e.payload, EventPayload::BadDebt(_)))
        .count();
    assert_eq!(bad_debt_events, 1);
}

#[test]
fn close_at_a_loss_never_pays_out_more_than_equity() {
    let mut world = World::new(2);
    let alice = world.traders[0].clone();
    let bob = world.traders[1].clone();

    for (trader, side, margin) in [(&alice, Side::Long, dec!(1_000)), (&bob, Side::Short, dec!(5_000))] {
        world
            .engine
            .open_position(OpenPositionRequest {
                trader: trader.clone(),
                pair: nibi(),
                side,
                quote_margin: Quote::new(margin),
                leverage: Leverage::new(dec!(5)).unwrap(),
                base_limit: Decimal::ZERO,
            })
            .unwrap();
    }

    let health = world.engine.position_health(&nibi(), &alice).unwrap();
    assert!(health.unrealized_pnl.is_negative());

    let result = world
        .engine
        .close_position(ClosePositionRequest {
            trader: alice.clone(),
            pair: nibi(),
        })
        .unwrap();
    assert!(result.margin_to_trader.value() < dec!(1_000));
    assert_eq!(world.total_quote(), world.injected);
}
