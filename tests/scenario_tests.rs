//! Lifecycle scenarios
//!
//! End-to-end runs through the message and request entry points on a single
//! NIBI:USDN market with 1,000,000 / 1,000,000 reserves.

use perp_settlement::msgs::{LiquidateRequest, MsgLiquidate, MsgOpenPosition, OpenPositionRequest};
use perp_settlement::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn nibi() -> Pair {
    "NIBI:USDN".parse().unwrap()
}

fn engine(params: MarketParams) -> Engine {
    let mut engine = Engine::new(EngineConfig::default());
    engine
        .add_market(nibi(), dec!(1_000_000), dec!(1_000_000), params)
        .unwrap();
    engine
}

fn open(engine: &mut Engine, seed: u64, side: Side, margin: Decimal) -> Address {
    let trader = Address::sample(seed);
    engine.deposit(&trader, Quote::new(margin)).unwrap();
    engine
        .open_position(OpenPositionRequest {
            trader: trader.clone(),
            pair: nibi(),
            side,
            quote_margin: Quote::new(margin),
            leverage: Leverage::new(dec!(10)).unwrap(),
            base_limit: Decimal::ZERO,
        })
        .unwrap();
    trader
}

fn open_msg(sender: &Address) -> MsgOpenPosition {
    MsgOpenPosition {
        sender: sender.to_string(),
        token_pair: "NIBI:USDN".to_string(),
        side: Side::BUY,
        quote_asset_amount: "100".to_string(),
        leverage: "10".to_string(),
        base_asset_amount_limit: "1".to_string(),
    }
}

#[test]
fn scenario_a_open_long() {
    let mut engine = engine(MarketParams::default());
    let trader = Address::sample(1);
    engine.deposit(&trader, Quote::new(dec!(100))).unwrap();

    let response = engine.deliver(Msg::OpenPosition(open_msg(&trader))).unwrap();
    let MsgResponse::Position(result) = response else {
        panic!("expected a position result");
    };

    // base = 1,000,000 - ceil(10^12 / 1,001,000)
    assert_eq!(result.exchanged_base, dec!(999.000999));
    assert_eq!(result.exchanged_quote.value(), dec!(1000));

    let market = engine.market(&nibi()).unwrap();
    assert_eq!(market.pool.base_reserve, dec!(999000.999001));
    assert_eq!(market.pool.quote_reserve, dec!(1_001_000));
    assert!(market.pool.invariant_surplus().unwrap() >= Decimal::ZERO);

    let position = engine.position(&nibi(), &trader).unwrap();
    assert_eq!(position.side, Side::Long);
    assert_eq!(position.size, dec!(999.000999));
    assert_eq!(position.margin.value(), dec!(100));
    assert_eq!(position.open_notional.value(), dec!(1000));
    assert_eq!(position.last_funding_index, Decimal::ZERO);
}

#[test]
fn scenario_b_zero_leverage_rejected() {
    let mut engine = engine(MarketParams::default());
    let trader = Address::sample(1);
    engine.deposit(&trader, Quote::new(dec!(100))).unwrap();
    let events_before = engine.events().count();
    let market_before = engine.market(&nibi()).unwrap();

    let mut msg = open_msg(&trader);
    msg.leverage = "0".to_string();
    let err = engine.deliver(Msg::OpenPosition(msg)).unwrap_err();

    assert!(matches!(err, EngineError::MalformedInput(_)));
    assert_eq!(engine.market(&nibi()).unwrap(), market_before);
    assert_eq!(engine.events().count(), events_before);
    assert_eq!(engine.account(&trader).unwrap().balance.value(), dec!(100));
}

#[test]
fn scenario_c_hyphenated_pair_rejected() {
    let mut engine = engine(MarketParams::default());
    let trader = Address::sample(1);

    let mut msg = open_msg(&trader);
    msg.token_pair = "NIBI-USDN".to_string();
    let err = engine.deliver(Msg::OpenPosition(msg)).unwrap_err();

    assert!(matches!(err, EngineError::MalformedInput(_)));
    assert!(engine.position(&nibi(), &trader).is_err());
}

#[test]
fn scenario_d_partial_then_healthy() {
    let params = MarketParams {
        partial_liquidation_ratio: dec!(0.5),
        liquidation_fee_ratio: dec!(0.01),
        ..MarketParams::default()
    };
    let mut engine = engine(params);
    let alice = open(&mut engine, 1, Side::Long, dec!(100));
    open(&mut engine, 2, Side::Short, dec!(3175.4));
    let keeper = Address::sample(99);

    // roughly 4%: under maintenance (6.25%), above full liquidation (2.5%)
    let ratio = engine.margin_ratio(&nibi(), &alice).unwrap();
    assert!(ratio > dec!(0.04) && ratio < dec!(0.0401));

    let msg = MsgLiquidate {
        sender: keeper.to_string(),
        token_pair: "NIBI:USDN".to_string(),
        trader: alice.to_string(),
    };
    let MsgResponse::Liquidation(result) = engine.deliver(Msg::Liquidate(msg.clone())).unwrap() else {
        panic!("expected a liquidation result");
    };

    assert_eq!(result.kind, LiquidationKind::Partial);
    assert_eq!(result.size_liquidated, dec!(499.500499));
    assert_eq!(result.exchanged_quote.value(), dec!(469.022582));
    assert_eq!(result.realized_pnl.value(), dec!(-30.977417));
    assert_eq!(result.penalty.total.value(), dec!(4.690226));
    assert_eq!(result.penalty.liquidator_reward.value(), dec!(2.345113));

    let remaining = engine.position(&nibi(), &alice).unwrap();
    assert_eq!(remaining.size, dec!(499.5005));
    assert_eq!(remaining.margin.value(), dec!(64.332357));
    assert_eq!(remaining.open_notional.value(), dec!(500.000001));

    let after = result.margin_ratio_after.unwrap();
    assert!(after > dec!(0.0702) && after < dec!(0.0703));
    assert_eq!(engine.margin_ratio(&nibi(), &alice).unwrap(), after);

    let err = engine.deliver(Msg::Liquidate(msg)).unwrap_err();
    assert!(matches!(err, EngineError::PositionHealthy { .. }));
    assert_eq!(engine.position(&nibi(), &alice).unwrap(), remaining);
}

#[test]
fn scenario_e_no_position() {
    let mut engine = engine(MarketParams::default());
    let before = engine.store().clone();

    let err = engine
        .liquidate(LiquidateRequest {
            liquidator: Address::sample(99),
            pair: nibi(),
            trader: Address::sample(1),
        })
        .unwrap_err();

    assert!(matches!(err, EngineError::NoOpenPosition { .. }));
    assert_eq!(engine.store().len(), before.len());
    assert_eq!(engine.market(&nibi()).unwrap().pool.base_reserve, dec!(1_000_000));
}

#[test]
fn genesis_document_drives_a_lifecycle() {
    let text = r#"{
        "genesis_time": 0,
        "markets": [
            { "pair": "NIBI:USDN", "base_reserve": "1000000", "quote_reserve": "1000000", "ecosystem_fund": "1000" }
        ],
        "accounts": [
            { "address": "nibi1qpzry9x8gf2tvdw0s3jn54khce6mua7lqpzry9", "balance": "500" }
        ]
    }"#;
    let genesis = GenesisConfig::from_json(text).unwrap();
    let mut engine = Engine::from_genesis(EngineConfig::default(), &genesis).unwrap();
    let trader = Address::new("nibi1qpzry9x8gf2tvdw0s3jn54khce6mua7lqpzry9");

    engine.deliver(Msg::OpenPosition(open_msg(&trader))).unwrap();
    assert_eq!(engine.account(&trader).unwrap().balance.value(), dec!(400));
    assert_eq!(engine.vault(&nibi()).unwrap().ecosystem_fund.value(), dec!(1000));

    let kinds: Vec<&str> = engine.events().map(|e| e.payload.kind()).collect();
    assert_eq!(kinds, vec!["market_created", "position_opened"]);
}
