//! Perpetual settlement simulation.
//!
//! Walks the settlement core through its lifecycle on one NIBI:USDN market: open and close,
//! funding epochs, a partial liquidation, and a crash that leaves bad debt.
//! `RUST_LOG=perp_settlement=debug` shows every event the engine emits.

use perp_settlement::msgs::{ClosePositionRequest, LiquidateRequest, OpenPositionRequest};
use perp_settlement::types::PairError;
use perp_settlement::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

type SimResult = Result<(), Box<dyn std::error::Error>>;

const HOUR: i64 = 60 * 60 * 1000;

fn main() -> SimResult {
    init_tracing();

    println!("Perpetual Settlement Simulation");
    println!("Single vAMM Market, Isolated Margin, Full Lifecycle\n");

    scenario_1_open_and_close()?;
    scenario_2_funding()?;
    scenario_3_partial_liquidation()?;
    scenario_4_bad_debt()?;
    scenario_5_many_traders()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}

fn nibi() -> Result<Pair, PairError> {
    "NIBI:USDN".parse()
}

fn engine_with(params: MarketParams) -> Result<Engine, Box<dyn std::error::Error>> {
    let mut engine = Engine::new(EngineConfig::default());
    engine.add_market(nibi()?, dec!(1_000_000), dec!(1_000_000), params)?;
    Ok(engine)
}

fn open(engine: &mut Engine, seed: u64, side: Side, margin: Decimal, leverage: Decimal) -> Result<Address, Box<dyn std::error::Error>> {
    let trader = Address::sample(seed);
    engine.deposit(&trader, Quote::new(margin))?;
    let leverage = Leverage::new(leverage).ok_or("leverage must be positive")?;
    engine.open_position(OpenPositionRequest {
        trader: trader.clone(),
        pair: nibi()?,
        side,
        quote_margin: Quote::new(margin),
        leverage,
        base_limit: Decimal::ZERO,
    })?;
    Ok(trader)
}

/// Open and immediately close: the trader gets the margin back.
fn scenario_1_open_and_close() -> SimResult {
    println!("Scenario 1: Open and Close\n");

    let mut engine = engine_with(MarketParams::default())?;
    let alice = open(&mut engine, 1, Side::Long, dec!(100), dec!(10))?;

    let position = engine.position(&nibi()?, &alice)?;
    println!("  Alice opens LONG 100 USDN x10");
    println!("  Size: {} NIBI, notional: {}", position.size, position.open_notional);
    println!("  Mark price: {}", engine.spot_price(&nibi()?)?);

    let result = engine.close_position(ClosePositionRequest {
        trader: alice.clone(),
        pair: nibi()?,
    })?;
    println!("  Alice closes, receives {} (pnl {})", result.margin_to_trader, result.realized_pnl);
    println!("  Balance: {}\n", engine.account(&alice)?.balance);
    Ok(())
}

/// Mark above index: longs pay shorts once per epoch.
fn scenario_2_funding() -> SimResult {
    println!("Scenario 2: Funding Epochs\n");

    let mut engine = engine_with(MarketParams::default())?;
    let alice = open(&mut engine, 1, Side::Long, dec!(1000), dec!(10))?;
    let bob = open(&mut engine, 2, Side::Short, dec!(500), dec!(10))?;

    let mut oracle = FixedPrices::new();
    oracle.set(nibi()?, Price::new_unchecked(dec!(1)));

    for _ in 0..3 {
        engine.advance_time(HOUR);
        for result in engine.begin_block(&oracle)? {
            println!(
                "  Epoch {}: mark {}, index {}, premium {}",
                result.epoch, result.mark_price, result.index_price, result.premium_fraction
            );
        }
    }

    println!("  Alice owes {}", engine.pending_funding(&nibi()?, &alice)?);
    println!("  Bob owes {}", engine.pending_funding(&nibi()?, &bob)?);

    let touched = engine.touch_position(&nibi()?, &alice)?;
    println!("  Alice margin after touch: {}\n", touched.margin);
    Ok(())
}

/// A long under maintenance margin loses half its size, then is healthy again.
fn scenario_3_partial_liquidation() -> SimResult {
    println!("Scenario 3: Partial Liquidation\n");

    let params = MarketParams {
        partial_liquidation_ratio: dec!(0.5),
        liquidation_fee_ratio: dec!(0.01),
        ..MarketParams::default()
    };
    let mut engine = engine_with(params)?;
    let alice = open(&mut engine, 1, Side::Long, dec!(100), dec!(10))?;
    open(&mut engine, 2, Side::Short, dec!(3175.4), dec!(10))?;
    let keeper = Address::sample(99);

    println!("  Alice margin ratio: {}", engine.margin_ratio(&nibi()?, &alice)?.round_dp(6));

    let result = engine.liquidate(LiquidateRequest {
        liquidator: keeper.clone(),
        pair: nibi()?,
        trader: alice.clone(),
    })?;
    println!("  {:?} liquidation of {} NIBI", result.kind, result.size_liquidated);
    println!("  Keeper reward: {}", result.penalty.liquidator_reward);
    if let Some(after) = result.margin_ratio_after {
        println!("  Ratio after: {}", after.round_dp(6));
    }

    match engine.liquidate(LiquidateRequest {
        liquidator: keeper,
        pair: nibi()?,
        trader: alice,
    }) {
        Err(EngineError::PositionHealthy { margin_ratio, .. }) => {
            println!("  Second attempt rejected: healthy at {}\n", margin_ratio.round_dp(6));
        }
        other => println!("  Second attempt: {:?}\n", other.map(|r| r.kind)),
    }
    Ok(())
}

/// A heavy short crashes the mark; the long is liquidated past zero equity.
fn scenario_4_bad_debt() -> SimResult {
    println!("Scenario 4: Bad Debt\n");

    let mut engine = engine_with(MarketParams::default())?;
    engine.fund_ecosystem(&nibi()?, Quote::new(dec!(50)))?;
    let alice = open(&mut engine, 1, Side::Long, dec!(100), dec!(10))?;
    open(&mut engine, 2, Side::Short, dec!(10_000), dec!(10))?;

    let health = engine.position_health(&nibi()?, &alice)?;
    println!("  Alice equity {} on notional {}", health.equity, health.notional);

    let result = engine.liquidate(LiquidateRequest {
        liquidator: Address::sample(99),
        pair: nibi()?,
        trader: alice,
    })?;
    let vault = engine.vault(&nibi()?)?;
    println!("  {:?} liquidation, bad debt {}", result.kind, result.bad_debt);
    println!("  Ecosystem fund: {}, collateral: {}\n", vault.ecosystem_fund, vault.collateral);
    Ok(())
}

/// Twenty traders, alternating sides, then a keeper sweep.
fn scenario_5_many_traders() -> SimResult {
    println!("Scenario 5: Many Traders\n");

    let mut engine = engine_with(MarketParams::default())?;
    let mut traders = Vec::new();
    for i in 0..20u64 {
        let side = if i % 2 == 0 { Side::Long } else { Side::Short };
        let margin = dec!(500) + Decimal::from(i) * dec!(250);
        traders.push(open(&mut engine, i + 1, side, margin, dec!(8))?);
    }

    let keeper = Address::sample(1000);
    let mut liquidated = 0;
    for trader in &traders {
        if engine.is_liquidatable(&nibi()?, trader)? {
            engine.liquidate(LiquidateRequest {
                liquidator: keeper.clone(),
                pair: nibi()?,
                trader: trader.clone(),
            })?;
            liquidated += 1;
        }
    }

    let market = engine.market(&nibi()?)?;
    println!("  Open interest: {} long, {} short", market.open_interest_long, market.open_interest_short);
    println!("  Liquidated: {}", liquidated);
    println!("  Keeper balance: {}", engine.account(&keeper)?.balance);
    println!("  Events generated: {}\n", engine.events().count());
    Ok(())
}
