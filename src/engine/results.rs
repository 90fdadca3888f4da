// 8.0.2: result types and errors for engine operations.

use crate::account::AccountError;
use crate::config::ConfigError;
use crate::liquidation::{LiquidationKind, LiquidationPenalty};
use crate::market::MarketError;
use crate::numeric::ArithmeticError;
use crate::position::Position;
use crate::store::StoreError;
use crate::types::{Address, Pair, Price, Quote};
use crate::vamm::CurveError;
use rust_decimal::Decimal;

/// Outcome of open, increase, decrease and close.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionResult {
    /// The position after the operation. `None` once closed.
    pub position: Option<Position>,
    pub exchanged_base: Decimal,
    pub exchanged_quote: Quote,
    pub realized_pnl: Quote,
    pub exchange_fee: Quote,
    /// Funding settled by the touch that preceded the operation. Positive = paid.
    pub funding_payment: Quote,
    /// Quote credited to the trader's balance.
    pub margin_to_trader: Quote,
    pub bad_debt: Quote,
    pub mark_price: Price,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiquidationResult {
    pub kind: LiquidationKind,
    pub trader: Address,
    pub liquidator: Address,
    pub pair: Pair,
    /// What remains after a partial liquidation.
    pub position: Option<Position>,
    pub size_liquidated: Decimal,
    pub exchanged_quote: Quote,
    pub realized_pnl: Quote,
    pub penalty: LiquidationPenalty,
    pub margin_to_trader: Quote,
    pub bad_debt: Quote,
    pub margin_ratio_before: Decimal,
    pub margin_ratio_after: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FundingResult {
    pub pair: Pair,
    pub epoch: u64,
    pub mark_price: Price,
    pub index_price: Price,
    pub premium_fraction: Decimal,
    /// Premium as a fraction of the index price.
    pub funding_rate: Decimal,
    pub cumulative_premium_fraction: Decimal,
}

/// What `Engine::deliver` hands back for each message kind.
#[derive(Debug, Clone, PartialEq)]
pub enum MsgResponse {
    Position(PositionResult),
    Liquidation(LiquidationResult),
    Margin(Position),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("no market for pair {0}")]
    NoSuchMarket(Pair),

    #[error("market {0} already exists")]
    MarketAlreadyExists(Pair),

    #[error("{trader} already has an open position on {pair}")]
    PositionAlreadyOpen { trader: Address, pair: Pair },

    #[error("{trader} has no open position on {pair}")]
    NoOpenPosition { trader: Address, pair: Pair },

    #[error("leverage {leverage} exceeds market maximum {max}")]
    LeverageExceeded { leverage: Decimal, max: Decimal },

    #[error("insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    #[error("slippage exceeded: base amount {base} against limit {limit}")]
    SlippageExceeded { base: Decimal, limit: Decimal },

    #[error("trade of {amount} exceeds the {limit} limit on the {reserve} reserve")]
    TradeLimitExceeded {
        reserve: &'static str,
        amount: Decimal,
        limit: Decimal,
    },

    #[error("position is healthy: margin ratio {margin_ratio} >= maintenance {maintenance}")]
    PositionHealthy { margin_ratio: Decimal, maintenance: Decimal },

    #[error("margin too low: ratio {margin_ratio} below required {required}")]
    MarginTooLow { margin_ratio: Decimal, required: Decimal },

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Quote, available: Quote },

    #[error("arithmetic overflow: {0}")]
    ArithmeticOverflow(#[from] ArithmeticError),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<CurveError> for EngineError {
    fn from(err: CurveError) -> Self {
        match err {
            CurveError::InsufficientLiquidity { .. } => EngineError::InsufficientLiquidity(err.to_string()),
            CurveError::TradeLimitExceeded { reserve, amount, limit } => {
                EngineError::TradeLimitExceeded { reserve, amount, limit }
            }
            CurveError::NonPositiveAmount(_) => EngineError::MalformedInput(err.to_string()),
            CurveError::Arithmetic(e) => EngineError::ArithmeticOverflow(e),
        }
    }
}

impl From<AccountError> for EngineError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InsufficientBalance { requested, available } => {
                EngineError::InsufficientFunds { requested, available }
            }
            AccountError::Arithmetic(e) => EngineError::ArithmeticOverflow(e),
        }
    }
}

impl From<MarketError> for EngineError {
    fn from(err: MarketError) -> Self {
        match err {
            MarketError::InvalidParams { reason } => EngineError::InvalidParams(reason),
            MarketError::Curve(e) => e.into(),
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::InvalidParams(err.to_string())
    }
}
