// perp-settlement: perpetual futures settlement core over a virtual constant-product market.
// risk-first: margin math, funding and liquidation run on checked fixed-point decimals.
// all computation is deterministic with no external I/O; time and prices come from the caller.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Pair, Address, Side, Price, Quote, Leverage, Timestamp
//   1.1  numeric.rs: checked decimal ops, 6dp amount rounding, text parsing
//   2.x  vamm.rs: constant-product virtual pool, previews and swaps
//   3.x  margin.rs: notional, unrealized pnl, margin ratio, health
//   4.x  position.rs: position record, touch, increase/reduce
//   5.x  funding.rs: cumulative premium index, per-position payments
//   6.x  liquidation.rs: partial/full policy, penalty split
//   7.x  config.rs: genesis document, environment presets
//   8.x  engine/: atomic operations, queries, message dispatch
//   9.x  oracle.rs: index price input
//   9.1  store.rs: keyed store, cache branch, key layout
//   9.2  vault.rs: collateral and ecosystem fund
//   9.3  msgs.rs: wire messages and validate_basic
//   10.x account.rs: trader quote balances
//   11.x events.rs: state transition events for audit
//   12.x market.rs: market params + runtime state

// core settlement modules
pub mod engine;
pub mod funding;
pub mod liquidation;
pub mod margin;
pub mod market;
pub mod numeric;
pub mod position;
pub mod types;
pub mod vamm;

// ledger boundary
pub mod account;
pub mod config;
pub mod events;
pub mod msgs;
pub mod oracle;
pub mod store;
pub mod vault;

// re exports for convenience
pub use account::{Account, AccountError};
pub use config::{ConfigError, Environment, GenesisAccount, GenesisConfig, GenesisMarket};
pub use engine::{Engine, EngineConfig, EngineError, FundingResult, LiquidationResult, MsgResponse, PositionResult};
pub use events::{Event, EventPayload};
pub use liquidation::{LiquidationKind, LiquidationPenalty};
pub use margin::{MarginStatus, PositionHealth};
pub use market::{Market, MarketParams};
pub use msgs::{AddressValidator, Bech32Style, Msg};
pub use oracle::{FixedPrices, PriceOracle, PriceUpdate};
pub use position::Position;
pub use store::{CacheStore, KvStore, MemStore};
pub use types::{Address, Leverage, Pair, Price, Quote, Side, Timestamp};
pub use vamm::{Direction, TradeLimit, VirtualPool};
pub use vault::Vault;
