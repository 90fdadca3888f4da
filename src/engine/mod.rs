// 8.0: settlement engine. owns the store handle and runs every operation as one atomic unit:
// open, resize, close, margin changes, funding epochs and liquidations.
// deterministic with no external I/O; time and prices come in from the caller.

mod config;
mod core;
mod dispatch;
mod funding;
mod liquidations;
mod positions;
mod queries;
mod results;

pub use config::EngineConfig;
pub use core::Engine;
pub use results::{EngineError, FundingResult, LiquidationResult, MsgResponse, PositionResult};
