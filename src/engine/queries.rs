//! Read-only views over committed state.
//!
//! Values that depend on funding are computed against a touched copy of the position; the
//! stored record is never modified by a query.

use super::core::Engine;
use super::results::EngineError;
use crate::account::Account;
use crate::margin::{evaluate_health, PositionHealth};
use crate::market::Market;
use crate::position::Position;
use crate::store::{self, KvStore, MARKET_PREFIX};
use crate::types::{Address, Pair, Price, Quote};
use crate::vault::Vault;
use rust_decimal::Decimal;

impl<S: KvStore> Engine<S> {
    pub fn market(&self, pair: &Pair) -> Result<Market, EngineError> {
        store::load(&self.store, &store::market_key(pair))?
            .ok_or_else(|| EngineError::NoSuchMarket(pair.clone()))
    }

    /// Every market, in key order.
    pub fn markets(&self) -> Result<Vec<Market>, EngineError> {
        let mut markets = Vec::new();
        for key in self.store.prefix_keys(MARKET_PREFIX) {
            if let Some(market) = store::load(&self.store, &key)? {
                markets.push(market);
            }
        }
        Ok(markets)
    }

    pub fn position(&self, pair: &Pair, trader: &Address) -> Result<Position, EngineError> {
        store::load(&self.store, &store::position_key(pair, trader))?.ok_or_else(|| {
            EngineError::NoOpenPosition {
                trader: trader.clone(),
                pair: pair.clone(),
            }
        })
    }

    pub fn positions(&self, pair: &Pair) -> Result<Vec<Position>, EngineError> {
        let mut positions = Vec::new();
        for key in self.store.prefix_keys(&store::positions_prefix(pair)) {
            if let Some(position) = store::load(&self.store, &key)? {
                positions.push(position);
            }
        }
        Ok(positions)
    }

    pub fn vault(&self, pair: &Pair) -> Result<Vault, EngineError> {
        store::load(&self.store, &store::vault_key(pair))?
            .ok_or_else(|| EngineError::NoSuchMarket(pair.clone()))
    }

    /// Unknown addresses read as an empty account.
    pub fn account(&self, address: &Address) -> Result<Account, EngineError> {
        Ok(store::load(&self.store, &store::account_key(address))?
            .unwrap_or_else(|| Account::new(address.clone())))
    }

    pub fn spot_price(&self, pair: &Pair) -> Result<Price, EngineError> {
        Ok(self.market(pair)?.mark_price()?)
    }

    pub fn position_health(&self, pair: &Pair, trader: &Address) -> Result<PositionHealth, EngineError> {
        let (market, position) = self.touched(pair, trader)?;
        Ok(evaluate_health(&market, &position)?)
    }

    pub fn margin_ratio(&self, pair: &Pair, trader: &Address) -> Result<Decimal, EngineError> {
        Ok(self.position_health(pair, trader)?.margin_ratio)
    }

    pub fn is_liquidatable(&self, pair: &Pair, trader: &Address) -> Result<bool, EngineError> {
        let (market, position) = self.touched(pair, trader)?;
        Ok(crate::margin::is_liquidatable(&market, &position)?)
    }

    pub fn unrealized_pnl(&self, pair: &Pair, trader: &Address) -> Result<Quote, EngineError> {
        Ok(self.position_health(pair, trader)?.unrealized_pnl)
    }

    /// Funding the next touch would settle. Positive = the position pays.
    pub fn pending_funding(&self, pair: &Pair, trader: &Address) -> Result<Quote, EngineError> {
        let market = self.market(pair)?;
        let position = self.position(pair, trader)?;
        Ok(position.pending_funding(market.funding_index())?)
    }

    fn touched(&self, pair: &Pair, trader: &Address) -> Result<(Market, Position), EngineError> {
        let market = self.market(pair)?;
        let mut position = self.position(pair, trader)?;
        position.touch(market.funding_index(), self.current_time)?;
        Ok((market, position))
    }
}
