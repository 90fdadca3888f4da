// Index price input for funding.
//
// The engine never fetches prices itself: whoever drives the block hands it a `PriceOracle`
// and the funding epoch reads one index price per pair from it. A stale or missing price
// skips that market for the block instead of failing the block.

use crate::types::{Pair, Price, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single index price observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub price: Price,
    pub timestamp: Timestamp,
    /// Milliseconds after `timestamp` during which the price is still usable.
    pub ttl_ms: i64,
}

impl PriceUpdate {
    pub fn new(price: Price, timestamp: Timestamp) -> Self {
        Self {
            price,
            timestamp,
            ttl_ms: 60 * 1000,
        }
    }

    pub fn with_ttl(mut self, ttl_ms: i64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    pub fn is_stale(&self, now: Timestamp) -> bool {
        now.millis_since(&self.timestamp) > self.ttl_ms
    }
}

/// Source of index prices, one per pair.
pub trait PriceOracle {
    /// Fresh index price for `pair` at `now`, if any.
    fn index_price(&self, pair: &Pair, now: Timestamp) -> Option<Price>;
}

/// In-memory oracle fed by the caller. Used by the simulator and the tests.
#[derive(Debug, Clone, Default)]
pub struct FixedPrices {
    prices: BTreeMap<Pair, PriceUpdate>,
}

impl FixedPrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, pair: Pair, update: PriceUpdate) {
        self.prices.insert(pair, update);
    }

    /// Price that never goes stale.
    pub fn set(&mut self, pair: Pair, price: Price) {
        self.submit(pair, PriceUpdate::new(price, Timestamp::from_millis(0)).with_ttl(i64::MAX));
    }

}

impl PriceOracle for FixedPrices {
    fn index_price(&self, pair: &Pair, now: Timestamp) -> Option<Price> {
        self.prices
            .get(pair)
            .filter(|update| !update.is_stale(now))
            .map(|update| update.price)
    }
}
