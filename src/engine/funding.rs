//! Funding epochs.
//!
//! Settlement here only moves the market's cumulative index. Positions pick up what they owe
//! the next time they are touched.

use super::core::{Engine, Tx};
use super::results::{EngineError, FundingResult};
use crate::events::{EventPayload, FundingRateUpdatedEvent};
use crate::funding::{advance_epoch, premium_as_rate};
use crate::market::Market;
use crate::oracle::PriceOracle;
use crate::store::{self, KvStore, MARKET_PREFIX};
use crate::types::{Pair, Price};
use tracing::{info, warn};

impl<S: KvStore> Engine<S> {
    /// Advances `pair` by one funding epoch against `index_price`. `None` if the epoch has not
    /// elapsed yet. After a gap each call settles the oldest outstanding epoch.
    pub fn settle_funding(&mut self, pair: &Pair, index_price: Price) -> Result<Option<FundingResult>, EngineError> {
        self.execute("settle_funding", |tx| {
            let mut market = tx.market(pair)?;
            if !market.funding.is_due(tx.now, &market.params) {
                return Ok(None);
            }
            tx.advance_funding(&mut market, index_price).map(Some)
        })
    }

    /// Runs before a block's transactions: settles every due market in key order, one result per
    /// elapsed epoch. A due market without an oracle price waits for a later block.
    pub fn begin_block(&mut self, oracle: &dyn PriceOracle) -> Result<Vec<FundingResult>, EngineError> {
        self.execute("begin_block", |tx| {
            let mut settled = Vec::new();
            for key in tx.store.prefix_keys(MARKET_PREFIX) {
                let Some(mut market) = store::load::<Market>(&tx.store, &key)? else {
                    continue;
                };
                if !market.funding.is_due(tx.now, &market.params) {
                    continue;
                }
                let Some(index_price) = oracle.index_price(&market.pair, tx.now) else {
                    warn!(pair = %market.pair, time = %tx.now, "no index price, funding epoch skipped");
                    continue;
                };
                while market.funding.is_due(tx.now, &market.params) {
                    settled.push(tx.advance_funding(&mut market, index_price)?);
                }
            }
            Ok(settled)
        })
    }
}

impl<S: KvStore> Tx<'_, S> {
    fn advance_funding(&mut self, market: &mut Market, index_price: Price) -> Result<FundingResult, EngineError> {
        let mark_price = market.mark_price()?;
        market.funding = advance_epoch(&market.funding, mark_price, index_price, &market.params)?;
        self.put_market(market)?;

        let result = FundingResult {
            pair: market.pair.clone(),
            epoch: market.funding.epoch,
            mark_price,
            index_price,
            premium_fraction: market.funding.last_premium_fraction,
            funding_rate: premium_as_rate(market.funding.last_premium_fraction, index_price)?,
            cumulative_premium_fraction: market.funding.cumulative_premium_fraction,
        };
        self.emit(EventPayload::FundingRateUpdated(FundingRateUpdatedEvent {
            pair: result.pair.clone(),
            epoch: result.epoch,
            mark_price,
            index_price,
            premium_fraction: result.premium_fraction,
            cumulative_premium_fraction: result.cumulative_premium_fraction,
        }));
        info!(
            pair = %result.pair,
            epoch = result.epoch,
            mark = %mark_price,
            index = %index_price,
            premium = %result.premium_fraction,
            rate = %result.funding_rate,
            "funding epoch settled"
        );
        Ok(result)
    }
}
