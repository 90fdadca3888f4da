// 8.0 engine/core.rs: main engine. owns the committed store, the event log and the block clock.
// 8.0.1 Tx: one operation's view of the world. writes and events stay in it until commit.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::account::Account;
use crate::config::GenesisConfig;
use crate::events::{Event, EventCollector, EventPayload, FundingSettledEvent, MarketCreatedEvent};
use crate::market::{Market, MarketParams};
use crate::msgs::Bech32Style;
use crate::position::Position;
use crate::store::{self, CacheStore, KvStore, MemStore};
use crate::types::{Address, Pair, Quote, Timestamp};
use crate::vault::Vault;
use rust_decimal::Decimal;
use tracing::{debug, info};

/** 8.1: main engine struct. all persistent state lives in the store */
pub struct Engine<S: KvStore = MemStore> {
    pub(super) config: EngineConfig,
    pub(super) store: S,
    pub(super) events: EventCollector,
    pub(super) validator: Bech32Style,
    pub(super) current_time: Timestamp,
}

impl Engine<MemStore> {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_store(config, MemStore::new())
    }

    /// Builds an engine holding every market, fund seed and balance in `genesis`.
    pub fn from_genesis(config: EngineConfig, genesis: &GenesisConfig) -> Result<Self, EngineError> {
        genesis.validate()?;
        let mut engine = Self::new(config);
        engine.set_time(genesis.genesis_time);

        for market in &genesis.markets {
            engine.add_market(
                market.pair.clone(),
                market.base_reserve,
                market.quote_reserve,
                market.params.clone(),
            )?;
            if market.ecosystem_fund.is_positive() {
                engine.fund_ecosystem(&market.pair, market.ecosystem_fund)?;
            }
        }
        for account in &genesis.accounts {
            engine.deposit(&account.address, account.balance)?;
        }

        info!(
            markets = genesis.markets.len(),
            accounts = genesis.accounts.len(),
            time = %genesis.genesis_time,
            "engine initialized from genesis"
        );
        Ok(engine)
    }
}

impl<S: KvStore> Engine<S> {
    pub fn with_store(config: EngineConfig, store: S) -> Self {
        let validator = Bech32Style {
            prefix: config.address_prefix.clone(),
        };
        let events = EventCollector::new(config.max_events);
        Self {
            config,
            store,
            events,
            validator,
            current_time: Timestamp::from_millis(0),
        }
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, millis: i64) {
        self.current_time = self.current_time.plus_millis(millis);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Committed state. Never shows the writes of an operation in flight.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn add_market(
        &mut self,
        pair: Pair,
        base_reserve: Decimal,
        quote_reserve: Decimal,
        params: MarketParams,
    ) -> Result<(), EngineError> {
        self.execute("add_market", |tx| {
            if tx.has_market(&pair) {
                return Err(EngineError::MarketAlreadyExists(pair.clone()));
            }
            let market = Market::new(pair.clone(), base_reserve, quote_reserve, params, tx.now)?;
            tx.put_market(&market)?;
            tx.put_vault(&Vault::new(pair.clone()))?;
            tx.emit(EventPayload::MarketCreated(MarketCreatedEvent {
                pair: pair.clone(),
                base_reserve,
                quote_reserve,
            }));
            info!(%pair, %base_reserve, %quote_reserve, "market created");
            Ok(())
        })
    }

    /// Tops up a market's ecosystem fund from outside the system.
    pub fn fund_ecosystem(&mut self, pair: &Pair, amount: Quote) -> Result<(), EngineError> {
        if !amount.is_positive() {
            return Err(EngineError::MalformedInput(format!("fund amount must be positive, got {amount}")));
        }
        self.execute("fund_ecosystem", |tx| {
            tx.market(pair)?;
            let mut vault = tx.vault(pair)?;
            vault.fund(amount)?;
            tx.put_vault(&vault)
        })
    }

    pub fn deposit(&mut self, address: &Address, amount: Quote) -> Result<(), EngineError> {
        if amount.is_negative() {
            return Err(EngineError::MalformedInput(format!("deposit must not be negative, got {amount}")));
        }
        self.execute("deposit", |tx| {
            let mut account = tx.account(address)?;
            account.deposit(amount)?;
            tx.put_account(&account)
        })
    }

    pub fn withdraw(&mut self, address: &Address, amount: Quote) -> Result<(), EngineError> {
        self.execute("withdraw", |tx| {
            let mut account = tx.account(address)?;
            account.withdraw(amount)?;
            tx.put_account(&account)
        })
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.events()
    }

    pub fn recent_events(&self, count: usize) -> Vec<&Event> {
        let skip = self.events.len().saturating_sub(count);
        self.events.events().skip(skip).collect()
    }

    /// Runs `op` against a fresh cache branch. Writes and events land only if it succeeds.
    pub(super) fn execute<T>(
        &mut self,
        operation: &'static str,
        op: impl FnOnce(&mut Tx<'_, S>) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let now = self.current_time;
        let mut tx = Tx {
            store: CacheStore::new(&mut self.store),
            events: Vec::new(),
            now,
        };

        match op(&mut tx) {
            Ok(output) => {
                let Tx { store, events, .. } = tx;
                store.commit();
                for payload in &events {
                    debug!(operation, event = payload.kind(), ?payload, "event emitted");
                }
                self.events.extend(now, events);
                Ok(output)
            }
            Err(err) => {
                debug!(operation, error = %err, "operation rolled back");
                Err(err)
            }
        }
    }
}

pub(super) struct Tx<'a, S: KvStore> {
    pub(super) store: CacheStore<'a, S>,
    pub(super) events: Vec<EventPayload>,
    pub(super) now: Timestamp,
}

impl<S: KvStore> Tx<'_, S> {
    pub(super) fn emit(&mut self, payload: EventPayload) {
        self.events.push(payload);
    }

    fn has_market(&self, pair: &Pair) -> bool {
        self.store.get(&store::market_key(pair)).is_some()
    }

    pub(super) fn market(&self, pair: &Pair) -> Result<Market, EngineError> {
        store::load(&self.store, &store::market_key(pair))?
            .ok_or_else(|| EngineError::NoSuchMarket(pair.clone()))
    }

    pub(super) fn put_market(&mut self, market: &Market) -> Result<(), EngineError> {
        store::save(&mut self.store, store::market_key(&market.pair), market)?;
        Ok(())
    }

    pub(super) fn position(&self, pair: &Pair, trader: &Address) -> Result<Option<Position>, EngineError> {
        Ok(store::load(&self.store, &store::position_key(pair, trader))?)
    }

    pub(super) fn existing_position(&self, pair: &Pair, trader: &Address) -> Result<Position, EngineError> {
        self.position(pair, trader)?.ok_or_else(|| EngineError::NoOpenPosition {
            trader: trader.clone(),
            pair: pair.clone(),
        })
    }

    pub(super) fn put_position(&mut self, position: &Position) -> Result<(), EngineError> {
        store::save(
            &mut self.store,
            store::position_key(&position.pair, &position.trader),
            position,
        )?;
        Ok(())
    }

    pub(super) fn remove_position(&mut self, pair: &Pair, trader: &Address) {
        self.store.delete(&store::position_key(pair, trader));
    }

    pub(super) fn vault(&self, pair: &Pair) -> Result<Vault, EngineError> {
        Ok(store::load(&self.store, &store::vault_key(pair))?.unwrap_or_else(|| Vault::new(pair.clone())))
    }

    pub(super) fn put_vault(&mut self, vault: &Vault) -> Result<(), EngineError> {
        store::save(&mut self.store, store::vault_key(&vault.pair), vault)?;
        Ok(())
    }

    pub(super) fn account(&self, address: &Address) -> Result<Account, EngineError> {
        Ok(store::load(&self.store, &store::account_key(address))?.unwrap_or_else(|| Account::new(address.clone())))
    }

    pub(super) fn put_account(&mut self, account: &Account) -> Result<(), EngineError> {
        store::save(&mut self.store, store::account_key(&account.address), account)?;
        Ok(())
    }

    /// Settles outstanding funding into the position's margin. Every mutation starts here.
    pub(super) fn touch(&mut self, market: &Market, position: &mut Position) -> Result<Quote, EngineError> {
        let payment = position.touch(market.funding_index(), self.now)?;
        if !payment.is_zero() {
            self.emit(EventPayload::FundingSettled(FundingSettledEvent {
                trader: position.trader.clone(),
                pair: position.pair.clone(),
                payment,
                funding_index: position.last_funding_index,
                margin_after: position.margin,
            }));
        }
        Ok(payment)
    }
}
