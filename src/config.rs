// 7.0 config.rs: genesis document and parameter presets. markets, starting balances, fund seeding.
// 7.1 Environment presets only differ in risk params; the engine treats them all the same.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::market::MarketParams;
use crate::types::{Address, Leverage, Pair, Quote, Timestamp};

// One market to create at genesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisMarket {
    pub pair: Pair,
    // Initial virtual reserves. Their ratio is the starting mark price.
    pub base_reserve: Decimal,
    pub quote_reserve: Decimal,
    #[serde(default)]
    pub params: MarketParams,
    // Seed for the market's ecosystem fund
    #[serde(default)]
    pub ecosystem_fund: Quote,
}

// Starting quote balance for one address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: Address,
    pub balance: Quote,
}

/** 7.2: the whole starting state. loaded from JSON by the host or built in code */
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenesisConfig {
    #[serde(default)]
    pub genesis_time: Timestamp,
    #[serde(default)]
    pub markets: Vec<GenesisMarket>,
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,
}

impl GenesisConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: GenesisConfig =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    // Validate the document for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for market in &self.markets {
            if !seen.insert(&market.pair) {
                return Err(ConfigError::DuplicateMarket(market.pair.clone()));
            }
            if market.base_reserve <= Decimal::ZERO || market.quote_reserve <= Decimal::ZERO {
                return Err(ConfigError::InvalidMarket {
                    pair: market.pair.clone(),
                    reason: "reserves must be positive".to_string(),
                });
            }
            if market.ecosystem_fund.is_negative() {
                return Err(ConfigError::InvalidMarket {
                    pair: market.pair.clone(),
                    reason: "ecosystem fund seed must not be negative".to_string(),
                });
            }
            market.params.validate().map_err(|e| ConfigError::InvalidMarket {
                pair: market.pair.clone(),
                reason: e.to_string(),
            })?;
        }

        for account in &self.accounts {
            if account.address.as_str().is_empty() {
                return Err(ConfigError::InvalidAccount("empty address".to_string()));
            }
            if account.balance.is_negative() {
                return Err(ConfigError::InvalidAccount(format!(
                    "{} has a negative balance",
                    account.address
                )));
            }
        }
        Ok(())
    }

    /// Single NIBI:USDN market at parity with the preset's params.
    pub fn single_market(environment: Environment, reserve: Decimal) -> Result<Self, ConfigError> {
        let pair = Pair::new("NIBI", "USDN").map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(Self {
            genesis_time: Timestamp::default(),
            markets: vec![GenesisMarket {
                pair,
                base_reserve: reserve,
                quote_reserve: reserve,
                params: environment.market_params(),
                ecosystem_fund: Quote::zero(),
            }],
            accounts: Vec::new(),
        })
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot parse config: {0}")]
    Parse(String),

    #[error("market {0} listed twice")]
    DuplicateMarket(Pair),

    #[error("market {pair}: {reason}")]
    InvalidMarket { pair: Pair, reason: String },

    #[error("account: {0}")]
    InvalidAccount(String),
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn market_params(&self) -> MarketParams {
        match self {
            Environment::Development => MarketParams::default(),
            // looser leverage, fast funding epochs
            Environment::Testnet => MarketParams {
                max_leverage: leverage(dec!(20)),
                initial_margin_ratio: dec!(0.05),
                maintenance_margin_ratio: dec!(0.03),
                full_liquidation_ratio: dec!(0.015),
                funding_epoch_ms: 15 * 60 * 1000,
                epochs_per_funding_period: 96,
                ..MarketParams::default()
            },
            // conservative leverage with a trading fee
            Environment::Mainnet => MarketParams {
                max_leverage: leverage(dec!(5)),
                initial_margin_ratio: dec!(0.2),
                maintenance_margin_ratio: dec!(0.1),
                full_liquidation_ratio: dec!(0.05),
                exchange_fee_ratio: dec!(0.001),
                trade_limit_ratio: dec!(0.05),
                ..MarketParams::default()
            },
        }
    }
}

fn leverage(value: Decimal) -> Leverage {
    Leverage::new(value).unwrap_or_else(|| MarketParams::default().max_leverage)
}
