//! Transaction messages.
//!
//! Messages carry raw wire fields exactly as the ledger decodes them: addresses and pairs as
//! text, side as its protobuf discriminant, amounts as decimal strings. `validate_basic` does
//! every check that needs no state and returns a typed request; the engine only ever sees
//! typed requests.

use crate::engine::EngineError;
use crate::numeric::{parse_amount, parse_ratio};
use crate::types::{Address, Leverage, Pair, Quote, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Address format check supplied by the host chain.
pub trait AddressValidator {
    /// Canonical form of `raw`, or `None` if it is not an address.
    fn canonicalize(&self, raw: &str) -> Option<String>;

    fn is_valid(&self, raw: &str) -> bool {
        self.canonicalize(raw).is_some()
    }
}

const BECH32_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// `<hrp>1<data>`: human-readable part, then 6 to 90 characters of the bech32 data alphabet.
/// Either case is accepted as long as it is not mixed; the canonical form is lowercase.
/// Checksums are the host's concern.
#[derive(Debug, Clone, Default)]
pub struct Bech32Style {
    /// Required human-readable part. `None` accepts any.
    pub prefix: Option<String>,
}

impl Bech32Style {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl AddressValidator for Bech32Style {
    fn canonicalize(&self, raw: &str) -> Option<String> {
        let has_upper = raw.bytes().any(|b| b.is_ascii_uppercase());
        let has_lower = raw.bytes().any(|b| b.is_ascii_lowercase());
        if has_upper && has_lower {
            return None;
        }
        let lowered = raw.to_ascii_lowercase();
        let (hrp, data) = lowered.rsplit_once('1')?;
        if hrp.is_empty() || !hrp.bytes().all(|b| b.is_ascii_lowercase()) {
            return None;
        }
        if self.prefix.as_deref().is_some_and(|prefix| prefix != hrp) {
            return None;
        }
        let data_ok = (6..=90).contains(&data.len()) && data.chars().all(|c| BECH32_CHARSET.contains(c));
        data_ok.then_some(lowered)
    }
}

fn parse_address(validator: &dyn AddressValidator, field: &str, raw: &str) -> Result<Address, EngineError> {
    validator
        .canonicalize(raw)
        .filter(|canonical| !canonical.is_empty())
        .map(Address::new)
        .ok_or_else(|| EngineError::InvalidAddress(format!("{field}: {raw:?}")))
}

fn parse_pair(raw: &str) -> Result<Pair, EngineError> {
    raw.parse()
        .map_err(|e| EngineError::MalformedInput(format!("token_pair: {e}")))
}

fn parse_side(raw: i32) -> Result<Side, EngineError> {
    Side::from_wire(raw).ok_or_else(|| EngineError::MalformedInput(format!("side: unknown value {raw}")))
}

fn amount(field: &str, raw: &str) -> Result<Decimal, EngineError> {
    parse_amount(raw).map_err(|e| EngineError::MalformedInput(format!("{field}: {e}")))
}

fn positive_amount(field: &str, raw: &str) -> Result<Decimal, EngineError> {
    let value = amount(field, raw)?;
    if value <= Decimal::ZERO {
        return Err(EngineError::MalformedInput(format!("{field}: must be positive, got {value}")));
    }
    Ok(value)
}

/// Empty text and zero both mean "no bound".
fn optional_limit(field: &str, raw: &str) -> Result<Decimal, EngineError> {
    if raw.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let value = amount(field, raw)?;
    if value < Decimal::ZERO {
        return Err(EngineError::MalformedInput(format!("{field}: must not be negative, got {value}")));
    }
    Ok(value)
}

fn parse_leverage(raw: &str) -> Result<Leverage, EngineError> {
    let value = parse_ratio(raw).map_err(|e| EngineError::MalformedInput(format!("leverage: {e}")))?;
    Leverage::new(value)
        .ok_or_else(|| EngineError::MalformedInput(format!("leverage: must be positive, got {value}")))
}

// typed requests

#[derive(Debug, Clone, PartialEq)]
pub struct OpenPositionRequest {
    pub trader: Address,
    pub pair: Pair,
    pub side: Side,
    pub quote_margin: Quote,
    pub leverage: Leverage,
    /// Long: minimum base received. Short: maximum base owed. Zero disables the check.
    pub base_limit: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncreasePositionRequest {
    pub trader: Address,
    pub pair: Pair,
    pub quote_margin: Quote,
    pub leverage: Leverage,
    pub base_limit: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecreasePositionRequest {
    pub trader: Address,
    pub pair: Pair,
    /// Notional to unwind, in quote.
    pub quote_amount: Quote,
    pub base_limit: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosePositionRequest {
    pub trader: Address,
    pub pair: Pair,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiquidateRequest {
    pub liquidator: Address,
    pub pair: Pair,
    pub trader: Address,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarginRequest {
    pub trader: Address,
    pub pair: Pair,
    pub amount: Quote,
}

// wire messages

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgOpenPosition {
    pub sender: String,
    pub token_pair: String,
    pub side: i32,
    pub quote_asset_amount: String,
    pub leverage: String,
    pub base_asset_amount_limit: String,
}

impl MsgOpenPosition {
    pub fn validate_basic(&self, validator: &dyn AddressValidator) -> Result<OpenPositionRequest, EngineError> {
        let trader = parse_address(validator, "sender", &self.sender)?;
        let pair = parse_pair(&self.token_pair)?;
        let side = parse_side(self.side)?;
        let quote_margin = positive_amount("quote_asset_amount", &self.quote_asset_amount)?;
        let leverage = parse_leverage(&self.leverage)?;
        let base_limit = positive_amount("base_asset_amount_limit", &self.base_asset_amount_limit)?;

        Ok(OpenPositionRequest {
            trader,
            pair,
            side,
            quote_margin: Quote::new(quote_margin),
            leverage,
            base_limit,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgIncreasePosition {
    pub sender: String,
    pub token_pair: String,
    pub quote_asset_amount: String,
    pub leverage: String,
    pub base_asset_amount_limit: String,
}

impl MsgIncreasePosition {
    pub fn validate_basic(&self, validator: &dyn AddressValidator) -> Result<IncreasePositionRequest, EngineError> {
        Ok(IncreasePositionRequest {
            trader: parse_address(validator, "sender", &self.sender)?,
            pair: parse_pair(&self.token_pair)?,
            quote_margin: Quote::new(positive_amount("quote_asset_amount", &self.quote_asset_amount)?),
            leverage: parse_leverage(&self.leverage)?,
            base_limit: optional_limit("base_asset_amount_limit", &self.base_asset_amount_limit)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgDecreasePosition {
    pub sender: String,
    pub token_pair: String,
    pub quote_asset_amount: String,
    pub base_asset_amount_limit: String,
}

impl MsgDecreasePosition {
    pub fn validate_basic(&self, validator: &dyn AddressValidator) -> Result<DecreasePositionRequest, EngineError> {
        Ok(DecreasePositionRequest {
            trader: parse_address(validator, "sender", &self.sender)?,
            pair: parse_pair(&self.token_pair)?,
            quote_amount: Quote::new(positive_amount("quote_asset_amount", &self.quote_asset_amount)?),
            base_limit: optional_limit("base_asset_amount_limit", &self.base_asset_amount_limit)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgClosePosition {
    pub sender: String,
    pub token_pair: String,
}

impl MsgClosePosition {
    pub fn validate_basic(&self, validator: &dyn AddressValidator) -> Result<ClosePositionRequest, EngineError> {
        Ok(ClosePositionRequest {
            trader: parse_address(validator, "sender", &self.sender)?,
            pair: parse_pair(&self.token_pair)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgLiquidate {
    pub sender: String,
    pub token_pair: String,
    pub trader: String,
}

impl MsgLiquidate {
    pub fn validate_basic(&self, validator: &dyn AddressValidator) -> Result<LiquidateRequest, EngineError> {
        Ok(LiquidateRequest {
            liquidator: parse_address(validator, "sender", &self.sender)?,
            pair: parse_pair(&self.token_pair)?,
            trader: parse_address(validator, "trader", &self.trader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAddMargin {
    pub sender: String,
    pub token_pair: String,
    pub margin: String,
}

impl MsgAddMargin {
    pub fn validate_basic(&self, validator: &dyn AddressValidator) -> Result<MarginRequest, EngineError> {
        Ok(MarginRequest {
            trader: parse_address(validator, "sender", &self.sender)?,
            pair: parse_pair(&self.token_pair)?,
            amount: Quote::new(positive_amount("margin", &self.margin)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgRemoveMargin {
    pub sender: String,
    pub token_pair: String,
    pub margin: String,
}

impl MsgRemoveMargin {
    pub fn validate_basic(&self, validator: &dyn AddressValidator) -> Result<MarginRequest, EngineError> {
        Ok(MarginRequest {
            trader: parse_address(validator, "sender", &self.sender)?,
            pair: parse_pair(&self.token_pair)?,
            amount: Quote::new(positive_amount("margin", &self.margin)?),
        })
    }
}

/// Any message the engine accepts through `Engine::deliver`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Msg {
    OpenPosition(MsgOpenPosition),
    IncreasePosition(MsgIncreasePosition),
    DecreasePosition(MsgDecreasePosition),
    ClosePosition(MsgClosePosition),
    Liquidate(MsgLiquidate),
    AddMargin(MsgAddMargin),
    RemoveMargin(MsgRemoveMargin),
}
