// 1.0: all the primitives live here. nothing in the engine works without these types.
// pair ids, addresses, sides, prices, quote amounts, leverage, timestamps.
// each is a newtype so the compiler catches type mixups.

use crate::numeric::{self, ArithmeticError};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest accepted `BASE:QUOTE` string, in bytes. Store keys length-prefix the pair in one byte.
pub const MAX_PAIR_LEN: usize = 255;

// 1.1: market identifier. BASE:QUOTE, exactly one colon, both halves non-empty, no whitespace.
// denoms may carry '/' (ibc/<hash>).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pair {
    base: String,
    quote: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PairError {
    #[error("pair {0:?} must look like BASE:QUOTE")]
    Format(String),

    #[error("pair {0:?} contains whitespace")]
    Whitespace(String),

    #[error("pair is {0} bytes, longer than {MAX_PAIR_LEN}")]
    TooLong(usize),
}

impl Pair {
    pub fn new(base: &str, quote: &str) -> Result<Self, PairError> {
        format!("{base}:{quote}").parse()
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }
}

impl FromStr for Pair {
    type Err = PairError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > MAX_PAIR_LEN {
            return Err(PairError::TooLong(s.len()));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(PairError::Whitespace(s.to_string()));
        }
        let segments: Vec<&str> = s.split(':').collect();
        match segments.as_slice() {
            [base, quote] if !base.is_empty() && !quote.is_empty() => Ok(Self {
                base: base.to_string(),
                quote: quote.to_string(),
            }),
            _ => Err(PairError::Format(s.to_string())),
        }
    }
}

impl TryFrom<String> for Pair {
    type Error = PairError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Pair> for String {
    fn from(pair: Pair) -> Self {
        pair.to_string()
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.base, self.quote)
    }
}

// 1.2: account identifier. format is checked at the message boundary by an AddressValidator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic well-formed address for simulations and tests.
    pub fn sample(seed: u64) -> Self {
        const CHARSET: &[u8] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
        let mut data = String::with_capacity(38);
        let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(1);
        for _ in 0..38 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            data.push(CHARSET[(state % 32) as usize] as char);
        }
        Self(format!("nibi1{data}"))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Long = profit when price goes up. Short = profit when price goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Wire discriminant for BUY.
    pub const BUY: i32 = 1;
    /// Wire discriminant for SELL.
    pub const SELL: i32 = 2;

    /// 0 is "unspecified" on the wire and is rejected like any other unknown value.
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            Self::BUY => Some(Side::Long),
            Self::SELL => Some(Side::Short),
            _ => None,
        }
    }

    pub fn to_wire(self) -> i32 {
        match self {
            Side::Long => Self::BUY,
            Side::Short => Self::SELL,
        }
    }

    pub fn sign(&self) -> Decimal {
        match self {
            Side::Long => dec!(1),
            Side::Short => dec!(-1),
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

// 1.3: price in quote currency per unit of base. must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn new_unchecked(value: Decimal) -> Self {
        debug_assert!(value > Decimal::ZERO);
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.4: quote currency amount. margin, pnl, fees, balances all use this. signed: pnl and
// bad-debt bookkeeping go negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Quote(Decimal);

impl Quote {
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn negate(&self) -> Self {
        Self(-self.0)
    }

    /// Clamps negatives to zero.
    pub fn floor_zero(&self) -> Self {
        Self(self.0.max(Decimal::ZERO))
    }

    pub fn checked_add(&self, other: Quote) -> Result<Self, ArithmeticError> {
        numeric::add(self.0, other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Quote) -> Result<Self, ArithmeticError> {
        numeric::sub(self.0, other.0).map(Self)
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialOrd for Quote {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quote {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

// 1.5: leverage multiplier. anything strictly positive; the market caps it from above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Leverage(Decimal);

impl Leverage {
    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    /// 10x, the default market cap.
    pub const TEN: Self = Self(Decimal::TEN);

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Leverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.0)
    }
}

// 1.6: millisecond block timestamp. supplied by the caller, never read from the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn plus_millis(&self, ms: i64) -> Self {
        Self(self.0.saturating_add(ms))
    }

    pub fn millis_since(&self, earlier: &Timestamp) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn pair_parsing() {
        let pair: Pair = "NIBI:USDN".parse().unwrap();
        assert_eq!(pair.base(), "NIBI");
        assert_eq!(pair.quote(), "USDN");
        assert_eq!(pair.to_string(), "NIBI:USDN");
    }

    #[test]
    fn pair_rejects_bad_shapes() {
        for bad in ["NIBI-USDN", "xxx:yyy:zzz", ":USDN", "NIBI:", "", ":", "NIBI :USDN", " NIBI:USDN"] {
            assert!(bad.parse::<Pair>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn pair_accepts_ibc_denoms_up_to_the_length_cap() {
        let pair: Pair = "NIBI:ibc/27394FB0".parse().unwrap();
        assert_eq!(pair.quote(), "ibc/27394FB0");

        let at_cap = format!("A:{}", "q".repeat(MAX_PAIR_LEN - 2));
        assert!(at_cap.parse::<Pair>().is_ok());
        let over = format!("A:{}", "q".repeat(MAX_PAIR_LEN - 1));
        assert_eq!(over.parse::<Pair>(), Err(PairError::TooLong(MAX_PAIR_LEN + 1)));
    }

    #[test]
    fn pair_is_case_sensitive() {
        let upper: Pair = "NIBI:USDN".parse().unwrap();
        let lower: Pair = "nibi:usdn".parse().unwrap();
        assert_ne!(upper, lower);
    }

    #[test]
    fn pair_serde_as_string() {
        let pair = Pair::new("BTC", "USDN").unwrap();
        let json = serde_json::to_string(&pair).unwrap();
        assert_eq!(json, "\"BTC:USDN\"");
        let back: Pair = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pair);
        assert!(serde_json::from_str::<Pair>("\"BTC-USDN\"").is_err());
    }

    #[test]
    fn side_wire_discriminants() {
        assert_eq!(Side::from_wire(1), Some(Side::Long));
        assert_eq!(Side::from_wire(2), Some(Side::Short));
        assert_eq!(Side::from_wire(0), None);
        assert_eq!(Side::from_wire(3), None);
        assert_eq!(Side::from_wire(-1), None);
        assert_eq!(Side::Short.to_wire(), 2);
    }

    #[test]
    fn leverage_must_be_positive() {
        assert_eq!(Leverage::new(dec!(10)), Some(Leverage::TEN));

        assert!(Leverage::new(dec!(0.5)).is_some());
        assert!(Leverage::new(Decimal::ZERO).is_none());
        assert!(Leverage::new(dec!(-2)).is_none());
    }

    #[test]
    fn quote_checked_math() {
        let a = Quote::new(dec!(10));
        let b = Quote::new(dec!(25));
        assert_eq!(a.checked_sub(b).unwrap().value(), dec!(-15));
        assert_eq!(a.checked_sub(b).unwrap().floor_zero(), Quote::zero());
        assert!(Quote::new(Decimal::MAX).checked_add(a).is_err());
    }

    #[test]
    fn sample_addresses_are_stable_and_distinct() {
        assert_eq!(Address::sample(7), Address::sample(7));
        assert_ne!(Address::sample(1), Address::sample(2));
        assert!(Address::sample(3).as_str().starts_with("nibi1"));
    }

    #[test]
    fn timestamp_rendering() {
        let ts = Timestamp::from_millis(0);
        assert_eq!(ts.to_string(), "1970-01-01T00:00:00+00:00");
        assert_eq!(ts.plus_millis(1500).millis_since(&ts), 1500);
    }
}
