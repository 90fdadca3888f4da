// 0.0: fixed-point layer. all money flows through Decimal quantized to AMOUNT_DP places.
// rounding rule for the whole crate: what a trader receives is floored, what a trader pays is ceiled.
// 0.1 checked arithmetic, 0.2 rounding, 0.3 parsing from wire text.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Decimal places kept on every stored base or quote amount.
pub const AMOUNT_DP: u32 = 6;

/// Upper bound on any amount accepted from the wire: 10^15.
/// Two bounded amounts multiply to at most 10^30 units at scale 0, which the 96-bit
/// mantissa still holds once the scale is reduced.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ArithmeticError {
    #[error("fixed-point overflow in {0}")]
    Overflow(&'static str),

    #[error("division by zero")]
    DivisionByZero,
}

// 0.1: checked ops. rust_decimal would panic on overflow with the plain operators.
pub fn add(a: Decimal, b: Decimal) -> Result<Decimal, ArithmeticError> {
    a.checked_add(b).ok_or(ArithmeticError::Overflow("add"))
}

pub fn sub(a: Decimal, b: Decimal) -> Result<Decimal, ArithmeticError> {
    a.checked_sub(b).ok_or(ArithmeticError::Overflow("sub"))
}

pub fn mul(a: Decimal, b: Decimal) -> Result<Decimal, ArithmeticError> {
    a.checked_mul(b).ok_or(ArithmeticError::Overflow("mul"))
}

pub fn div(a: Decimal, b: Decimal) -> Result<Decimal, ArithmeticError> {
    if b.is_zero() {
        return Err(ArithmeticError::DivisionByZero);
    }
    a.checked_div(b).ok_or(ArithmeticError::Overflow("div"))
}

// 0.2: quantization to the amount grid
pub fn floor_amount(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_DP, RoundingStrategy::ToNegativeInfinity)
}

pub fn ceil_amount(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_DP, RoundingStrategy::ToPositiveInfinity)
}

/// True when `value` already sits on the amount grid.
pub fn is_amount(value: Decimal) -> bool {
    value.normalize().scale() <= AMOUNT_DP
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty numeric field")]
    Empty,

    #[error("not a plain decimal: {0:?}")]
    Invalid(String),

    #[error("{text:?} has more than {max_dp} decimal places")]
    TooPrecise { text: String, max_dp: u32 },

    #[error("{0} is outside the accepted range")]
    OutOfRange(Decimal),
}

// 0.3: wire text → Decimal. plain `[-]digits[.digits]` only: no exponents, no separators.
fn parse_plain(text: &str) -> Result<Decimal, ParseError> {
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let unsigned = text.strip_prefix('-').unwrap_or(text);
    let mut parts = unsigned.splitn(2, '.');
    let int_part = parts.next().unwrap_or_default();
    let frac_part = parts.next();

    let digits_ok = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    let well_formed = !int_part.is_empty()
        && digits_ok(int_part)
        && frac_part.map_or(true, |f| !f.is_empty() && digits_ok(f));

    if !well_formed {
        return Err(ParseError::Invalid(text.to_string()));
    }

    let value = Decimal::from_str(text).map_err(|_| ParseError::Invalid(text.to_string()))?;
    if value.abs() > MAX_AMOUNT {
        return Err(ParseError::OutOfRange(value));
    }
    Ok(value)
}

/// Parses a base or quote amount. At most `AMOUNT_DP` fractional digits.
pub fn parse_amount(text: &str) -> Result<Decimal, ParseError> {
    let value = parse_plain(text)?;
    if !is_amount(value) {
        return Err(ParseError::TooPrecise {
            text: text.to_string(),
            max_dp: AMOUNT_DP,
        });
    }
    Ok(value)
}

/// Parses a ratio such as leverage. Full Decimal precision is kept.
pub fn parse_ratio(text: &str) -> Result<Decimal, ParseError> {
    parse_plain(text)
}
