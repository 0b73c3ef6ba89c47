//! # Wei Amounts
//!
//! Every monetary value in veilmint (mint price, payments, the treasury) is
//! an integer amount of wei, the smallest EVM denomination. Floating point
//! never touches money.
//!
//! Amounts are `u128` internally. That is more than JSON numbers can carry
//! safely, so [`wei_string`] moves them across JSON as decimal strings.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use thiserror::Error;

/// An amount in wei.
pub type Wei = u128;

/// Number of wei in one ether.
pub const WEI_PER_ETHER: Wei = 1_000_000_000_000_000_000;

/// Decimal places between wei and ether.
pub const ETHER_DECIMALS: usize = 18;

/// Errors from parsing human-readable ether amounts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitsError {
    /// The input is empty or contains only a decimal point.
    #[error("empty amount")]
    Empty,

    /// A character other than an ASCII digit or a single '.' was found.
    #[error("invalid character in amount: '{0}'")]
    InvalidDigit(char),

    /// More fractional digits than wei can represent.
    #[error("too many decimal places: {0} (max 18)")]
    TooManyDecimals(usize),

    /// The value does not fit in 128 bits of wei.
    #[error("amount overflows u128 wei")]
    Overflow,
}

/// Formats a wei amount as ether, the way wallets display it.
///
/// Trailing fractional zeros are trimmed but at least one fractional digit
/// is kept, so `10^16` wei renders as `"0.01"` and `10^18` as `"1.0"`.
pub fn format_ether(wei: Wei) -> String {
    let whole = wei / WEI_PER_ETHER;
    let frac = wei % WEI_PER_ETHER;
    let frac = format!("{:0width$}", frac, width = ETHER_DECIMALS);
    let trimmed = frac.trim_end_matches('0');
    if trimmed.is_empty() {
        format!("{}.0", whole)
    } else {
        format!("{}.{}", whole, trimmed)
    }
}

/// Parses a decimal ether amount (e.g. `"0.01"`) into wei.
///
/// # Errors
///
/// Returns [`UnitsError`] for empty input, stray characters, more than 18
/// fractional digits, or values beyond `u128::MAX` wei.
pub fn parse_ether(input: &str) -> Result<Wei, UnitsError> {
    let input = input.trim();
    let (whole, frac) = match input.split_once('.') {
        Some((w, f)) => (w, f),
        None => (input, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(UnitsError::Empty);
    }
    if let Some(bad) = whole.chars().chain(frac.chars()).find(|c| !c.is_ascii_digit()) {
        return Err(UnitsError::InvalidDigit(bad));
    }
    if frac.len() > ETHER_DECIMALS {
        return Err(UnitsError::TooManyDecimals(frac.len()));
    }

    let whole_wei = parse_digits(whole)?
        .checked_mul(WEI_PER_ETHER)
        .ok_or(UnitsError::Overflow)?;
    let padded = format!("{:0<width$}", frac, width = ETHER_DECIMALS);
    let frac_wei = parse_digits(&padded)?;

    whole_wei.checked_add(frac_wei).ok_or(UnitsError::Overflow)
}

fn parse_digits(digits: &str) -> Result<Wei, UnitsError> {
    digits.chars().try_fold(0u128, |acc, c| {
        let d = c.to_digit(10).ok_or(UnitsError::InvalidDigit(c))?;
        acc.checked_mul(10)
            .and_then(|v| v.checked_add(Wei::from(d)))
            .ok_or(UnitsError::Overflow)
    })
}

/// Serde adapter for wei amounts: serializes as a decimal string and
/// accepts either a decimal string or a non-negative JSON integer.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use veilmint_protocol::units::{wei_string, Wei};
///
/// #[derive(Serialize, Deserialize)]
/// struct Payment {
///     #[serde(with = "wei_string")]
///     value: Wei,
/// }
///
/// let p: Payment = serde_json::from_str(r#"{"value":"100000000000000000000"}"#).unwrap();
/// assert_eq!(p.value, 100 * veilmint_protocol::units::WEI_PER_ETHER);
/// ```
pub mod wei_string {
    use super::*;

    /// Serializes a wei amount as a decimal string.
    pub fn serialize<S: Serializer>(value: &Wei, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    /// Deserializes a wei amount from a decimal string or an integer.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Wei, D::Error> {
        deserializer.deserialize_any(WeiVisitor)
    }

    struct WeiVisitor;

    impl<'de> Visitor<'de> for WeiVisitor {
        type Value = Wei;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a wei amount as a decimal string or non-negative integer")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Wei, E> {
            let v = v.trim();
            if v.is_empty() {
                return Err(E::custom(UnitsError::Empty));
            }
            parse_digits(v).map_err(E::custom)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Wei, E> {
            Ok(Wei::from(v))
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<Wei, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Wei, E> {
            u64::try_from(v)
                .map(Wei::from)
                .map_err(|_| E::custom("wei amounts cannot be negative"))
        }
    }
}
