//! Fixed-point amounts of the funded asset.
//!
//! Amounts are raw integers (u128) in the asset's smallest unit. The observed
//! asset uses 6 decimals, so `1_000_000` raw is `1.00` nominal.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Decimal precision of the funded asset.
pub const DECIMALS: u32 = 6;

/// Raw units per one nominal unit (`10^DECIMALS`).
pub const UNIT: u128 = 10u128.pow(DECIMALS);

/// An amount of the funded asset in raw units.
///
/// Human-readable formats carry the nominal decimal string (`"1.5"`), since
/// JSON numbers cannot hold the full u128 range; binary formats carry the
/// raw integer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u128);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountParseError {
    #[error("empty amount")]
    Empty,

    #[error("invalid digit in amount: {0:?}")]
    InvalidDigit(String),

    #[error("too many fractional digits: at most {DECIMALS} allowed")]
    TooPrecise,

    #[error("amount overflows u128")]
    Overflow,
}

impl Amount {
    pub const ZERO: Self = Self(0);

    pub fn new(raw: u128) -> Self {
        Self(raw)
    }

    /// Whole nominal units, e.g. `Amount::from_units(100)` is 100.00.
    pub fn from_units(units: u64) -> Self {
        Self(units as u128 * UNIT)
    }

    pub fn raw(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn checked_mul(self, factor: u128) -> Option<Self> {
        self.0.checked_mul(factor).map(Self)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Parse a nominal decimal string such as `"100"`, `"0.5"` or `"12.345678"`.
    pub fn parse_nominal(s: &str) -> Result<Self, AmountParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountParseError::Empty);
        }
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(AmountParseError::Empty);
        }
        if frac.len() > DECIMALS as usize {
            return Err(AmountParseError::TooPrecise);
        }
        let digits_only = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !digits_only(whole) || !digits_only(frac) {
            return Err(AmountParseError::InvalidDigit(s.to_string()));
        }

        let whole_raw = if whole.is_empty() {
            0
        } else {
            whole.parse::<u128>().map_err(|_| AmountParseError::Overflow)?
        };
        let frac_raw = if frac.is_empty() {
            0
        } else {
            let scale = 10u128.pow(DECIMALS - frac.len() as u32);
            frac.parse::<u128>().map_err(|_| AmountParseError::Overflow)? * scale
        };

        whole_raw
            .checked_mul(UNIT)
            .and_then(|w| w.checked_add(frac_raw))
            .map(Self)
            .ok_or(AmountParseError::Overflow)
    }
}

impl fmt::Display for Amount {
    /// Nominal rendering with trailing zeros trimmed: `40`, `1.5`, `0.000001`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / UNIT;
        let frac = self.0 % UNIT;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let padded = format!("{:0width$}", frac, width = DECIMALS as usize);
        write!(f, "{}.{}", whole, padded.trim_end_matches('0'))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::parse_nominal(&s).map_err(serde::de::Error::custom)
        } else {
            u128::deserialize(deserializer).map(Self)
        }
    }
}

impl From<u128> for Amount {
    fn from(raw: u128) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_unit_is_a_million_raw() {
        assert_eq!(Amount::from_units(1).raw(), 1_000_000);
    }

    #[test]
    fn display_trims_trailing_zeros() {
        assert_eq!(Amount::new(40_000_000).to_string(), "40");
        assert_eq!(Amount::new(1_500_000).to_string(), "1.5");
        assert_eq!(Amount::new(1).to_string(), "0.000001");
        assert_eq!(Amount::ZERO.to_string(), "0");
    }

    #[test]
    fn parses_nominal_strings() {
        assert_eq!(Amount::parse_nominal("100").unwrap().raw(), 100_000_000);
        assert_eq!(Amount::parse_nominal("0.5").unwrap().raw(), 500_000);
        assert_eq!(Amount::parse_nominal(".25").unwrap().raw(), 250_000);
        assert_eq!(Amount::parse_nominal("12.345678").unwrap().raw(), 12_345_678);
    }

    #[test]
    fn rejects_bad_nominal_strings() {
        assert_eq!(Amount::parse_nominal(""), Err(AmountParseError::Empty));
        assert_eq!(Amount::parse_nominal("."), Err(AmountParseError::Empty));
        assert_eq!(Amount::parse_nominal("1.0000001"), Err(AmountParseError::TooPrecise));
        assert!(matches!(Amount::parse_nominal("-1"), Err(AmountParseError::InvalidDigit(_))));
        assert!(matches!(Amount::parse_nominal("1e6"), Err(AmountParseError::InvalidDigit(_))));
    }

    #[test]
    fn checked_mul_detects_overflow() {
        assert!(Amount::new(u128::MAX).checked_mul(2).is_none());
        assert_eq!(Amount::new(10).checked_mul(3), Some(Amount::new(30)));
    }

    #[test]
    fn json_carries_amounts_beyond_u64_as_strings() {
        let big = Amount::new(u64::MAX as u128 + 1);
        let json = serde_json::to_string(&big).unwrap();
        assert_eq!(json, format!("\"{big}\""));
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, big);

        let max = Amount::new(u128::MAX);
        let back: Amount = serde_json::from_str(&serde_json::to_string(&max).unwrap()).unwrap();
        assert_eq!(back, max);
    }

    #[test]
    fn bincode_keeps_the_raw_integer() {
        let amount = Amount::new(1_500_000);
        let bytes = bincode::serialize(&amount).unwrap();
        assert_eq!(bytes, 1_500_000u128.to_le_bytes());
        assert_eq!(bincode::deserialize::<Amount>(&bytes).unwrap(), amount);
    }
}
