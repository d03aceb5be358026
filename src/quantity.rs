//! Fixed-point quantity type.
//!
//! Quantities are stored as signed `i128` counts of the smallest unit
//! (10^-8). Every division truncates toward zero, so derived shares never
//! exceed their source; the propagation engine recovers the truncation
//! loss explicitly through absorption.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use crate::error::FieldError;

/// Number of fractional digits carried by [`Quantity`].
pub const DECIMALS: u32 = 8;

/// Smallest units per whole unit.
pub const SCALE: i128 = 100_000_000;

/// A fixed-point amount with [`DECIMALS`] fractional digits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(i128);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    /// Build from a raw count of smallest units.
    pub const fn from_units(units: i128) -> Self {
        Self(units)
    }

    /// Build from a whole number of units.
    pub const fn from_whole(whole: i64) -> Self {
        Self(whole as i128 * SCALE)
    }

    /// Raw count of smallest units.
    pub const fn units(self) -> i128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// `self / base^exp`, truncated toward zero.
    ///
    /// Returns zero when the divisor overflows: the true share is then
    /// smaller than one unit anyway.
    pub fn div_pow(self, base: u32, exp: u32) -> Self {
        match (base as i128).checked_pow(exp) {
            Some(divisor) if divisor > 0 => Self(self.0 / divisor),
            _ => Self::ZERO,
        }
    }

    /// `self * percent / 100`, truncated toward zero.
    ///
    /// Split into whole hundreds and a remainder so that no intermediate
    /// product exceeds the input for `percent <= 100`.
    pub fn percent(self, percent: u32) -> Self {
        let p = percent as i128;
        let hundreds = (self.0 / 100).saturating_mul(p);
        Self(hundreds.saturating_add(self.0 % 100 * p / 100))
    }

    /// Lossy conversion for display and ratios.
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = SCALE as u128;
        write!(
            f,
            "{sign}{}.{:0width$}",
            abs / scale,
            abs % scale,
            width = DECIMALS as usize
        )
    }
}

impl FromStr for Quantity {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FieldError::InvalidQuantity(s.to_string());
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if frac.len() > DECIMALS as usize {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole_units: i128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let frac_units: i128 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<width$}", width = DECIMALS as usize);
            padded.parse().map_err(|_| invalid())?
        };

        let units = whole_units
            .checked_mul(SCALE)
            .and_then(|w| w.checked_add(frac_units))
            .ok_or_else(invalid)?;
        Ok(Self(if negative { -units } else { units }))
    }
}

impl Add for Quantity {
    type Output = Quantity;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Quantity {
    type Output = Quantity;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Quantity {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Quantity {
    type Output = Quantity;
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, q| acc + q)
    }
}

impl<'a> Sum<&'a Quantity> for Quantity {
    fn sum<I: Iterator<Item = &'a Quantity>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, q| acc + *q)
    }
}

// Serialized as a decimal string so no precision is lost in JSON/YAML.
impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Int(i64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Raw::Int(n) => Ok(Quantity::from_whole(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(q("100").units(), 100 * SCALE);
        assert_eq!(q("0.5").units(), SCALE / 2);
        assert_eq!(q(".25").units(), SCALE / 4);
        assert_eq!(q("-1.00000001").units(), -(SCALE + 1));
        assert_eq!(q("12.3").to_string(), "12.30000000");
        assert_eq!(q("-0.00000001").to_string(), "-0.00000001");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Quantity>().is_err());
        assert!(".".parse::<Quantity>().is_err());
        assert!("1.123456789".parse::<Quantity>().is_err());
        assert!("1e5".parse::<Quantity>().is_err());
        assert!("--1".parse::<Quantity>().is_err());
    }

    #[test]
    fn test_div_pow_truncates() {
        let hundred = Quantity::from_whole(100);
        assert_eq!(hundred.div_pow(2, 1), Quantity::from_whole(50));
        assert_eq!(hundred.div_pow(2, 0), hundred);
        // 1 unit / 2 -> 0, never rounded up
        assert_eq!(Quantity::from_units(1).div_pow(2, 1), Quantity::ZERO);
        assert_eq!(Quantity::from_units(7).div_pow(3, 1), Quantity::from_units(2));
        // divisor overflow collapses to zero
        assert_eq!(hundred.div_pow(10, 60), Quantity::ZERO);
    }

    #[test]
    fn test_percent_truncates() {
        let dust = Quantity::from_units(3);
        assert_eq!(dust.percent(40), Quantity::from_units(1));
        assert_eq!(dust.percent(15), Quantity::ZERO);
        assert_eq!(Quantity::from_whole(100).percent(25), Quantity::from_whole(25));
        assert_eq!(Quantity::from_units(-7).percent(50), Quantity::from_units(-3));
    }

    #[test]
    fn test_percent_at_the_top_of_the_range() {
        let max = Quantity::from_units(i128::MAX);
        assert_eq!(
            max.percent(40).units(),
            68_056_473_384_187_692_692_674_921_486_353_642_290
        );
        assert_eq!(max.percent(100), max);

        let huge = q("1000000000000000000000000000000");
        assert_eq!(huge.percent(15).units(), 15 * 10i128.pow(36));
    }

    #[test]
    fn test_serde_is_exact() {
        let value = Quantity::from_units(123_456_789_012_345);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"1234567.89012345\"");
        let back: Quantity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);

        let from_int: Quantity = serde_yaml::from_str("42").unwrap();
        assert_eq!(from_int, Quantity::from_whole(42));
    }

    #[test]
    fn test_sum() {
        let parts = [q("0.1"), q("0.2"), q("0.7")];
        let total: Quantity = parts.iter().sum();
        assert_eq!(total, Quantity::from_whole(1));
    }
}
