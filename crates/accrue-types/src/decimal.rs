//! Fixed-point decimal arithmetic.
//!
//! Every amount in Accrue (token balances, per-second supply, reward-per-share,
//! multipliers, pool shares, router weights) is a [`Decimal`]: an unsigned
//! `u128` scaled by `10^18`. Binary floating point is never used, so long sums
//! over many cycles do not drift.
//!
//! ## Rounding
//!
//! Multiplication and division truncate toward zero. Nothing rounds up, so a
//! computed emission or payout never exceeds its exact value.
//!
//! ## Serialization
//!
//! Serialized as a decimal string (`"0.729"`). Deserialization also accepts
//! non-negative integers but rejects floats.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Number of fractional digits carried by [`Decimal`].
pub const DECIMALS: u32 = 18;

/// Unsigned fixed-point number with 18 fractional digits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Decimal(u128);

/// Errors from parsing a [`Decimal`] string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseDecimalError {
    /// Input was empty.
    #[error("empty decimal string")]
    Empty,

    /// Input contained something other than digits and one decimal point.
    #[error("invalid decimal string: {0:?}")]
    Invalid(String),

    /// More fractional digits than [`DECIMALS`].
    #[error("too many fractional digits: {digits} (max {DECIMALS})")]
    TooPrecise {
        /// Number of fractional digits supplied.
        digits: usize,
    },

    /// Value does not fit in the fixed-point range.
    #[error("decimal value out of range")]
    Overflow,
}

impl Decimal {
    /// Raw units per whole unit (`10^18`).
    pub const SCALE: u128 = 1_000_000_000_000_000_000;

    /// Zero.
    pub const ZERO: Self = Self(0);

    /// One whole unit.
    pub const ONE: Self = Self(Self::SCALE);

    /// Largest representable value.
    pub const MAX: Self = Self(u128::MAX);

    /// Build from a raw scaled value.
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// The raw scaled value.
    pub const fn raw(self) -> u128 {
        self.0
    }

    /// Build from a whole number of units. Never overflows.
    pub const fn from_int(units: u64) -> Self {
        Self(units as u128 * Self::SCALE)
    }

    /// Build from a whole number of units, `None` if out of range.
    pub fn checked_from_units(units: u128) -> Option<Self> {
        units.checked_mul(Self::SCALE).map(Self)
    }

    /// Whole units, fractional part discarded.
    pub fn trunc(self) -> u128 {
        self.0 / Self::SCALE
    }

    /// Returns `true` if the value is zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// Multiply by an integer (a duration in seconds). Exact.
    pub fn checked_mul_int(self, n: u64) -> Option<Self> {
        self.0.checked_mul(u128::from(n)).map(Self)
    }

    /// Fixed-point multiplication, truncated.
    ///
    /// Splits both operands into whole and fractional parts so the only
    /// intermediate that carries a fraction is `frac * frac < 10^36`:
    ///
    /// ```text
    /// a * b / S = ah*bh*S + ah*bl + al*bh + floor(al*bl / S)
    /// ```
    ///
    /// Returns `None` only when the true result is out of range.
    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        let (ah, al) = (self.0 / Self::SCALE, self.0 % Self::SCALE);
        let (bh, bl) = (rhs.0 / Self::SCALE, rhs.0 % Self::SCALE);

        let whole = ah.checked_mul(bh)?.checked_mul(Self::SCALE)?;
        let cross = ah.checked_mul(bl)?.checked_add(al.checked_mul(bh)?)?;
        let frac = al * bl / Self::SCALE;

        whole.checked_add(cross)?.checked_add(frac).map(Self)
    }

    /// Fixed-point division, truncated. `None` on division by zero or overflow.
    ///
    /// Long division: the integer quotient first, then one decimal digit of the
    /// remainder at a time, so `self * SCALE` is never materialized.
    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        if rhs.0 == 0 {
            return None;
        }
        let quotient = self.0 / rhs.0;
        let mut remainder = self.0 % rhs.0;
        let mut frac: u128 = 0;
        for _ in 0..DECIMALS {
            let (digit, rest) = next_digit(remainder, rhs.0);
            frac = frac * 10 + digit;
            remainder = rest;
        }
        quotient.checked_mul(Self::SCALE)?.checked_add(frac).map(Self)
    }

    /// Sum a sequence, `None` on overflow.
    pub fn checked_sum<I>(iter: I) -> Option<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        iter.into_iter()
            .try_fold(Self::ZERO, |acc, value| acc.checked_add(value))
    }
}

/// `(10r / d, 10r % d)` for `r < d`.
///
/// When `10r` does not fit in a `u128` (divisors above `u128::MAX / 10`), `r`
/// is added ten times modulo `d`, counting the wraps. Each partial sum stays
/// below `2d`, so nothing overflows.
fn next_digit(remainder: u128, divisor: u128) -> (u128, u128) {
    if let Some(wide) = remainder.checked_mul(10) {
        return (wide / divisor, wide % divisor);
    }
    let mut digit = 0;
    let mut rest: u128 = 0;
    for _ in 0..10 {
        let room = divisor - rest;
        if remainder >= room {
            rest = remainder - room;
            digit += 1;
        } else {
            rest += remainder;
        }
    }
    (digit, rest)
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::SCALE;
        let frac = self.0 % Self::SCALE;
        if frac == 0 {
            write!(f, "{whole}")
        } else {
            let digits = format!("{frac:018}");
            write!(f, "{whole}.{}", digits.trim_end_matches('0'))
        }
    }
}

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s.trim().chars().filter(|c| *c != '_').collect();
        if cleaned.is_empty() {
            return Err(ParseDecimalError::Empty);
        }

        let (whole, frac) = cleaned.split_once('.').unwrap_or((cleaned.as_str(), ""));
        let is_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !is_digits(whole) || !is_digits(frac) {
            return Err(ParseDecimalError::Invalid(s.to_string()));
        }
        if frac.len() > DECIMALS as usize {
            return Err(ParseDecimalError::TooPrecise { digits: frac.len() });
        }

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| ParseDecimalError::Overflow)?
        };
        let mut frac_raw: u128 = if frac.is_empty() {
            0
        } else {
            frac.parse().map_err(|_| ParseDecimalError::Overflow)?
        };
        for _ in frac.len()..DECIMALS as usize {
            frac_raw *= 10;
        }

        whole
            .checked_mul(Self::SCALE)
            .and_then(|raw| raw.checked_add(frac_raw))
            .map(Self)
            .ok_or(ParseDecimalError::Overflow)
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DecimalVisitor;

        impl de::Visitor<'_> for DecimalVisitor {
            type Value = Decimal;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal string or a non-negative integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Decimal, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Decimal, E> {
                Ok(Decimal::from_int(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Decimal, E> {
                u64::try_from(v)
                    .map(Decimal::from_int)
                    .map_err(|_| E::custom("decimal must be non-negative"))
            }
        }

        deserializer.deserialize_any(DecimalVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().expect("valid decimal")
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(dec("0.729").to_string(), "0.729");
        assert_eq!(dec("100").to_string(), "100");
        assert_eq!(dec("1_000.50").to_string(), "1000.5");
        assert_eq!(dec(".5"), dec("0.5"));
        assert_eq!(dec("0.000000000000000001").raw(), 1);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!("".parse::<Decimal>(), Err(ParseDecimalError::Empty));
        assert!(matches!("-1".parse::<Decimal>(), Err(ParseDecimalError::Invalid(_))));
        assert!(matches!("1.2.3".parse::<Decimal>(), Err(ParseDecimalError::Invalid(_))));
        assert!(matches!(".".parse::<Decimal>(), Err(ParseDecimalError::Invalid(_))));
        assert_eq!(
            "0.0000000000000000001".parse::<Decimal>(),
            Err(ParseDecimalError::TooPrecise { digits: 19 })
        );
        assert_eq!(
            "999999999999999999999999999999".parse::<Decimal>(),
            Err(ParseDecimalError::Overflow)
        );
    }

    #[test]
    fn test_mul_exact_and_truncating() {
        assert_eq!(dec("0.9").checked_mul(dec("0.9")), Some(dec("0.81")));
        assert_eq!(dec("100").checked_mul(dec("0.3")), Some(dec("30")));
        // 1e-18 * 0.5 truncates to zero.
        assert_eq!(
            Decimal::from_raw(1).checked_mul(dec("0.5")),
            Some(Decimal::ZERO)
        );
    }

    #[test]
    fn test_mul_large_operands_do_not_overflow_spuriously() {
        // Both operands far above the point where a naive a*b would overflow u128.
        let a = dec("1000000000.123456789");
        let b = dec("2000000.5");
        let product = a.checked_mul(b).expect("in range");
        assert_eq!(product, dec("2000000500246913.6397283945"));
    }

    #[test]
    fn test_mul_overflow_detected() {
        assert_eq!(Decimal::MAX.checked_mul(dec("2")), None);
    }

    #[test]
    fn test_div() {
        assert_eq!(dec("10").checked_div(dec("100")), Some(dec("0.1")));
        assert_eq!(
            dec("1").checked_div(dec("3")),
            Some(dec("0.333333333333333333"))
        );
        assert_eq!(dec("1").checked_div(Decimal::ZERO), None);
        // Large numerator: naive a * SCALE would overflow.
        let big = dec("100000000000000000000");
        assert_eq!(big.checked_div(dec("4")), Some(dec("25000000000000000000")));
    }

    #[test]
    fn test_div_by_divisor_above_tenth_of_range() {
        let divisor = Decimal::from_raw(u128::MAX - 1);
        let half = Decimal::from_raw((u128::MAX - 1) / 2);
        assert_eq!(half.checked_div(divisor), Some(dec("0.5")));
        assert_eq!(
            Decimal::from_raw(u128::MAX - 2).checked_div(divisor),
            Some(dec("0.999999999999999999"))
        );
        assert_eq!(Decimal::MAX.checked_div(divisor), Some(Decimal::ONE));
    }

    #[test]
    fn test_next_digit_slow_path_matches_long_division() {
        // 10 * r overflows, the result must still be floor(10r / d), 10r mod d.
        let d = u128::MAX / 3;
        let r = d - 1;
        let (digit, rest) = next_digit(r, d);
        assert_eq!(digit, 9);
        assert_eq!(rest, d - 10);
    }

    #[test]
    fn test_mul_int() {
        assert_eq!(dec("0.5").checked_mul_int(7), Some(dec("3.5")));
        assert_eq!(Decimal::MAX.checked_mul_int(2), None);
    }

    #[test]
    fn test_checked_sum() {
        let parts = [dec("0.1"), dec("0.2"), dec("0.7")];
        assert_eq!(Decimal::checked_sum(parts), Some(Decimal::ONE));
        assert_eq!(Decimal::checked_sum([Decimal::MAX, Decimal::ONE]), None);
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&dec("0.994")).expect("serialize");
        assert_eq!(json, "\"0.994\"");
        let back: Decimal = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, dec("0.994"));
        let int: Decimal = serde_json::from_str("42").expect("integer");
        assert_eq!(int, Decimal::from_int(42));
        assert!(serde_json::from_str::<Decimal>("0.5").is_err());
        assert!(serde_json::from_str::<Decimal>("-3").is_err());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn small() -> impl Strategy<Value = Decimal> {
            (0u128..1_000_000_000u128 * Decimal::SCALE).prop_map(Decimal::from_raw)
        }

        proptest! {
            #[test]
            fn mul_never_exceeds_exact_product(a in small(), b in small()) {
                prop_assume!(!b.is_zero());
                let product = a.checked_mul(b).expect("in range");
                prop_assert!(product.checked_div(b).expect("in range") <= a);
            }

            #[test]
            fn div_then_mul_never_exceeds_numerator(a in small(), b in small()) {
                prop_assume!(!b.is_zero());
                let q = a.checked_div(b).expect("in range");
                prop_assert!(q.checked_mul(b).expect("in range") <= a);
            }

            #[test]
            fn display_round_trips(raw in any::<u128>()) {
                let value = Decimal::from_raw(raw);
                prop_assert_eq!(value.to_string().parse::<Decimal>(), Ok(value));
            }
        }
    }
}
