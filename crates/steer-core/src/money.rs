//! Fixed-point money arithmetic
//!
//! All monetary values are stored as integer minor units (cents). The
//! forecast loop and nudge sizing never touch floating point, so repeated
//! additions cannot drift. Percentages go through 128-bit intermediates.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// An amount of money in minor units (cents)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(units: i64) -> Self {
        Money(units)
    }

    /// Construct from whole currency units (e.g. `from_major(500)` = 500.00)
    pub const fn from_major(units: i64) -> Self {
        Money(units * 100)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Whole currency units, truncated toward zero
    pub const fn major(self) -> i64 {
        self.0 / 100
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn abs(self) -> Money {
        Money(self.0.abs())
    }

    /// `pct` percent of this amount, truncated toward zero
    pub fn percent(self, pct: i64) -> Money {
        Money((self.0 as i128 * pct as i128 / 100) as i64)
    }

    /// Scale by a rational `num / den`; `den` must be non-zero
    pub fn ratio(self, num: i64, den: i64) -> Money {
        Money((self.0 as i128 * num as i128 / den as i128) as i64)
    }

    /// Divide by an integer count, truncated toward zero
    pub fn div(self, n: i64) -> Money {
        Money(self.0 / n)
    }

    /// This amount as a percentage of `whole` (None when `whole` is zero)
    pub fn pct_of(self, whole: Money) -> Option<i64> {
        if whole.0 == 0 {
            return None;
        }
        Some((self.0 as i128 * 100 / whole.0 as i128) as i64)
    }

    pub fn clamp(self, lo: Money, hi: Money) -> Money {
        Money(self.0.clamp(lo.0, hi.0))
    }

    pub fn min(self, other: Money) -> Money {
        Money(self.0.min(other.0))
    }

    pub fn max(self, other: Money) -> Money {
        Money(self.0.max(other.0))
    }

    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;
    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_major_minor_round_trip() {
        assert_eq!(Money::from_major(500).minor(), 50_000);
        assert_eq!(Money::from_minor(50_000).major(), 500);
    }

    #[test]
    fn test_percent_truncates() {
        assert_eq!(Money::from_minor(1050).percent(10), Money::from_minor(105));
        assert_eq!(Money::from_minor(101).percent(50), Money::from_minor(50));
        assert_eq!(Money::from_minor(-101).percent(50), Money::from_minor(-50));
    }

    #[test]
    fn test_pct_of() {
        let whole = Money::from_major(1000);
        assert_eq!(Money::from_major(600).pct_of(whole), Some(60));
        assert_eq!(Money::from_major(600).pct_of(Money::ZERO), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_minor(123_45).to_string(), "123.45");
        assert_eq!(Money::from_minor(-7).to_string(), "-0.07");
        assert_eq!(Money::from_major(5).to_string(), "5.00");
    }

    #[test]
    fn test_sum_is_integer_exact() {
        // 0.01 summed ten thousand times is exactly 100.00
        let total: Money = std::iter::repeat(Money::from_minor(1)).take(10_000).sum();
        assert_eq!(total, Money::from_major(100));
    }
}
