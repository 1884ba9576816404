//! Leave units as fixed-point hundredths of a day.
//!
//! Balances are tracked to two decimal places. Storing hundredths in an
//! integer keeps the ledger arithmetic exact, so
//! `available = opening + granted - consumed` never needs a float round.

use std::fmt;
use std::ops::{Add, Sub};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    minicbor::Encode,
    minicbor::Decode,
)]
#[cbor(transparent)]
pub struct Units(#[n(0)] i64);

impl Units {
    pub const ZERO: Units = Units(0);

    /// Whole calendar days.
    pub fn from_whole_days(days: u32) -> Self {
        Units(i64::from(days) * 100)
    }

    /// A half day: 0.50 units.
    pub fn half_day() -> Self {
        Units(50)
    }

    /// Raw hundredths, for values that are already two-decimal fixed point
    /// (grant amounts, opening balances).
    pub fn from_hundredths(hundredths: i64) -> Self {
        Units(hundredths)
    }

    pub fn hundredths(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Add for Units {
    type Output = Units;

    fn add(self, rhs: Units) -> Units {
        Units(self.0 + rhs.0)
    }
}

impl Sub for Units {
    type Output = Units;

    fn sub(self, rhs: Units) -> Units {
        Units(self.0 - rhs.0)
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_days_scale_to_hundredths() {
        assert_eq!(Units::from_whole_days(3).hundredths(), 300);
        assert_eq!(Units::from_whole_days(0), Units::ZERO);
    }

    #[test]
    fn half_day_is_fifty_hundredths() {
        assert_eq!(Units::half_day().hundredths(), 50);
    }

    #[test]
    fn arithmetic_is_exact() {
        let available = Units::from_hundredths(1000) + Units::from_hundredths(250)
            - Units::from_hundredths(50);
        assert_eq!(available, Units::from_hundredths(1200));
    }

    #[test]
    fn display_shows_two_decimals() {
        assert_eq!(Units::from_whole_days(3).to_string(), "3.00");
        assert_eq!(Units::half_day().to_string(), "0.50");
        assert_eq!(Units::from_hundredths(-50).to_string(), "-0.50");
        assert_eq!(Units::ZERO.to_string(), "0.00");
    }

    #[test]
    fn ordering_follows_value() {
        assert!(Units::half_day() < Units::from_whole_days(1));
        assert!(Units::ZERO.max(Units::from_hundredths(-10)).is_zero());
    }
}
