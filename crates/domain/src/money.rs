//! Money amounts in the smallest currency unit.

use serde::{Deserialize, Serialize};

/// Money amount represented as a whole number of the smallest currency unit.
///
/// The currency in this domain has no fractional unit, so all arithmetic is
/// plain integer arithmetic and discount calculations truncate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a money amount from a raw unit count.
    pub fn from_units(units: i64) -> Self {
        Self(units)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the raw unit count.
    pub fn units(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the amount is greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0 * i64::from(quantity))
    }

    /// Subtracts `other`, flooring the result at zero.
    pub fn saturating_sub(&self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_units_roundtrip() {
        let money = Money::from_units(1234);
        assert_eq!(money.units(), 1234);
    }

    #[test]
    fn arithmetic() {
        let a = Money::from_units(1000);
        let b = Money::from_units(400);

        assert_eq!((a + b).units(), 1400);
        assert_eq!((a - b).units(), 600);
        assert_eq!(a.multiply(3).units(), 3000);
    }

    #[test]
    fn saturating_sub_floors_at_zero() {
        let a = Money::from_units(100);
        let b = Money::from_units(250);
        assert_eq!(a.saturating_sub(b), Money::zero());
        assert_eq!(b.saturating_sub(a).units(), 150);
    }

    #[test]
    fn sum_over_iterator() {
        let total: Money = [100, 200, 300].map(Money::from_units).into_iter().sum();
        assert_eq!(total.units(), 600);
    }

    #[test]
    fn serializes_as_bare_integer() {
        let json = serde_json::to_string(&Money::from_units(900)).unwrap();
        assert_eq!(json, "900");
    }
}
