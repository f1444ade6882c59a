use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const USD_CURRENCY_CODE: &str = "USD";

//--------------------------------------     UsdAmount       ---------------------------------------------------------
/// A fiat amount in US cents. All product prices and order totals are denominated in `UsdAmount`.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct UsdAmount(i64);

op!(binary UsdAmount, Add, add);
op!(binary UsdAmount, Sub, sub);
op!(inplace UsdAmount, AddAssign, add_assign);
op!(inplace UsdAmount, SubAssign, sub_assign);
op!(unary UsdAmount, Neg, neg);

impl Mul<i64> for UsdAmount {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for UsdAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a money amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for UsdAmount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for UsdAmount {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for UsdAmount {}

impl TryFrom<u64> for UsdAmount {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {} is too large to convert to UsdAmount", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for UsdAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.unsigned_abs();
        write!(f, "{sign}${}.{:02}", cents / 100, cents % 100)
    }
}

impl UsdAmount {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn from_dollars(dollars: i64) -> Self {
        Self(dollars * 100)
    }
}

//--------------------------------------     CryptoAmount    ---------------------------------------------------------
/// A cryptocurrency amount in base units of 10⁻⁸ coins (the satoshi scale), independent of chain.
///
/// Integer base units keep amount comparisons exact. Chains with more native decimals than 8 are quantised to this
/// scale at the verifier boundary.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct CryptoAmount(i64);

op!(binary CryptoAmount, Add, add);
op!(binary CryptoAmount, Sub, sub);
op!(inplace CryptoAmount, SubAssign, sub_assign);
op!(unary CryptoAmount, Neg, neg);

impl Sum for CryptoAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl From<i64> for CryptoAmount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for CryptoAmount {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for CryptoAmount {}

impl Display for CryptoAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let units = self.0.unsigned_abs();
        let base = Self::BASE_UNITS_PER_COIN as u64;
        write!(f, "{sign}{}.{:08}", units / base, units % base)
    }
}

impl CryptoAmount {
    pub const BASE_UNITS_PER_COIN: i64 = 100_000_000;

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_base_units(units: i64) -> Self {
        Self(units)
    }

    /// Construct from a whole-coin floating point value, rounding to the nearest base unit.
    /// Intended for test fixtures and display-layer conversions, not for settlement arithmetic.
    pub fn from_coins(coins: f64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        Self((coins * Self::BASE_UNITS_PER_COIN as f64).round() as i64)
    }

    pub fn as_coins(&self) -> f64 {
        self.0 as f64 / Self::BASE_UNITS_PER_COIN as f64
    }
}
