//! Type-safe price representation in integer minor units.
//!
//! Amounts are always stored in the smallest currency unit (yen for JPY,
//! cents for USD). Arithmetic stays in integers; `rust_decimal` is only used
//! for percentage rates and display formatting.

use core::fmt;
use core::ops::Add;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the smallest currency unit.
    pub amount: i64,
    /// ISO 4217 currency code.
    #[serde(default)]
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price from an amount in minor units.
    #[must_use]
    pub const fn new(amount: i64, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// A zero amount in the given currency.
    #[must_use]
    pub const fn zero(currency_code: CurrencyCode) -> Self {
        Self::new(0, currency_code)
    }

    /// Multiply the unit price by a quantity, saturating on overflow.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self::new(
            self.amount.saturating_mul(i64::from(quantity)),
            self.currency_code,
        )
    }

    /// Apply a percentage rate (e.g. `0.10` for 10%), rounding toward zero
    /// to the minor unit.
    #[must_use]
    pub fn apply_rate(self, rate: Decimal) -> Self {
        let scaled = (Decimal::from(self.amount) * rate)
            .round_dp_with_strategy(0, RoundingStrategy::ToZero)
            .to_i64()
            .unwrap_or(0);
        Self::new(scaled, self.currency_code)
    }

    /// The amount in the currency's major unit (e.g. dollars, not cents).
    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.amount, self.currency_code.minor_exponent())
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.amount.saturating_add(rhs.amount), self.currency_code)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dp = self.currency_code.minor_exponent() as usize;
        write!(
            f,
            "{}{:.dp$}",
            self.currency_code.symbol(),
            self.to_decimal()
        )
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    JPY,
    USD,
    EUR,
}

impl CurrencyCode {
    /// Number of decimal places between the minor and major unit.
    #[must_use]
    pub const fn minor_exponent(self) -> u32 {
        match self {
            Self::JPY => 0,
            Self::USD | Self::EUR => 2,
        }
    }

    /// Display symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::JPY => "¥",
            Self::USD => "$",
            Self::EUR => "€",
        }
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "JPY" => Ok(Self::JPY),
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            _ => Err(format!("unsupported currency: {s}")),
        }
    }
}
