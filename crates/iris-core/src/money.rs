//! # Money Module
//!
//! Decimal helpers for FBR figures.
//!
//! ## Why Decimal?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  FBR validates every item:                                              │
//! │    totalValues == valueSalesExcludingST + salesTaxApplicable + ...      │
//! │  A stray 0.01 rejects the invoice.                                      │
//! │                                                                         │
//! │  OUR SOLUTION: rust_decimal                                             │
//! │    Exact base-10 arithmetic, fractional quantities (1.5 kg) allowed,    │
//! │    rounding happens ONCE, at emission, with round-half-up.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of decimal places FBR accepts on monetary fields.
pub const MONEY_DP: u32 = 2;

/// Rounds a monetary figure to 2 decimal places, half away from zero.
///
/// ## Example
/// ```rust
/// use iris_core::money::round_money;
/// use rust_decimal::Decimal;
///
/// let v: Decimal = "24.405".parse().unwrap();
/// assert_eq!(round_money(v).to_string(), "24.41");
/// ```
#[inline]
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

// =============================================================================
// Percent
// =============================================================================

/// A percentage rate such as `18` for 18% sales tax.
///
/// Stored as the percentage number itself, not a fraction, which is how the
/// host's tax records and the authority's rate tables express it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percent(Decimal);

impl Percent {
    /// Creates a percentage from its numeric value (`18` → 18%).
    #[inline]
    pub const fn new(value: Decimal) -> Self {
        Percent(value)
    }

    /// Zero percent.
    #[inline]
    pub const fn zero() -> Self {
        Percent(Decimal::ZERO)
    }

    /// Returns the numeric percentage.
    #[inline]
    pub const fn value(&self) -> Decimal {
        self.0
    }

    /// Checks if the rate is zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Applies the rate to an amount without rounding.
    ///
    /// Returns `None` if the product does not fit in a `Decimal`.
    ///
    /// ```rust
    /// use iris_core::money::Percent;
    /// use rust_decimal::Decimal;
    ///
    /// let rate = Percent::new(Decimal::from(18));
    /// assert_eq!(rate.of(Decimal::from(200)), Some(Decimal::from(36)));
    /// assert_eq!(rate.of(Decimal::MAX), None);
    /// ```
    #[inline]
    pub fn of(&self, amount: Decimal) -> Option<Decimal> {
        amount.checked_mul(self.0)?.checked_div(Decimal::ONE_HUNDRED)
    }

    /// Returns the multiplier left after a discount of this size (`10` → `0.9`).
    #[inline]
    pub fn remaining_fraction(&self) -> Decimal {
        Decimal::ONE - self.0 / Decimal::ONE_HUNDRED
    }
}

/// Displays as the authority writes rates: `18%`, `17.5%`.
impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0.normalize())
    }
}

impl From<Decimal> for Percent {
    fn from(value: Decimal) -> Self {
        Percent(value)
    }
}
