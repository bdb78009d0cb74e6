//! Per-provider currency support and amount conversion.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;

use crate::error::SwitchError;
use crate::model::Currency;

/// Inclusive amount range accepted by a provider for one currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrencyBounds {
    /// The currency the range applies to.
    pub currency: Currency,
    /// Smallest accepted amount, in major units.
    pub min: Decimal,
    /// Largest accepted amount, in major units.
    pub max: Decimal,
}

impl CurrencyBounds {
    /// Bounds `min..=max` for `currency`.
    #[must_use]
    pub const fn new(currency: Currency, min: Decimal, max: Decimal) -> Self {
        Self { currency, min, max }
    }

    /// Convenience constructor for whole-unit bounds.
    #[must_use]
    pub fn whole(currency: Currency, min: i64, max: i64) -> Self {
        Self::new(currency, Decimal::from(min), Decimal::from(max))
    }
}

/// The set of currencies a provider accepts, each with its amount bounds.
#[derive(Debug, Clone, Default)]
pub struct CurrencyRules {
    bounds: Vec<CurrencyBounds>,
}

impl CurrencyRules {
    /// Rules accepting exactly the listed currencies.
    #[must_use]
    pub fn new(bounds: impl IntoIterator<Item = CurrencyBounds>) -> Self {
        Self {
            bounds: bounds.into_iter().collect(),
        }
    }

    /// Returns `true` if `currency` has bounds.
    #[must_use]
    pub fn supports(&self, currency: Currency) -> bool {
        self.bounds_for(currency).is_some()
    }

    /// The bounds for `currency`, if supported.
    #[must_use]
    pub fn bounds_for(&self, currency: Currency) -> Option<&CurrencyBounds> {
        self.bounds.iter().find(|b| b.currency == currency)
    }

    /// Iterates over the supported currencies in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &CurrencyBounds> {
        self.bounds.iter()
    }

    /// Checks that `amount` is positive, `currency` is supported and the
    /// amount lies within the currency's bounds.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Validation`] naming the offending field.
    pub fn validate(&self, amount: Decimal, currency: Currency) -> Result<(), SwitchError> {
        if amount <= Decimal::ZERO {
            return Err(SwitchError::invalid_field(
                "amount",
                format!("amount must be strictly positive, got {amount}"),
            ));
        }
        let bounds = self.bounds_for(currency).ok_or_else(|| {
            SwitchError::invalid_field("currency", format!("currency {currency} is not supported"))
        })?;
        if amount < bounds.min {
            return Err(SwitchError::invalid_field(
                "amount",
                format!("amount {amount} {currency} is below the minimum of {}", bounds.min),
            ));
        }
        if amount > bounds.max {
            return Err(SwitchError::invalid_field(
                "amount",
                format!("amount {amount} {currency} exceeds the maximum of {}", bounds.max),
            ));
        }
        Ok(())
    }
}

fn scale_factor(exponent: u32) -> Option<Decimal> {
    10i64.checked_pow(exponent).map(Decimal::from)
}

/// Converts a major-unit amount to integer minor units (`100.00` EUR to `10000`).
///
/// # Errors
///
/// Returns [`SwitchError::Validation`] if the amount has more precision than
/// `exponent` allows or does not fit in an `i64`.
pub fn to_minor_units(amount: Decimal, exponent: u32) -> Result<i64, SwitchError> {
    let scaled = scale_factor(exponent)
        .and_then(|factor| amount.checked_mul(factor))
        .ok_or_else(|| SwitchError::invalid_field("amount", format!("amount {amount} is too large")))?;
    if !scaled.fract().is_zero() {
        return Err(SwitchError::invalid_field(
            "amount",
            format!("amount {amount} has more than {exponent} decimal places"),
        ));
    }
    scaled
        .to_i64()
        .ok_or_else(|| SwitchError::invalid_field("amount", format!("amount {amount} is out of range")))
}

/// Converts integer minor units back to a major-unit amount.
#[must_use]
pub fn from_minor_units(minor: Decimal, exponent: u32) -> Decimal {
    scale_factor(exponent).map_or(minor, |factor| minor / factor)
}

/// Renders an amount as a JSON number when it round-trips through `f64`,
/// otherwise as a decimal string.
#[must_use]
pub fn amount_to_json(amount: Decimal) -> Value {
    amount
        .normalize()
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map_or_else(|| Value::String(amount.to_string()), Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules() -> CurrencyRules {
        CurrencyRules::new([
            CurrencyBounds::whole(Currency::EUR, 1, 10_000),
            CurrencyBounds::new(Currency::GHS, Decimal::new(10, 2), Decimal::from(10_000_000)),
        ])
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let rules = rules();
        assert!(rules.validate(Decimal::ONE, Currency::EUR).is_ok());
        assert!(rules.validate(Decimal::from(10_000), Currency::EUR).is_ok());
        assert!(rules.validate(Decimal::new(10, 2), Currency::GHS).is_ok());
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let rules = rules();
        let below = rules.validate(Decimal::new(99, 2), Currency::EUR).unwrap_err();
        assert!(matches!(below, SwitchError::Validation { field: Some(ref f), .. } if f == "amount"));
        let above = rules.validate(Decimal::new(1_000_001, 2), Currency::EUR).unwrap_err();
        assert!(above.is_validation());
    }

    #[test]
    fn test_non_positive_and_unsupported() {
        let rules = rules();
        assert!(rules.validate(Decimal::ZERO, Currency::EUR).is_err());
        assert!(rules.validate(Decimal::from(-5), Currency::EUR).is_err());
        let err = rules.validate(Decimal::from(5), Currency::NGN).unwrap_err();
        assert!(matches!(err, SwitchError::Validation { field: Some(ref f), .. } if f == "currency"));
    }

    #[test]
    fn test_minor_unit_round_trip() {
        let amount = Decimal::new(10000, 2);
        let minor = to_minor_units(amount, 2).unwrap();
        assert_eq!(minor, 10000);
        assert_eq!(from_minor_units(Decimal::from(minor), 2), amount);
        assert_eq!(from_minor_units(Decimal::from(5000), 2), Decimal::from(50));
    }

    #[test]
    fn test_minor_units_reject_excess_precision() {
        assert!(to_minor_units(Decimal::new(10005, 3), 2).is_err());
        assert!(to_minor_units(Decimal::new(15, 1), 0).is_err());
        assert_eq!(to_minor_units(Decimal::from(2500), 0).unwrap(), 2500);
    }

    #[test]
    fn test_amount_to_json() {
        assert_eq!(amount_to_json(Decimal::new(10050, 2)), json!(100.5));
        assert_eq!(amount_to_json(Decimal::from(5000)), json!(5000.0));
    }
}
