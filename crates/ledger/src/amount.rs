//! Monetary amounts
//!
//! Amounts never go negative and never mix currencies: arithmetic across
//! currencies returns [`LedgerError::CurrencyMismatch`] instead of panicking.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{LedgerError, LedgerResult};

/// A three letter upper-case currency code, e.g. `GBP`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Validate and wrap a currency code
    pub fn new(code: &str) -> LedgerResult<Self> {
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(LedgerError::InvalidAmount(format!(
                "Currency codes are three upper-case letters, got {:?}",
                code
            )));
        }

        Ok(Self(code.to_string()))
    }

    pub fn gbp() -> Self {
        Self("GBP".to_string())
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn eur() -> Self {
        Self("EUR".to_string())
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = LedgerError;

    fn try_from(value: String) -> LedgerResult<Self> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-negative quantity of a currency
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "UncheckedAmount")]
pub struct Amount {
    quantity: Decimal,
    currency: Currency,
}

/// Wire form of an [`Amount`], validated on the way in
#[derive(Deserialize)]
struct UncheckedAmount {
    quantity: Decimal,
    currency: Currency,
}

impl TryFrom<UncheckedAmount> for Amount {
    type Error = LedgerError;

    fn try_from(value: UncheckedAmount) -> LedgerResult<Self> {
        Self::new(value.quantity, value.currency)
    }
}

impl Amount {
    /// Create an amount, rejecting negative quantities
    pub fn new(quantity: Decimal, currency: Currency) -> LedgerResult<Self> {
        if quantity.is_sign_negative() && !quantity.is_zero() {
            return Err(LedgerError::InvalidAmount(format!(
                "Amounts cannot be negative: {} {}",
                quantity, currency
            )));
        }

        Ok(Self { quantity, currency })
    }

    /// Create an amount of whole currency units
    pub fn from_units(units: u64, currency: Currency) -> Self {
        Self {
            quantity: Decimal::from(units),
            currency,
        }
    }

    /// Zero of the given currency
    pub fn zero(currency: Currency) -> Self {
        Self {
            quantity: Decimal::ZERO,
            currency,
        }
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.quantity.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        !self.quantity.is_zero() && self.quantity.is_sign_positive()
    }

    /// Fail unless `other` is denominated in the same currency
    pub fn ensure_same_currency(&self, other: &Amount) -> LedgerResult<()> {
        if self.currency != other.currency {
            return Err(LedgerError::CurrencyMismatch {
                expected: self.currency.to_string(),
                found: other.currency.to_string(),
            });
        }

        Ok(())
    }

    /// Sum of two amounts of the same currency
    pub fn checked_add(&self, other: &Amount) -> LedgerResult<Amount> {
        self.ensure_same_currency(other)?;

        let quantity = self.quantity.checked_add(other.quantity).ok_or_else(|| {
            LedgerError::InvalidAmount(format!("Overflow adding {} to {}", other, self))
        })?;

        Ok(Amount {
            quantity,
            currency: self.currency.clone(),
        })
    }

    /// Difference of two amounts of the same currency; fails if it would go negative
    pub fn checked_sub(&self, other: &Amount) -> LedgerResult<Amount> {
        self.ensure_same_currency(other)?;

        if other.quantity > self.quantity {
            return Err(LedgerError::InvalidAmount(format!(
                "Cannot subtract {} from {}",
                other, self
            )));
        }

        Ok(Amount {
            quantity: self.quantity - other.quantity,
            currency: self.currency.clone(),
        })
    }

    /// Whether this amount is strictly larger than `other`
    pub fn exceeds(&self, other: &Amount) -> LedgerResult<bool> {
        self.ensure_same_currency(other)?;
        Ok(self.quantity > other.quantity)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.quantity, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_codes() {
        assert_eq!(Currency::new("GBP").unwrap(), Currency::gbp());
        assert!(Currency::new("gbp").is_err());
        assert!(Currency::new("POUNDS").is_err());
        assert!(Currency::new("").is_err());
    }

    #[test]
    fn test_amount_arithmetic() {
        let a = Amount::from_units(100, Currency::gbp());
        let b = Amount::from_units(40, Currency::gbp());

        assert_eq!(a.checked_add(&b).unwrap(), Amount::from_units(140, Currency::gbp()));
        assert_eq!(a.checked_sub(&b).unwrap(), Amount::from_units(60, Currency::gbp()));
        assert!(b.checked_sub(&a).is_err());
        assert!(a.exceeds(&b).unwrap());
        assert!(!b.exceeds(&a).unwrap());
    }

    #[test]
    fn test_currency_mismatch_is_an_error() {
        let pounds = Amount::from_units(10, Currency::gbp());
        let dollars = Amount::from_units(10, Currency::usd());

        let err = pounds.checked_add(&dollars).unwrap_err();
        assert_eq!(
            err,
            LedgerError::CurrencyMismatch {
                expected: "GBP".to_string(),
                found: "USD".to_string(),
            }
        );
        assert!(pounds.exceeds(&dollars).is_err());
    }

    #[test]
    fn test_negative_amounts_rejected() {
        assert!(Amount::new(Decimal::new(-1, 0), Currency::eur()).is_err());
        assert!(Amount::new(Decimal::new(250, 2), Currency::eur()).is_ok());
        assert!(Amount::zero(Currency::eur()).is_zero());
        assert!(!Amount::zero(Currency::eur()).is_positive());
    }

    #[test]
    fn test_serde_validates_currency() {
        let json = serde_json::to_string(&Amount::from_units(5, Currency::gbp())).unwrap();
        let decoded: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, Amount::from_units(5, Currency::gbp()));

        let bad = json.replace("GBP", "gbp");
        assert!(serde_json::from_str::<Amount>(&bad).is_err());
    }

    #[test]
    fn test_serde_rejects_negative_quantity() {
        let json = serde_json::to_string(&Amount::from_units(5, Currency::gbp())).unwrap();
        let negative = json.replace("\"5\"", "\"-5\"");
        assert_ne!(negative, json);

        let err = serde_json::from_str::<Amount>(&negative).unwrap_err();
        assert!(err.to_string().contains("cannot be negative"));
    }
}
