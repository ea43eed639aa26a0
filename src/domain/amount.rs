//! Amount and Currency types
//!
//! Domain primitives for monetary values. Amounts are exact decimals scaled to
//! the minor unit of their currency, so repeated debit/credit never drifts.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum allowed transfer amount (1 trillion units)
const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Currency a balance is denominated in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Currency {
    #[default]
    Sgd,
    Usd,
    Eur,
    Jpy,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Sgd => "SGD",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Jpy => "JPY",
        }
    }

    /// Number of decimal places of the currency's minor unit.
    pub fn minor_units(&self) -> u32 {
        match self {
            Currency::Jpy => 0,
            Currency::Sgd | Currency::Usd | Currency::Eur => 2,
        }
    }

    /// Round a value to this currency's minor unit (half away from zero).
    pub fn round(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.minor_units(), RoundingStrategy::MidpointAwayFromZero)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SGD" => Ok(Currency::Sgd),
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "JPY" => Ok(Currency::Jpy),
            other => Err(AmountError::UnknownCurrency(other.to_string())),
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.code().to_string()
    }
}

/// Amount represents a validated, positive transfer value.
///
/// # Invariants
/// - Value is rounded to the currency's minor unit
/// - Rounded value is always positive (> 0)
/// - Maximum value is 1 trillion
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use wallet_ledger::domain::{Amount, Currency};
///
/// let amount = Amount::new(Decimal::new(11_494, 3), Currency::Sgd).unwrap();
/// assert_eq!(amount.value(), Decimal::new(1149, 2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amount {
    value: Decimal,
    currency: Currency,
}

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive after rounding to {currency} minor units (got {value})")]
    NotPositive { value: Decimal, currency: Currency },

    #[error("Amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),
}

impl Amount {
    /// Create a new Amount, rounding to the currency's minor unit first.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if the rounded value is <= 0
    /// - `AmountError::Overflow` if value > 1 trillion
    pub fn new(value: Decimal, currency: Currency) -> Result<Self, AmountError> {
        let rounded = currency.round(value);

        if rounded <= Decimal::ZERO {
            return Err(AmountError::NotPositive { value, currency });
        }

        if rounded > MAX_AMOUNT {
            return Err(AmountError::Overflow);
        }

        Ok(Self {
            value: rounded,
            currency,
        })
    }

    /// Parse a decimal string in the given currency.
    pub fn parse(s: &str, currency: Currency) -> Result<Self, AmountError> {
        let decimal =
            Decimal::from_str(s.trim()).map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::new(decimal, currency)
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.*} {}",
            self.currency.minor_units() as usize,
            self.value,
            self.currency
        )
    }
}
