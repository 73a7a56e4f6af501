//! Fixed-point decimal types for prices and quantities
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point
//! errors) on the market-data path. Statistical metrics (relative error,
//! accuracy) live outside this module and use f64 because they are
//! dimensionless ratios, not money.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ValidationError;

/// Execution or quote price. Always strictly positive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Try to create a Price, rejecting zero and negative values.
    pub fn try_new(value: Decimal) -> Result<Self, ValidationError> {
        if value <= Decimal::ZERO {
            return Err(ValidationError::InvalidPrice(value.to_string()));
        }
        Ok(Self(value))
    }

    /// Convenience constructor for whole-number prices.
    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    /// Parse a decimal string (the form exchanges put on the wire).
    pub fn from_str(s: &str) -> Result<Self, ValidationError> {
        let value = Decimal::from_str(s)
            .map_err(|_| ValidationError::InvalidPrice(s.to_string()))?;
        Self::try_new(value)
    }

    /// Get the inner decimal value.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Lossy conversion for statistical consumers.
    pub fn as_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Traded quantity. Non-negative.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Quantity(Decimal);

impl Quantity {
    /// Try to create a Quantity, rejecting negative values.
    pub fn try_new(value: Decimal) -> Result<Self, ValidationError> {
        if value < Decimal::ZERO {
            return Err(ValidationError::InvalidQuantity(value.to_string()));
        }
        Ok(Self(value))
    }

    /// Convenience constructor for whole-number quantities.
    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    /// Parse a decimal string.
    pub fn from_str(s: &str) -> Result<Self, ValidationError> {
        let value = Decimal::from_str(s)
            .map_err(|_| ValidationError::InvalidQuantity(s.to_string()))?;
        Self::try_new(value)
    }

    /// Get the inner decimal value.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Lossy conversion for statistical consumers.
    pub fn as_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }

    /// Whether this quantity is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mean of a sequence of decimals. None for an empty slice.
pub fn decimal_mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum: Decimal = values.iter().copied().sum();
    Some(sum / Decimal::from(values.len()))
}
