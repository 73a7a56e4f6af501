//! Validation error taxonomy shared across the monitoring system
//!
//! Data errors are rejected at the boundary where a value is first
//! constructed; downstream code can then assume well-formed inputs.

use thiserror::Error;

/// Errors raised when constructing core types from untrusted input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol must not be empty")]
    EmptySymbol,

    #[error("invalid price: {0}")]
    InvalidPrice(String),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}
