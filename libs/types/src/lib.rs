//! Types library for the market monitoring system
//!
//! This library provides the core type definitions shared across the
//! monitoring service, ensuring type safety and a single source of truth
//! for wire and persisted representations.
//!
//! # Modules
//! - `ids`: Identifiers (Symbol, AlertId)
//! - `numeric`: Fixed-point decimal types (Price, Quantity)
//! - `market`: Market data types (Trade, OrderBookSnapshot)
//! - `alert`: Alert event types
//! - `errors`: Validation error taxonomy

// Public modules
pub mod alert;
pub mod errors;
pub mod ids;
pub mod market;
pub mod numeric;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::alert::*;
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::market::*;
    pub use crate::numeric::*;
}
