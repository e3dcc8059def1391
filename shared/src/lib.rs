//! Shared types and domain logic for BarStockWise
//!
//! This crate contains the domain models and the pure pieces of the two
//! core engines (payment settlement allocation, unit conversion, sale
//! status transitions) shared between the backend and its tests.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
