//! HTTP handlers for BarStockWise

pub mod credits;
pub mod health;
pub mod inventory;
pub mod kitchen;
pub mod products;
pub mod sales;
pub mod tables;

pub use credits::*;
pub use health::*;
pub use inventory::*;
pub use kitchen::*;
pub use products::*;
pub use sales::*;
pub use tables::*;
