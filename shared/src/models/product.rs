//! Product catalog models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Unit;

/// Product category kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    Drinks,
    Dishes,
    Snacks,
}

impl CategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKind::Drinks => "drinks",
            CategoryKind::Dishes => "dishes",
            CategoryKind::Snacks => "snacks",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "drinks" => Some(CategoryKind::Drinks),
            "dishes" => Some(CategoryKind::Dishes),
            "snacks" => Some(CategoryKind::Snacks),
            _ => None,
        }
    }
}

/// A product category (drinks, dishes, snacks)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub kind: CategoryKind,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A sellable product
///
/// Finished-goods stock is an integer count; products backed by a
/// recipe derive their availability from ingredient stock instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub category_id: Uuid,
    pub code: Option<String>,
    pub description: Option<String>,
    pub unit: Unit,
    /// Prices in BIF
    pub purchase_price: Decimal,
    pub selling_price: Decimal,
    pub current_stock: i32,
    /// Alert threshold for low-stock notifications
    pub minimum_stock: i32,
    pub is_active: bool,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn is_low_stock(&self) -> bool {
        self.current_stock > 0 && self.current_stock <= self.minimum_stock
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.current_stock == 0
    }

    pub fn profit_margin(&self) -> Decimal {
        self.selling_price - self.purchase_price
    }
}
