//! Kitchen models: ingredients, recipes, and unit conversion
//!
//! Recipe lines may declare their quantity in a different unit than the
//! ingredient's native one. The conversion table is explicit and total:
//! grams→kilograms and milliliters→liters divide by 1000, identical
//! units pass through, and every other pair is a hard error rather than
//! a silent identity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Measurement units used for products and ingredients
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Grams,
    Kilograms,
    Milliliters,
    Liters,
    Piece,
    Bottle,
    Portion,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Grams => "g",
            Unit::Kilograms => "kg",
            Unit::Milliliters => "ml",
            Unit::Liters => "l",
            Unit::Piece => "piece",
            Unit::Bottle => "bottle",
            Unit::Portion => "portion",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "g" => Some(Unit::Grams),
            "kg" => Some(Unit::Kilograms),
            "ml" => Some(Unit::Milliliters),
            "l" => Some(Unit::Liters),
            "piece" => Some(Unit::Piece),
            "bottle" => Some(Unit::Bottle),
            "portion" => Some(Unit::Portion),
            _ => None,
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit pair with no defined conversion
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no conversion from {from} to {to}")]
pub struct UnitConversionError {
    pub from: Unit,
    pub to: Unit,
}

/// Convert a quantity between units.
///
/// Only the metric sub-unit pairs are defined; an unknown pair is an
/// error so a mismatched recipe line can never silently mis-deduct
/// stock.
pub fn convert_quantity(
    quantity: Decimal,
    from: Unit,
    to: Unit,
) -> Result<Decimal, UnitConversionError> {
    if from == to {
        return Ok(quantity);
    }
    match (from, to) {
        (Unit::Grams, Unit::Kilograms) => Ok(quantity / Decimal::from(1000)),
        (Unit::Milliliters, Unit::Liters) => Ok(quantity / Decimal::from(1000)),
        _ => Err(UnitConversionError { from, to }),
    }
}

/// A raw ingredient tracked in its native unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: Uuid,
    pub name: String,
    /// Stock in the native unit; may go negative, which signals an
    /// out-of-stock overdraft rather than being clamped.
    pub quantity_remaining: Decimal,
    pub unit: Unit,
    pub alert_threshold: Decimal,
    /// Cost per native unit in BIF
    pub unit_price: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ingredient {
    pub fn is_out_of_stock(&self) -> bool {
        self.quantity_remaining <= Decimal::ZERO
    }

    pub fn is_low_stock(&self) -> bool {
        !self.is_out_of_stock() && self.quantity_remaining <= self.alert_threshold
    }
}

/// A dish recipe attached to exactly one product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub preparation_minutes: Option<i32>,
    pub portions: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One ingredient line of a recipe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeIngredient {
    pub id: Uuid,
    pub recipe_id: Uuid,
    pub ingredient_id: Uuid,
    /// Quantity needed for one dish, in `unit`
    pub quantity_per_dish: Decimal,
    /// May differ from the ingredient's native unit
    pub unit: Unit,
}

/// Quantity of an ingredient a recipe line needs, in the ingredient's
/// native unit.
pub fn required_quantity(
    line_quantity_per_dish: Decimal,
    line_unit: Unit,
    native_unit: Unit,
    dishes: i32,
) -> Result<Decimal, UnitConversionError> {
    let total = line_quantity_per_dish * Decimal::from(dishes);
    convert_quantity(total, line_unit, native_unit)
}

/// An ingredient whose remaining stock cannot cover a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingIngredient {
    pub ingredient_id: Uuid,
    pub name: String,
    pub required: Decimal,
    pub available: Decimal,
    pub unit: Unit,
}

/// Result of a recipe availability check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub can_prepare: bool,
    pub quantity_requested: i32,
    pub missing_ingredients: Vec<MissingIngredient>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn grams_to_kilograms_divides_by_thousand() {
        assert_eq!(
            convert_quantity(dec("250"), Unit::Grams, Unit::Kilograms).unwrap(),
            dec("0.25")
        );
    }

    #[test]
    fn milliliters_to_liters_divides_by_thousand() {
        assert_eq!(
            convert_quantity(dec("500"), Unit::Milliliters, Unit::Liters).unwrap(),
            dec("0.5")
        );
    }

    #[test]
    fn same_unit_is_identity() {
        for unit in [
            Unit::Grams,
            Unit::Kilograms,
            Unit::Milliliters,
            Unit::Liters,
            Unit::Piece,
            Unit::Bottle,
            Unit::Portion,
        ] {
            assert_eq!(convert_quantity(dec("7.5"), unit, unit).unwrap(), dec("7.5"));
        }
    }

    #[test]
    fn undefined_pairs_are_errors() {
        let err = convert_quantity(dec("1"), Unit::Kilograms, Unit::Grams).unwrap_err();
        assert_eq!(err.from, Unit::Kilograms);
        assert_eq!(err.to, Unit::Grams);

        assert!(convert_quantity(dec("1"), Unit::Grams, Unit::Liters).is_err());
        assert!(convert_quantity(dec("1"), Unit::Piece, Unit::Kilograms).is_err());
        assert!(convert_quantity(dec("1"), Unit::Liters, Unit::Milliliters).is_err());
    }

    #[test]
    fn required_quantity_scales_then_converts() {
        // 250g per dish, three dishes, ingredient stocked in kg.
        let needed = required_quantity(dec("250"), Unit::Grams, Unit::Kilograms, 3).unwrap();
        assert_eq!(needed, dec("0.75"));
    }

    #[test]
    fn low_and_out_of_stock_flags() {
        let mut ingredient = Ingredient {
            id: Uuid::new_v4(),
            name: "Tomates".into(),
            quantity_remaining: dec("2.0"),
            unit: Unit::Kilograms,
            alert_threshold: dec("5.0"),
            unit_price: dec("1500"),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(ingredient.is_low_stock());
        assert!(!ingredient.is_out_of_stock());

        ingredient.quantity_remaining = dec("-0.2");
        assert!(ingredient.is_out_of_stock());
        assert!(!ingredient.is_low_stock());
    }
}
