//! Stock movement audit models
//!
//! Every stock mutation is recorded as an append-only movement row with
//! the stock level before and after. The owning product or ingredient's
//! current stock must always equal the `stock_after` of its most recent
//! movement; replaying the log reconstructs the stock exactly.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a stock movement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    In,
    Out,
    Adjustment,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
            MovementType::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in" => Some(MovementType::In),
            "out" => Some(MovementType::Out),
            "adjustment" => Some(MovementType::Adjustment),
            _ => None,
        }
    }

    /// Stock level after applying a movement of `quantity` to `before`.
    ///
    /// Adjustments carry a signed quantity; in/out quantities are
    /// positive.
    pub fn apply(&self, before: Decimal, quantity: Decimal) -> Decimal {
        match self {
            MovementType::In => before + quantity,
            MovementType::Out => before - quantity,
            MovementType::Adjustment => before + quantity,
        }
    }
}

/// Business cause of a movement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    Purchase,
    Sale,
    Kitchen,
    Correction,
    Loss,
    Return,
}

impl MovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::Purchase => "purchase",
            MovementReason::Sale => "sale",
            MovementReason::Kitchen => "kitchen",
            MovementReason::Correction => "correction",
            MovementReason::Loss => "loss",
            MovementReason::Return => "return",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "purchase" => Some(MovementReason::Purchase),
            "sale" => Some(MovementReason::Sale),
            "kitchen" => Some(MovementReason::Kitchen),
            "correction" => Some(MovementReason::Correction),
            "loss" => Some(MovementReason::Loss),
            "return" => Some(MovementReason::Return),
            _ => None,
        }
    }
}

/// Finished-goods stock movement (integer quantities)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub movement_type: MovementType,
    pub reason: MovementReason,
    pub quantity: i32,
    pub stock_before: i32,
    pub stock_after: i32,
    pub sale_id: Option<Uuid>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Raw-ingredient stock movement (decimal quantities, native unit)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientMovement {
    pub id: Uuid,
    pub ingredient_id: Uuid,
    pub movement_type: MovementType,
    pub reason: MovementReason,
    pub quantity: Decimal,
    pub stock_before: Decimal,
    pub stock_after: Decimal,
    pub sale_id: Option<Uuid>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One ingredient deduction performed for a sale, reported to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientDeduction {
    pub ingredient_id: Uuid,
    pub ingredient_name: String,
    /// Quantity deducted in the ingredient's native unit
    pub quantity_deducted: Decimal,
    pub unit: super::Unit,
    pub stock_after: Decimal,
    pub low_stock: bool,
    pub out_of_stock: bool,
}

/// Replay a movement log from an initial level.
///
/// Returns the final stock, or `None` when some intermediate
/// `stock_after` disagrees with the arithmetic, i.e. the log is
/// corrupt.
pub fn replay_movements<I>(initial: Decimal, movements: I) -> Option<Decimal>
where
    I: IntoIterator<Item = (MovementType, Decimal, Decimal, Decimal)>,
{
    let mut level = initial;
    for (kind, quantity, before, after) in movements {
        if before != level || kind.apply(before, quantity) != after {
            return None;
        }
        level = after;
    }
    Some(level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn apply_follows_movement_direction() {
        assert_eq!(MovementType::In.apply(dec("10"), dec("4")), dec("14"));
        assert_eq!(MovementType::Out.apply(dec("10"), dec("4")), dec("6"));
        assert_eq!(
            MovementType::Adjustment.apply(dec("10"), dec("-2.5")),
            dec("7.5")
        );
    }

    #[test]
    fn replay_reconstructs_final_stock() {
        let log = vec![
            (MovementType::In, dec("10"), dec("0"), dec("10")),
            (MovementType::Out, dec("3"), dec("10"), dec("7")),
            (MovementType::Out, dec("8"), dec("7"), dec("-1")),
        ];
        assert_eq!(replay_movements(dec("0"), log), Some(dec("-1")));
    }

    #[test]
    fn replay_detects_tampered_rows() {
        // stock_after does not match the arithmetic
        let log = vec![(MovementType::Out, dec("3"), dec("10"), dec("8"))];
        assert_eq!(replay_movements(dec("10"), log), None);

        // stock_before does not chain from the previous row
        let log = vec![
            (MovementType::In, dec("5"), dec("0"), dec("5")),
            (MovementType::Out, dec("1"), dec("4"), dec("3")),
        ];
        assert_eq!(replay_movements(dec("0"), log), None);
    }
}
