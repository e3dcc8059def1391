//! Stock and ingredient deduction engine tests
//!
//! Covers the deduction properties:
//! - movement/stock consistency (the log reconstructs the stock)
//! - idempotent paid transition (no double deduction)
//! - unit conversion (g→kg, ml→L, unknown pairs rejected)
//! - atomicity under failure (no partial deductions)

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use shared::{convert_quantity, replay_movements, required_quantity, MovementType, Unit};

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

// ============================================================================
// Simulation helpers
//
// These mirror the engine's arithmetic without a database: an in-memory
// movement log with the same floor/overdraft policies.
// ============================================================================

#[derive(Debug, Clone)]
struct SimMovement {
    sale_id: Option<Uuid>,
    movement_type: MovementType,
    quantity: Decimal,
    stock_before: Decimal,
    stock_after: Decimal,
}

/// Finished-goods deduction: floored at zero, the movement records the
/// effective quantity.
fn deduct_finished(stock: i32, requested: i32) -> (i32, i32) {
    let effective = requested.min(stock);
    (effective, stock - effective)
}

/// Ingredient deduction: no floor, overdraft allowed.
fn deduct_ingredient(stock: Decimal, used: Decimal) -> Decimal {
    stock - used
}

/// One recipe line as the deduction walk sees it.
struct SimLine {
    quantity_per_dish: Decimal,
    line_unit: Unit,
    native_unit: Unit,
}

/// The per-sale deduction walk: every line converts first, then all
/// deductions apply, so one bad line leaves the log untouched.
fn deduct_for_sale_sim(
    log: &mut Vec<SimMovement>,
    stock: &mut Decimal,
    sale_id: Uuid,
    lines: &[SimLine],
    dishes: i32,
) -> Result<(), shared::UnitConversionError> {
    // Idempotence guard: the movement log decides
    if log.iter().any(|m| m.sale_id == Some(sale_id)) {
        return Ok(());
    }

    let mut used = Vec::with_capacity(lines.len());
    for line in lines {
        used.push(required_quantity(
            line.quantity_per_dish,
            line.line_unit,
            line.native_unit,
            dishes,
        )?);
    }

    for quantity in used {
        let before = *stock;
        let after = deduct_ingredient(before, quantity);
        log.push(SimMovement {
            sale_id: Some(sale_id),
            movement_type: MovementType::Out,
            quantity,
            stock_before: before,
            stock_after: after,
        });
        *stock = after;
    }

    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// 250g of an ingredient stocked in kilograms deducts exactly 0.25
    #[test]
    fn test_gram_to_kilogram_deduction() {
        let used = required_quantity(dec("250"), Unit::Grams, Unit::Kilograms, 1).unwrap();
        assert_eq!(used, dec("0.25"));
        assert_eq!(deduct_ingredient(dec("2"), used), dec("1.75"));
    }

    /// 500ml of an ingredient stocked in liters deducts exactly 0.5
    #[test]
    fn test_milliliter_to_liter_deduction() {
        let used = required_quantity(dec("500"), Unit::Milliliters, Unit::Liters, 1).unwrap();
        assert_eq!(used, dec("0.5"));
    }

    /// Quantity scales with the number of dishes before converting
    #[test]
    fn test_conversion_scales_with_dishes() {
        let used = required_quantity(dec("250"), Unit::Grams, Unit::Kilograms, 4).unwrap();
        assert_eq!(used, dec("1"));
    }

    /// Pairs outside the conversion table are hard errors
    #[test]
    fn test_unknown_pairs_rejected() {
        assert!(convert_quantity(dec("1"), Unit::Kilograms, Unit::Grams).is_err());
        assert!(convert_quantity(dec("1"), Unit::Piece, Unit::Liters).is_err());
        assert!(convert_quantity(dec("1"), Unit::Grams, Unit::Milliliters).is_err());
        assert!(convert_quantity(dec("1"), Unit::Bottle, Unit::Kilograms).is_err());
    }

    /// Movement log reconstructs the current stock exactly
    #[test]
    fn test_movement_stock_consistency() {
        let log = vec![
            (MovementType::In, dec("10"), dec("0"), dec("10")),
            (MovementType::Out, dec("2.5"), dec("10"), dec("7.5")),
            (MovementType::Adjustment, dec("-0.5"), dec("7.5"), dec("7")),
            (MovementType::Out, dec("3"), dec("7"), dec("4")),
        ];

        assert_eq!(replay_movements(dec("0"), log), Some(dec("4")));
    }

    /// A corrupt row breaks the replay instead of being absorbed
    #[test]
    fn test_inconsistent_log_detected() {
        let log = vec![
            (MovementType::In, dec("10"), dec("0"), dec("10")),
            (MovementType::Out, dec("2"), dec("10"), dec("9")),
        ];

        assert_eq!(replay_movements(dec("0"), log), None);
    }

    /// The deduction trigger is idempotent: a second run for the same
    /// sale performs no additional mutation
    #[test]
    fn test_idempotent_paid_transition() {
        let sale_id = Uuid::new_v4();
        let mut log = Vec::new();
        let mut stock = dec("5");
        let lines = vec![SimLine {
            quantity_per_dish: dec("250"),
            line_unit: Unit::Grams,
            native_unit: Unit::Kilograms,
        }];

        deduct_for_sale_sim(&mut log, &mut stock, sale_id, &lines, 2).unwrap();
        assert_eq!(stock, dec("4.5"));
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].sale_id, Some(sale_id));
        assert_eq!(log[0].movement_type, MovementType::Out);
        assert_eq!(log[0].quantity, dec("0.5"));
        assert_eq!(log[0].stock_before, dec("5"));
        assert_eq!(log[0].stock_after, dec("4.5"));

        // Second trigger: nothing moves
        deduct_for_sale_sim(&mut log, &mut stock, sale_id, &lines, 2).unwrap();
        assert_eq!(stock, dec("4.5"));
        assert_eq!(log.len(), 1);
    }

    /// A failing line aborts the whole walk with nothing persisted
    #[test]
    fn test_atomicity_under_failure() {
        let sale_id = Uuid::new_v4();
        let mut log = Vec::new();
        let mut stock = dec("10");
        let lines = vec![
            SimLine {
                quantity_per_dish: dec("100"),
                line_unit: Unit::Grams,
                native_unit: Unit::Kilograms,
            },
            SimLine {
                quantity_per_dish: dec("1"),
                // No conversion from bottles to kilograms
                line_unit: Unit::Bottle,
                native_unit: Unit::Kilograms,
            },
        ];

        let result = deduct_for_sale_sim(&mut log, &mut stock, sale_id, &lines, 1);
        assert!(result.is_err());
        assert!(log.is_empty());
        assert_eq!(stock, dec("10"));
    }

    /// Finished goods floor at zero and record the effective quantity
    #[test]
    fn test_finished_goods_floor_at_zero() {
        let (effective, after) = deduct_finished(3, 5);
        assert_eq!(effective, 3);
        assert_eq!(after, 0);

        // The audit invariant still holds for the recorded row
        assert_eq!(
            MovementType::Out.apply(Decimal::from(3), Decimal::from(effective)),
            Decimal::from(after)
        );
    }

    /// Ingredients overdraw instead of flooring; negative remaining is
    /// the out-of-stock signal
    #[test]
    fn test_ingredient_overdraft_allowed() {
        let after = deduct_ingredient(dec("0.2"), dec("0.5"));
        assert_eq!(after, dec("-0.3"));
        assert!(after <= Decimal::ZERO);
    }

    /// Low-stock fires at the threshold, out-of-stock at zero or below
    #[test]
    fn test_alert_levels() {
        let threshold = dec("1.0");

        let after_low = dec("0.8");
        assert!(after_low > Decimal::ZERO && after_low <= threshold);

        let after_out = dec("-0.1");
        assert!(after_out <= Decimal::ZERO);

        let after_ok = dec("1.2");
        assert!(after_ok > threshold);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Strategy for ingredient quantities (0.001 to 10000.000)
    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=10_000_000i64).prop_map(|n| Decimal::new(n, 3))
    }

    fn dish_strategy() -> impl Strategy<Value = i32> {
        1i32..=50
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// g→kg is exactly division by 1000
        #[test]
        fn prop_gram_conversion_exact(q in quantity_strategy()) {
            let converted = convert_quantity(q, Unit::Grams, Unit::Kilograms).unwrap();
            prop_assert_eq!(converted * Decimal::from(1000), q);
        }

        /// ml→L is exactly division by 1000
        #[test]
        fn prop_milliliter_conversion_exact(q in quantity_strategy()) {
            let converted = convert_quantity(q, Unit::Milliliters, Unit::Liters).unwrap();
            prop_assert_eq!(converted * Decimal::from(1000), q);
        }

        /// Same-unit conversion is the identity for every unit
        #[test]
        fn prop_same_unit_identity(q in quantity_strategy()) {
            for unit in [
                Unit::Grams,
                Unit::Kilograms,
                Unit::Milliliters,
                Unit::Liters,
                Unit::Piece,
                Unit::Bottle,
                Unit::Portion,
            ] {
                prop_assert_eq!(convert_quantity(q, unit, unit).unwrap(), q);
            }
        }

        /// Required quantity scales linearly with the dish count
        #[test]
        fn prop_required_quantity_scales(
            per_dish in quantity_strategy(),
            dishes in dish_strategy()
        ) {
            let required =
                required_quantity(per_dish, Unit::Grams, Unit::Kilograms, dishes).unwrap();
            let single = required_quantity(per_dish, Unit::Grams, Unit::Kilograms, 1).unwrap();
            prop_assert_eq!(required, single * Decimal::from(dishes));
        }

        /// A well-formed movement log always replays to its last
        /// stock_after
        #[test]
        fn prop_replay_matches_chain(
            initial in quantity_strategy(),
            deltas in prop::collection::vec(
                prop_oneof![
                    quantity_strategy().prop_map(|q| (MovementType::In, q)),
                    quantity_strategy().prop_map(|q| (MovementType::Out, q)),
                ],
                0..20
            )
        ) {
            let mut level = initial;
            let mut log = Vec::with_capacity(deltas.len());
            for (kind, quantity) in deltas {
                let before = level;
                let after = kind.apply(before, quantity);
                log.push((kind, quantity, before, after));
                level = after;
            }

            prop_assert_eq!(replay_movements(initial, log), Some(level));
        }

        /// The deduction walk never mutates anything when a line fails
        #[test]
        fn prop_failed_walk_leaves_no_trace(
            stock in quantity_strategy(),
            good_lines in prop::collection::vec(quantity_strategy(), 0..5),
            dishes in dish_strategy()
        ) {
            let sale_id = Uuid::new_v4();
            let mut log = Vec::new();
            let mut current = stock;

            let mut lines: Vec<SimLine> = good_lines
                .iter()
                .map(|q| SimLine {
                    quantity_per_dish: *q,
                    line_unit: Unit::Grams,
                    native_unit: Unit::Kilograms,
                })
                .collect();
            // Poison the last line
            lines.push(SimLine {
                quantity_per_dish: dec("1"),
                line_unit: Unit::Liters,
                native_unit: Unit::Kilograms,
            });

            let result = deduct_for_sale_sim(&mut log, &mut current, sale_id, &lines, dishes);

            prop_assert!(result.is_err());
            prop_assert!(log.is_empty());
            prop_assert_eq!(current, stock);
        }

        /// Finished-goods deduction never goes negative and records the
        /// effective quantity
        #[test]
        fn prop_finished_goods_never_negative(
            stock in 0i32..=1000,
            requested in 1i32..=2000
        ) {
            let (effective, after) = deduct_finished(stock, requested);

            prop_assert!(after >= 0);
            prop_assert!(effective <= requested);
            prop_assert_eq!(stock - effective, after);
        }
    }
}
