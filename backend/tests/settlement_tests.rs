//! Credit settlement engine tests
//!
//! Covers the settlement properties:
//! - balance conservation (ledger sum == balance)
//! - FIFO settlement with at most one partial
//! - exact full settlement
//! - overpayment rejection

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use shared::{allocate_payment, balance_from_ledger, OutstandingSale, TransactionType};

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn sale(total: &str) -> OutstandingSale {
    OutstandingSale {
        sale_id: Uuid::new_v4(),
        reference: format!("SALE-{}", total),
        total_amount: dec(total),
    }
}

/// The validation the payment endpoint applies before touching the
/// ledger: positive amount, never more than the outstanding balance.
fn apply_payment(balance: Decimal, amount: Decimal) -> Result<Decimal, &'static str> {
    if amount <= Decimal::ZERO {
        return Err("Payment amount must be positive");
    }
    if amount > balance {
        return Err("Payment cannot exceed the outstanding balance");
    }
    Ok(balance - amount)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Balance equals the signed sum of all ledger entries
    #[test]
    fn test_balance_conservation() {
        let ledger = vec![
            (TransactionType::Debt, dec("9000")),
            (TransactionType::Debt, dec("6000")),
            (TransactionType::Payment, dec("10000")),
        ];

        // 9000 + 6000 - 10000 = 5000
        assert_eq!(balance_from_ledger(ledger), dec("5000"));
    }

    /// Adjustments apply their own sign
    #[test]
    fn test_balance_with_signed_adjustments() {
        let ledger = vec![
            (TransactionType::Debt, dec("2000")),
            (TransactionType::Adjustment, dec("-500")),
            (TransactionType::Adjustment, dec("300")),
        ];

        assert_eq!(balance_from_ledger(ledger), dec("1800"));
    }

    /// Documented scenario: sales of 9000 and 6000, payment of 10000.
    /// The first sale settles fully, the second absorbs 1000 and stays
    /// unpaid with 5000 outstanding.
    #[test]
    fn test_fifo_settlement() {
        let sales = vec![sale("9000"), sale("6000")];
        let plan = allocate_payment(dec("10000"), &sales);

        assert_eq!(plan.fully_settled.len(), 1);
        assert_eq!(plan.fully_settled[0].sale_id, sales[0].sale_id);
        assert_eq!(plan.fully_settled[0].amount, dec("9000"));

        let partial = plan.partially_settled.expect("partial settlement");
        assert_eq!(partial.sale_id, sales[1].sale_id);
        assert_eq!(partial.amount_applied, dec("1000"));
        assert_eq!(partial.amount_outstanding, dec("5000"));

        // Balance decreases by exactly the payment amount regardless of
        // how it was distributed
        let ledger = vec![
            (TransactionType::Debt, dec("9000")),
            (TransactionType::Debt, dec("6000")),
            (TransactionType::Payment, dec("10000")),
        ];
        assert_eq!(balance_from_ledger(ledger), dec("5000"));
    }

    /// A payment equal to the single unpaid sale settles it and lands
    /// the balance exactly at zero
    #[test]
    fn test_exact_full_settlement() {
        let sales = vec![sale("9000")];
        let plan = allocate_payment(dec("9000"), &sales);

        assert_eq!(plan.fully_settled.len(), 1);
        assert!(plan.partially_settled.is_none());
        assert_eq!(plan.unallocated, Decimal::ZERO);

        let ledger = vec![
            (TransactionType::Debt, dec("9000")),
            (TransactionType::Payment, dec("9000")),
        ];
        assert_eq!(balance_from_ledger(ledger), Decimal::ZERO);
    }

    /// Overpayment is rejected before any state changes
    #[test]
    fn test_overpayment_rejected() {
        let balance = dec("5000");
        let result = apply_payment(balance, dec("5001"));
        assert!(result.is_err());

        // Exact balance is accepted
        assert_eq!(apply_payment(balance, dec("5000")).unwrap(), Decimal::ZERO);
    }

    /// Non-positive amounts are rejected
    #[test]
    fn test_non_positive_amount_rejected() {
        assert!(apply_payment(dec("5000"), Decimal::ZERO).is_err());
        assert!(apply_payment(dec("5000"), dec("-100")).is_err());
    }

    /// Sales beyond the exhausted payment are untouched
    #[test]
    fn test_walk_stops_when_exhausted() {
        let sales = vec![sale("4000"), sale("4000"), sale("4000")];
        let plan = allocate_payment(dec("4000"), &sales);

        assert_eq!(plan.fully_settled.len(), 1);
        assert!(plan.partially_settled.is_none());
    }

    /// An empty outstanding list leaves the whole payment unallocated
    #[test]
    fn test_no_outstanding_sales() {
        let plan = allocate_payment(dec("3000"), &[]);

        assert!(plan.fully_settled.is_empty());
        assert!(plan.partially_settled.is_none());
        assert_eq!(plan.unallocated, dec("3000"));
    }

    /// Settlement bookkeeping never exceeds the payment
    #[test]
    fn test_applied_plus_unallocated_is_payment() {
        let sales = vec![sale("100"), sale("250"), sale("75")];
        let plan = allocate_payment(dec("300"), &sales);

        assert_eq!(plan.total_applied() + plan.unallocated, dec("300"));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Strategy for BIF amounts (whole francs, 1 to 1,000,000)
    fn amount_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=1_000_000i64).prop_map(Decimal::from)
    }

    /// Strategy for lists of outstanding sale totals
    fn totals_strategy() -> impl Strategy<Value = Vec<Decimal>> {
        prop::collection::vec(amount_strategy(), 0..12)
    }

    fn transaction_strategy() -> impl Strategy<Value = (TransactionType, Decimal)> {
        prop_oneof![
            amount_strategy().prop_map(|a| (TransactionType::Debt, a)),
            amount_strategy().prop_map(|a| (TransactionType::Payment, a)),
            (-1_000_000i64..=1_000_000i64)
                .prop_map(|a| (TransactionType::Adjustment, Decimal::from(a))),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// P1: the balance is the signed sum of the ledger
        #[test]
        fn prop_balance_conservation(
            entries in prop::collection::vec(transaction_strategy(), 0..30)
        ) {
            let expected = entries.iter().fold(Decimal::ZERO, |acc, (kind, amount)| {
                match kind {
                    TransactionType::Debt => acc + amount,
                    TransactionType::Payment => acc - amount,
                    TransactionType::Adjustment => acc + amount,
                }
            });

            prop_assert_eq!(balance_from_ledger(entries), expected);
        }

        /// Every franc of the payment is either applied to a sale or
        /// left unallocated
        #[test]
        fn prop_allocation_conserves_amount(
            amount in amount_strategy(),
            totals in totals_strategy()
        ) {
            let sales: Vec<OutstandingSale> = totals
                .iter()
                .map(|t| OutstandingSale {
                    sale_id: Uuid::new_v4(),
                    reference: "SALE-PROP".to_string(),
                    total_amount: *t,
                })
                .collect();

            let plan = allocate_payment(amount, &sales);

            prop_assert_eq!(plan.total_applied() + plan.unallocated, amount);
        }

        /// Fully settled sales are exactly a prefix of the FIFO order
        #[test]
        fn prop_settlement_is_fifo_prefix(
            amount in amount_strategy(),
            totals in totals_strategy()
        ) {
            let sales: Vec<OutstandingSale> = totals
                .iter()
                .map(|t| OutstandingSale {
                    sale_id: Uuid::new_v4(),
                    reference: "SALE-PROP".to_string(),
                    total_amount: *t,
                })
                .collect();

            let plan = allocate_payment(amount, &sales);

            for (i, settled) in plan.fully_settled.iter().enumerate() {
                prop_assert_eq!(settled.sale_id, sales[i].sale_id);
                prop_assert_eq!(settled.amount, sales[i].total_amount);
            }

            // The partial, if any, is the sale right after the prefix
            if let Some(partial) = &plan.partially_settled {
                let k = plan.fully_settled.len();
                prop_assert_eq!(partial.sale_id, sales[k].sale_id);
                prop_assert_eq!(
                    partial.amount_applied + partial.amount_outstanding,
                    sales[k].total_amount
                );
                prop_assert!(partial.amount_applied > Decimal::ZERO);
                prop_assert!(partial.amount_outstanding > Decimal::ZERO);
            }
        }

        /// At most one sale is ever partially settled
        #[test]
        fn prop_at_most_one_partial(
            amount in amount_strategy(),
            totals in totals_strategy()
        ) {
            let sales: Vec<OutstandingSale> = totals
                .iter()
                .map(|t| OutstandingSale {
                    sale_id: Uuid::new_v4(),
                    reference: "SALE-PROP".to_string(),
                    total_amount: *t,
                })
                .collect();

            let plan = allocate_payment(amount, &sales);

            // Encoded in the type as an Option; a partial never also
            // appears in the fully settled list
            if let Some(partial) = &plan.partially_settled {
                prop_assert!(plan
                    .fully_settled
                    .iter()
                    .all(|s| s.sale_id != partial.sale_id));
            }
        }

        /// Overpayment is always rejected, exact payment always accepted
        #[test]
        fn prop_overpayment_always_rejected(
            balance in amount_strategy(),
            excess in amount_strategy()
        ) {
            prop_assert!(apply_payment(balance, balance + excess).is_err());
            prop_assert_eq!(apply_payment(balance, balance).unwrap(), Decimal::ZERO);
        }

        /// The validated payment decreases the balance by exactly the
        /// amount paid
        #[test]
        fn prop_payment_decreases_balance_exactly(
            amount in amount_strategy(),
            headroom in amount_strategy()
        ) {
            let balance = amount + headroom;
            let new_balance = apply_payment(balance, amount).unwrap();
            prop_assert_eq!(balance - new_balance, amount);
            prop_assert!(new_balance >= Decimal::ZERO);
        }
    }
}
