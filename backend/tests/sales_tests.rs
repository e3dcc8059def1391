//! Sale lifecycle tests
//!
//! Covers the status machine guards (terminal states admit nothing,
//! cancellation reachable from any non-terminal state) and the
//! cancellation stock-restoration arithmetic.

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use shared::{validate_sale_reference, MovementType, SaleStatus};

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

const ALL_STATUSES: [SaleStatus; 7] = [
    SaleStatus::Pending,
    SaleStatus::Preparing,
    SaleStatus::Ready,
    SaleStatus::Served,
    SaleStatus::Completed,
    SaleStatus::Paid,
    SaleStatus::Cancelled,
];

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// The nominal service flow is accepted step by step
    #[test]
    fn test_nominal_flow() {
        let flow = [
            SaleStatus::Pending,
            SaleStatus::Preparing,
            SaleStatus::Ready,
            SaleStatus::Served,
            SaleStatus::Completed,
            SaleStatus::Paid,
        ];

        for pair in flow.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be allowed",
                pair[0],
                pair[1]
            );
        }
    }

    /// Counter sales skip the kitchen stages
    #[test]
    fn test_skipping_stages_forward() {
        assert!(SaleStatus::Pending.can_transition_to(SaleStatus::Served));
        assert!(SaleStatus::Ready.can_transition_to(SaleStatus::Paid));
        assert!(SaleStatus::Served.can_transition_to(SaleStatus::Paid));
    }

    /// Nothing ever moves backwards
    #[test]
    fn test_no_backward_transitions() {
        assert!(!SaleStatus::Preparing.can_transition_to(SaleStatus::Pending));
        assert!(!SaleStatus::Served.can_transition_to(SaleStatus::Ready));
        assert!(!SaleStatus::Completed.can_transition_to(SaleStatus::Served));
    }

    /// No field of a paid sale may be altered; the machine refuses to
    /// leave paid at all
    #[test]
    fn test_paid_is_terminal() {
        for next in ALL_STATUSES {
            assert!(!SaleStatus::Paid.can_transition_to(next));
        }
    }

    /// Cancelled is terminal too
    #[test]
    fn test_cancelled_is_terminal() {
        for next in ALL_STATUSES {
            assert!(!SaleStatus::Cancelled.can_transition_to(next));
        }
    }

    /// Cancellation is reachable from every non-terminal state
    #[test]
    fn test_cancellation_reachable() {
        for from in ALL_STATUSES {
            if from.is_terminal() {
                continue;
            }
            assert!(from.can_transition_to(SaleStatus::Cancelled));
        }
    }

    /// A deduction followed by its compensating return restores the
    /// original stock level
    #[test]
    fn test_cancellation_restores_stock() {
        let original = dec("7.5");
        let deducted = dec("1.25");

        let after_sale = MovementType::Out.apply(original, deducted);
        let after_cancel = MovementType::In.apply(after_sale, deducted);

        assert_eq!(after_cancel, original);
    }

    /// Restoring a floored finished-goods deduction returns exactly to
    /// the pre-sale level because the movement recorded the effective
    /// quantity, not the requested one
    #[test]
    fn test_cancellation_after_floored_deduction() {
        let stock_before = 3;
        let requested = 5;

        // The engine records min(requested, stock) on the way out
        let effective = requested.min(stock_before);
        let after_sale = stock_before - effective;
        assert_eq!(after_sale, 0);

        let after_cancel = after_sale + effective;
        assert_eq!(after_cancel, stock_before);
    }

    /// Sale references follow the SALE- convention
    #[test]
    fn test_sale_reference_format() {
        assert!(validate_sale_reference("SALE-1A2B3C4D").is_ok());
        assert!(validate_sale_reference("sale-1234").is_err());
        assert!(validate_sale_reference("SALE-").is_err());
    }

    /// Status strings round-trip (the database stores text)
    #[test]
    fn test_status_round_trip() {
        for status in ALL_STATUSES {
            assert_eq!(SaleStatus::parse(status.as_str()), Some(status));
        }
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn status_strategy() -> impl Strategy<Value = SaleStatus> {
        prop::sample::select(ALL_STATUSES.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Applying any sequence of requested transitions (accepting
        /// only the legal ones) can never leave a terminal state
        #[test]
        fn prop_terminal_states_absorb(
            requests in prop::collection::vec(status_strategy(), 1..30)
        ) {
            let mut status = SaleStatus::Pending;
            let mut became_terminal_at: Option<SaleStatus> = None;

            for next in requests {
                if status.is_terminal() && became_terminal_at.is_none() {
                    became_terminal_at = Some(status);
                }

                if status.can_transition_to(next) {
                    prop_assert!(!status.is_terminal());
                    status = next;
                }

                if let Some(terminal) = became_terminal_at {
                    prop_assert_eq!(status, terminal);
                }
            }
        }

        /// A transition is accepted at most in one direction
        #[test]
        fn prop_transitions_antisymmetric(
            a in status_strategy(),
            b in status_strategy()
        ) {
            if a != b && a.can_transition_to(b) && b.can_transition_to(a) {
                // Only possible if both directions are legal, which the
                // rank ordering forbids
                prop_assert!(false, "{} and {} transition both ways", a, b);
            }
        }

        /// Out-then-in with the same quantity is always the identity on
        /// stock
        #[test]
        fn prop_reversal_is_identity(
            stock in (0i64..=1_000_000i64).prop_map(Decimal::from),
            quantity in (1i64..=1_000_000i64).prop_map(Decimal::from)
        ) {
            let after_out = MovementType::Out.apply(stock, quantity);
            let restored = MovementType::In.apply(after_out, quantity);
            prop_assert_eq!(restored, stock);
        }
    }
}
