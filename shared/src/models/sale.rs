//! Sale and sale-item models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PaymentMethod;

/// Sale lifecycle status
///
/// Forward-only progression through the service stages; `cancelled` is
/// reachable from any non-terminal state. `paid` and `cancelled` are
/// terminal: no field of a sale may change once it reaches either.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Pending,
    Preparing,
    Ready,
    Served,
    Completed,
    Paid,
    Cancelled,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Preparing => "preparing",
            SaleStatus::Ready => "ready",
            SaleStatus::Served => "served",
            SaleStatus::Completed => "completed",
            SaleStatus::Paid => "paid",
            SaleStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SaleStatus::Pending),
            "preparing" => Some(SaleStatus::Preparing),
            "ready" => Some(SaleStatus::Ready),
            "served" => Some(SaleStatus::Served),
            "completed" => Some(SaleStatus::Completed),
            "paid" => Some(SaleStatus::Paid),
            "cancelled" => Some(SaleStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SaleStatus::Paid | SaleStatus::Cancelled)
    }

    /// Position in the service flow; `cancelled` has no rank.
    fn rank(&self) -> Option<u8> {
        match self {
            SaleStatus::Pending => Some(0),
            SaleStatus::Preparing => Some(1),
            SaleStatus::Ready => Some(2),
            SaleStatus::Served => Some(3),
            SaleStatus::Completed => Some(4),
            SaleStatus::Paid => Some(5),
            SaleStatus::Cancelled => None,
        }
    }

    /// Whether this sale may move to `next`.
    ///
    /// Any forward move in the service flow is allowed (drinks skip the
    /// kitchen stages), cancellation is allowed from any non-terminal
    /// state, and nothing leaves a terminal state.
    pub fn can_transition_to(&self, next: SaleStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            SaleStatus::Cancelled => true,
            _ => match (self.rank(), next.rank()) {
                (Some(from), Some(to)) => to > from,
                _ => false,
            },
        }
    }
}

impl std::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sale (one table order or counter sale)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    pub id: Uuid,
    pub reference: String,
    pub table_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub status: SaleStatus,
    pub payment_method: PaymentMethod,
    /// Present iff the sale is credit-financed
    pub credit_account_id: Option<Uuid>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    /// A credit-financed sale has both the method and an account.
    pub fn is_credit_sale(&self) -> bool {
        self.payment_method == PaymentMethod::Credit && self.credit_account_id.is_some()
    }
}

/// One line of a sale, immutable once the sale is paid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::SaleStatus::*;

    #[test]
    fn forward_moves_are_allowed() {
        assert!(Pending.can_transition_to(Preparing));
        assert!(Preparing.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Served));
        assert!(Served.can_transition_to(Completed));
        assert!(Completed.can_transition_to(Paid));
        // Drinks skip the kitchen.
        assert!(Pending.can_transition_to(Served));
        assert!(Served.can_transition_to(Paid));
    }

    #[test]
    fn backward_moves_are_rejected() {
        assert!(!Served.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Ready));
        assert!(!Paid.can_transition_to(Completed));
    }

    #[test]
    fn terminal_states_admit_nothing() {
        for next in [Pending, Preparing, Ready, Served, Completed, Paid, Cancelled] {
            assert!(!Paid.can_transition_to(next));
            assert!(!Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn cancellation_reachable_from_any_non_terminal_state() {
        for from in [Pending, Preparing, Ready, Served, Completed] {
            assert!(from.can_transition_to(Cancelled));
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [Pending, Preparing, Ready, Served, Completed, Paid, Cancelled] {
            assert_eq!(super::SaleStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(super::SaleStatus::parse("unknown"), None);
    }
}
