//! Credit account and ledger models
//!
//! The account balance is denormalized but only ever mutated through
//! ledger insertion; `balance_from_ledger` recomputes it for
//! verification. `allocate_payment` is the pure FIFO settlement walk
//! applied by the backend inside its database transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Credit account status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Suspended,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AccountStatus::Active),
            "suspended" => Some(AccountStatus::Suspended),
            "closed" => Some(AccountStatus::Closed),
            _ => None,
        }
    }
}

/// Payment methods accepted at the till
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Mobile,
    BankTransfer,
    Credit,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Mobile => "mobile",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Credit => "credit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(PaymentMethod::Cash),
            "card" => Some(PaymentMethod::Card),
            "mobile" => Some(PaymentMethod::Mobile),
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            "credit" => Some(PaymentMethod::Credit),
            _ => None,
        }
    }
}

/// Ledger entry types
///
/// `amount` is always positive for debt and payment entries; adjustments
/// carry a signed amount.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Debt,
    Payment,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Debt => "debt",
            TransactionType::Payment => "payment",
            TransactionType::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debt" => Some(TransactionType::Debt),
            "payment" => Some(TransactionType::Payment),
            "adjustment" => Some(TransactionType::Adjustment),
            _ => None,
        }
    }

    /// Signed contribution of an entry to the account balance.
    ///
    /// Debt increases what the customer owes, a payment decreases it,
    /// an adjustment carries its own sign.
    pub fn signed_amount(&self, amount: Decimal) -> Decimal {
        match self {
            TransactionType::Debt => amount,
            TransactionType::Payment => -amount,
            TransactionType::Adjustment => amount,
        }
    }
}

/// A customer's running-tab account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditAccount {
    pub id: Uuid,
    pub customer_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Credit ceiling in BIF (advisory, not a hard gate)
    pub credit_limit: Decimal,
    /// Amount currently owed in BIF, never negative
    pub current_balance: Decimal,
    pub status: AccountStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CreditAccount {
    pub fn available_credit(&self) -> Decimal {
        self.credit_limit - self.current_balance
    }

    pub fn is_over_limit(&self) -> bool {
        self.current_balance > self.credit_limit
    }
}

/// Immutable ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub payment_method: Option<PaymentMethod>,
    /// Originating sale for debt entries
    pub sale_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Recompute a balance from ledger entries applied in order.
///
/// The persisted `current_balance` must always equal this sum; the
/// backend's reconciliation routine compares the two.
pub fn balance_from_ledger<I>(entries: I) -> Decimal
where
    I: IntoIterator<Item = (TransactionType, Decimal)>,
{
    entries
        .into_iter()
        .fold(Decimal::ZERO, |acc, (kind, amount)| {
            acc + kind.signed_amount(amount)
        })
}

/// An unpaid credit-financed sale, as seen by the settlement walk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutstandingSale {
    pub sale_id: Uuid,
    pub reference: String,
    pub total_amount: Decimal,
}

/// A sale fully covered by a payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettledSale {
    pub sale_id: Uuid,
    pub reference: String,
    pub amount: Decimal,
}

/// A sale only partially covered; its status is left untouched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialSettlement {
    pub sale_id: Uuid,
    pub reference: String,
    pub amount_applied: Decimal,
    pub amount_outstanding: Decimal,
}

/// Outcome of allocating one payment across outstanding sales
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementPlan {
    pub fully_settled: Vec<SettledSale>,
    pub partially_settled: Option<PartialSettlement>,
    /// Payment left over once every outstanding sale is covered
    pub unallocated: Decimal,
}

impl SettlementPlan {
    /// Total actually applied against sales (informational; the account
    /// balance always moves by the full payment amount).
    pub fn total_applied(&self) -> Decimal {
        let full: Decimal = self.fully_settled.iter().map(|s| s.amount).sum();
        let partial = self
            .partially_settled
            .as_ref()
            .map(|p| p.amount_applied)
            .unwrap_or(Decimal::ZERO);
        full + partial
    }
}

/// Allocate a payment across outstanding sales, oldest first.
///
/// Sales must be supplied in ascending creation order; the ordering is
/// load-bearing. A sale is settled only when the remaining payment
/// covers its full total; the first sale that cannot be fully covered
/// absorbs the rest and the walk stops.
pub fn allocate_payment(amount: Decimal, outstanding: &[OutstandingSale]) -> SettlementPlan {
    let mut plan = SettlementPlan::default();
    let mut remaining = amount;

    for sale in outstanding {
        if remaining <= Decimal::ZERO {
            break;
        }

        if remaining >= sale.total_amount {
            remaining -= sale.total_amount;
            plan.fully_settled.push(SettledSale {
                sale_id: sale.sale_id,
                reference: sale.reference.clone(),
                amount: sale.total_amount,
            });
        } else {
            plan.partially_settled = Some(PartialSettlement {
                sale_id: sale.sale_id,
                reference: sale.reference.clone(),
                amount_applied: remaining,
                amount_outstanding: sale.total_amount - remaining,
            });
            remaining = Decimal::ZERO;
        }
    }

    plan.unallocated = remaining;
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

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

    #[test]
    fn signed_amounts() {
        assert_eq!(TransactionType::Debt.signed_amount(dec("100")), dec("100"));
        assert_eq!(
            TransactionType::Payment.signed_amount(dec("100")),
            dec("-100")
        );
        assert_eq!(
            TransactionType::Adjustment.signed_amount(dec("-50")),
            dec("-50")
        );
    }

    #[test]
    fn ledger_sum_matches_sign_convention() {
        let entries = vec![
            (TransactionType::Debt, dec("9000")),
            (TransactionType::Debt, dec("6000")),
            (TransactionType::Payment, dec("10000")),
            (TransactionType::Adjustment, dec("-500")),
        ];
        assert_eq!(balance_from_ledger(entries), dec("4500"));
    }

    #[test]
    fn fifo_allocation_splits_full_and_partial() {
        let sales = vec![sale("9000"), sale("6000")];
        let plan = allocate_payment(dec("10000"), &sales);

        assert_eq!(plan.fully_settled.len(), 1);
        assert_eq!(plan.fully_settled[0].sale_id, sales[0].sale_id);
        assert_eq!(plan.fully_settled[0].amount, dec("9000"));

        let partial = plan.partially_settled.expect("second sale partially paid");
        assert_eq!(partial.sale_id, sales[1].sale_id);
        assert_eq!(partial.amount_applied, dec("1000"));
        assert_eq!(partial.amount_outstanding, dec("5000"));
        assert_eq!(plan.unallocated, Decimal::ZERO);
    }

    #[test]
    fn exact_payment_fully_settles_without_partial() {
        let sales = vec![sale("9000")];
        let plan = allocate_payment(dec("9000"), &sales);

        assert_eq!(plan.fully_settled.len(), 1);
        assert!(plan.partially_settled.is_none());
        assert_eq!(plan.unallocated, Decimal::ZERO);
    }

    #[test]
    fn leftover_is_reported_as_unallocated() {
        let sales = vec![sale("3000")];
        let plan = allocate_payment(dec("5000"), &sales);

        assert_eq!(plan.fully_settled.len(), 1);
        assert!(plan.partially_settled.is_none());
        assert_eq!(plan.unallocated, dec("2000"));
    }

    #[test]
    fn sales_beyond_the_exhausted_amount_are_untouched() {
        let sales = vec![sale("4000"), sale("4000"), sale("4000")];
        let plan = allocate_payment(dec("5000"), &sales);

        assert_eq!(plan.fully_settled.len(), 1);
        let partial = plan.partially_settled.unwrap();
        assert_eq!(partial.sale_id, sales[1].sale_id);
        // Third sale never appears anywhere in the plan.
        assert_ne!(partial.sale_id, sales[2].sale_id);
    }

    #[test]
    fn total_applied_never_exceeds_payment() {
        let sales = vec![sale("100"), sale("250"), sale("75")];
        let plan = allocate_payment(dec("300"), &sales);
        assert!(plan.total_applied() <= dec("300"));
        assert_eq!(plan.total_applied() + plan.unallocated, dec("300"));
    }
}
