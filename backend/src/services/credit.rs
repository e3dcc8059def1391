//! Credit account service: ledger, balances, and payment settlement
//!
//! The account balance is denormalized for reads but only ever mutated
//! by `insert_transaction`, which appends a ledger row and applies its
//! signed amount in one place. `add_payment` performs the FIFO
//! settlement walk: the account row and the outstanding sales are
//! locked for the whole walk so two concurrent payments cannot
//! double-allocate against the same sale.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use shared::{
    allocate_payment, balance_from_ledger, validate_burundi_phone, AccountStatus, CreditAccount,
    CreditTransaction, OutstandingSale, PartialSettlement, PaymentMethod, SettledSale,
    TransactionType,
};

use crate::error::{AppError, AppResult};

/// Service for credit accounts and their transaction ledger
#[derive(Clone)]
pub struct CreditService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    customer_name: String,
    phone: Option<String>,
    email: Option<String>,
    credit_limit: Decimal,
    current_balance: Decimal,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for CreditAccount {
    type Error = AppError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let status = AccountStatus::parse(&row.status).ok_or_else(|| {
            AppError::Consistency(format!("unknown account status '{}'", row.status))
        })?;
        Ok(CreditAccount {
            id: row.id,
            customer_name: row.customer_name,
            phone: row.phone,
            email: row.email,
            credit_limit: row.credit_limit,
            current_balance: row.current_balance,
            status,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    account_id: Uuid,
    transaction_type: String,
    amount: Decimal,
    payment_method: Option<String>,
    sale_id: Option<Uuid>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for CreditTransaction {
    type Error = AppError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let transaction_type = TransactionType::parse(&row.transaction_type).ok_or_else(|| {
            AppError::Consistency(format!(
                "unknown transaction type '{}'",
                row.transaction_type
            ))
        })?;
        let payment_method = match row.payment_method.as_deref() {
            Some(s) => Some(PaymentMethod::parse(s).ok_or_else(|| {
                AppError::Consistency(format!("unknown payment method '{}'", s))
            })?),
            None => None,
        };
        Ok(CreditTransaction {
            id: row.id,
            account_id: row.account_id,
            transaction_type,
            amount: row.amount,
            payment_method,
            sale_id: row.sale_id,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OutstandingSaleRow {
    id: Uuid,
    reference: String,
    total_amount: Decimal,
}

/// Input for creating a credit account
#[derive(Debug, Deserialize)]
pub struct CreateAccountInput {
    pub customer_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub credit_limit: Option<Decimal>,
    pub notes: Option<String>,
}

/// Input for updating a credit account
#[derive(Debug, Deserialize)]
pub struct UpdateAccountInput {
    pub customer_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub credit_limit: Option<Decimal>,
    pub status: Option<AccountStatus>,
    pub notes: Option<String>,
}

/// Filters for listing accounts
#[derive(Debug, Default, Deserialize)]
pub struct AccountFilter {
    pub status: Option<AccountStatus>,
    pub search: Option<String>,
    pub has_debt: Option<bool>,
}

/// Input for recording a payment on an account
#[derive(Debug, Deserialize)]
pub struct AddPaymentInput {
    pub amount: Decimal,
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
}

/// Input for recording a manual adjustment
#[derive(Debug, Deserialize)]
pub struct AddAdjustmentInput {
    /// Signed: positive increases the debt, negative reduces it
    pub amount: Decimal,
    pub notes: Option<String>,
}

/// Account balance snapshot returned with mutation outcomes
#[derive(Debug, Serialize)]
pub struct AccountSummary {
    pub new_balance: Decimal,
    pub available_credit: Decimal,
}

/// Outcome of a payment: ledger entry plus the settlement lists
#[derive(Debug, Serialize)]
pub struct PaymentOutcome {
    pub transaction: CreditTransaction,
    pub account: AccountSummary,
    pub fully_settled: Vec<SettledSale>,
    pub partially_settled: Option<PartialSettlement>,
    pub total_settled: usize,
}

/// Outcome of an adjustment
#[derive(Debug, Serialize)]
pub struct AdjustmentOutcome {
    pub transaction: CreditTransaction,
    pub new_balance: Decimal,
}

/// Ledger-vs-balance verification report
#[derive(Debug, Serialize)]
pub struct BalanceReconciliation {
    pub account_id: Uuid,
    pub recorded_balance: Decimal,
    pub ledger_balance: Decimal,
    pub entry_count: usize,
}

/// Filters for listing transactions
#[derive(Debug, Default, Deserialize)]
pub struct TransactionFilter {
    pub account: Option<Uuid>,
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
}

/// Global credit statistics
#[derive(Debug, Serialize)]
pub struct CreditStatistics {
    pub total_accounts: i64,
    pub active_accounts: i64,
    pub total_debt: Decimal,
    pub accounts_with_debt: i64,
    pub payments_this_month: Decimal,
    pub top_debtors: Vec<DebtorSummary>,
}

/// A customer with outstanding debt
#[derive(Debug, Serialize, FromRow)]
pub struct DebtorSummary {
    pub id: Uuid,
    pub customer_name: String,
    pub current_balance: Decimal,
    pub phone: Option<String>,
}

const ACCOUNT_COLUMNS: &str = "id, customer_name, phone, email, credit_limit, current_balance, \
                               status, notes, created_at, updated_at";

const TRANSACTION_COLUMNS: &str =
    "id, account_id, transaction_type, amount, payment_method, sale_id, notes, created_at";

impl CreditService {
    /// Create a new CreditService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Insert a ledger entry and move the account balance by its signed
    /// amount. Every balance mutation in the system goes through here.
    pub(crate) async fn insert_transaction(
        conn: &mut PgConnection,
        account_id: Uuid,
        transaction_type: TransactionType,
        amount: Decimal,
        payment_method: Option<PaymentMethod>,
        sale_id: Option<Uuid>,
        notes: Option<String>,
    ) -> AppResult<CreditTransaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "INSERT INTO credit_transactions \
             (account_id, transaction_type, amount, payment_method, sale_id, notes) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(account_id)
        .bind(transaction_type.as_str())
        .bind(amount)
        .bind(payment_method.map(|m| m.as_str()))
        .bind(sale_id)
        .bind(&notes)
        .fetch_one(&mut *conn)
        .await?;

        let delta = transaction_type.signed_amount(amount);
        sqlx::query(
            "UPDATE credit_accounts SET current_balance = current_balance + $1, \
             updated_at = NOW() WHERE id = $2",
        )
        .bind(delta)
        .bind(account_id)
        .execute(&mut *conn)
        .await?;

        row.try_into()
    }

    /// Record the debt side of a credit sale. Called by the sale
    /// service inside its own transaction when a credit sale completes.
    pub(crate) async fn record_debt(
        conn: &mut PgConnection,
        account_id: Uuid,
        sale_id: Uuid,
        amount: Decimal,
        reference: &str,
    ) -> AppResult<CreditTransaction> {
        Self::insert_transaction(
            conn,
            account_id,
            TransactionType::Debt,
            amount,
            Some(PaymentMethod::Credit),
            Some(sale_id),
            Some(format!("Vente {} à crédit", reference)),
        )
        .await
    }

    async fn lock_account(
        conn: &mut PgConnection,
        account_id: Uuid,
    ) -> AppResult<CreditAccount> {
        sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM credit_accounts WHERE id = $1 FOR UPDATE"
        ))
        .bind(account_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Credit account".to_string()))?
        .try_into()
    }

    /// Record a payment and settle outstanding credit sales, oldest
    /// debt first.
    pub async fn add_payment(
        &self,
        account_id: Uuid,
        input: AddPaymentInput,
    ) -> AppResult<PaymentOutcome> {
        if input.amount <= Decimal::ZERO {
            return Err(AppError::Validation {
                field: "amount".to_string(),
                message: "Payment amount must be positive".to_string(),
                message_fr: "Le montant du paiement doit être positif".to_string(),
            });
        }

        let mut tx = self.db.begin().await?;

        // Lock the account row for the duration of the settlement walk
        let account = Self::lock_account(&mut tx, account_id).await?;

        if account.status == AccountStatus::Closed {
            return Err(AppError::Conflict {
                resource: "credit_account".to_string(),
                message: "Cannot record a payment on a closed account".to_string(),
                message_fr: "Impossible d'enregistrer un paiement sur un compte fermé"
                    .to_string(),
            });
        }

        // A payment may not exceed the outstanding debt
        if input.amount > account.current_balance {
            return Err(AppError::Validation {
                field: "amount".to_string(),
                message: format!(
                    "Payment cannot exceed the outstanding balance ({} BIF)",
                    account.current_balance
                ),
                message_fr: format!(
                    "Le paiement ne peut pas dépasser la dette actuelle ({} FBu)",
                    account.current_balance
                ),
            });
        }

        let payment_method = input.payment_method.unwrap_or(PaymentMethod::Cash);
        let transaction = Self::insert_transaction(
            &mut tx,
            account_id,
            TransactionType::Payment,
            input.amount,
            Some(payment_method),
            None,
            input.notes.clone(),
        )
        .await?;

        // Outstanding credit sales in chronological order. The read runs
        // inside the same transaction as the writes below and the rows
        // are locked, so a concurrent payment cannot settle a sale we
        // are about to settle.
        let rows = sqlx::query_as::<_, OutstandingSaleRow>(
            "SELECT id, reference, total_amount FROM sales \
             WHERE credit_account_id = $1 AND payment_method = 'credit' AND status = 'completed' \
             ORDER BY created_at ASC \
             FOR UPDATE",
        )
        .bind(account_id)
        .fetch_all(&mut *tx)
        .await?;

        let outstanding: Vec<OutstandingSale> = rows
            .into_iter()
            .map(|r| OutstandingSale {
                sale_id: r.id,
                reference: r.reference,
                total_amount: r.total_amount,
            })
            .collect();

        let plan = allocate_payment(input.amount, &outstanding);

        // The settlement transition completed -> paid is bookkeeping
        // only; stock for these sales was already deducted when they
        // completed, so no deduction runs here.
        for settled in &plan.fully_settled {
            let updated = sqlx::query(
                "UPDATE sales SET status = 'paid', updated_at = NOW() \
                 WHERE id = $1 AND status = 'completed'",
            )
            .bind(settled.sale_id)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() != 1 {
                return Err(AppError::Consistency(format!(
                    "sale {} was already settled",
                    settled.reference
                )));
            }
        }

        let new_balance: Decimal =
            sqlx::query_scalar("SELECT current_balance FROM credit_accounts WHERE id = $1")
                .bind(account_id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;

        Ok(PaymentOutcome {
            transaction,
            account: AccountSummary {
                new_balance,
                available_credit: account.credit_limit - new_balance,
            },
            total_settled: plan.fully_settled.len(),
            fully_settled: plan.fully_settled,
            partially_settled: plan.partially_settled,
        })
    }

    /// Record a manual adjustment. The amount is signed and moves the
    /// balance directly; there is no settlement cascade.
    pub async fn add_adjustment(
        &self,
        account_id: Uuid,
        input: AddAdjustmentInput,
    ) -> AppResult<AdjustmentOutcome> {
        let mut tx = self.db.begin().await?;

        let account = Self::lock_account(&mut tx, account_id).await?;

        if account.current_balance + input.amount < Decimal::ZERO {
            return Err(AppError::Validation {
                field: "amount".to_string(),
                message: format!(
                    "Adjustment would make the balance negative (current: {} BIF)",
                    account.current_balance
                ),
                message_fr: format!(
                    "L'ajustement rendrait le solde négatif (solde actuel : {} FBu)",
                    account.current_balance
                ),
            });
        }

        let transaction = Self::insert_transaction(
            &mut tx,
            account_id,
            TransactionType::Adjustment,
            input.amount,
            None,
            None,
            input.notes.clone(),
        )
        .await?;

        let new_balance: Decimal =
            sqlx::query_scalar("SELECT current_balance FROM credit_accounts WHERE id = $1")
                .bind(account_id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;

        Ok(AdjustmentOutcome {
            transaction,
            new_balance,
        })
    }

    /// Recompute the balance from the ledger and compare it to the
    /// denormalized field. A mismatch is a consistency violation; the
    /// routine verifies, it never repairs.
    pub async fn reconcile_balance(&self, account_id: Uuid) -> AppResult<BalanceReconciliation> {
        let mut tx = self.db.begin().await?;

        let account = Self::lock_account(&mut tx, account_id).await?;

        let raw: Vec<(String, Decimal)> = sqlx::query_as(
            "SELECT transaction_type, amount FROM credit_transactions \
             WHERE account_id = $1 ORDER BY created_at ASC",
        )
        .bind(account_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut entries = Vec::with_capacity(raw.len());
        for (kind, amount) in &raw {
            let kind = TransactionType::parse(kind).ok_or_else(|| {
                AppError::Consistency(format!("unknown transaction type '{}'", kind))
            })?;
            entries.push((kind, *amount));
        }

        let ledger_balance = balance_from_ledger(entries);

        tx.commit().await?;

        if ledger_balance != account.current_balance {
            tracing::error!(
                account_id = %account_id,
                recorded = %account.current_balance,
                ledger = %ledger_balance,
                "credit account balance does not match its ledger"
            );
            return Err(AppError::Consistency(format!(
                "account {} balance {} does not match ledger sum {}",
                account_id, account.current_balance, ledger_balance
            )));
        }

        Ok(BalanceReconciliation {
            account_id,
            recorded_balance: account.current_balance,
            ledger_balance,
            entry_count: raw.len(),
        })
    }

    /// Create a credit account
    pub async fn create_account(&self, input: CreateAccountInput) -> AppResult<CreditAccount> {
        if input.customer_name.trim().is_empty() {
            return Err(AppError::Validation {
                field: "customer_name".to_string(),
                message: "Customer name is required".to_string(),
                message_fr: "Le nom du client est requis".to_string(),
            });
        }

        let credit_limit = input.credit_limit.unwrap_or(Decimal::ZERO);
        if credit_limit < Decimal::ZERO {
            return Err(AppError::Validation {
                field: "credit_limit".to_string(),
                message: "Credit limit cannot be negative".to_string(),
                message_fr: "La limite de crédit ne peut pas être négative".to_string(),
            });
        }

        if let Some(phone) = &input.phone {
            if let Err(msg) = validate_burundi_phone(phone) {
                return Err(AppError::Validation {
                    field: "phone".to_string(),
                    message: msg.to_string(),
                    message_fr: "Numéro de téléphone invalide".to_string(),
                });
            }
        }

        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "INSERT INTO credit_accounts (customer_name, phone, email, credit_limit, notes) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(input.customer_name.trim())
        .bind(&input.phone)
        .bind(&input.email)
        .bind(credit_limit)
        .bind(&input.notes)
        .fetch_one(&self.db)
        .await?;

        row.try_into()
    }

    /// Get an account by ID
    pub async fn get_account(&self, account_id: Uuid) -> AppResult<CreditAccount> {
        sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM credit_accounts WHERE id = $1"
        ))
        .bind(account_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Credit account".to_string()))?
        .try_into()
    }

    /// List accounts with optional filters
    pub async fn list_accounts(&self, filter: AccountFilter) -> AppResult<Vec<CreditAccount>> {
        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM credit_accounts \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::text IS NULL OR customer_name ILIKE '%' || $2 || '%' \
                    OR phone ILIKE '%' || $2 || '%' OR email ILIKE '%' || $2 || '%') \
               AND (NOT $3 OR current_balance > 0) \
             ORDER BY created_at DESC"
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(&filter.search)
        .bind(filter.has_debt.unwrap_or(false))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Update an account
    pub async fn update_account(
        &self,
        account_id: Uuid,
        input: UpdateAccountInput,
    ) -> AppResult<CreditAccount> {
        let existing = self.get_account(account_id).await?;

        let customer_name = input.customer_name.unwrap_or(existing.customer_name);
        let phone = input.phone.or(existing.phone);
        let email = input.email.or(existing.email);
        let credit_limit = input.credit_limit.unwrap_or(existing.credit_limit);
        let status = input.status.unwrap_or(existing.status);
        let notes = input.notes.or(existing.notes);

        if credit_limit < Decimal::ZERO {
            return Err(AppError::Validation {
                field: "credit_limit".to_string(),
                message: "Credit limit cannot be negative".to_string(),
                message_fr: "La limite de crédit ne peut pas être négative".to_string(),
            });
        }

        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "UPDATE credit_accounts \
             SET customer_name = $1, phone = $2, email = $3, credit_limit = $4, \
                 status = $5, notes = $6, updated_at = NOW() \
             WHERE id = $7 \
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(&customer_name)
        .bind(&phone)
        .bind(&email)
        .bind(credit_limit)
        .bind(status.as_str())
        .bind(&notes)
        .bind(account_id)
        .fetch_one(&self.db)
        .await?;

        row.try_into()
    }

    /// Close an account (soft; accounts are never hard-deleted)
    pub async fn close_account(&self, account_id: Uuid) -> AppResult<CreditAccount> {
        let mut tx = self.db.begin().await?;

        let account = Self::lock_account(&mut tx, account_id).await?;

        if account.current_balance > Decimal::ZERO {
            return Err(AppError::Conflict {
                resource: "credit_account".to_string(),
                message: format!(
                    "Cannot close an account with outstanding debt ({} BIF)",
                    account.current_balance
                ),
                message_fr: format!(
                    "Impossible de fermer un compte avec une dette en cours ({} FBu)",
                    account.current_balance
                ),
            });
        }

        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "UPDATE credit_accounts SET status = 'closed', updated_at = NOW() \
             WHERE id = $1 RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(account_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        row.try_into()
    }

    /// List ledger entries with optional filters
    pub async fn list_transactions(
        &self,
        filter: TransactionFilter,
    ) -> AppResult<Vec<CreditTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM credit_transactions \
             WHERE ($1::uuid IS NULL OR account_id = $1) \
               AND ($2::text IS NULL OR transaction_type = $2) \
             ORDER BY created_at DESC"
        ))
        .bind(filter.account)
        .bind(filter.transaction_type.map(|t| t.as_str()))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Global credit statistics for the dashboard
    pub async fn statistics(&self) -> AppResult<CreditStatistics> {
        let total_accounts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM credit_accounts")
            .fetch_one(&self.db)
            .await?;

        let active_accounts: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM credit_accounts WHERE status = 'active'")
                .fetch_one(&self.db)
                .await?;

        let total_debt: Decimal =
            sqlx::query_scalar("SELECT COALESCE(SUM(current_balance), 0) FROM credit_accounts")
                .fetch_one(&self.db)
                .await?;

        let accounts_with_debt: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM credit_accounts \
             WHERE status = 'active' AND current_balance > 0",
        )
        .fetch_one(&self.db)
        .await?;

        let payments_this_month: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM credit_transactions \
             WHERE transaction_type = 'payment' AND created_at >= date_trunc('month', NOW())",
        )
        .fetch_one(&self.db)
        .await?;

        let top_debtors = sqlx::query_as::<_, DebtorSummary>(
            "SELECT id, customer_name, current_balance, phone FROM credit_accounts \
             WHERE current_balance > 0 ORDER BY current_balance DESC LIMIT 5",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(CreditStatistics {
            total_accounts,
            active_accounts,
            total_debt,
            accounts_with_debt,
            payments_this_month,
            top_debtors,
        })
    }
}
