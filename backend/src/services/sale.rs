//! Sale service: creation, status transitions and cancellation
//!
//! This is the orchestrator that makes the event chain visible in one
//! place: completing a credit sale records the debt and deducts stock,
//! the paid transition deducts stock (if not already done) and releases
//! the table, cancellation reverses whatever was deducted and releases
//! the table. Each flow is one database transaction; stock alerts are
//! emitted only after it commits.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use shared::{
    validate_quantity, AccountStatus, CreditTransaction, IngredientDeduction, PaginatedResponse,
    Pagination, PaginationMeta, PaymentMethod, Sale, SaleItem, SaleStatus, StockMovement,
    TransactionType,
};

use crate::error::{AppError, AppResult};
use crate::services::credit::CreditService;
use crate::services::inventory::{InventoryService, RestoredStock};
use crate::services::kitchen::KitchenService;
use crate::services::notification::NotificationService;
use crate::services::table::TableService;

/// Service for sales
#[derive(Clone)]
pub struct SaleService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct SaleRow {
    id: Uuid,
    reference: String,
    table_id: Option<Uuid>,
    customer_name: Option<String>,
    status: String,
    payment_method: String,
    credit_account_id: Option<Uuid>,
    subtotal: Decimal,
    tax_amount: Decimal,
    total_amount: Decimal,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SaleRow> for Sale {
    type Error = AppError;

    fn try_from(row: SaleRow) -> Result<Self, Self::Error> {
        let status = SaleStatus::parse(&row.status)
            .ok_or_else(|| AppError::Consistency(format!("unknown sale status '{}'", row.status)))?;
        let payment_method = PaymentMethod::parse(&row.payment_method).ok_or_else(|| {
            AppError::Consistency(format!("unknown payment method '{}'", row.payment_method))
        })?;
        Ok(Sale {
            id: row.id,
            reference: row.reference,
            table_id: row.table_id,
            customer_name: row.customer_name,
            status,
            payment_method,
            credit_account_id: row.credit_account_id,
            subtotal: row.subtotal,
            tax_amount: row.tax_amount,
            total_amount: row.total_amount,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SaleItemRow {
    id: Uuid,
    sale_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    unit_price: Decimal,
    total_price: Decimal,
    notes: Option<String>,
}

impl From<SaleItemRow> for SaleItem {
    fn from(row: SaleItemRow) -> Self {
        SaleItem {
            id: row.id,
            sale_id: row.sale_id,
            product_id: row.product_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
            total_price: row.total_price,
            notes: row.notes,
        }
    }
}

#[derive(Debug, FromRow)]
struct ProductForSaleRow {
    name: String,
    selling_price: Decimal,
    current_stock: i32,
    is_active: bool,
    is_available: bool,
}

/// One line of a sale being created
#[derive(Debug, Deserialize)]
pub struct CreateSaleItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Option<Decimal>,
    pub notes: Option<String>,
}

/// Input for creating a sale
#[derive(Debug, Deserialize)]
pub struct CreateSaleInput {
    pub table_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub payment_method: PaymentMethod,
    pub credit_account_id: Option<Uuid>,
    pub notes: Option<String>,
    pub items: Vec<CreateSaleItemInput>,
}

/// Input for a status transition
#[derive(Debug, Deserialize)]
pub struct UpdateStatusInput {
    pub status: SaleStatus,
}

/// Filters for listing sales
#[derive(Debug, Default, Deserialize)]
pub struct SaleFilter {
    pub status: Option<SaleStatus>,
    pub table: Option<Uuid>,
    pub account: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// A sale with its items
#[derive(Debug, Serialize)]
pub struct SaleWithItems {
    #[serde(flatten)]
    pub sale: Sale,
    pub items: Vec<SaleItem>,
}

/// Outcome of a status transition, including everything the deduction
/// engine did
#[derive(Debug, Serialize)]
pub struct StatusUpdateOutcome {
    pub sale: Sale,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debt_recorded: Option<CreditTransaction>,
    pub stock_movements: Vec<StockMovement>,
    pub ingredient_deductions: Vec<IngredientDeduction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored: Option<RestoredStock>,
}

const SALE_COLUMNS: &str = "id, reference, table_id, customer_name, status, payment_method, \
                            credit_account_id, subtotal, tax_amount, total_amount, notes, \
                            created_at, updated_at";

const SALE_ITEM_COLUMNS: &str =
    "id, sale_id, product_id, quantity, unit_price, total_price, notes";

impl SaleService {
    /// Create a new SaleService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    fn generate_reference() -> String {
        let id = Uuid::new_v4().simple().to_string();
        format!("SALE-{}", id[..8].to_uppercase())
    }

    /// Create a sale with its items.
    ///
    /// Availability is checked here (finished stock or preparable
    /// recipe) but nothing is deducted; deduction happens when the sale
    /// is paid, or completed for credit sales.
    pub async fn create_sale(&self, input: CreateSaleInput) -> AppResult<SaleWithItems> {
        if input.items.is_empty() {
            return Err(AppError::Validation {
                field: "items".to_string(),
                message: "A sale needs at least one item".to_string(),
                message_fr: "Une vente nécessite au moins un article".to_string(),
            });
        }

        for item in &input.items {
            if let Err(msg) = validate_quantity(item.quantity) {
                return Err(AppError::Validation {
                    field: "quantity".to_string(),
                    message: msg.to_string(),
                    message_fr: "La quantité doit être positive".to_string(),
                });
            }
        }

        if input.payment_method == PaymentMethod::Credit && input.credit_account_id.is_none() {
            return Err(AppError::Validation {
                field: "credit_account_id".to_string(),
                message: "A credit sale requires a credit account".to_string(),
                message_fr: "Une vente à crédit nécessite un compte crédit".to_string(),
            });
        }

        let mut tx = self.db.begin().await?;

        if let Some(account_id) = input.credit_account_id {
            let status: String =
                sqlx::query_scalar("SELECT status FROM credit_accounts WHERE id = $1")
                    .bind(account_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Credit account".to_string()))?;
            if status != AccountStatus::Active.as_str() {
                return Err(AppError::Conflict {
                    resource: "credit_account".to_string(),
                    message: "Credit account is not active".to_string(),
                    message_fr: "Le compte crédit n'est pas actif".to_string(),
                });
            }
        }

        // Price the items and check availability without deducting.
        let mut priced = Vec::with_capacity(input.items.len());
        let mut subtotal = Decimal::ZERO;

        for item in &input.items {
            let product = sqlx::query_as::<_, ProductForSaleRow>(
                "SELECT name, selling_price, current_stock, is_active, is_available \
                 FROM products WHERE id = $1 FOR UPDATE",
            )
            .bind(item.product_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

            if !product.is_active || !product.is_available {
                return Err(AppError::Conflict {
                    resource: "product".to_string(),
                    message: format!("{} is not available for sale", product.name),
                    message_fr: format!("{} n'est pas disponible à la vente", product.name),
                });
            }

            match KitchenService::availability_for_product(&mut tx, item.product_id, item.quantity)
                .await?
            {
                Some(report) if !report.can_prepare => {
                    let names: Vec<&str> = report
                        .missing_ingredients
                        .iter()
                        .map(|m| m.name.as_str())
                        .collect();
                    return Err(AppError::InsufficientStock(format!(
                        "{}: missing {}",
                        product.name,
                        names.join(", ")
                    )));
                }
                Some(_) => {}
                None => {
                    if product.current_stock < item.quantity {
                        return Err(AppError::InsufficientStock(format!(
                            "{} (available: {})",
                            product.name, product.current_stock
                        )));
                    }
                }
            }

            let unit_price = item.unit_price.unwrap_or(product.selling_price);
            if unit_price < Decimal::ZERO {
                return Err(AppError::ValidationError(
                    "Unit price cannot be negative".to_string(),
                ));
            }

            let total_price = unit_price * Decimal::from(item.quantity);
            subtotal += total_price;
            priced.push((item, unit_price, total_price));
        }

        let tax_amount = Decimal::ZERO;
        let total_amount = subtotal + tax_amount;
        let reference = Self::generate_reference();

        let sale: Sale = sqlx::query_as::<_, SaleRow>(&format!(
            "INSERT INTO sales \
             (reference, table_id, customer_name, status, payment_method, credit_account_id, \
              subtotal, tax_amount, total_amount, notes) \
             VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7, $8, $9) \
             RETURNING {SALE_COLUMNS}"
        ))
        .bind(&reference)
        .bind(input.table_id)
        .bind(&input.customer_name)
        .bind(input.payment_method.as_str())
        .bind(input.credit_account_id)
        .bind(subtotal)
        .bind(tax_amount)
        .bind(total_amount)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        let mut items = Vec::with_capacity(priced.len());
        for (item, unit_price, total_price) in priced {
            let row = sqlx::query_as::<_, SaleItemRow>(&format!(
                "INSERT INTO sale_items (sale_id, product_id, quantity, unit_price, total_price, notes) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 RETURNING {SALE_ITEM_COLUMNS}"
            ))
            .bind(sale.id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(unit_price)
            .bind(total_price)
            .bind(&item.notes)
            .fetch_one(&mut *tx)
            .await?;
            items.push(row.into());
        }

        if let Some(table_id) = input.table_id {
            TableService::occupy(&mut tx, table_id, input.customer_name.as_deref()).await?;
        }

        tx.commit().await?;

        Ok(SaleWithItems { sale, items })
    }

    async fn fetch_items(conn: &mut PgConnection, sale_id: Uuid) -> AppResult<Vec<SaleItem>> {
        let rows = sqlx::query_as::<_, SaleItemRow>(&format!(
            "SELECT {SALE_ITEM_COLUMNS} FROM sale_items \
             WHERE sale_id = $1 ORDER BY created_at ASC"
        ))
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Get a sale with its items
    pub async fn get_sale(&self, sale_id: Uuid) -> AppResult<SaleWithItems> {
        let sale: Sale = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE id = $1"
        ))
        .bind(sale_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Sale".to_string()))?
        .try_into()?;

        let mut conn = self.db.acquire().await?;
        let items = Self::fetch_items(&mut conn, sale_id).await?;

        Ok(SaleWithItems { sale, items })
    }

    /// List sales with optional filters, paginated
    pub async fn list_sales(&self, filter: SaleFilter) -> AppResult<PaginatedResponse<Sale>> {
        let pagination = Pagination {
            page: filter.page.unwrap_or(1).max(1),
            per_page: filter.per_page.unwrap_or(20).clamp(1, 100),
        };
        let offset = (pagination.page as i64 - 1) * pagination.per_page as i64;

        let total_items: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sales \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::uuid IS NULL OR table_id = $2) \
               AND ($3::uuid IS NULL OR credit_account_id = $3)",
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.table)
        .bind(filter.account)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::uuid IS NULL OR table_id = $2) \
               AND ($3::uuid IS NULL OR credit_account_id = $3) \
             ORDER BY created_at DESC \
             LIMIT $4 OFFSET $5"
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.table)
        .bind(filter.account)
        .bind(pagination.per_page as i64)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        let data: Vec<Sale> = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<AppResult<_>>()?;

        let total_items = total_items.max(0) as u64;
        let per_page = pagination.per_page as u64;
        let total_pages = ((total_items + per_page - 1) / per_page) as u32;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta {
                page: pagination.page,
                per_page: pagination.per_page,
                total_items,
                total_pages,
            },
        })
    }

    /// Move a sale through its status machine.
    ///
    /// Illegal transitions, including anything out of `paid` or
    /// `cancelled`, fail hard; nothing about a terminal sale can
    /// change.
    pub async fn update_status(
        &self,
        sale_id: Uuid,
        new_status: SaleStatus,
    ) -> AppResult<StatusUpdateOutcome> {
        let mut tx = self.db.begin().await?;

        let sale: Sale = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE id = $1 FOR UPDATE"
        ))
        .bind(sale_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Sale".to_string()))?
        .try_into()?;

        if !sale.status.can_transition_to(new_status) {
            return Err(AppError::InvalidStateTransition(format!(
                "a {} sale cannot become {}",
                sale.status, new_status
            )));
        }

        let mut debt_recorded = None;
        let mut stock_movements = Vec::new();
        let mut ingredient_deductions = Vec::new();
        let mut restored = None;
        let mut alerts = Vec::new();

        match new_status {
            SaleStatus::Completed if sale.is_credit_sale() => {
                // The goods leave the bar now; record the debt and
                // deduct stock so settlement later is bookkeeping only.
                let account_id = sale.credit_account_id.ok_or_else(|| {
                    AppError::Consistency(format!(
                        "credit sale {} has no credit account",
                        sale.reference
                    ))
                })?;
                debt_recorded = Some(
                    CreditService::record_debt(
                        &mut tx,
                        account_id,
                        sale_id,
                        sale.total_amount,
                        &sale.reference,
                    )
                    .await?,
                );

                if !InventoryService::movements_exist_for_sale(&mut tx, sale_id).await? {
                    let deduction =
                        InventoryService::deduct_for_sale(&mut tx, sale_id, &sale.reference)
                            .await?;
                    stock_movements = deduction.stock_movements;
                    ingredient_deductions = deduction.ingredient_deductions;
                    alerts = deduction.alerts;
                }

                // The customer leaves with the tab on their account;
                // settlement later is bookkeeping and never touches
                // tables.
                if let Some(table_id) = sale.table_id {
                    TableService::release(&mut tx, table_id).await?;
                }
            }
            SaleStatus::Paid => {
                // Idempotent: the movement log decides whether the
                // deduction engine already ran for this sale.
                if !InventoryService::movements_exist_for_sale(&mut tx, sale_id).await? {
                    let deduction =
                        InventoryService::deduct_for_sale(&mut tx, sale_id, &sale.reference)
                            .await?;
                    stock_movements = deduction.stock_movements;
                    ingredient_deductions = deduction.ingredient_deductions;
                    alerts = deduction.alerts;
                }

                if let Some(table_id) = sale.table_id {
                    TableService::release(&mut tx, table_id).await?;
                }
            }
            SaleStatus::Cancelled => {
                restored = Some(
                    InventoryService::restore_for_sale(&mut tx, sale_id, &sale.reference).await?,
                );

                Self::reverse_debt_if_recorded(&mut tx, &sale).await?;

                if let Some(table_id) = sale.table_id {
                    TableService::release(&mut tx, table_id).await?;
                }
            }
            _ => {}
        }

        let sale: Sale = sqlx::query_as::<_, SaleRow>(&format!(
            "UPDATE sales SET status = $1, updated_at = NOW() \
             WHERE id = $2 RETURNING {SALE_COLUMNS}"
        ))
        .bind(new_status.as_str())
        .bind(sale_id)
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        tx.commit().await?;

        if !alerts.is_empty() {
            NotificationService::new(self.db.clone())
                .record_stock_alerts(&alerts)
                .await;
        }

        Ok(StatusUpdateOutcome {
            sale,
            debt_recorded,
            stock_movements,
            ingredient_deductions,
            restored,
        })
    }

    /// Mark a sale paid (the deduction trigger for till sales)
    pub async fn mark_as_paid(&self, sale_id: Uuid) -> AppResult<StatusUpdateOutcome> {
        self.update_status(sale_id, SaleStatus::Paid).await
    }

    /// Cancel a sale, reversing any deducted stock
    pub async fn cancel_sale(&self, sale_id: Uuid) -> AppResult<StatusUpdateOutcome> {
        self.update_status(sale_id, SaleStatus::Cancelled).await
    }

    /// Reverse the debt ledger entry of a cancelled credit sale, if one
    /// was recorded when it completed.
    async fn reverse_debt_if_recorded(conn: &mut PgConnection, sale: &Sale) -> AppResult<()> {
        let Some(account_id) = sale.credit_account_id else {
            return Ok(());
        };

        let debt_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM credit_transactions \
             WHERE sale_id = $1 AND transaction_type = 'debt')",
        )
        .bind(sale.id)
        .fetch_one(&mut *conn)
        .await?;

        if !debt_exists {
            return Ok(());
        }

        let balance: Decimal = sqlx::query_scalar(
            "SELECT current_balance FROM credit_accounts WHERE id = $1 FOR UPDATE",
        )
        .bind(account_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Credit account".to_string()))?;

        // A payment may already have been applied against this debt; in
        // that case the books need a manual refund, not a silent
        // negative balance.
        if balance < sale.total_amount {
            return Err(AppError::Conflict {
                resource: "credit_account".to_string(),
                message: format!(
                    "Cancelling {} would overdraw the credit account; refund the payment manually",
                    sale.reference
                ),
                message_fr: format!(
                    "L'annulation de {} rendrait le solde négatif ; remboursez le paiement manuellement",
                    sale.reference
                ),
            });
        }

        CreditService::insert_transaction(
            conn,
            account_id,
            TransactionType::Adjustment,
            -sale.total_amount,
            None,
            Some(sale.id),
            Some(format!("Annulation de la vente {}", sale.reference)),
        )
        .await?;

        Ok(())
    }
}
