//! Stock movement service: audit-logged mutations and the sale
//! deduction walk
//!
//! `record_stock_movement` and `record_ingredient_movement` are the
//! only paths that mutate stock; both lock the owning row, compute the
//! before/after pair and append the movement in one step, so the
//! audit invariant (current stock equals the last movement's
//! `stock_after`) holds by construction. `deduct_for_sale` runs inside
//! the sale service's transaction: any failing step, including an
//! undefined unit conversion, rolls back every deduction for the sale.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use chrono::{DateTime, Utc};
use shared::{
    replay_movements, required_quantity, IngredientDeduction, IngredientMovement, MovementReason,
    MovementType, StockMovement, Unit,
};

use crate::error::{AppError, AppResult};
use crate::services::notification::{AlertEntity, AlertLevel, StockAlertDraft};

/// Service for stock movements and restocking
#[derive(Clone)]
pub struct InventoryService {
    db: PgPool,
}

const STOCK_MOVEMENT_COLUMNS: &str = "id, product_id, movement_type, reason, quantity, \
                                      stock_before, stock_after, sale_id, reference, notes, created_at";

const INGREDIENT_MOVEMENT_COLUMNS: &str = "id, ingredient_id, movement_type, reason, quantity, \
                                           stock_before, stock_after, sale_id, reference, notes, created_at";

#[derive(Debug, FromRow)]
struct StockMovementRow {
    id: Uuid,
    product_id: Uuid,
    movement_type: String,
    reason: String,
    quantity: i32,
    stock_before: i32,
    stock_after: i32,
    sale_id: Option<Uuid>,
    reference: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<StockMovementRow> for StockMovement {
    type Error = AppError;

    fn try_from(row: StockMovementRow) -> Result<Self, Self::Error> {
        Ok(StockMovement {
            id: row.id,
            product_id: row.product_id,
            movement_type: parse_movement_type(&row.movement_type)?,
            reason: parse_reason(&row.reason)?,
            quantity: row.quantity,
            stock_before: row.stock_before,
            stock_after: row.stock_after,
            sale_id: row.sale_id,
            reference: row.reference,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct IngredientMovementRow {
    id: Uuid,
    ingredient_id: Uuid,
    movement_type: String,
    reason: String,
    quantity: Decimal,
    stock_before: Decimal,
    stock_after: Decimal,
    sale_id: Option<Uuid>,
    reference: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<IngredientMovementRow> for IngredientMovement {
    type Error = AppError;

    fn try_from(row: IngredientMovementRow) -> Result<Self, Self::Error> {
        Ok(IngredientMovement {
            id: row.id,
            ingredient_id: row.ingredient_id,
            movement_type: parse_movement_type(&row.movement_type)?,
            reason: parse_reason(&row.reason)?,
            quantity: row.quantity,
            stock_before: row.stock_before,
            stock_after: row.stock_after,
            sale_id: row.sale_id,
            reference: row.reference,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

fn parse_movement_type(s: &str) -> AppResult<MovementType> {
    MovementType::parse(s)
        .ok_or_else(|| AppError::Consistency(format!("unknown movement type '{}'", s)))
}

fn parse_reason(s: &str) -> AppResult<MovementReason> {
    MovementReason::parse(s)
        .ok_or_else(|| AppError::Consistency(format!("unknown movement reason '{}'", s)))
}

/// Snapshot of a product after a movement, used for alert decisions
#[derive(Debug)]
pub(crate) struct ProductSnapshot {
    pub name: String,
    pub minimum_stock: i32,
    pub stock_after: i32,
}

/// Snapshot of an ingredient after a movement
#[derive(Debug)]
pub(crate) struct IngredientSnapshot {
    pub name: String,
    pub unit: Unit,
    pub alert_threshold: Decimal,
    pub stock_after: Decimal,
}

#[derive(Debug, FromRow)]
struct ProductStockRow {
    name: String,
    current_stock: i32,
    minimum_stock: i32,
}

#[derive(Debug, FromRow)]
struct IngredientStockRow {
    name: String,
    quantity_remaining: Decimal,
    unit: String,
    alert_threshold: Decimal,
}

#[derive(Debug, FromRow)]
struct RecipeLineRow {
    ingredient_id: Uuid,
    quantity_per_dish: Decimal,
    unit: String,
    native_unit: String,
}

/// Everything deducted for one sale, plus the alerts to emit after the
/// transaction commits
#[derive(Debug, Default)]
pub struct SaleDeduction {
    pub stock_movements: Vec<StockMovement>,
    pub ingredient_deductions: Vec<IngredientDeduction>,
    pub alerts: Vec<StockAlertDraft>,
}

/// Compensating movements created when a sale is cancelled
#[derive(Debug, Default, Serialize)]
pub struct RestoredStock {
    pub stock_movements: Vec<StockMovement>,
    pub ingredient_movements: Vec<IngredientMovement>,
}

/// Input for receiving finished-goods stock
#[derive(Debug, Deserialize)]
pub struct RestockProductInput {
    pub quantity: i32,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

/// Input for receiving ingredient stock
#[derive(Debug, Deserialize)]
pub struct RestockIngredientInput {
    pub quantity: Decimal,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

/// Input for a manual finished-goods stock correction (signed)
#[derive(Debug, Deserialize)]
pub struct AdjustProductInput {
    pub quantity: i32,
    pub notes: Option<String>,
}

/// Input for a manual ingredient stock correction (signed)
#[derive(Debug, Deserialize)]
pub struct AdjustIngredientInput {
    pub quantity: Decimal,
    pub notes: Option<String>,
}

/// Movement-log verification report
#[derive(Debug, Serialize)]
pub struct MovementAudit {
    pub entity_id: Uuid,
    pub movement_count: usize,
    pub baseline: Decimal,
    pub expected_stock: Decimal,
    pub recorded_stock: Decimal,
}

impl InventoryService {
    /// Create a new InventoryService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Apply a finished-goods movement: lock the product, compute the
    /// before/after pair and append the audit row.
    ///
    /// Outgoing quantities are floored at zero stock; the movement
    /// records the effective quantity so `stock_after = stock_before -
    /// quantity` stays true.
    pub(crate) async fn record_stock_movement(
        conn: &mut PgConnection,
        product_id: Uuid,
        movement_type: MovementType,
        reason: MovementReason,
        quantity: i32,
        sale_id: Option<Uuid>,
        reference: Option<String>,
        notes: Option<String>,
    ) -> AppResult<(StockMovement, ProductSnapshot)> {
        let product = sqlx::query_as::<_, ProductStockRow>(
            "SELECT name, current_stock, minimum_stock FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        let before = product.current_stock;
        let (effective, after) = match movement_type {
            MovementType::In => {
                if quantity <= 0 {
                    return Err(AppError::ValidationError(
                        "Movement quantity must be positive".to_string(),
                    ));
                }
                (quantity, before + quantity)
            }
            MovementType::Out => {
                if quantity <= 0 {
                    return Err(AppError::ValidationError(
                        "Movement quantity must be positive".to_string(),
                    ));
                }
                let effective = quantity.min(before);
                (effective, before - effective)
            }
            MovementType::Adjustment => {
                let after = before + quantity;
                if after < 0 {
                    return Err(AppError::ValidationError(format!(
                        "Adjustment would make {} stock negative",
                        product.name
                    )));
                }
                (quantity, after)
            }
        };

        sqlx::query("UPDATE products SET current_stock = $1, updated_at = NOW() WHERE id = $2")
            .bind(after)
            .bind(product_id)
            .execute(&mut *conn)
            .await?;

        let row = sqlx::query_as::<_, StockMovementRow>(&format!(
            "INSERT INTO stock_movements \
             (product_id, movement_type, reason, quantity, stock_before, stock_after, \
              sale_id, reference, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {STOCK_MOVEMENT_COLUMNS}"
        ))
        .bind(product_id)
        .bind(movement_type.as_str())
        .bind(reason.as_str())
        .bind(effective)
        .bind(before)
        .bind(after)
        .bind(sale_id)
        .bind(&reference)
        .bind(&notes)
        .fetch_one(&mut *conn)
        .await?;

        Ok((
            row.try_into()?,
            ProductSnapshot {
                name: product.name,
                minimum_stock: product.minimum_stock,
                stock_after: after,
            },
        ))
    }

    /// Apply an ingredient movement: lock the ingredient, compute the
    /// before/after pair and append the audit row.
    ///
    /// Outgoing quantities are not floored: negative remaining stock is
    /// the out-of-stock overdraft signal.
    pub(crate) async fn record_ingredient_movement(
        conn: &mut PgConnection,
        ingredient_id: Uuid,
        movement_type: MovementType,
        reason: MovementReason,
        quantity: Decimal,
        sale_id: Option<Uuid>,
        reference: Option<String>,
        notes: Option<String>,
    ) -> AppResult<(IngredientMovement, IngredientSnapshot)> {
        let ingredient = sqlx::query_as::<_, IngredientStockRow>(
            "SELECT name, quantity_remaining, unit, alert_threshold \
             FROM ingredients WHERE id = $1 FOR UPDATE",
        )
        .bind(ingredient_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Ingredient".to_string()))?;

        if quantity <= Decimal::ZERO && movement_type != MovementType::Adjustment {
            return Err(AppError::ValidationError(
                "Movement quantity must be positive".to_string(),
            ));
        }

        let unit = Unit::parse(&ingredient.unit).ok_or_else(|| {
            AppError::Consistency(format!("unknown ingredient unit '{}'", ingredient.unit))
        })?;

        let before = ingredient.quantity_remaining;
        let after = movement_type.apply(before, quantity);

        sqlx::query(
            "UPDATE ingredients SET quantity_remaining = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(after)
        .bind(ingredient_id)
        .execute(&mut *conn)
        .await?;

        let row = sqlx::query_as::<_, IngredientMovementRow>(&format!(
            "INSERT INTO ingredient_movements \
             (ingredient_id, movement_type, reason, quantity, stock_before, stock_after, \
              sale_id, reference, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {INGREDIENT_MOVEMENT_COLUMNS}"
        ))
        .bind(ingredient_id)
        .bind(movement_type.as_str())
        .bind(reason.as_str())
        .bind(quantity)
        .bind(before)
        .bind(after)
        .bind(sale_id)
        .bind(&reference)
        .bind(&notes)
        .fetch_one(&mut *conn)
        .await?;

        Ok((
            row.try_into()?,
            IngredientSnapshot {
                name: ingredient.name,
                unit,
                alert_threshold: ingredient.alert_threshold,
                stock_after: after,
            },
        ))
    }

    /// Whether the deduction engine already ran for a sale.
    ///
    /// The movement log is the authoritative record, so re-triggering
    /// the paid transition can never deduct twice.
    pub(crate) async fn movements_exist_for_sale(
        conn: &mut PgConnection,
        sale_id: Uuid,
    ) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM stock_movements \
                           WHERE sale_id = $1 AND reason = 'sale') \
                 OR EXISTS(SELECT 1 FROM ingredient_movements \
                           WHERE sale_id = $1 AND reason = 'sale')",
        )
        .bind(sale_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(exists)
    }

    /// Deduct stock for every item of a sale.
    ///
    /// Products without a recipe lose finished-goods stock; products
    /// with a recipe cascade into their ingredients with unit
    /// conversion. Runs inside the caller's transaction: the first
    /// failing step rolls back all deductions for the sale.
    pub(crate) async fn deduct_for_sale(
        conn: &mut PgConnection,
        sale_id: Uuid,
        reference: &str,
    ) -> AppResult<SaleDeduction> {
        let items: Vec<(Uuid, i32)> = sqlx::query_as(
            "SELECT product_id, quantity FROM sale_items \
             WHERE sale_id = $1 ORDER BY created_at ASC",
        )
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut deduction = SaleDeduction::default();

        for (product_id, quantity) in items {
            let recipe_id: Option<Uuid> = sqlx::query_scalar(
                "SELECT id FROM recipes WHERE product_id = $1 AND is_active = TRUE",
            )
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await?;

            match recipe_id {
                None => {
                    let (movement, product) = Self::record_stock_movement(
                        conn,
                        product_id,
                        MovementType::Out,
                        MovementReason::Sale,
                        quantity,
                        Some(sale_id),
                        Some(reference.to_string()),
                        None,
                    )
                    .await?;

                    if product.stock_after == 0 {
                        deduction.alerts.push(StockAlertDraft {
                            entity_type: AlertEntity::Product,
                            entity_id: product_id,
                            name: product.name,
                            alert_type: AlertLevel::OutOfStock,
                            quantity: Decimal::from(product.stock_after),
                            unit: None,
                        });
                    } else if product.stock_after <= product.minimum_stock {
                        deduction.alerts.push(StockAlertDraft {
                            entity_type: AlertEntity::Product,
                            entity_id: product_id,
                            name: product.name,
                            alert_type: AlertLevel::LowStock,
                            quantity: Decimal::from(product.stock_after),
                            unit: None,
                        });
                    }

                    deduction.stock_movements.push(movement);
                }
                Some(recipe_id) => {
                    let lines = sqlx::query_as::<_, RecipeLineRow>(
                        "SELECT ri.ingredient_id, ri.quantity_per_dish, ri.unit, \
                                i.unit AS native_unit \
                         FROM recipe_ingredients ri \
                         JOIN ingredients i ON i.id = ri.ingredient_id \
                         WHERE ri.recipe_id = $1 \
                         ORDER BY ri.created_at ASC",
                    )
                    .bind(recipe_id)
                    .fetch_all(&mut *conn)
                    .await?;

                    for line in lines {
                        let line_unit = Unit::parse(&line.unit).ok_or_else(|| {
                            AppError::Consistency(format!(
                                "unknown recipe line unit '{}'",
                                line.unit
                            ))
                        })?;
                        let native_unit = Unit::parse(&line.native_unit).ok_or_else(|| {
                            AppError::Consistency(format!(
                                "unknown ingredient unit '{}'",
                                line.native_unit
                            ))
                        })?;

                        let total_used = required_quantity(
                            line.quantity_per_dish,
                            line_unit,
                            native_unit,
                            quantity,
                        )?;

                        let (_, ingredient) = Self::record_ingredient_movement(
                            conn,
                            line.ingredient_id,
                            MovementType::Out,
                            MovementReason::Sale,
                            total_used,
                            Some(sale_id),
                            Some(reference.to_string()),
                            None,
                        )
                        .await?;

                        let out_of_stock = ingredient.stock_after <= Decimal::ZERO;
                        let low_stock =
                            !out_of_stock && ingredient.stock_after <= ingredient.alert_threshold;

                        if out_of_stock {
                            deduction.alerts.push(StockAlertDraft {
                                entity_type: AlertEntity::Ingredient,
                                entity_id: line.ingredient_id,
                                name: ingredient.name.clone(),
                                alert_type: AlertLevel::OutOfStock,
                                quantity: ingredient.stock_after,
                                unit: Some(ingredient.unit),
                            });
                        } else if low_stock {
                            deduction.alerts.push(StockAlertDraft {
                                entity_type: AlertEntity::Ingredient,
                                entity_id: line.ingredient_id,
                                name: ingredient.name.clone(),
                                alert_type: AlertLevel::LowStock,
                                quantity: ingredient.stock_after,
                                unit: Some(ingredient.unit),
                            });
                        }

                        deduction.ingredient_deductions.push(IngredientDeduction {
                            ingredient_id: line.ingredient_id,
                            ingredient_name: ingredient.name,
                            quantity_deducted: total_used,
                            unit: native_unit,
                            stock_after: ingredient.stock_after,
                            low_stock,
                            out_of_stock,
                        });
                    }
                }
            }
        }

        Ok(deduction)
    }

    /// Reverse every deduction recorded for a sale with compensating
    /// return movements. Used by cancellation; restores finished goods
    /// and ingredients alike.
    pub(crate) async fn restore_for_sale(
        conn: &mut PgConnection,
        sale_id: Uuid,
        reference: &str,
    ) -> AppResult<RestoredStock> {
        let mut restored = RestoredStock::default();

        let product_totals: Vec<(Uuid, i32)> = sqlx::query_as(
            "SELECT product_id, COALESCE(SUM(quantity), 0)::INT \
             FROM stock_movements \
             WHERE sale_id = $1 AND movement_type = 'out' AND reason = 'sale' \
             GROUP BY product_id",
        )
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;

        for (product_id, total) in product_totals {
            if total <= 0 {
                continue;
            }
            let (movement, _) = Self::record_stock_movement(
                conn,
                product_id,
                MovementType::In,
                MovementReason::Return,
                total,
                Some(sale_id),
                Some(reference.to_string()),
                Some("Annulation de la vente".to_string()),
            )
            .await?;
            restored.stock_movements.push(movement);
        }

        let ingredient_totals: Vec<(Uuid, Decimal)> = sqlx::query_as(
            "SELECT ingredient_id, COALESCE(SUM(quantity), 0) \
             FROM ingredient_movements \
             WHERE sale_id = $1 AND movement_type = 'out' AND reason = 'sale' \
             GROUP BY ingredient_id",
        )
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;

        for (ingredient_id, total) in ingredient_totals {
            if total <= Decimal::ZERO {
                continue;
            }
            let (movement, _) = Self::record_ingredient_movement(
                conn,
                ingredient_id,
                MovementType::In,
                MovementReason::Return,
                total,
                Some(sale_id),
                Some(reference.to_string()),
                Some("Annulation de la vente".to_string()),
            )
            .await?;
            restored.ingredient_movements.push(movement);
        }

        Ok(restored)
    }

    /// Receive finished-goods stock (purchase)
    pub async fn restock_product(
        &self,
        product_id: Uuid,
        input: RestockProductInput,
    ) -> AppResult<StockMovement> {
        let mut tx = self.db.begin().await?;
        let (movement, _) = Self::record_stock_movement(
            &mut tx,
            product_id,
            MovementType::In,
            MovementReason::Purchase,
            input.quantity,
            None,
            input.reference.clone(),
            input.notes.clone(),
        )
        .await?;
        tx.commit().await?;
        Ok(movement)
    }

    /// Receive ingredient stock (purchase)
    pub async fn restock_ingredient(
        &self,
        ingredient_id: Uuid,
        input: RestockIngredientInput,
    ) -> AppResult<IngredientMovement> {
        let mut tx = self.db.begin().await?;
        let (movement, _) = Self::record_ingredient_movement(
            &mut tx,
            ingredient_id,
            MovementType::In,
            MovementReason::Purchase,
            input.quantity,
            None,
            input.reference.clone(),
            input.notes.clone(),
        )
        .await?;
        tx.commit().await?;
        Ok(movement)
    }

    /// Manual finished-goods stock correction
    pub async fn adjust_product_stock(
        &self,
        product_id: Uuid,
        input: AdjustProductInput,
    ) -> AppResult<StockMovement> {
        let mut tx = self.db.begin().await?;
        let (movement, _) = Self::record_stock_movement(
            &mut tx,
            product_id,
            MovementType::Adjustment,
            MovementReason::Correction,
            input.quantity,
            None,
            None,
            input.notes.clone(),
        )
        .await?;
        tx.commit().await?;
        Ok(movement)
    }

    /// Manual ingredient stock correction
    pub async fn adjust_ingredient_stock(
        &self,
        ingredient_id: Uuid,
        input: AdjustIngredientInput,
    ) -> AppResult<IngredientMovement> {
        let mut tx = self.db.begin().await?;
        let (movement, _) = Self::record_ingredient_movement(
            &mut tx,
            ingredient_id,
            MovementType::Adjustment,
            MovementReason::Correction,
            input.quantity,
            None,
            None,
            input.notes.clone(),
        )
        .await?;
        tx.commit().await?;
        Ok(movement)
    }

    /// Movement history for a product
    pub async fn list_product_movements(&self, product_id: Uuid) -> AppResult<Vec<StockMovement>> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                .bind(product_id)
                .fetch_one(&self.db)
                .await?;
        if !exists {
            return Err(AppError::NotFound("Product".to_string()));
        }

        let rows = sqlx::query_as::<_, StockMovementRow>(&format!(
            "SELECT {STOCK_MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE product_id = $1 ORDER BY created_at DESC"
        ))
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Movement history for an ingredient
    pub async fn list_ingredient_movements(
        &self,
        ingredient_id: Uuid,
    ) -> AppResult<Vec<IngredientMovement>> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM ingredients WHERE id = $1)")
                .bind(ingredient_id)
                .fetch_one(&self.db)
                .await?;
        if !exists {
            return Err(AppError::NotFound("Ingredient".to_string()));
        }

        let rows = sqlx::query_as::<_, IngredientMovementRow>(&format!(
            "SELECT {INGREDIENT_MOVEMENT_COLUMNS} FROM ingredient_movements \
             WHERE ingredient_id = $1 ORDER BY created_at DESC"
        ))
        .bind(ingredient_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Replay a product's movement log and compare against its
    /// persisted stock
    pub async fn verify_product_log(&self, product_id: Uuid) -> AppResult<MovementAudit> {
        let mut tx = self.db.begin().await?;

        let current: i32 =
            sqlx::query_scalar("SELECT current_stock FROM products WHERE id = $1 FOR UPDATE")
                .bind(product_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        let rows: Vec<(String, i32, i32, i32)> = sqlx::query_as(
            "SELECT movement_type, quantity, stock_before, stock_after \
             FROM stock_movements WHERE product_id = $1 ORDER BY created_at ASC",
        )
        .bind(product_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let current = Decimal::from(current);
        let baseline = rows
            .first()
            .map(|r| Decimal::from(r.2))
            .unwrap_or(current);

        let mut log = Vec::with_capacity(rows.len());
        for (kind, quantity, before, after) in &rows {
            log.push((
                parse_movement_type(kind)?,
                Decimal::from(*quantity),
                Decimal::from(*before),
                Decimal::from(*after),
            ));
        }

        self.check_replay(product_id, baseline, current, log, rows.len())
    }

    /// Replay an ingredient's movement log and compare against its
    /// persisted stock
    pub async fn verify_ingredient_log(&self, ingredient_id: Uuid) -> AppResult<MovementAudit> {
        let mut tx = self.db.begin().await?;

        let current: Decimal = sqlx::query_scalar(
            "SELECT quantity_remaining FROM ingredients WHERE id = $1 FOR UPDATE",
        )
        .bind(ingredient_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Ingredient".to_string()))?;

        let rows: Vec<(String, Decimal, Decimal, Decimal)> = sqlx::query_as(
            "SELECT movement_type, quantity, stock_before, stock_after \
             FROM ingredient_movements WHERE ingredient_id = $1 ORDER BY created_at ASC",
        )
        .bind(ingredient_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let baseline = rows.first().map(|r| r.2).unwrap_or(current);

        let mut log = Vec::with_capacity(rows.len());
        for (kind, quantity, before, after) in &rows {
            log.push((parse_movement_type(kind)?, *quantity, *before, *after));
        }

        self.check_replay(ingredient_id, baseline, current, log, rows.len())
    }

    fn check_replay(
        &self,
        entity_id: Uuid,
        baseline: Decimal,
        recorded: Decimal,
        log: Vec<(MovementType, Decimal, Decimal, Decimal)>,
        movement_count: usize,
    ) -> AppResult<MovementAudit> {
        let expected = replay_movements(baseline, log).ok_or_else(|| {
            tracing::error!(entity_id = %entity_id, "movement log rows do not chain");
            AppError::Consistency(format!("movement log for {} is inconsistent", entity_id))
        })?;

        if expected != recorded {
            tracing::error!(
                entity_id = %entity_id,
                expected = %expected,
                recorded = %recorded,
                "stock does not match its movement log"
            );
            return Err(AppError::Consistency(format!(
                "stock for {} is {} but its movement log reconstructs {}",
                entity_id, recorded, expected
            )));
        }

        Ok(MovementAudit {
            entity_id,
            movement_count,
            baseline,
            expected_stock: expected,
            recorded_stock: recorded,
        })
    }
}
