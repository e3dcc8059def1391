//! Kitchen service: ingredients, recipes and the availability gate
//!
//! Ingredient stock is only mutated through the inventory movement
//! primitives; the update path deliberately has no quantity field.
//! Recipe lines are validated at creation time against the conversion
//! table, so a line whose unit cannot be converted to the ingredient's
//! native unit is rejected before it can ever mis-deduct stock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use shared::{
    convert_quantity, required_quantity, AvailabilityReport, Ingredient, IngredientDeduction,
    MissingIngredient, MovementReason, MovementType, Recipe, Unit,
};

use crate::error::{AppError, AppResult};
use crate::services::inventory::InventoryService;
use crate::services::notification::{
    AlertEntity, AlertLevel, NotificationService, StockAlertDraft,
};

/// Service for ingredients and recipes
#[derive(Clone)]
pub struct KitchenService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct IngredientRow {
    id: Uuid,
    name: String,
    quantity_remaining: Decimal,
    unit: String,
    alert_threshold: Decimal,
    unit_price: Decimal,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<IngredientRow> for Ingredient {
    type Error = AppError;

    fn try_from(row: IngredientRow) -> Result<Self, Self::Error> {
        let unit = Unit::parse(&row.unit).ok_or_else(|| {
            AppError::Consistency(format!("unknown ingredient unit '{}'", row.unit))
        })?;
        Ok(Ingredient {
            id: row.id,
            name: row.name,
            quantity_remaining: row.quantity_remaining,
            unit,
            alert_threshold: row.alert_threshold,
            unit_price: row.unit_price,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RecipeRow {
    id: Uuid,
    product_id: Uuid,
    name: String,
    preparation_minutes: Option<i32>,
    portions: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RecipeRow> for Recipe {
    fn from(row: RecipeRow) -> Self {
        Recipe {
            id: row.id,
            product_id: row.product_id,
            name: row.name,
            preparation_minutes: row.preparation_minutes,
            portions: row.portions,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct RecipeLineDetailRow {
    id: Uuid,
    ingredient_id: Uuid,
    ingredient_name: String,
    quantity_per_dish: Decimal,
    unit: String,
    native_unit: String,
    ingredient_stock: Decimal,
}

#[derive(Debug, FromRow)]
struct AvailabilityLineRow {
    ingredient_id: Uuid,
    ingredient_name: String,
    quantity_per_dish: Decimal,
    unit: String,
    native_unit: String,
    quantity_remaining: Decimal,
    alert_threshold: Decimal,
}

/// Input for creating an ingredient
#[derive(Debug, Deserialize)]
pub struct CreateIngredientInput {
    pub name: String,
    pub quantity_remaining: Option<Decimal>,
    pub unit: Unit,
    pub alert_threshold: Option<Decimal>,
    pub unit_price: Decimal,
}

/// Input for updating an ingredient
///
/// Stock is absent on purpose: quantity changes go through movements.
#[derive(Debug, Deserialize)]
pub struct UpdateIngredientInput {
    pub name: Option<String>,
    pub alert_threshold: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub is_active: Option<bool>,
}

/// One line of a recipe being created or replaced
#[derive(Debug, Deserialize)]
pub struct RecipeLineInput {
    pub ingredient_id: Uuid,
    pub quantity_per_dish: Decimal,
    pub unit: Unit,
}

/// Input for creating a recipe
#[derive(Debug, Deserialize)]
pub struct CreateRecipeInput {
    pub product_id: Uuid,
    pub name: String,
    pub preparation_minutes: Option<i32>,
    pub portions: Option<i32>,
    pub ingredients: Vec<RecipeLineInput>,
}

/// Input for updating a recipe; supplying `ingredients` replaces every
/// line
#[derive(Debug, Deserialize)]
pub struct UpdateRecipeInput {
    pub name: Option<String>,
    pub preparation_minutes: Option<i32>,
    pub portions: Option<i32>,
    pub is_active: Option<bool>,
    pub ingredients: Option<Vec<RecipeLineInput>>,
}

/// A recipe line joined with its ingredient
#[derive(Debug, Serialize)]
pub struct RecipeLineDetail {
    pub id: Uuid,
    pub ingredient_id: Uuid,
    pub ingredient_name: String,
    pub quantity_per_dish: Decimal,
    pub unit: Unit,
    pub native_unit: Unit,
    pub ingredient_stock: Decimal,
}

/// A recipe with its lines
#[derive(Debug, Serialize)]
pub struct RecipeWithLines {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub ingredients: Vec<RecipeLineDetail>,
}

/// Input for preparing dishes outside a sale
#[derive(Debug, Default, Deserialize)]
pub struct PrepareInput {
    pub quantity: Option<i32>,
}

/// Outcome of a kitchen preparation
#[derive(Debug, Serialize)]
pub struct PrepareOutcome {
    pub recipe_name: String,
    pub quantity: i32,
    pub consumed: Vec<IngredientDeduction>,
}

const INGREDIENT_COLUMNS: &str = "id, name, quantity_remaining, unit, alert_threshold, \
                                  unit_price, is_active, created_at, updated_at";

const RECIPE_COLUMNS: &str =
    "id, product_id, name, preparation_minutes, portions, is_active, created_at, updated_at";

impl KitchenService {
    /// Create a new KitchenService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create an ingredient
    pub async fn create_ingredient(&self, input: CreateIngredientInput) -> AppResult<Ingredient> {
        if input.name.trim().is_empty() {
            return Err(AppError::Validation {
                field: "name".to_string(),
                message: "Ingredient name is required".to_string(),
                message_fr: "Le nom de l'ingrédient est requis".to_string(),
            });
        }

        let quantity = input.quantity_remaining.unwrap_or(Decimal::ZERO);
        let threshold = input.alert_threshold.unwrap_or(Decimal::ZERO);
        if quantity < Decimal::ZERO || threshold < Decimal::ZERO || input.unit_price < Decimal::ZERO
        {
            return Err(AppError::ValidationError(
                "Quantity, threshold and unit price cannot be negative".to_string(),
            ));
        }

        let row = sqlx::query_as::<_, IngredientRow>(&format!(
            "INSERT INTO ingredients (name, quantity_remaining, unit, alert_threshold, unit_price) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {INGREDIENT_COLUMNS}"
        ))
        .bind(input.name.trim())
        .bind(quantity)
        .bind(input.unit.as_str())
        .bind(threshold)
        .bind(input.unit_price)
        .fetch_one(&self.db)
        .await?;

        row.try_into()
    }

    /// Get an ingredient by ID
    pub async fn get_ingredient(&self, ingredient_id: Uuid) -> AppResult<Ingredient> {
        sqlx::query_as::<_, IngredientRow>(&format!(
            "SELECT {INGREDIENT_COLUMNS} FROM ingredients WHERE id = $1"
        ))
        .bind(ingredient_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Ingredient".to_string()))?
        .try_into()
    }

    /// List ingredients, optionally only those at or below their alert
    /// threshold
    pub async fn list_ingredients(&self, low_stock_only: bool) -> AppResult<Vec<Ingredient>> {
        let rows = sqlx::query_as::<_, IngredientRow>(&format!(
            "SELECT {INGREDIENT_COLUMNS} FROM ingredients \
             WHERE is_active = TRUE AND (NOT $1 OR quantity_remaining <= alert_threshold) \
             ORDER BY name ASC"
        ))
        .bind(low_stock_only)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Update an ingredient
    pub async fn update_ingredient(
        &self,
        ingredient_id: Uuid,
        input: UpdateIngredientInput,
    ) -> AppResult<Ingredient> {
        let existing = self.get_ingredient(ingredient_id).await?;

        let name = input.name.unwrap_or(existing.name);
        let alert_threshold = input.alert_threshold.unwrap_or(existing.alert_threshold);
        let unit_price = input.unit_price.unwrap_or(existing.unit_price);
        let is_active = input.is_active.unwrap_or(existing.is_active);

        if alert_threshold < Decimal::ZERO || unit_price < Decimal::ZERO {
            return Err(AppError::ValidationError(
                "Threshold and unit price cannot be negative".to_string(),
            ));
        }

        let row = sqlx::query_as::<_, IngredientRow>(&format!(
            "UPDATE ingredients \
             SET name = $1, alert_threshold = $2, unit_price = $3, is_active = $4, \
                 updated_at = NOW() \
             WHERE id = $5 RETURNING {INGREDIENT_COLUMNS}"
        ))
        .bind(&name)
        .bind(alert_threshold)
        .bind(unit_price)
        .bind(is_active)
        .bind(ingredient_id)
        .fetch_one(&self.db)
        .await?;

        row.try_into()
    }

    /// Validate recipe lines against the ingredients they reference.
    async fn validate_lines(
        conn: &mut PgConnection,
        lines: &[RecipeLineInput],
    ) -> AppResult<()> {
        if lines.is_empty() {
            return Err(AppError::Validation {
                field: "ingredients".to_string(),
                message: "A recipe needs at least one ingredient".to_string(),
                message_fr: "Une recette nécessite au moins un ingrédient".to_string(),
            });
        }

        for line in lines {
            if line.quantity_per_dish <= Decimal::ZERO {
                return Err(AppError::ValidationError(
                    "Ingredient quantity per dish must be positive".to_string(),
                ));
            }

            let native: Option<String> =
                sqlx::query_scalar("SELECT unit FROM ingredients WHERE id = $1")
                    .bind(line.ingredient_id)
                    .fetch_optional(&mut *conn)
                    .await?;
            let native = native.ok_or_else(|| AppError::NotFound("Ingredient".to_string()))?;
            let native = Unit::parse(&native).ok_or_else(|| {
                AppError::Consistency(format!("unknown ingredient unit '{}'", native))
            })?;

            // Reject lines the deduction engine could never convert.
            convert_quantity(line.quantity_per_dish, line.unit, native)?;
        }

        Ok(())
    }

    async fn insert_lines(
        conn: &mut PgConnection,
        recipe_id: Uuid,
        lines: &[RecipeLineInput],
    ) -> AppResult<()> {
        for line in lines {
            sqlx::query(
                "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, quantity_per_dish, unit) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(recipe_id)
            .bind(line.ingredient_id)
            .bind(line.quantity_per_dish)
            .bind(line.unit.as_str())
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Create a recipe with its lines
    pub async fn create_recipe(&self, input: CreateRecipeInput) -> AppResult<RecipeWithLines> {
        if input.name.trim().is_empty() {
            return Err(AppError::Validation {
                field: "name".to_string(),
                message: "Recipe name is required".to_string(),
                message_fr: "Le nom de la recette est requis".to_string(),
            });
        }

        let mut tx = self.db.begin().await?;

        let product_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                .bind(input.product_id)
                .fetch_one(&mut *tx)
                .await?;
        if !product_exists {
            return Err(AppError::NotFound("Product".to_string()));
        }

        let recipe_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM recipes WHERE product_id = $1)")
                .bind(input.product_id)
                .fetch_one(&mut *tx)
                .await?;
        if recipe_exists {
            return Err(AppError::DuplicateEntry("recipe for this product".to_string()));
        }

        Self::validate_lines(&mut tx, &input.ingredients).await?;

        let recipe: Recipe = sqlx::query_as::<_, RecipeRow>(&format!(
            "INSERT INTO recipes (product_id, name, preparation_minutes, portions) \
             VALUES ($1, $2, $3, $4) RETURNING {RECIPE_COLUMNS}"
        ))
        .bind(input.product_id)
        .bind(input.name.trim())
        .bind(input.preparation_minutes)
        .bind(input.portions.unwrap_or(1))
        .fetch_one(&mut *tx)
        .await?
        .into();

        Self::insert_lines(&mut tx, recipe.id, &input.ingredients).await?;

        tx.commit().await?;

        self.get_recipe(recipe.id).await
    }

    /// Get a recipe with its lines
    pub async fn get_recipe(&self, recipe_id: Uuid) -> AppResult<RecipeWithLines> {
        let recipe: Recipe = sqlx::query_as::<_, RecipeRow>(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = $1"
        ))
        .bind(recipe_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Recipe".to_string()))?
        .into();

        let rows = sqlx::query_as::<_, RecipeLineDetailRow>(
            "SELECT ri.id, ri.ingredient_id, i.name AS ingredient_name, ri.quantity_per_dish, \
                    ri.unit, i.unit AS native_unit, i.quantity_remaining AS ingredient_stock \
             FROM recipe_ingredients ri \
             JOIN ingredients i ON i.id = ri.ingredient_id \
             WHERE ri.recipe_id = $1 \
             ORDER BY ri.created_at ASC",
        )
        .bind(recipe_id)
        .fetch_all(&self.db)
        .await?;

        let mut ingredients = Vec::with_capacity(rows.len());
        for row in rows {
            let unit = Unit::parse(&row.unit).ok_or_else(|| {
                AppError::Consistency(format!("unknown recipe line unit '{}'", row.unit))
            })?;
            let native_unit = Unit::parse(&row.native_unit).ok_or_else(|| {
                AppError::Consistency(format!("unknown ingredient unit '{}'", row.native_unit))
            })?;
            ingredients.push(RecipeLineDetail {
                id: row.id,
                ingredient_id: row.ingredient_id,
                ingredient_name: row.ingredient_name,
                quantity_per_dish: row.quantity_per_dish,
                unit,
                native_unit,
                ingredient_stock: row.ingredient_stock,
            });
        }

        Ok(RecipeWithLines {
            recipe,
            ingredients,
        })
    }

    /// List recipes
    pub async fn list_recipes(&self, active_only: bool) -> AppResult<Vec<Recipe>> {
        let rows = sqlx::query_as::<_, RecipeRow>(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes \
             WHERE (NOT $1 OR is_active = TRUE) ORDER BY name ASC"
        ))
        .bind(active_only)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Update a recipe; supplying ingredients replaces every line
    pub async fn update_recipe(
        &self,
        recipe_id: Uuid,
        input: UpdateRecipeInput,
    ) -> AppResult<RecipeWithLines> {
        let mut tx = self.db.begin().await?;

        let existing: Recipe = sqlx::query_as::<_, RecipeRow>(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = $1 FOR UPDATE"
        ))
        .bind(recipe_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Recipe".to_string()))?
        .into();

        let name = input.name.unwrap_or(existing.name);
        let preparation_minutes = input.preparation_minutes.or(existing.preparation_minutes);
        let portions = input.portions.unwrap_or(existing.portions);
        let is_active = input.is_active.unwrap_or(existing.is_active);

        sqlx::query(
            "UPDATE recipes \
             SET name = $1, preparation_minutes = $2, portions = $3, is_active = $4, \
                 updated_at = NOW() \
             WHERE id = $5",
        )
        .bind(&name)
        .bind(preparation_minutes)
        .bind(portions)
        .bind(is_active)
        .bind(recipe_id)
        .execute(&mut *tx)
        .await?;

        if let Some(lines) = &input.ingredients {
            Self::validate_lines(&mut tx, lines).await?;
            sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
                .bind(recipe_id)
                .execute(&mut *tx)
                .await?;
            Self::insert_lines(&mut tx, recipe_id, lines).await?;
        }

        tx.commit().await?;

        self.get_recipe(recipe_id).await
    }

    /// Availability walk shared by the HTTP check and the sale gate.
    /// Runs on the caller's connection so the sale service sees a
    /// consistent snapshot inside its transaction.
    pub(crate) async fn availability_on(
        conn: &mut PgConnection,
        recipe_id: Uuid,
        quantity: i32,
    ) -> AppResult<AvailabilityReport> {
        let lines = sqlx::query_as::<_, AvailabilityLineRow>(
            "SELECT ri.ingredient_id, i.name AS ingredient_name, ri.quantity_per_dish, ri.unit, \
                    i.unit AS native_unit, i.quantity_remaining, i.alert_threshold \
             FROM recipe_ingredients ri \
             JOIN ingredients i ON i.id = ri.ingredient_id \
             WHERE ri.recipe_id = $1 \
             ORDER BY ri.created_at ASC",
        )
        .bind(recipe_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut missing = Vec::new();
        for line in &lines {
            let unit = Unit::parse(&line.unit).ok_or_else(|| {
                AppError::Consistency(format!("unknown recipe line unit '{}'", line.unit))
            })?;
            let native = Unit::parse(&line.native_unit).ok_or_else(|| {
                AppError::Consistency(format!("unknown ingredient unit '{}'", line.native_unit))
            })?;

            let required = required_quantity(line.quantity_per_dish, unit, native, quantity)?;
            if line.quantity_remaining < required {
                missing.push(MissingIngredient {
                    ingredient_id: line.ingredient_id,
                    name: line.ingredient_name.clone(),
                    required,
                    available: line.quantity_remaining,
                    unit: native,
                });
            }
        }

        Ok(AvailabilityReport {
            can_prepare: missing.is_empty(),
            quantity_requested: quantity,
            missing_ingredients: missing,
        })
    }

    /// Availability of the recipe backing a product, if any. Used by
    /// the sale service as its pre-sale gate.
    pub(crate) async fn availability_for_product(
        conn: &mut PgConnection,
        product_id: Uuid,
        quantity: i32,
    ) -> AppResult<Option<AvailabilityReport>> {
        let recipe_id: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM recipes WHERE product_id = $1 AND is_active = TRUE")
                .bind(product_id)
                .fetch_optional(&mut *conn)
                .await?;

        match recipe_id {
            Some(recipe_id) => Ok(Some(
                Self::availability_on(conn, recipe_id, quantity).await?,
            )),
            None => Ok(None),
        }
    }

    /// Check whether a recipe can be prepared, without mutating
    /// anything
    pub async fn check_availability(
        &self,
        recipe_id: Uuid,
        quantity: i32,
    ) -> AppResult<AvailabilityReport> {
        if quantity <= 0 {
            return Err(AppError::ValidationError(
                "Quantity must be positive".to_string(),
            ));
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM recipes WHERE id = $1)")
            .bind(recipe_id)
            .fetch_one(&self.db)
            .await?;
        if !exists {
            return Err(AppError::NotFound("Recipe".to_string()));
        }

        let mut conn = self.db.acquire().await?;
        Self::availability_on(&mut conn, recipe_id, quantity).await
    }

    /// Prepare dishes outside a sale, consuming ingredients
    pub async fn prepare(&self, recipe_id: Uuid, input: PrepareInput) -> AppResult<PrepareOutcome> {
        let quantity = input.quantity.unwrap_or(1);
        if quantity <= 0 {
            return Err(AppError::ValidationError(
                "Quantity must be positive".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;

        let recipe_name: String =
            sqlx::query_scalar("SELECT name FROM recipes WHERE id = $1 FOR UPDATE")
                .bind(recipe_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::NotFound("Recipe".to_string()))?;

        let report = Self::availability_on(&mut tx, recipe_id, quantity).await?;
        if !report.can_prepare {
            let names: Vec<&str> = report
                .missing_ingredients
                .iter()
                .map(|m| m.name.as_str())
                .collect();
            return Err(AppError::InsufficientStock(format!(
                "{}: missing {}",
                recipe_name,
                names.join(", ")
            )));
        }

        let lines = sqlx::query_as::<_, AvailabilityLineRow>(
            "SELECT ri.ingredient_id, i.name AS ingredient_name, ri.quantity_per_dish, ri.unit, \
                    i.unit AS native_unit, i.quantity_remaining, i.alert_threshold \
             FROM recipe_ingredients ri \
             JOIN ingredients i ON i.id = ri.ingredient_id \
             WHERE ri.recipe_id = $1 \
             ORDER BY ri.created_at ASC",
        )
        .bind(recipe_id)
        .fetch_all(&mut *tx)
        .await?;

        let reference = format!("PREP-{}", recipe_id.simple());
        let mut consumed = Vec::with_capacity(lines.len());
        let mut alerts = Vec::new();

        for line in &lines {
            let unit = Unit::parse(&line.unit).ok_or_else(|| {
                AppError::Consistency(format!("unknown recipe line unit '{}'", line.unit))
            })?;
            let native = Unit::parse(&line.native_unit).ok_or_else(|| {
                AppError::Consistency(format!("unknown ingredient unit '{}'", line.native_unit))
            })?;
            let required = required_quantity(line.quantity_per_dish, unit, native, quantity)?;

            let (_, ingredient) = InventoryService::record_ingredient_movement(
                &mut tx,
                line.ingredient_id,
                MovementType::Out,
                MovementReason::Kitchen,
                required,
                None,
                Some(reference.clone()),
                None,
            )
            .await?;

            let out_of_stock = ingredient.stock_after <= Decimal::ZERO;
            let low_stock = !out_of_stock && ingredient.stock_after <= ingredient.alert_threshold;

            if out_of_stock || low_stock {
                alerts.push(StockAlertDraft {
                    entity_type: AlertEntity::Ingredient,
                    entity_id: line.ingredient_id,
                    name: ingredient.name.clone(),
                    alert_type: if out_of_stock {
                        AlertLevel::OutOfStock
                    } else {
                        AlertLevel::LowStock
                    },
                    quantity: ingredient.stock_after,
                    unit: Some(ingredient.unit),
                });
            }

            consumed.push(IngredientDeduction {
                ingredient_id: line.ingredient_id,
                ingredient_name: ingredient.name,
                quantity_deducted: required,
                unit: native,
                stock_after: ingredient.stock_after,
                low_stock,
                out_of_stock,
            });
        }

        tx.commit().await?;

        if !alerts.is_empty() {
            NotificationService::new(self.db.clone())
                .record_stock_alerts(&alerts)
                .await;
        }

        Ok(PrepareOutcome {
            recipe_name,
            quantity,
            consumed,
        })
    }
}
