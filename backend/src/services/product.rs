//! Product catalog service

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::{Category, CategoryKind, Product, Unit};

use crate::error::{AppError, AppResult};

/// Service for the product catalog
#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct CategoryRow {
    id: Uuid,
    name: String,
    kind: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<CategoryRow> for Category {
    type Error = AppError;

    fn try_from(row: CategoryRow) -> Result<Self, Self::Error> {
        let kind = CategoryKind::parse(&row.kind).ok_or_else(|| {
            AppError::Consistency(format!("unknown category kind '{}'", row.kind))
        })?;
        Ok(Category {
            id: row.id,
            name: row.name,
            kind,
            description: row.description,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    category_id: Uuid,
    code: Option<String>,
    description: Option<String>,
    unit: String,
    purchase_price: Decimal,
    selling_price: Decimal,
    current_stock: i32,
    minimum_stock: i32,
    is_active: bool,
    is_available: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = AppError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let unit = Unit::parse(&row.unit)
            .ok_or_else(|| AppError::Consistency(format!("unknown product unit '{}'", row.unit)))?;
        Ok(Product {
            id: row.id,
            name: row.name,
            category_id: row.category_id,
            code: row.code,
            description: row.description,
            unit,
            purchase_price: row.purchase_price,
            selling_price: row.selling_price,
            current_stock: row.current_stock,
            minimum_stock: row.minimum_stock,
            is_active: row.is_active,
            is_available: row.is_available,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Input for creating a category
#[derive(Debug, Deserialize)]
pub struct CreateCategoryInput {
    pub name: String,
    pub kind: CategoryKind,
    pub description: Option<String>,
}

/// Input for creating a product
#[derive(Debug, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    pub category_id: Uuid,
    pub code: Option<String>,
    pub description: Option<String>,
    pub unit: Unit,
    pub purchase_price: Decimal,
    pub selling_price: Decimal,
    pub initial_stock: Option<i32>,
    pub minimum_stock: Option<i32>,
}

/// Input for updating a product
///
/// Stock is absent on purpose: quantity changes go through movements.
#[derive(Debug, Deserialize)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub purchase_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub minimum_stock: Option<i32>,
    pub is_active: Option<bool>,
    pub is_available: Option<bool>,
}

/// Filters for listing products
#[derive(Debug, Default, Deserialize)]
pub struct ProductFilter {
    pub category: Option<Uuid>,
    pub search: Option<String>,
    pub active_only: Option<bool>,
}

/// A product with derived availability flags
#[derive(Debug, Serialize)]
pub struct ProductDetails {
    #[serde(flatten)]
    pub product: Product,
    pub recipe_id: Option<Uuid>,
    pub is_low_stock: bool,
    pub is_out_of_stock: bool,
}

const CATEGORY_COLUMNS: &str = "id, name, kind, description, is_active, created_at";

const PRODUCT_COLUMNS: &str = "id, name, category_id, code, description, unit, purchase_price, \
                               selling_price, current_stock, minimum_stock, is_active, \
                               is_available, created_at, updated_at";

impl ProductService {
    /// Create a new ProductService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a category
    pub async fn create_category(&self, input: CreateCategoryInput) -> AppResult<Category> {
        if input.name.trim().is_empty() {
            return Err(AppError::Validation {
                field: "name".to_string(),
                message: "Category name is required".to_string(),
                message_fr: "Le nom de la catégorie est requis".to_string(),
            });
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE name = $1)")
                .bind(input.name.trim())
                .fetch_one(&self.db)
                .await?;
        if exists {
            return Err(AppError::DuplicateEntry("category name".to_string()));
        }

        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            "INSERT INTO categories (name, kind, description) \
             VALUES ($1, $2, $3) RETURNING {CATEGORY_COLUMNS}"
        ))
        .bind(input.name.trim())
        .bind(input.kind.as_str())
        .bind(&input.description)
        .fetch_one(&self.db)
        .await?;

        row.try_into()
    }

    /// List categories
    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE is_active = TRUE ORDER BY name ASC"
        ))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    fn generate_code(name: &str) -> String {
        let prefix: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(3)
            .collect::<String>()
            .to_uppercase();
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}-{}", prefix, suffix[..6].to_uppercase())
    }

    /// Create a product
    pub async fn create_product(&self, input: CreateProductInput) -> AppResult<ProductDetails> {
        if input.name.trim().is_empty() {
            return Err(AppError::Validation {
                field: "name".to_string(),
                message: "Product name is required".to_string(),
                message_fr: "Le nom du produit est requis".to_string(),
            });
        }

        if input.purchase_price < Decimal::ZERO || input.selling_price < Decimal::ZERO {
            return Err(AppError::ValidationError(
                "Prices cannot be negative".to_string(),
            ));
        }

        let initial_stock = input.initial_stock.unwrap_or(0);
        let minimum_stock = input.minimum_stock.unwrap_or(5);
        if initial_stock < 0 || minimum_stock < 0 {
            return Err(AppError::ValidationError(
                "Stock levels cannot be negative".to_string(),
            ));
        }

        let category_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
                .bind(input.category_id)
                .fetch_one(&self.db)
                .await?;
        if !category_exists {
            return Err(AppError::NotFound("Category".to_string()));
        }

        let code = input
            .code
            .clone()
            .unwrap_or_else(|| Self::generate_code(&input.name));

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO products \
             (name, category_id, code, description, unit, purchase_price, selling_price, \
              current_stock, minimum_stock) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(input.name.trim())
        .bind(input.category_id)
        .bind(&code)
        .bind(&input.description)
        .bind(input.unit.as_str())
        .bind(input.purchase_price)
        .bind(input.selling_price)
        .bind(initial_stock)
        .bind(minimum_stock)
        .fetch_one(&self.db)
        .await?;

        let product: Product = row.try_into()?;
        Ok(self.with_details(product, None))
    }

    fn with_details(&self, product: Product, recipe_id: Option<Uuid>) -> ProductDetails {
        let is_low_stock = product.is_low_stock();
        let is_out_of_stock = product.is_out_of_stock();
        ProductDetails {
            product,
            recipe_id,
            is_low_stock,
            is_out_of_stock,
        }
    }

    /// Get a product with availability flags
    pub async fn get_product(&self, product_id: Uuid) -> AppResult<ProductDetails> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        let recipe_id: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM recipes WHERE product_id = $1")
                .bind(product_id)
                .fetch_optional(&self.db)
                .await?;

        let product: Product = row.try_into()?;
        Ok(self.with_details(product, recipe_id))
    }

    /// List products with optional filters
    pub async fn list_products(&self, filter: ProductFilter) -> AppResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE ($1::uuid IS NULL OR category_id = $1) \
               AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%' OR code ILIKE '%' || $2 || '%') \
               AND (NOT $3 OR is_active = TRUE) \
             ORDER BY name ASC"
        ))
        .bind(filter.category)
        .bind(&filter.search)
        .bind(filter.active_only.unwrap_or(true))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Products at or below their minimum stock
    pub async fn low_stock_products(&self) -> AppResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE is_active = TRUE AND current_stock <= minimum_stock \
             ORDER BY current_stock ASC"
        ))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Update a product
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> AppResult<ProductDetails> {
        let existing = self.get_product(product_id).await?;
        let current = existing.product;

        let name = input.name.unwrap_or(current.name);
        let description = input.description.or(current.description);
        let purchase_price = input.purchase_price.unwrap_or(current.purchase_price);
        let selling_price = input.selling_price.unwrap_or(current.selling_price);
        let minimum_stock = input.minimum_stock.unwrap_or(current.minimum_stock);
        let is_active = input.is_active.unwrap_or(current.is_active);
        let is_available = input.is_available.unwrap_or(current.is_available);

        if purchase_price < Decimal::ZERO || selling_price < Decimal::ZERO || minimum_stock < 0 {
            return Err(AppError::ValidationError(
                "Prices and minimum stock cannot be negative".to_string(),
            ));
        }

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE products \
             SET name = $1, description = $2, purchase_price = $3, selling_price = $4, \
                 minimum_stock = $5, is_active = $6, is_available = $7, updated_at = NOW() \
             WHERE id = $8 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(&name)
        .bind(&description)
        .bind(purchase_price)
        .bind(selling_price)
        .bind(minimum_stock)
        .bind(is_active)
        .bind(is_available)
        .bind(product_id)
        .fetch_one(&self.db)
        .await?;

        let product: Product = row.try_into()?;
        Ok(self.with_details(product, existing.recipe_id))
    }
}
