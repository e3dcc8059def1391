//! HTTP handlers for product catalog endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use shared::{Category, Product};

use crate::error::AppResult;
use crate::services::product::{
    CreateCategoryInput, CreateProductInput, ProductDetails, ProductFilter, ProductService,
    UpdateProductInput,
};
use crate::AppState;

/// Create a category
pub async fn create_category(
    State(state): State<AppState>,
    Json(input): Json<CreateCategoryInput>,
) -> AppResult<Json<Category>> {
    let service = ProductService::new(state.db);
    let category = service.create_category(input).await?;
    Ok(Json(category))
}

/// List categories
pub async fn list_categories(State(state): State<AppState>) -> AppResult<Json<Vec<Category>>> {
    let service = ProductService::new(state.db);
    let categories = service.list_categories().await?;
    Ok(Json(categories))
}

/// Create a product
pub async fn create_product(
    State(state): State<AppState>,
    Json(input): Json<CreateProductInput>,
) -> AppResult<Json<ProductDetails>> {
    let service = ProductService::new(state.db);
    let product = service.create_product(input).await?;
    Ok(Json(product))
}

/// List products
pub async fn list_products(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> AppResult<Json<Vec<Product>>> {
    let service = ProductService::new(state.db);
    let products = service.list_products(filter).await?;
    Ok(Json(products))
}

/// Get a product with availability flags
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ProductDetails>> {
    let service = ProductService::new(state.db);
    let product = service.get_product(product_id).await?;
    Ok(Json(product))
}

/// Update a product
pub async fn update_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> AppResult<Json<ProductDetails>> {
    let service = ProductService::new(state.db);
    let product = service.update_product(product_id, input).await?;
    Ok(Json(product))
}

/// Products at or below their minimum stock
pub async fn low_stock_products(State(state): State<AppState>) -> AppResult<Json<Vec<Product>>> {
    let service = ProductService::new(state.db);
    let products = service.low_stock_products().await?;
    Ok(Json(products))
}
