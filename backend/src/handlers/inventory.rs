//! HTTP handlers for stock movement and alert endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use shared::{IngredientMovement, StockMovement};

use crate::error::AppResult;
use crate::services::inventory::{
    AdjustIngredientInput, AdjustProductInput, InventoryService, MovementAudit,
    RestockIngredientInput, RestockProductInput,
};
use crate::services::notification::{NotificationService, StockAlert};
use crate::AppState;

/// Receive finished-goods stock
pub async fn restock_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(input): Json<RestockProductInput>,
) -> AppResult<Json<StockMovement>> {
    let service = InventoryService::new(state.db);
    let movement = service.restock_product(product_id, input).await?;
    Ok(Json(movement))
}

/// Receive ingredient stock
pub async fn restock_ingredient(
    State(state): State<AppState>,
    Path(ingredient_id): Path<Uuid>,
    Json(input): Json<RestockIngredientInput>,
) -> AppResult<Json<IngredientMovement>> {
    let service = InventoryService::new(state.db);
    let movement = service.restock_ingredient(ingredient_id, input).await?;
    Ok(Json(movement))
}

/// Manual finished-goods stock correction
pub async fn adjust_product_stock(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(input): Json<AdjustProductInput>,
) -> AppResult<Json<StockMovement>> {
    let service = InventoryService::new(state.db);
    let movement = service.adjust_product_stock(product_id, input).await?;
    Ok(Json(movement))
}

/// Manual ingredient stock correction
pub async fn adjust_ingredient_stock(
    State(state): State<AppState>,
    Path(ingredient_id): Path<Uuid>,
    Json(input): Json<AdjustIngredientInput>,
) -> AppResult<Json<IngredientMovement>> {
    let service = InventoryService::new(state.db);
    let movement = service.adjust_ingredient_stock(ingredient_id, input).await?;
    Ok(Json(movement))
}

/// Movement history for a product
pub async fn list_product_movements(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<Vec<StockMovement>>> {
    let service = InventoryService::new(state.db);
    let movements = service.list_product_movements(product_id).await?;
    Ok(Json(movements))
}

/// Movement history for an ingredient
pub async fn list_ingredient_movements(
    State(state): State<AppState>,
    Path(ingredient_id): Path<Uuid>,
) -> AppResult<Json<Vec<IngredientMovement>>> {
    let service = InventoryService::new(state.db);
    let movements = service.list_ingredient_movements(ingredient_id).await?;
    Ok(Json(movements))
}

/// Replay a product's movement log against its stock
pub async fn verify_product_log(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<MovementAudit>> {
    let service = InventoryService::new(state.db);
    let audit = service.verify_product_log(product_id).await?;
    Ok(Json(audit))
}

/// Replay an ingredient's movement log against its stock
pub async fn verify_ingredient_log(
    State(state): State<AppState>,
    Path(ingredient_id): Path<Uuid>,
) -> AppResult<Json<MovementAudit>> {
    let service = InventoryService::new(state.db);
    let audit = service.verify_ingredient_log(ingredient_id).await?;
    Ok(Json(audit))
}

/// List unacknowledged stock alerts
pub async fn list_stock_alerts(State(state): State<AppState>) -> AppResult<Json<Vec<StockAlert>>> {
    let service = NotificationService::new(state.db);
    let alerts = service.list_active_alerts().await?;
    Ok(Json(alerts))
}

/// Acknowledge a stock alert
pub async fn acknowledge_stock_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
) -> AppResult<Json<StockAlert>> {
    let service = NotificationService::new(state.db);
    let alert = service.acknowledge_alert(alert_id).await?;
    Ok(Json(alert))
}
