//! HTTP handlers for sale endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use shared::{PaginatedResponse, Sale};

use crate::error::AppResult;
use crate::services::sale::{
    CreateSaleInput, SaleFilter, SaleService, SaleWithItems, StatusUpdateOutcome,
    UpdateStatusInput,
};
use crate::AppState;

/// Create a sale
pub async fn create_sale(
    State(state): State<AppState>,
    Json(input): Json<CreateSaleInput>,
) -> AppResult<Json<SaleWithItems>> {
    let service = SaleService::new(state.db);
    let sale = service.create_sale(input).await?;
    Ok(Json(sale))
}

/// List sales
pub async fn list_sales(
    State(state): State<AppState>,
    Query(filter): Query<SaleFilter>,
) -> AppResult<Json<PaginatedResponse<Sale>>> {
    let service = SaleService::new(state.db);
    let sales = service.list_sales(filter).await?;
    Ok(Json(sales))
}

/// Get a sale with its items
pub async fn get_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
) -> AppResult<Json<SaleWithItems>> {
    let service = SaleService::new(state.db);
    let sale = service.get_sale(sale_id).await?;
    Ok(Json(sale))
}

/// Move a sale through its status machine
pub async fn update_sale_status(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
    Json(input): Json<UpdateStatusInput>,
) -> AppResult<Json<StatusUpdateOutcome>> {
    let service = SaleService::new(state.db);
    let outcome = service.update_status(sale_id, input.status).await?;
    Ok(Json(outcome))
}

/// Mark a sale paid
pub async fn mark_sale_paid(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
) -> AppResult<Json<StatusUpdateOutcome>> {
    let service = SaleService::new(state.db);
    let outcome = service.mark_as_paid(sale_id).await?;
    Ok(Json(outcome))
}

/// Cancel a sale, restoring deducted stock
pub async fn cancel_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
) -> AppResult<Json<StatusUpdateOutcome>> {
    let service = SaleService::new(state.db);
    let outcome = service.cancel_sale(sale_id).await?;
    Ok(Json(outcome))
}
