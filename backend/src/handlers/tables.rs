//! HTTP handlers for dining table endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use shared::{DiningTable, TableStatus};

use crate::error::AppResult;
use crate::services::table::{CreateTableInput, OccupyTableInput, TableService};
use crate::AppState;

/// Query parameters for listing tables
#[derive(Debug, Default, Deserialize)]
pub struct TableListQuery {
    pub status: Option<TableStatus>,
}

/// Create a table
pub async fn create_table(
    State(state): State<AppState>,
    Json(input): Json<CreateTableInput>,
) -> AppResult<Json<DiningTable>> {
    let service = TableService::new(state.db);
    let table = service.create_table(input).await?;
    Ok(Json(table))
}

/// List tables
pub async fn list_tables(
    State(state): State<AppState>,
    Query(query): Query<TableListQuery>,
) -> AppResult<Json<Vec<DiningTable>>> {
    let service = TableService::new(state.db);
    let tables = service.list_tables(query.status).await?;
    Ok(Json(tables))
}

/// Get a table
pub async fn get_table(
    State(state): State<AppState>,
    Path(table_id): Path<Uuid>,
) -> AppResult<Json<DiningTable>> {
    let service = TableService::new(state.db);
    let table = service.get_table(table_id).await?;
    Ok(Json(table))
}

/// Occupy a table
pub async fn occupy_table(
    State(state): State<AppState>,
    Path(table_id): Path<Uuid>,
    Json(input): Json<OccupyTableInput>,
) -> AppResult<Json<DiningTable>> {
    let service = TableService::new(state.db);
    let table = service.occupy_table(table_id, input).await?;
    Ok(Json(table))
}

/// Release a table
pub async fn release_table(
    State(state): State<AppState>,
    Path(table_id): Path<Uuid>,
) -> AppResult<Json<DiningTable>> {
    let service = TableService::new(state.db);
    let table = service.release_table(table_id).await?;
    Ok(Json(table))
}
