//! HTTP handlers for credit account endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use shared::{CreditAccount, CreditTransaction};

use crate::error::AppResult;
use crate::services::credit::{
    AccountFilter, AddAdjustmentInput, AddPaymentInput, AdjustmentOutcome, BalanceReconciliation,
    CreateAccountInput, CreditService, CreditStatistics, PaymentOutcome, TransactionFilter,
    UpdateAccountInput,
};
use crate::AppState;

/// Create a credit account
pub async fn create_account(
    State(state): State<AppState>,
    Json(input): Json<CreateAccountInput>,
) -> AppResult<Json<CreditAccount>> {
    let service = CreditService::new(state.db);
    let account = service.create_account(input).await?;
    Ok(Json(account))
}

/// List credit accounts
pub async fn list_accounts(
    State(state): State<AppState>,
    Query(filter): Query<AccountFilter>,
) -> AppResult<Json<Vec<CreditAccount>>> {
    let service = CreditService::new(state.db);
    let accounts = service.list_accounts(filter).await?;
    Ok(Json(accounts))
}

/// Get a credit account
pub async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<CreditAccount>> {
    let service = CreditService::new(state.db);
    let account = service.get_account(account_id).await?;
    Ok(Json(account))
}

/// Update a credit account
pub async fn update_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    Json(input): Json<UpdateAccountInput>,
) -> AppResult<Json<CreditAccount>> {
    let service = CreditService::new(state.db);
    let account = service.update_account(account_id, input).await?;
    Ok(Json(account))
}

/// Close a credit account (soft delete)
pub async fn close_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<CreditAccount>> {
    let service = CreditService::new(state.db);
    let account = service.close_account(account_id).await?;
    Ok(Json(account))
}

/// Record a payment and settle outstanding sales oldest-first
pub async fn add_payment(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    Json(input): Json<AddPaymentInput>,
) -> AppResult<Json<PaymentOutcome>> {
    let service = CreditService::new(state.db);
    let outcome = service.add_payment(account_id, input).await?;
    Ok(Json(outcome))
}

/// Record a manual adjustment
pub async fn add_adjustment(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    Json(input): Json<AddAdjustmentInput>,
) -> AppResult<Json<AdjustmentOutcome>> {
    let service = CreditService::new(state.db);
    let outcome = service.add_adjustment(account_id, input).await?;
    Ok(Json(outcome))
}

/// Verify an account balance against its ledger
pub async fn reconcile_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<BalanceReconciliation>> {
    let service = CreditService::new(state.db);
    let report = service.reconcile_balance(account_id).await?;
    Ok(Json(report))
}

/// List ledger entries
pub async fn list_credit_transactions(
    State(state): State<AppState>,
    Query(filter): Query<TransactionFilter>,
) -> AppResult<Json<Vec<CreditTransaction>>> {
    let service = CreditService::new(state.db);
    let transactions = service.list_transactions(filter).await?;
    Ok(Json(transactions))
}

/// Global credit statistics
pub async fn credit_statistics(
    State(state): State<AppState>,
) -> AppResult<Json<CreditStatistics>> {
    let service = CreditService::new(state.db);
    let stats = service.statistics().await?;
    Ok(Json(stats))
}
