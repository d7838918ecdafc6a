use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::models::*;
use crate::error::{AppError, AppResult};
use crate::ledger::models::TransactionStatus;
use crate::ledger::TransactionStore;
use crate::reconciler::{MetricsSnapshot, SharedReconcilerMetrics};

const DEFAULT_STUCK_LIMIT: i64 = 50;
const MAX_STUCK_LIMIT: i64 = 500;

#[derive(Clone)]
pub struct AppState {
    pub transactions: Arc<dyn TransactionStore>,
    pub metrics: Arc<SharedReconcilerMetrics>,
}

/// Liveness check
/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        passes_completed: state.metrics.passes_completed(),
    })
}

/// Reconciler counters
/// GET /api/v1/reconciler/status
pub async fn get_reconciler_status(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// Transactions parked after exhausting their retries
/// GET /api/v1/transactions/stuck?limit=N
pub async fn list_stuck_transactions(
    State(state): State<AppState>,
    Query(query): Query<StuckQuery>,
) -> AppResult<Json<StuckTransactionsResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_STUCK_LIMIT);
    if limit <= 0 {
        return Err(AppError::InvalidInput(
            "limit must be greater than zero".to_string(),
        ));
    }

    let stuck = state
        .transactions
        .list_by_status(TransactionStatus::Stuck, limit.min(MAX_STUCK_LIMIT))
        .await?;

    info!("Listing {} stuck transactions", stuck.len());

    Ok(Json(StuckTransactionsResponse {
        count: stuck.len(),
        transactions: stuck.into_iter().map(TransactionResponse::from).collect(),
    }))
}

/// GET /api/v1/transactions/:id
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TransactionResponse>> {
    let transaction = state.transactions.get_transaction(id).await?;
    Ok(Json(TransactionResponse::from(transaction)))
}
