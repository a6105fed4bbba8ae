//! 快照查询 API

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::{
        middleware::AuthUser,
        response::{success_response, ApiResponse},
    },
    app_state::AppState,
    domain::{BalanceSnapshot, PortfolioSummary},
    error::AppError,
};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

async fn ensure_owned(state: &AppState, user_id: Uuid, wallet_id: Uuid) -> Result<(), AppError> {
    state
        .coordinator
        .find_owned_wallet(user_id, wallet_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::wallet_not_found("Wallet not found"))
}

/// GET /api/v1/wallets/:id/snapshots/latest
pub async fn latest_snapshot(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(wallet_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Option<BalanceSnapshot>>>, AppError> {
    ensure_owned(&state, auth.user_id, wallet_id).await?;
    success_response(state.coordinator.latest_snapshot(wallet_id).await?)
}

/// GET /api/v1/wallets/:id/snapshots?limit=
pub async fn snapshot_history(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(wallet_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<BalanceSnapshot>>>, AppError> {
    ensure_owned(&state, auth.user_id, wallet_id).await?;
    success_response(
        state
            .coordinator
            .snapshot_history(wallet_id, query.limit)
            .await?,
    )
}

/// GET /api/v1/portfolio/summary
pub async fn portfolio_summary(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<PortfolioSummary>>, AppError> {
    success_response(state.coordinator.portfolio_summary(auth.user_id).await?)
}
