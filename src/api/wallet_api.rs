//! 钱包登记 API

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
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
    domain::{Network, Wallet},
    error::AppError,
};

#[derive(Debug, Deserialize)]
pub struct CreateWalletRequest {
    pub network: String,
    pub address: String,
    pub name: Option<String>,
}

/// POST /api/v1/wallets
pub async fn create_wallet(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<CreateWalletRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Wallet>>), AppError> {
    let network: Network = req
        .network
        .parse()
        .map_err(|_| AppError::chain_not_supported(format!("Unsupported network: {}", req.network)))?;

    let wallet = state
        .wallets
        .create_wallet(auth.user_id, network, req.address.trim(), req.name)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(wallet))))
}

/// GET /api/v1/wallets
pub async fn list_wallets(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<Wallet>>>, AppError> {
    success_response(state.wallets.list_wallets(auth.user_id).await?)
}

/// DELETE /api/v1/wallets/:id
pub async fn delete_wallet(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(wallet_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.wallets.delete_wallet(auth.user_id, wallet_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
