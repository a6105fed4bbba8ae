//! 用户设置 API（代币展示阈值）

use std::sync::Arc;

use axum::{extract::State, Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    api::{
        middleware::AuthUser,
        response::{success_response, ApiResponse},
    },
    app_state::AppState,
    error::AppError,
};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenThreshold {
    pub threshold_usd: Decimal,
}

/// GET /api/v1/settings/token-threshold
pub async fn get_token_threshold(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<TokenThreshold>>, AppError> {
    success_response(TokenThreshold {
        threshold_usd: state.coordinator.token_threshold(auth.user_id).await,
    })
}

/// PUT /api/v1/settings/token-threshold
pub async fn set_token_threshold(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<TokenThreshold>,
) -> Result<Json<ApiResponse<TokenThreshold>>, AppError> {
    if req.threshold_usd.is_sign_negative() {
        return Err(AppError::validation_failed(
            "Token threshold must not be negative",
        ));
    }

    state
        .coordinator
        .set_token_threshold(auth.user_id, req.threshold_usd)
        .await?;
    tracing::info!(
        user_id = %auth.user_id,
        threshold_usd = %req.threshold_usd,
        "Token threshold updated"
    );

    success_response(req)
}
