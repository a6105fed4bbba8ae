//! 刷新 API：手动刷新、单钱包刷新、刷新状态

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    api::{
        middleware::AuthUser,
        response::{success_response, ApiResponse, PublicFetchError, RefreshResponse},
    },
    app_state::AppState,
    domain::{RefreshLog, RefreshStatus, RefreshTrigger, WalletBalanceData},
    error::AppError,
    repository::RateLimitDecision,
};

/// 状态页展示的最近日志条数
const STATUS_LOG_LIMIT: i64 = 10;

fn rate_limited(retry_after: Duration) -> AppError {
    let secs = retry_after.as_millis().div_ceil(1000);
    AppError::rate_limit_exceeded(
        format!(
            "Rate limited. Please wait {} seconds before refreshing again.",
            secs
        ),
        retry_after,
    )
}

async fn enforce_cooldown(state: &AppState, user_id: Uuid) -> Result<(), AppError> {
    match state.rate_limiter.check(user_id).await? {
        RateLimitDecision::Allowed => Ok(()),
        RateLimitDecision::Limited { retry_after } => Err(rate_limited(retry_after)),
    }
}

/// POST /api/v1/refresh
pub async fn manual_refresh(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<RefreshResponse>, AppError> {
    enforce_cooldown(&state, auth.user_id).await?;

    let result = state
        .coordinator
        .refresh_user(auth.user_id, RefreshTrigger::Manual)
        .await
        .map_err(|e| {
            tracing::error!(user_id = %auth.user_id, error = ?e, "Manual refresh failed");
            AppError::internal("Refresh failed")
        })?;

    Ok(Json(RefreshResponse::from(&result)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRefreshResponse {
    pub success: bool,
    pub wallet: Option<WalletBalanceData>,
    pub error: Option<PublicFetchError>,
}

/// POST /api/v1/wallets/:id/refresh
pub async fn refresh_wallet(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(wallet_id): Path<Uuid>,
) -> Result<Json<ApiResponse<WalletRefreshResponse>>, AppError> {
    // 不存在的钱包不消耗冷却窗口
    if state
        .coordinator
        .find_owned_wallet(auth.user_id, wallet_id)
        .await?
        .is_none()
    {
        return Err(AppError::wallet_not_found("Wallet not found"));
    }
    enforce_cooldown(&state, auth.user_id).await?;

    let outcome = state
        .coordinator
        .refresh_single_wallet(auth.user_id, wallet_id)
        .await?
        .ok_or_else(|| AppError::wallet_not_found("Wallet not found"))?;

    let response = match outcome {
        Ok(data) => WalletRefreshResponse {
            success: true,
            wallet: Some(data),
            error: None,
        },
        Err(e) => {
            tracing::warn!(
                wallet_id = %wallet_id,
                kind = %e.kind,
                error = %e.message,
                "Single wallet refresh failed"
            );
            WalletRefreshResponse {
                success: false,
                wallet: None,
                error: Some(PublicFetchError::from(&e)),
            }
        }
    };

    success_response(response)
}

/// 对外的刷新日志（错误只保留网络与消息）
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshLogView {
    pub id: Uuid,
    pub trigger: RefreshTrigger,
    pub status: RefreshStatus,
    pub wallets_attempted: i32,
    pub wallets_succeeded: i32,
    pub wallets_failed: i32,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
    pub errors: Vec<PublicFetchError>,
}

impl From<RefreshLog> for RefreshLogView {
    fn from(log: RefreshLog) -> Self {
        Self {
            errors: log.errors.iter().map(PublicFetchError::from).collect(),
            id: log.id,
            trigger: log.trigger,
            status: log.status,
            wallets_attempted: log.wallets_attempted,
            wallets_succeeded: log.wallets_succeeded,
            wallets_failed: log.wallets_failed,
            duration_ms: log.duration_ms,
            created_at: log.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshStatusResponse {
    pub scheduler_running: bool,
    pub cron: Option<String>,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub is_refreshing: bool,
    pub recent_logs: Vec<RefreshLogView>,
}

/// GET /api/v1/refresh/status
pub async fn refresh_status(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<RefreshStatusResponse>>, AppError> {
    let scheduler = &state.scheduler;
    let logs = state
        .coordinator
        .recent_refresh_logs(Some(auth.user_id), STATUS_LOG_LIMIT)
        .await?;

    success_response(RefreshStatusResponse {
        scheduler_running: scheduler.is_running().await,
        cron: scheduler.cron().await,
        next_run: scheduler.next_run().await,
        last_run: scheduler.last_run().await,
        is_refreshing: state.coordinator.is_refreshing(),
        recent_logs: logs.into_iter().map(RefreshLogView::from).collect(),
    })
}
