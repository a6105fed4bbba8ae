//! 统一 API 响应格式
//!
//! 查询类接口使用 { code, message, data }；手动刷新接口直接返回运行摘要

use axum::Json;
use serde::Serialize;

use crate::{
    domain::{FetchError, Network, RefreshResult, RefreshStatus},
    error::AppError,
};

/// 统一成功响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            message: "success".to_string(),
            data,
        }
    }
}

/// 辅助函数：将数据包装为统一响应格式
pub fn success_response<T: Serialize>(data: T) -> Result<Json<ApiResponse<T>>, AppError> {
    Ok(Json(ApiResponse::success(data)))
}

/// 对外的错误条目：只有网络与消息，provider 原始信息不出站
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicFetchError {
    pub network: Network,
    pub message: String,
}

impl From<&FetchError> for PublicFetchError {
    fn from(err: &FetchError) -> Self {
        Self {
            network: err.network,
            message: err.message.clone(),
        }
    }
}

/// 手动刷新响应体；运行跑完即 success，结果好坏看 status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    pub status: RefreshStatus,
    pub wallets_attempted: usize,
    pub wallets_succeeded: usize,
    pub wallets_failed: usize,
    pub duration_ms: u64,
    pub errors: Vec<PublicFetchError>,
}

impl From<&RefreshResult> for RefreshResponse {
    fn from(result: &RefreshResult) -> Self {
        Self {
            success: true,
            status: result.status,
            wallets_attempted: result.wallets_attempted,
            wallets_succeeded: result.wallets_succeeded,
            wallets_failed: result.wallets_failed,
            duration_ms: result.duration_ms,
            errors: result.errors.iter().map(PublicFetchError::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::{FetchErrorKind, RefreshTrigger};

    #[test]
    fn test_refresh_response_redacts_details() {
        let error = FetchError::new(
            Uuid::new_v4(),
            "0xabc",
            Network::Ethereum,
            FetchErrorKind::ApiError,
            "HTTP 500",
        )
        .with_details(Some("{\"raw\":\"upstream body\"}".into()));
        let result =
            RefreshResult::from_outcomes(RefreshTrigger::Manual, Vec::new(), vec![error], 42);

        let body = serde_json::to_value(RefreshResponse::from(&result)).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["status"], "complete_failure");
        assert_eq!(body["walletsFailed"], 1);
        assert_eq!(body["durationMs"], 42);
        assert_eq!(
            body["errors"],
            serde_json::json!([{ "network": "ethereum", "message": "HTTP 500" }])
        );
    }

    #[test]
    fn test_empty_run_response() {
        let body =
            serde_json::to_value(RefreshResponse::from(&RefreshResult::empty(RefreshTrigger::Manual)))
                .unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["walletsAttempted"], 0);
        assert_eq!(body["errors"], serde_json::json!([]));
    }
}
