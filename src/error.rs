use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppErrorCode {
    // HTTP 基础错误码
    BadRequest,
    Unauthorized,
    NotFound,
    Internal,

    // 业务错误码
    WalletNotFound,
    WalletAlreadyExists,
    InvalidAddress,
    ChainNotSupported,
    TokenExpired,
    TokenInvalid,
    RateLimitExceeded,
    ValidationFailed,
    DatabaseError,
}

impl AppErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppErrorCode::BadRequest => "bad_request",
            AppErrorCode::Unauthorized => "unauthorized",
            AppErrorCode::NotFound => "not_found",
            AppErrorCode::Internal => "internal",
            AppErrorCode::WalletNotFound => "wallet_not_found",
            AppErrorCode::WalletAlreadyExists => "wallet_already_exists",
            AppErrorCode::InvalidAddress => "invalid_address",
            AppErrorCode::ChainNotSupported => "chain_not_supported",
            AppErrorCode::TokenExpired => "token_expired",
            AppErrorCode::TokenInvalid => "token_invalid",
            AppErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            AppErrorCode::ValidationFailed => "validation_failed",
            AppErrorCode::DatabaseError => "database_error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub code: AppErrorCode,
    pub message: String,
    pub status: StatusCode,
    /// 仅限流错误携带，用于 Retry-After
    pub retry_after: Option<Duration>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(rename = "retryAfterMs", skip_serializing_if = "Option::is_none")]
    retry_after_ms: Option<u64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code.as_str(),
            message: &self.message,
            retry_after_ms: self.retry_after.map(|d| d.as_millis() as u64),
        };
        let mut response = (self.status, Json(body)).into_response();

        if let Some(retry_after) = self.retry_after {
            // 秒数向上取整
            let secs = retry_after.as_millis().div_ceil(1000);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

impl AppError {
    fn with_code(code: AppErrorCode, status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            status,
            retry_after: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_code(AppErrorCode::BadRequest, StatusCode::BAD_REQUEST, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::with_code(AppErrorCode::NotFound, StatusCode::NOT_FOUND, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_code(
            AppErrorCode::Internal,
            StatusCode::INTERNAL_SERVER_ERROR,
            msg,
        )
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::with_code(AppErrorCode::Unauthorized, StatusCode::UNAUTHORIZED, msg)
    }

    // 业务错误辅助函数
    pub fn wallet_not_found(msg: impl Into<String>) -> Self {
        Self::with_code(AppErrorCode::WalletNotFound, StatusCode::NOT_FOUND, msg)
    }

    pub fn wallet_already_exists(msg: impl Into<String>) -> Self {
        Self::with_code(AppErrorCode::WalletAlreadyExists, StatusCode::CONFLICT, msg)
    }

    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::with_code(AppErrorCode::InvalidAddress, StatusCode::BAD_REQUEST, msg)
    }

    pub fn chain_not_supported(msg: impl Into<String>) -> Self {
        Self::with_code(AppErrorCode::ChainNotSupported, StatusCode::BAD_REQUEST, msg)
    }

    pub fn token_expired(msg: impl Into<String>) -> Self {
        Self::with_code(AppErrorCode::TokenExpired, StatusCode::UNAUTHORIZED, msg)
    }

    pub fn token_invalid(msg: impl Into<String>) -> Self {
        Self::with_code(AppErrorCode::TokenInvalid, StatusCode::UNAUTHORIZED, msg)
    }

    /// 429，附带剩余等待时间
    pub fn rate_limit_exceeded(msg: impl Into<String>, retry_after: Duration) -> Self {
        Self {
            retry_after: Some(retry_after),
            ..Self::with_code(
                AppErrorCode::RateLimitExceeded,
                StatusCode::TOO_MANY_REQUESTS,
                msg,
            )
        }
    }

    pub fn validation_failed(msg: impl Into<String>) -> Self {
        Self::with_code(AppErrorCode::ValidationFailed, StatusCode::BAD_REQUEST, msg)
    }

    pub fn database_error(msg: impl Into<String>) -> Self {
        Self::with_code(
            AppErrorCode::DatabaseError,
            StatusCode::INTERNAL_SERVER_ERROR,
            msg,
        )
    }
}

// 从 SQLx 错误转换
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found("Resource not found"),
            sqlx::Error::Database(ref db_err) => {
                if db_err.code().as_deref() == Some("23505") {
                    // PostgreSQL unique_violation
                    return Self::wallet_already_exists("Resource already exists");
                }
                tracing::error!(error = %db_err, "Database error");
                Self::database_error("Database error")
            }
            _ => {
                tracing::error!(error = %err, "Database operation failed");
                Self::database_error("Database operation failed")
            }
        }
    }
}

// 从 UUID 错误转换
impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        Self::bad_request(format!("Invalid UUID: {}", err))
    }
}

// 从 anyhow 错误转换
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = ?err, "Unhandled internal error");
        Self::internal("Internal server error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_sets_retry_after_header() {
        let response =
            AppError::rate_limit_exceeded("slow down", Duration::from_millis(42_100))
                .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "43"
        );
    }

    #[test]
    fn test_plain_error_has_no_retry_after() {
        let response = AppError::not_found("missing").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }
}
