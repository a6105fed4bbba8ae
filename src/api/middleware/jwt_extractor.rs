//! JWT 认证中间件
//! 从 Authorization: Bearer 中取出 user_id（claims.sub）注入 request extensions

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, Method},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{app_state::AppState, error::AppError, infrastructure::jwt};

/// JWT 认证上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn jwt_extractor_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // OPTIONS 请求直接放行
    if req.method() == Method::OPTIONS {
        return Ok(next.run(req).await);
    }

    let token = bearer_token(&req).ok_or_else(|| {
        tracing::debug!(path = %req.uri().path(), "JWT middleware: missing bearer token");
        AppError::unauthorized("Missing bearer token")
    })?;

    let claims = jwt::verify_token(token, &state.config.jwt.secret).map_err(|e| {
        if e.to_string().contains("ExpiredSignature") {
            AppError::token_expired("Token expired")
        } else {
            AppError::token_invalid("Invalid token")
        }
    })?;

    let user_id = claims.user_id().map_err(|e| {
        tracing::warn!(error = %e, "JWT middleware: invalid subject");
        AppError::token_invalid("Invalid token subject")
    })?;

    req.extensions_mut().insert(AuthUser { user_id });
    Ok(next.run(req).await)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }
}
