use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{app_state::AppState, infrastructure::db};

pub mod credential_api;
pub mod middleware;
pub mod refresh_api;
pub mod response;
pub mod settings_api;
pub mod snapshot_api;
pub mod wallet_api;

use middleware::{jwt_extractor_middleware, request_id_middleware};

/// GET /healthz：进程存活 + 数据库可达
pub async fn healthz(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let database = match &state.pool {
        Some(pool) => match db::health_check(pool).await {
            Ok(()) => "ok",
            Err(e) => {
                tracing::warn!(error = %e, "Health check: database unreachable");
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "status": "degraded", "database": "unreachable" })),
                );
            }
        },
        None => "disabled",
    };

    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "database": database,
            "scheduler": state.scheduler.is_running().await,
        })),
    )
}

pub fn routes(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/api/v1/refresh", post(refresh_api::manual_refresh))
        .route("/api/v1/refresh/status", get(refresh_api::refresh_status))
        .route(
            "/api/v1/wallets",
            get(wallet_api::list_wallets).post(wallet_api::create_wallet),
        )
        .route("/api/v1/wallets/:id", delete(wallet_api::delete_wallet))
        .route("/api/v1/wallets/:id/refresh", post(refresh_api::refresh_wallet))
        .route(
            "/api/v1/wallets/:id/snapshots",
            get(snapshot_api::snapshot_history),
        )
        .route(
            "/api/v1/wallets/:id/snapshots/latest",
            get(snapshot_api::latest_snapshot),
        )
        .route(
            "/api/v1/portfolio/summary",
            get(snapshot_api::portfolio_summary),
        )
        .route("/api/v1/credentials", get(credential_api::list_credentials))
        .route(
            "/api/v1/credentials/:name",
            put(credential_api::store_credential).delete(credential_api::delete_credential),
        )
        .route(
            "/api/v1/settings/token-threshold",
            get(settings_api::get_token_threshold).put(settings_api::set_token_threshold),
        )
        .route_layer(from_fn_with_state(state.clone(), jwt_extractor_middleware));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
