//! provider 凭据 API：只返回掩码，明文从不出站

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    api::{
        middleware::AuthUser,
        response::{success_response, ApiResponse},
    },
    app_state::AppState,
    domain::Network,
    error::AppError,
    service::{
        credential_vault::{probe_credential, required_credential, KNOWN_CREDENTIALS},
        CredentialVault,
    },
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatus {
    pub name: &'static str,
    /// 已存储（即使无法解密）
    pub configured: bool,
    /// 无法解密时为 None，需要重新录入
    pub masked: Option<String>,
    pub networks: Vec<Network>,
}

fn networks_for(name: &str) -> Vec<Network> {
    Network::ALL
        .into_iter()
        .filter(|n| required_credential(*n) == Some(name))
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct StoreCredentialRequest {
    pub value: String,
}

fn known_name(name: &str) -> Result<&'static str, AppError> {
    KNOWN_CREDENTIALS
        .into_iter()
        .find(|known| *known == name)
        .ok_or_else(|| AppError::not_found(format!("Unknown credential: {}", name)))
}

/// GET /api/v1/credentials
pub async fn list_credentials(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<CredentialStatus>>>, AppError> {
    let mut statuses = Vec::with_capacity(KNOWN_CREDENTIALS.len());
    for name in KNOWN_CREDENTIALS {
        let configured = state.vault.exists(auth.user_id, name).await?;
        let masked = if configured {
            state
                .vault
                .retrieve(auth.user_id, name)
                .await?
                .as_deref()
                .map(CredentialVault::mask)
        } else {
            None
        };
        statuses.push(CredentialStatus {
            name,
            configured,
            masked,
            networks: networks_for(name),
        });
    }
    success_response(statuses)
}

/// PUT /api/v1/credentials/:name
///
/// 先用 provider 的探测接口验证，通过后才加密保存
pub async fn store_credential(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(name): Path<String>,
    Json(req): Json<StoreCredentialRequest>,
) -> Result<Json<ApiResponse<CredentialStatus>>, AppError> {
    let name = known_name(&name)?;
    let value = req.value.trim();
    if value.is_empty() {
        return Err(AppError::validation_failed("Credential value must not be empty"));
    }

    if let Err(e) = probe_credential(state.provider_factory.as_ref(), name, value).await {
        tracing::info!(
            user_id = %auth.user_id,
            key_name = name,
            kind = %e.kind,
            "Credential probe failed"
        );
        return Err(AppError::validation_failed(format!(
            "Credential check failed: {}",
            e.message
        )));
    }

    state.vault.store(auth.user_id, name, value).await?;

    success_response(CredentialStatus {
        name,
        configured: true,
        masked: Some(CredentialVault::mask(value)),
        networks: networks_for(name),
    })
}

/// DELETE /api/v1/credentials/:name
pub async fn delete_credential(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    let name = known_name(&name)?;
    if state.vault.delete(auth.user_id, name).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("Credential not configured"))
    }
}
