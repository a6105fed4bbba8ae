//! HTTP / JSON-RPC 公共调用

use std::str::FromStr;

use rust_decimal::{prelude::FromPrimitive, Decimal};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::ProviderError;
use crate::infrastructure::logging::redact_url;

/// 发送请求，只处理传输层错误
pub async fn send(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, ProviderError> {
    request
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(provider, e))
}

/// 非 2xx 转为 ProviderError
pub fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        tracing::warn!(
            provider,
            status = status.as_u16(),
            url = %redact_url(response.url().as_str()),
            "Provider returned error status"
        );
        Err(ProviderError::from_status(provider, status))
    }
}

/// 解析 JSON 响应体
pub async fn read_json<T: DeserializeOwned>(
    provider: &str,
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let body = response
        .bytes()
        .await
        .map_err(|e| ProviderError::from_reqwest(provider, e))?;

    serde_json::from_slice(&body)
        .map_err(|e| ProviderError::parse(format!("Invalid {} response: {}", provider, e)))
}

/// GET 并解析 JSON
pub async fn get_json<T: DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, ProviderError> {
    let response = check_status(provider, send(provider, request).await?)?;
    read_json(provider, response).await
}

/// JSON-RPC 2.0 调用；error 信封转为 api_error 并保留原始 error 对象
pub async fn json_rpc_call<T: DeserializeOwned>(
    provider: &str,
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Value,
) -> Result<T, ProviderError> {
    let request_body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });

    tracing::debug!(provider, method, url = %redact_url(url), "JSON-RPC call");

    let response = check_status(provider, send(provider, client.post(url).json(&request_body)).await?)?;
    let mut envelope: Value = read_json(provider, response).await?;

    if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("RPC error")
            .to_string();
        return Err(ProviderError::api(message).with_details(error.clone()));
    }

    let result = envelope
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| ProviderError::parse(format!("Missing result in {} response", method)))?;

    serde_json::from_value(result)
        .map_err(|e| ProviderError::parse(format!("Invalid {} result: {}", method, e)))
}

/// JSON 数字 → Decimal（兼容科学计数法）
pub fn decimal_from_number(number: &serde_json::Number) -> Option<Decimal> {
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
        .or_else(|| number.as_f64().and_then(Decimal::from_f64))
}

/// JSON 值 → Decimal（数字或数字字符串）
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => decimal_from_number(n),
        Value::String(s) => Decimal::from_str(s)
            .or_else(|_| Decimal::from_scientific(s))
            .ok(),
        _ => None,
    }
}
