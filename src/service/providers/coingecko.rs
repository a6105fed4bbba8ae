//! CoinGecko 价格适配器
//!
//! 没有 key 走公共 API；有 key 走 Pro API 并带 `x-cg-pro-api-key` 头。
//! 代币价格按批查询，批次之间固定间隔，避免触发公共 API 限流

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;

use super::{rpc, PriceProvider, ProviderError};
use crate::domain::{FetchErrorKind, Network};

const PROVIDER: &str = "CoinGecko";
const PRO_KEY_HEADER: &str = "x-cg-pro-api-key";

pub struct CoinGeckoProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    batch_size: usize,
    batch_delay: Duration,
}

impl CoinGeckoProvider {
    pub fn free(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            batch_size: 100,
            batch_delay: Duration::from_millis(200),
        }
    }

    pub fn pro(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            api_key: Some(api_key.to_string()),
            ..Self::free(client, base_url)
        }
    }

    pub fn with_batching(mut self, batch_size: usize, batch_delay: Duration) -> Self {
        self.batch_size = batch_size.max(1);
        self.batch_delay = batch_delay;
        self
    }

    async fn get(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Value, ProviderError> {
        let mut request = self
            .client
            .get(format!("{}{}", self.base_url, endpoint))
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query);
        if let Some(key) = &self.api_key {
            request = request.header(PRO_KEY_HEADER, key);
        }

        let response = rpc::send(PROVIDER, request).await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::new(FetchErrorKind::NotFound, "Token not found"));
        }
        let response = rpc::check_status(PROVIDER, response)?;
        rpc::read_json(PROVIDER, response).await
    }
}

/// `{id: {usd: price}}` 中取出 usd 价格
fn usd_price(entry: Option<&Value>) -> Option<Decimal> {
    entry.and_then(|e| e.get("usd")).and_then(rpc::decimal_from_value)
}

#[async_trait]
impl PriceProvider for CoinGeckoProvider {
    async fn get_native_price(&self, network: Network) -> Result<Decimal, ProviderError> {
        let coin_id = network.coingecko_native_id();
        let data = self
            .get("/simple/price", &[("ids", coin_id), ("vs_currencies", "usd")])
            .await?;

        usd_price(data.get(coin_id)).ok_or_else(|| {
            ProviderError::new(
                FetchErrorKind::NotFound,
                format!("Price not found for {}", network),
            )
        })
    }

    async fn get_token_prices(
        &self,
        network: Network,
        addresses: &[String],
    ) -> Result<HashMap<String, Decimal>, ProviderError> {
        let mut prices = HashMap::new();
        if addresses.is_empty() {
            return Ok(prices);
        }

        let platform = network
            .coingecko_platform_id()
            .ok_or_else(|| ProviderError::api(format!("Unsupported network: {}", network)))?;
        let endpoint = format!("/simple/token_price/{}", platform);

        let batches: Vec<&[String]> = addresses.chunks(self.batch_size).collect();
        let batch_count = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            let joined = batch.join(",");
            let data = self
                .get(
                    &endpoint,
                    &[("contract_addresses", joined.as_str()), ("vs_currencies", "usd")],
                )
                .await?;

            if let Some(entries) = data.as_object() {
                for (address, entry) in entries {
                    if let Some(price) = usd_price(Some(entry)) {
                        prices.insert(address.to_lowercase(), price);
                    }
                }
            }

            if index + 1 < batch_count && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        tracing::debug!(
            network = %network,
            requested = addresses.len(),
            priced = prices.len(),
            "Fetched CoinGecko token prices"
        );

        Ok(prices)
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        self.get("/ping", &[]).await.map(|_| ())
    }
}
