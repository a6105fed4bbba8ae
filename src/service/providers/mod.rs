//! 上游数据源适配层
//!
//! 每个 provider 把各自的传输错误归一到 `FetchErrorKind`，
//! 上层只依赖 `BalanceProvider` / `PriceProvider` 两个 trait，不关心具体来源

pub mod alchemy;
pub mod blockstream;
pub mod coingecko;
pub mod helius;
pub mod rpc;

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use rust_decimal::Decimal;

pub use alchemy::AlchemyProvider;
pub use blockstream::BlockstreamProvider;
pub use coingecko::CoinGeckoProvider;
pub use helius::HeliusProvider;

use crate::{
    config::ProvidersConfig,
    domain::{FetchErrorKind, Network, RawBalance, RawTokenBalance},
};

/// provider 层统一错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: FetchErrorKind,
    pub message: String,
    /// provider 原始错误（JSON-RPC error 对象等）
    pub details: Option<serde_json::Value>,
}

impl ProviderError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::ApiError, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::ParseError, message)
    }

    /// HTTP 非 2xx：429 → rate_limit，其余 → api_error
    pub fn from_status(provider: &str, status: reqwest::StatusCode) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Self::new(
                FetchErrorKind::RateLimit,
                format!("Rate limited by {}", provider),
            )
        } else {
            Self::api(format!("HTTP {}", status.as_u16()))
        }
    }

    /// 传输层错误分类（去掉 URL，避免把 API key 带进日志）
    pub fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(provider, status);
        }

        let kind = if err.is_timeout() {
            FetchErrorKind::Timeout
        } else if err.is_decode() {
            FetchErrorKind::ParseError
        } else {
            FetchErrorKind::NetworkError
        };
        Self::new(kind, format!("{} request failed: {}", provider, err.without_url()))
    }

    /// 落库用的原始信息
    pub fn details_string(&self) -> Option<String> {
        self.details.as_ref().map(|d| d.to_string())
    }
}

/// 余额数据源：原生币 + 代币
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_native_balance(&self, address: &str) -> Result<RawBalance, ProviderError>;

    /// 没有代币概念的网络返回空列表
    async fn fetch_token_balances(
        &self,
        address: &str,
    ) -> Result<Vec<RawTokenBalance>, ProviderError>;

    /// 连接探测（保存 key 前验证）
    async fn test_connection(&self) -> Result<(), ProviderError>;
}

/// USD 价格数据源
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn get_native_price(&self, network: Network) -> Result<Decimal, ProviderError>;

    /// 返回的 key 统一为小写合约地址；查不到价格的地址不出现在结果中
    async fn get_token_prices(
        &self,
        network: Network,
        addresses: &[String],
    ) -> Result<HashMap<String, Decimal>, ProviderError>;

    async fn test_connection(&self) -> Result<(), ProviderError>;
}

/// 一次运行中某个用户的 provider 凭据（已解密）
#[derive(Clone, Default)]
pub struct ProviderCredentials {
    pub alchemy_api_key: Option<String>,
    pub helius_api_key: Option<String>,
    pub coingecko_api_key: Option<String>,
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "***" } else { "<none>" };
        f.debug_struct("ProviderCredentials")
            .field("alchemy_api_key", &mask(&self.alchemy_api_key))
            .field("helius_api_key", &mask(&self.helius_api_key))
            .field("coingecko_api_key", &mask(&self.coingecko_api_key))
            .finish()
    }
}

/// 按网络与凭据构造 provider
pub trait ProviderFactory: Send + Sync {
    /// 缺少必需 key 时返回 api_error，不发起任何请求
    fn balance_provider(
        &self,
        network: Network,
        credentials: &ProviderCredentials,
    ) -> Result<Arc<dyn BalanceProvider>, ProviderError>;

    fn price_provider(&self, credentials: &ProviderCredentials) -> Arc<dyn PriceProvider>;
}

/// 基于 reqwest 的默认实现，所有 provider 共享一个连接池
pub struct HttpProviderFactory {
    client: reqwest::Client,
    config: ProvidersConfig,
}

impl HttpProviderFactory {
    pub fn new(config: ProvidersConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self { client, config })
    }

    fn non_empty(key: &Option<String>) -> Option<&str> {
        key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn balance_provider(
        &self,
        network: Network,
        credentials: &ProviderCredentials,
    ) -> Result<Arc<dyn BalanceProvider>, ProviderError> {
        match network {
            Network::Bitcoin => Ok(Arc::new(BlockstreamProvider::new(
                self.client.clone(),
                &self.config.blockstream_url,
            ))),
            Network::Solana => {
                let api_key = Self::non_empty(&credentials.helius_api_key)
                    .ok_or_else(|| ProviderError::api("Helius API key not configured"))?;
                Ok(Arc::new(HeliusProvider::new(
                    self.client.clone(),
                    &self.config.helius_url,
                    api_key,
                )))
            }
            Network::Ethereum | Network::Arbitrum | Network::Base | Network::Polygon => {
                let api_key = Self::non_empty(&credentials.alchemy_api_key)
                    .ok_or_else(|| ProviderError::api("Alchemy API key not configured"))?;
                Ok(Arc::new(AlchemyProvider::new(
                    self.client.clone(),
                    &self.config.alchemy_url_template,
                    network,
                    api_key,
                    self.config.token_metadata_batch_size,
                )?))
            }
        }
    }

    fn price_provider(&self, credentials: &ProviderCredentials) -> Arc<dyn PriceProvider> {
        let provider = match Self::non_empty(&credentials.coingecko_api_key) {
            Some(key) => {
                CoinGeckoProvider::pro(self.client.clone(), &self.config.coingecko_pro_url, key)
            }
            None => CoinGeckoProvider::free(self.client.clone(), &self.config.coingecko_url),
        };

        Arc::new(provider.with_batching(
            self.config.price_batch_size,
            Duration::from_millis(self.config.price_batch_delay_ms),
        ))
    }
}
