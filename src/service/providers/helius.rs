//! Helius（Solana）余额适配器，代币走 DAS `getAssetsByOwner`

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{rpc, BalanceProvider, ProviderError};
use crate::domain::{Network, RawBalance, RawTokenBalance};

const PROVIDER: &str = "Helius";
const DEFAULT_SPL_DECIMALS: u32 = 9;

pub struct HeliusProvider {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct BalanceValue {
    value: serde_json::Number,
}

#[derive(Debug, Deserialize)]
struct AssetsPage {
    #[serde(default)]
    items: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    id: String,
    #[serde(default)]
    interface: String,
    content: Option<AssetContent>,
    token_info: Option<AssetTokenInfo>,
}

#[derive(Debug, Deserialize)]
struct AssetContent {
    metadata: Option<AssetMetadata>,
    links: Option<AssetLinks>,
}

#[derive(Debug, Deserialize)]
struct AssetMetadata {
    name: Option<String>,
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssetLinks {
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssetTokenInfo {
    balance: Option<serde_json::Number>,
    decimals: Option<u32>,
    symbol: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

impl Asset {
    fn is_fungible(&self) -> bool {
        matches!(self.interface.as_str(), "FungibleToken" | "FungibleAsset")
    }

    /// 余额为正时返回整数字符串
    fn positive_balance(&self) -> Option<String> {
        let balance = self.token_info.as_ref()?.balance.as_ref()?;
        let text = balance.to_string();
        let positive = match balance.as_u64() {
            Some(v) => v > 0,
            None => balance.as_f64().map(|v| v > 0.0).unwrap_or(false),
        };
        positive.then_some(text)
    }

    fn into_token(self) -> Option<RawTokenBalance> {
        let amount = self.positive_balance()?;
        let metadata = self.content.as_ref().and_then(|c| c.metadata.as_ref());
        let info = self.token_info.as_ref();

        let symbol = non_empty(info.and_then(|i| i.symbol.as_ref()))
            .or_else(|| non_empty(metadata.and_then(|m| m.symbol.as_ref())))
            .unwrap_or_else(|| "???".to_string());

        Some(RawTokenBalance {
            symbol,
            name: non_empty(metadata.and_then(|m| m.name.as_ref())),
            decimals: info
                .and_then(|i| i.decimals)
                .filter(|d| *d > 0)
                .unwrap_or(DEFAULT_SPL_DECIMALS),
            amount,
            logo_url: non_empty(
                self.content
                    .as_ref()
                    .and_then(|c| c.links.as_ref())
                    .and_then(|l| l.image.as_ref()),
            ),
            contract_address: self.id,
        })
    }
}

impl HeliusProvider {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            url: format!("{}/?api-key={}", base_url.trim_end_matches('/'), api_key),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, ProviderError> {
        rpc::json_rpc_call(PROVIDER, &self.client, &self.url, method, params).await
    }
}

#[async_trait]
impl BalanceProvider for HeliusProvider {
    fn name(&self) -> &'static str {
        "helius"
    }

    async fn fetch_native_balance(&self, address: &str) -> Result<RawBalance, ProviderError> {
        let result: BalanceValue = self.call("getBalance", json!([address])).await?;

        Ok(RawBalance {
            amount: result.value.to_string(),
            decimals: Network::Solana.native_decimals(),
        })
    }

    async fn fetch_token_balances(
        &self,
        address: &str,
    ) -> Result<Vec<RawTokenBalance>, ProviderError> {
        let page: AssetsPage = self
            .call(
                "getAssetsByOwner",
                json!([{
                    "ownerAddress": address,
                    "page": 1,
                    "limit": 1000,
                    "displayOptions": {
                        "showFungible": true,
                        "showNativeBalance": false,
                    },
                }]),
            )
            .await?;

        let tokens: Vec<RawTokenBalance> = page
            .items
            .into_iter()
            .filter(Asset::is_fungible)
            .filter_map(Asset::into_token)
            .collect();

        tracing::debug!(token_count = tokens.len(), "Fetched Helius fungible assets");
        Ok(tokens)
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let _: serde_json::Value = self.call("getHealth", json!([])).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{body_partial_json, method, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::domain::FetchErrorKind;

    fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
    }

    #[tokio::test]
    async fn test_native_balance_uses_api_key_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("api-key", "sol-key"))
            .and(body_partial_json(json!({"method": "getBalance"})))
            .respond_with(rpc_result(json!({"context": {"slot": 1}, "value": 2500000000u64})))
            .mount(&server)
            .await;

        let provider = HeliusProvider::new(reqwest::Client::new(), &server.uri(), "sol-key");
        let balance = provider.fetch_native_balance("So1ana").await.unwrap();
        assert_eq!(balance.amount, "2500000000");
        assert_eq!(balance.decimals, 9);
    }

    #[tokio::test]
    async fn test_token_balances_filter_and_fallbacks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "getAssetsByOwner"})))
            .respond_with(rpc_result(json!({
                "total": 4,
                "items": [
                    {
                        "id": "MintA",
                        "interface": "FungibleToken",
                        "content": {
                            "metadata": {"name": "Token A", "symbol": "META"},
                            "links": {"image": "https://img/a.png"}
                        },
                        "token_info": {"balance": 1500000, "decimals": 6, "symbol": "TKA"}
                    },
                    {
                        "id": "MintB",
                        "interface": "FungibleAsset",
                        "content": {"metadata": {"symbol": "BBB"}},
                        "token_info": {"balance": 42}
                    },
                    {
                        "id": "MintZero",
                        "interface": "FungibleToken",
                        "token_info": {"balance": 0, "decimals": 6}
                    },
                    {
                        "id": "NftC",
                        "interface": "V1_NFT",
                        "token_info": {"balance": 1, "decimals": 0}
                    }
                ]
            })))
            .mount(&server)
            .await;

        let provider = HeliusProvider::new(reqwest::Client::new(), &server.uri(), "k");
        let tokens = provider.fetch_token_balances("owner").await.unwrap();

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].contract_address, "MintA");
        assert_eq!(tokens[0].symbol, "TKA");
        assert_eq!(tokens[0].decimals, 6);
        assert_eq!(tokens[0].amount, "1500000");
        assert_eq!(tokens[0].logo_url.as_deref(), Some("https://img/a.png"));

        assert_eq!(tokens[1].symbol, "BBB");
        assert_eq!(tokens[1].decimals, 9);
        assert!(tokens[1].name.is_none());
    }

    #[tokio::test]
    async fn test_http_error_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = HeliusProvider::new(reqwest::Client::new(), &server.uri(), "k");
        let err = provider.test_connection().await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::ApiError);
        assert_eq!(err.message, "HTTP 503");
    }
}
