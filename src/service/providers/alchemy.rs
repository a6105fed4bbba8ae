//! Alchemy（EVM 网络）余额适配器

use async_trait::async_trait;
use ethers::types::U256;
use futures::future::try_join_all;
use serde::Deserialize;
use serde_json::json;

use super::{rpc, BalanceProvider, ProviderError};
use crate::domain::{Network, RawBalance, RawTokenBalance};

const PROVIDER: &str = "Alchemy";

pub struct AlchemyProvider {
    client: reqwest::Client,
    url: String,
    network: Network,
    metadata_batch_size: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBalancesResult {
    #[serde(default)]
    token_balances: Vec<TokenBalanceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBalanceEntry {
    contract_address: String,
    token_balance: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenMetadata {
    name: Option<String>,
    symbol: Option<String>,
    decimals: Option<u32>,
    logo: Option<String>,
}

impl AlchemyProvider {
    /// `url_template` 中的 `{network}` 与 `{api_key}` 会被替换
    pub fn new(
        client: reqwest::Client,
        url_template: &str,
        network: Network,
        api_key: &str,
        metadata_batch_size: usize,
    ) -> Result<Self, ProviderError> {
        let slug = network.alchemy_slug().ok_or_else(|| {
            ProviderError::api(format!("Alchemy does not support {}", network))
        })?;

        Ok(Self {
            client,
            url: url_template
                .replace("{network}", slug)
                .replace("{api_key}", api_key),
            network,
            metadata_batch_size: metadata_batch_size.max(1),
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, ProviderError> {
        rpc::json_rpc_call(PROVIDER, &self.client, &self.url, method, params).await
    }

    async fn token_metadata(&self, contract_address: &str) -> Result<TokenMetadata, ProviderError> {
        let metadata: Option<TokenMetadata> = self
            .call("alchemy_getTokenMetadata", json!([contract_address]))
            .await?;
        Ok(metadata.unwrap_or_default())
    }
}

/// 十六进制数量（0x 前缀）→ 十进制字符串
pub fn hex_to_decimal_string(hex: &str) -> Result<String, ProviderError> {
    let digits = hex.trim().trim_start_matches("0x").trim_start_matches("0X");
    if digits.is_empty() {
        return Ok("0".to_string());
    }

    U256::from_str_radix(digits, 16)
        .map(|value| value.to_string())
        .map_err(|_| ProviderError::parse(format!("Invalid hex quantity: {}", hex)))
}

fn is_zero_balance(balance: Option<&str>) -> bool {
    match balance {
        None => true,
        Some(b) => {
            let digits = b.trim().trim_start_matches("0x");
            digits.is_empty() || digits.chars().all(|c| c == '0')
        }
    }
}

#[async_trait]
impl BalanceProvider for AlchemyProvider {
    fn name(&self) -> &'static str {
        "alchemy"
    }

    async fn fetch_native_balance(&self, address: &str) -> Result<RawBalance, ProviderError> {
        let hex: String = self.call("eth_getBalance", json!([address, "latest"])).await?;

        Ok(RawBalance {
            amount: hex_to_decimal_string(&hex)?,
            decimals: self.network.native_decimals(),
        })
    }

    async fn fetch_token_balances(
        &self,
        address: &str,
    ) -> Result<Vec<RawTokenBalance>, ProviderError> {
        let result: TokenBalancesResult = self
            .call("alchemy_getTokenBalances", json!([address, "erc20"]))
            .await?;

        let non_zero: Vec<TokenBalanceEntry> = result
            .token_balances
            .into_iter()
            .filter(|entry| !is_zero_balance(entry.token_balance.as_deref()))
            .collect();

        let mut tokens = Vec::with_capacity(non_zero.len());
        for chunk in non_zero.chunks(self.metadata_batch_size) {
            let metadata = try_join_all(
                chunk
                    .iter()
                    .map(|entry| self.token_metadata(&entry.contract_address)),
            )
            .await?;

            for (entry, meta) in chunk.iter().zip(metadata) {
                let hex = entry.token_balance.as_deref().unwrap_or("0x0");
                tokens.push(RawTokenBalance {
                    contract_address: entry.contract_address.to_lowercase(),
                    symbol: meta
                        .symbol
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| "???".to_string()),
                    name: meta.name.filter(|n| !n.is_empty()),
                    decimals: meta.decimals.unwrap_or(18),
                    amount: hex_to_decimal_string(hex)?,
                    logo_url: meta.logo.filter(|l| !l.is_empty()),
                });
            }
        }

        tracing::debug!(
            network = %self.network,
            token_count = tokens.len(),
            "Fetched Alchemy token balances"
        );

        Ok(tokens)
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let _: String = self.call("eth_blockNumber", json!([])).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::domain::FetchErrorKind;

    async fn provider(server: &MockServer) -> AlchemyProvider {
        AlchemyProvider::new(
            reqwest::Client::new(),
            &format!("{}/{{network}}/{{api_key}}", server.uri()),
            Network::Ethereum,
            "test-key",
            10,
        )
        .unwrap()
    }

    fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
    }

    #[test]
    fn test_hex_to_decimal_string() {
        assert_eq!(hex_to_decimal_string("0x0").unwrap(), "0");
        assert_eq!(
            hex_to_decimal_string("0xde0b6b3a7640000").unwrap(),
            "1000000000000000000"
        );
        assert_eq!(hex_to_decimal_string("0x").unwrap(), "0");
        assert!(hex_to_decimal_string("0xzz").is_err());
    }

    #[test]
    fn test_is_zero_balance() {
        assert!(is_zero_balance(None));
        assert!(is_zero_balance(Some("0x")));
        assert!(is_zero_balance(Some("0x0")));
        assert!(is_zero_balance(Some(
            "0x0000000000000000000000000000000000000000000000000000000000000000"
        )));
        assert!(!is_zero_balance(Some("0x01")));
    }

    #[tokio::test]
    async fn test_native_balance() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/eth-mainnet/test-key"))
            .and(body_partial_json(json!({"method": "eth_getBalance"})))
            .respond_with(rpc_result(json!("0xde0b6b3a7640000")))
            .mount(&server)
            .await;

        let balance = provider(&server)
            .await
            .fetch_native_balance("0xabc")
            .await
            .unwrap();
        assert_eq!(balance.amount, "1000000000000000000");
        assert_eq!(balance.decimals, 18);
    }

    #[tokio::test]
    async fn test_token_balances_skip_zero_and_fill_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "alchemy_getTokenBalances"})))
            .respond_with(rpc_result(json!({
                "address": "0xabc",
                "tokenBalances": [
                    {"contractAddress": "0xA0B8", "tokenBalance": "0x5f5e100"},
                    {"contractAddress": "0xdead", "tokenBalance": "0x0"},
                    {"contractAddress": "0xbeef", "tokenBalance": null}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "alchemy_getTokenMetadata"})))
            .respond_with(rpc_result(json!({
                "name": "USD Coin",
                "symbol": null,
                "decimals": null,
                "logo": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = provider(&server)
            .await
            .fetch_token_balances("0xabc")
            .await
            .unwrap();

        assert_eq!(tokens.len(), 1);
        let token = &tokens[0];
        assert_eq!(token.contract_address, "0xa0b8");
        assert_eq!(token.symbol, "???");
        assert_eq!(token.decimals, 18);
        assert_eq!(token.amount, "100000000");
        assert_eq!(token.name.as_deref(), Some("USD Coin"));
        assert!(token.logo_url.is_none());
    }

    #[tokio::test]
    async fn test_metadata_lookups_span_batches_in_order() {
        let server = MockServer::start().await;
        let contracts: Vec<String> = (1..=23).map(|i| format!("0x{:040x}", i)).collect();
        let balances: Vec<serde_json::Value> = contracts
            .iter()
            .enumerate()
            .map(|(i, c)| json!({"contractAddress": c, "tokenBalance": format!("0x{:x}", i + 1)}))
            .collect();

        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "alchemy_getTokenBalances"})))
            .respond_with(rpc_result(json!({"address": "0xabc", "tokenBalances": balances})))
            .mount(&server)
            .await;
        for (i, contract) in contracts.iter().enumerate() {
            Mock::given(method("POST"))
                .and(body_partial_json(json!({
                    "method": "alchemy_getTokenMetadata",
                    "params": [contract]
                })))
                .respond_with(rpc_result(json!({
                    "name": format!("Token {}", i + 1),
                    "symbol": format!("T{}", i + 1),
                    "decimals": 6,
                    "logo": null
                })))
                .expect(1)
                .mount(&server)
                .await;
        }

        let tokens = provider(&server)
            .await
            .fetch_token_balances("0xabc")
            .await
            .unwrap();

        // 批大小 10：23 个代币分 3 批
        assert_eq!(tokens.len(), 23);
        for (i, token) in tokens.iter().enumerate() {
            assert_eq!(token.contract_address, contracts[i]);
            assert_eq!(token.symbol, format!("T{}", i + 1));
            assert_eq!(token.amount, (i + 1).to_string());
            assert_eq!(token.decimals, 6);
        }
    }

    #[tokio::test]
    async fn test_rate_limit_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = provider(&server)
            .await
            .fetch_native_balance("0xabc")
            .await
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::RateLimit);
        assert_eq!(err.message, "Rate limited by Alchemy");
    }

    #[tokio::test]
    async fn test_rpc_error_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32602, "message": "invalid address"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .await
            .fetch_native_balance("0xabc")
            .await
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::ApiError);
        assert_eq!(err.message, "invalid address");
        assert_eq!(err.details.unwrap()["code"], json!(-32602));
    }

    #[test]
    fn test_rejects_non_evm_network() {
        let result = AlchemyProvider::new(
            reqwest::Client::new(),
            "http://localhost/{network}/{api_key}",
            Network::Bitcoin,
            "key",
            10,
        );
        assert!(result.is_err());
    }
}
