//! Blockstream（Bitcoin）余额适配器，无需 API key

use async_trait::async_trait;
use serde::Deserialize;

use super::{rpc, BalanceProvider, ProviderError};
use crate::domain::{Network, RawBalance, RawTokenBalance};

const PROVIDER: &str = "Blockstream";

pub struct BlockstreamProvider {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct AddressStats {
    chain_stats: TxoStats,
    mempool_stats: TxoStats,
}

#[derive(Debug, Deserialize)]
struct TxoStats {
    funded_txo_sum: i128,
    spent_txo_sum: i128,
}

impl TxoStats {
    fn net(&self) -> i128 {
        self.funded_txo_sum - self.spent_txo_sum
    }
}

impl BlockstreamProvider {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BalanceProvider for BlockstreamProvider {
    fn name(&self) -> &'static str {
        "blockstream"
    }

    /// 余额 = 已确认 + 未确认（mempool）
    async fn fetch_native_balance(&self, address: &str) -> Result<RawBalance, ProviderError> {
        let url = format!("{}/address/{}", self.base_url, address);
        let stats: AddressStats = rpc::get_json(PROVIDER, self.client.get(&url)).await?;

        let total = stats.chain_stats.net() + stats.mempool_stats.net();
        if total < 0 {
            return Err(ProviderError::parse(format!(
                "Negative balance reported for {}",
                address
            )));
        }

        Ok(RawBalance {
            amount: total.to_string(),
            decimals: Network::Bitcoin.native_decimals(),
        })
    }

    async fn fetch_token_balances(
        &self,
        _address: &str,
    ) -> Result<Vec<RawTokenBalance>, ProviderError> {
        Ok(Vec::new())
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let url = format!("{}/blocks/tip/height", self.base_url);
        let response = rpc::send(PROVIDER, self.client.get(&url)).await?;
        rpc::check_status(PROVIDER, response)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::domain::FetchErrorKind;

    #[tokio::test]
    async fn test_balance_includes_mempool() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/address/bc1qtest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "address": "bc1qtest",
                "chain_stats": {
                    "funded_txo_count": 2, "funded_txo_sum": 150000000,
                    "spent_txo_count": 1, "spent_txo_sum": 50000000, "tx_count": 3
                },
                "mempool_stats": {
                    "funded_txo_count": 1, "funded_txo_sum": 1000,
                    "spent_txo_count": 0, "spent_txo_sum": 0, "tx_count": 1
                }
            })))
            .mount(&server)
            .await;

        let provider = BlockstreamProvider::new(reqwest::Client::new(), &server.uri());
        let balance = provider.fetch_native_balance("bc1qtest").await.unwrap();
        assert_eq!(balance.amount, "100001000");
        assert_eq!(balance.decimals, 8);
        assert!(provider.fetch_token_balances("bc1qtest").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let provider = BlockstreamProvider::new(reqwest::Client::new(), &server.uri());
        let err = provider.fetch_native_balance("1abc").await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::ParseError);
    }

    #[tokio::test]
    async fn test_connection_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocks/tip/height"))
            .respond_with(ResponseTemplate::new(200).set_body_string("850000"))
            .mount(&server)
            .await;

        let provider = BlockstreamProvider::new(reqwest::Client::new(), &server.uri());
        assert!(provider.test_connection().await.is_ok());
    }
}
