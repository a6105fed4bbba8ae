//! 单钱包余额抓取与估值
//!
//! 流程：原生币余额与代币列表并发抓取 → 原生币价格与代币价格并发查询 → 换算、过滤、汇总。
//! 原生币余额、代币列表、原生币价格任一失败都会让整个钱包失败；
//! 代币价格失败不致命，按 0 处理。这里的错误从不以 panic 或 Err 之外的方式越过边界。

use std::{collections::HashMap, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use rust_decimal::Decimal;

use super::providers::{ProviderCredentials, ProviderError, ProviderFactory};
use crate::domain::{
    balance::{raw_to_decimal, BalanceError},
    FetchError, FetchErrorKind, RawBalance, RawTokenBalance, TokenData, Wallet,
    WalletBalanceData, WalletFetchResult,
};

impl From<BalanceError> for ProviderError {
    fn from(err: BalanceError) -> Self {
        ProviderError::parse(err.to_string())
    }
}

pub struct BalanceFetcher {
    factory: Arc<dyn ProviderFactory>,
}

impl BalanceFetcher {
    pub fn new(factory: Arc<dyn ProviderFactory>) -> Self {
        Self { factory }
    }

    /// 抓取并估值一个钱包
    pub async fn fetch_wallet(
        &self,
        wallet: &Wallet,
        credentials: &ProviderCredentials,
        token_threshold_usd: Decimal,
    ) -> WalletFetchResult {
        let outcome = AssertUnwindSafe(self.try_fetch(wallet, credentials, token_threshold_usd))
            .catch_unwind()
            .await;

        let err = match outcome {
            Ok(Ok(data)) => {
                tracing::debug!(
                    wallet_id = %wallet.id,
                    network = %wallet.network,
                    native = %data.native_balance_formatted,
                    symbol = wallet.network.native_symbol(),
                    total_usd = %data.total_usd_value,
                    tokens = data.tokens.len(),
                    "Wallet balance fetched"
                );
                return Ok(data);
            }
            Ok(Err(err)) => err,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "Unknown error".to_string());
                ProviderError::new(FetchErrorKind::Unknown, message)
            }
        };

        tracing::warn!(
            wallet_id = %wallet.id,
            network = %wallet.network,
            kind = %err.kind,
            error = %err.message,
            "Wallet balance fetch failed"
        );

        Err(FetchError::new(
            wallet.id,
            wallet.address.clone(),
            wallet.network,
            err.kind,
            err.message.clone(),
        )
        .with_details(err.details_string()))
    }

    async fn try_fetch(
        &self,
        wallet: &Wallet,
        credentials: &ProviderCredentials,
        token_threshold_usd: Decimal,
    ) -> Result<WalletBalanceData, ProviderError> {
        let network = wallet.network;
        let provider = self.factory.balance_provider(network, credentials)?;

        let (native, tokens) = tokio::join!(
            provider.fetch_native_balance(&wallet.address),
            provider.fetch_token_balances(&wallet.address),
        );
        let native = native?;
        let tokens = tokens?;

        let prices = self.factory.price_provider(credentials);
        let addresses: Vec<String> = tokens.iter().map(|t| t.contract_address.clone()).collect();

        let (native_price, token_prices) = tokio::join!(
            prices.get_native_price(network),
            async {
                if addresses.is_empty() {
                    Ok(HashMap::new())
                } else {
                    prices.get_token_prices(network, &addresses).await
                }
            },
        );

        let native_price = native_price.map_err(|e| ProviderError {
            kind: FetchErrorKind::PriceError,
            message: format!("Failed to get native token price: {}", e.message),
            details: e.details,
        })?;

        let token_prices = token_prices.unwrap_or_else(|e| {
            tracing::warn!(
                wallet_id = %wallet.id,
                network = %network,
                error = %e,
                "Token price lookup failed, valuing tokens at zero"
            );
            HashMap::new()
        });

        value_wallet(
            wallet,
            native,
            tokens,
            native_price,
            &token_prices,
            token_threshold_usd,
        )
    }
}

fn usd_value(amount: Decimal, price: Decimal) -> Result<Decimal, ProviderError> {
    amount
        .checked_mul(price)
        .ok_or_else(|| ProviderError::parse("USD value out of range"))
}

/// 原始余额 + 价格 → 钱包估值
///
/// `balance_usd < threshold` 的代币被剔除，不影响原生币估值
pub fn value_wallet(
    wallet: &Wallet,
    native: RawBalance,
    tokens: Vec<RawTokenBalance>,
    native_price: Decimal,
    token_prices: &HashMap<String, Decimal>,
    token_threshold_usd: Decimal,
) -> Result<WalletBalanceData, ProviderError> {
    let native_formatted = raw_to_decimal(&native.amount, native.decimals)?;
    let native_balance_usd = usd_value(native_formatted, native_price)?;

    let mut valued = Vec::with_capacity(tokens.len());
    for token in tokens {
        let price_usd = token_prices
            .get(&token.contract_address.to_lowercase())
            .copied()
            .unwrap_or(Decimal::ZERO);
        let valuation = raw_to_decimal(&token.amount, token.decimals)
            .map_err(ProviderError::from)
            .and_then(|amount| Ok((amount, usd_value(amount, price_usd)?)));
        let (balance_formatted, balance_usd) = match valuation {
            Ok(v) => v,
            Err(e) => {
                // 无法估值的代币直接跳过，钱包照常估值
                tracing::warn!(
                    wallet_id = %wallet.id,
                    contract = %token.contract_address,
                    symbol = %token.symbol,
                    error = %e.message,
                    "Skipping token that cannot be valued"
                );
                continue;
            }
        };

        if balance_usd < token_threshold_usd {
            continue;
        }

        valued.push(TokenData {
            contract_address: token.contract_address,
            symbol: token.symbol,
            name: token.name,
            decimals: token.decimals,
            balance: token.amount,
            balance_formatted,
            balance_usd,
            price_usd,
            logo_url: token.logo_url,
        });
    }

    let mut data = WalletBalanceData {
        wallet_id: wallet.id,
        network: wallet.network,
        address: wallet.address.clone(),
        native_balance: native.amount,
        native_balance_formatted: native_formatted,
        native_balance_usd,
        native_price_usd: native_price,
        tokens: valued,
        tokens_usd_value: Decimal::ZERO,
        total_usd_value: Decimal::ZERO,
    };
    data.recompute_totals();
    Ok(data)
}
