//! 测试辅助模块
//! 内存 Repository + 可编排的 provider，构造不依赖外部服务的 AppState

#![allow(dead_code)]

use std::{
    collections::HashMap,
    str::FromStr,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use pulsar::{
    app_state::{AppState, Repositories},
    config::Config,
    domain::{FetchErrorKind, Network, RawBalance, RawTokenBalance, Wallet},
    infrastructure::jwt,
    repository::{memory::InMemoryRepositories, CreateWalletParams, WalletRepository},
    service::providers::{
        BalanceProvider, PriceProvider, ProviderCredentials, ProviderError, ProviderFactory,
    },
};
use rust_decimal::Decimal;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret_that_is_at_least_32_characters_long";

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// 测试配置：不读数据库，调度默认关闭
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.database.url = "postgres://localhost/pulsar_test".into();
    config.jwt.secret = JWT_SECRET.into();
    config.vault.secret = "integration-test-vault-secret".into();
    config.vault.salt = "integration-test-salt".into();
    config.refresh.cron = None;
    config.refresh.refreshes_per_day = None;
    config.refresh.manual_cooldown_secs = 60;
    config.refresh.default_token_threshold_usd = dec("0.10");
    config.refresh.max_concurrent_wallets = 4;
    config.refresh.run_timeout_secs = None;
    config.refresh.history_page_size = 30;
    config.refresh.scheduler_enabled = false;
    config
}

/// 某个地址在 mock provider 上的表现
#[derive(Clone)]
pub enum MockWallet {
    Balance {
        amount: String,
        tokens: Vec<RawTokenBalance>,
    },
    Fail(ProviderError),
    /// 永不返回（用于运行期限测试）
    Hang,
}

#[derive(Default)]
struct MockState {
    wallets: Mutex<HashMap<String, MockWallet>>,
    native_prices: Mutex<HashMap<Network, Decimal>>,
    token_prices: Mutex<HashMap<String, Decimal>>,
}

#[derive(Clone, Default)]
pub struct MockProviderFactory {
    state: Arc<MockState>,
}

impl MockProviderFactory {
    pub fn new() -> Self {
        let factory = Self::default();
        factory.set_native_price(Network::Ethereum, dec("2000"));
        factory.set_native_price(Network::Bitcoin, dec("50000"));
        factory.set_native_price(Network::Solana, dec("150"));
        factory
    }

    pub fn set_wallet(&self, address: &str, behavior: MockWallet) {
        self.state
            .wallets
            .lock()
            .unwrap()
            .insert(address.to_lowercase(), behavior);
    }

    pub fn set_native_price(&self, network: Network, price: Decimal) {
        self.state.native_prices.lock().unwrap().insert(network, price);
    }

    pub fn set_token_price(&self, contract: &str, price: Decimal) {
        self.state
            .token_prices
            .lock()
            .unwrap()
            .insert(contract.to_lowercase(), price);
    }
}

pub fn raw_token(contract: &str, symbol: &str, amount: &str, decimals: u32) -> RawTokenBalance {
    RawTokenBalance {
        contract_address: contract.to_lowercase(),
        symbol: symbol.into(),
        name: None,
        decimals,
        amount: amount.into(),
        logo_url: None,
    }
}

struct MockBalanceProvider {
    network: Network,
    state: Arc<MockState>,
}

impl MockBalanceProvider {
    fn behavior(&self, address: &str) -> Option<MockWallet> {
        self.state
            .wallets
            .lock()
            .unwrap()
            .get(&address.to_lowercase())
            .cloned()
    }
}

#[async_trait]
impl BalanceProvider for MockBalanceProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn fetch_native_balance(&self, address: &str) -> Result<RawBalance, ProviderError> {
        match self.behavior(address) {
            Some(MockWallet::Balance { amount, .. }) => Ok(RawBalance {
                amount,
                decimals: self.network.native_decimals(),
            }),
            Some(MockWallet::Fail(e)) => Err(e),
            Some(MockWallet::Hang) => std::future::pending().await,
            None => Ok(RawBalance {
                amount: "0".into(),
                decimals: self.network.native_decimals(),
            }),
        }
    }

    async fn fetch_token_balances(
        &self,
        address: &str,
    ) -> Result<Vec<RawTokenBalance>, ProviderError> {
        match self.behavior(address) {
            Some(MockWallet::Balance { tokens, .. }) => Ok(tokens),
            Some(MockWallet::Fail(e)) => Err(e),
            Some(MockWallet::Hang) => std::future::pending().await,
            None => Ok(Vec::new()),
        }
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

struct MockPriceProvider {
    state: Arc<MockState>,
}

#[async_trait]
impl PriceProvider for MockPriceProvider {
    async fn get_native_price(&self, network: Network) -> Result<Decimal, ProviderError> {
        self.state
            .native_prices
            .lock()
            .unwrap()
            .get(&network)
            .copied()
            .ok_or_else(|| {
                ProviderError::new(
                    FetchErrorKind::NotFound,
                    format!("Price not found for {}", network),
                )
            })
    }

    async fn get_token_prices(
        &self,
        _network: Network,
        addresses: &[String],
    ) -> Result<HashMap<String, Decimal>, ProviderError> {
        let prices = self.state.token_prices.lock().unwrap();
        Ok(addresses
            .iter()
            .filter_map(|a| {
                let key = a.to_lowercase();
                prices.get(&key).map(|p| (key, *p))
            })
            .collect())
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

impl ProviderFactory for MockProviderFactory {
    fn balance_provider(
        &self,
        network: Network,
        _credentials: &ProviderCredentials,
    ) -> Result<Arc<dyn BalanceProvider>, ProviderError> {
        Ok(Arc::new(MockBalanceProvider {
            network,
            state: self.state.clone(),
        }))
    }

    fn price_provider(&self, _credentials: &ProviderCredentials) -> Arc<dyn PriceProvider> {
        Arc::new(MockPriceProvider {
            state: self.state.clone(),
        })
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub repos: InMemoryRepositories,
    pub providers: MockProviderFactory,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let repos = InMemoryRepositories::new();
        let providers = MockProviderFactory::new();
        let state = AppState::from_parts(
            Arc::new(config),
            Repositories::from(&repos),
            Arc::new(providers.clone()),
            None,
        )
        .expect("Failed to build test app state");

        Self {
            state: Arc::new(state),
            repos,
            providers,
        }
    }

    /// 直接入库（跳过地址校验）
    pub async fn add_wallet(&self, user_id: Uuid, network: Network, address: &str) -> Wallet {
        self.repos
            .wallets
            .create(CreateWalletParams {
                user_id,
                network,
                address: address.into(),
                name: None,
            })
            .await
            .unwrap()
            .expect("wallet should not exist yet")
    }
}

pub fn bearer(user_id: Uuid) -> String {
    format!(
        "Bearer {}",
        jwt::generate_token(user_id, JWT_SECRET, 3600).unwrap()
    )
}
