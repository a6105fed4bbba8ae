use std::{sync::Arc, time::Duration};

use anyhow::Context;

use crate::{
    config::Config,
    infrastructure::db::PgPool,
    repository::{
        memory::InMemoryRepositories, CredentialRepository, PgCredentialRepository,
        PgRateLimitRepository, PgRefreshLogRepository, PgSettingsRepository,
        PgSnapshotRepository, PgTokenRepository, PgWalletRepository, RateLimitRepository,
        RefreshLogRepository, SettingsRepository, SnapshotRepository, TokenRepository,
        WalletRepository,
    },
    service::{
        providers::{HttpProviderFactory, ProviderFactory},
        CoordinatorRepositories, CredentialVault, RefreshCoordinator, RefreshOptions,
        RefreshRateLimiter, RefreshScheduler, WalletService,
    },
};

/// 全部 Repository 的 trait 对象
#[derive(Clone)]
pub struct Repositories {
    pub wallets: Arc<dyn WalletRepository>,
    pub tokens: Arc<dyn TokenRepository>,
    pub snapshots: Arc<dyn SnapshotRepository>,
    pub refresh_logs: Arc<dyn RefreshLogRepository>,
    pub credentials: Arc<dyn CredentialRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub rate_limits: Arc<dyn RateLimitRepository>,
}

impl Repositories {
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            wallets: Arc::new(PgWalletRepository::new(pool.clone())),
            tokens: Arc::new(PgTokenRepository::new(pool.clone())),
            snapshots: Arc::new(PgSnapshotRepository::new(pool.clone())),
            refresh_logs: Arc::new(PgRefreshLogRepository::new(pool.clone())),
            credentials: Arc::new(PgCredentialRepository::new(pool.clone())),
            settings: Arc::new(PgSettingsRepository::new(pool.clone())),
            rate_limits: Arc::new(PgRateLimitRepository::new(pool.clone())),
        }
    }

    fn coordinator(&self) -> CoordinatorRepositories {
        CoordinatorRepositories {
            wallets: self.wallets.clone(),
            tokens: self.tokens.clone(),
            snapshots: self.snapshots.clone(),
            refresh_logs: self.refresh_logs.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl From<&InMemoryRepositories> for Repositories {
    fn from(repos: &InMemoryRepositories) -> Self {
        Self {
            wallets: repos.wallets.clone(),
            tokens: repos.tokens.clone(),
            snapshots: repos.snapshots.clone(),
            refresh_logs: repos.refresh_logs.clone(),
            credentials: repos.credentials.clone(),
            settings: repos.settings.clone(),
            rate_limits: repos.rate_limits.clone(),
        }
    }
}

/// 应用状态
/// 包含所有共享资源
pub struct AppState {
    pub config: Arc<Config>,
    /// 内存模式（测试）下为 None
    pub pool: Option<PgPool>,
    pub wallets: WalletService,
    pub vault: Arc<CredentialVault>,
    pub provider_factory: Arc<dyn ProviderFactory>,
    pub coordinator: Arc<RefreshCoordinator>,
    pub scheduler: Arc<RefreshScheduler>,
    pub rate_limiter: RefreshRateLimiter,
}

impl AppState {
    /// 生产装配：Postgres Repository + HTTP provider
    pub fn new(pool: PgPool, config: Arc<Config>) -> anyhow::Result<Self> {
        let repos = Repositories::postgres(&pool);
        let factory: Arc<dyn ProviderFactory> = Arc::new(
            HttpProviderFactory::new(config.providers.clone())
                .context("Failed to build provider factory")?,
        );
        Self::from_parts(config, repos, factory, Some(pool))
    }

    /// 按给定的 Repository 与 provider 工厂装配（测试注入内存实现）
    pub fn from_parts(
        config: Arc<Config>,
        repos: Repositories,
        provider_factory: Arc<dyn ProviderFactory>,
        pool: Option<PgPool>,
    ) -> anyhow::Result<Self> {
        let vault = Arc::new(
            CredentialVault::new(repos.credentials.clone(), &config.vault)
                .context("Failed to initialize credential vault")?,
        );

        let coordinator = Arc::new(RefreshCoordinator::new(
            repos.coordinator(),
            vault.clone(),
            provider_factory.clone(),
            RefreshOptions::from_config(&config.refresh),
        ));
        let scheduler = Arc::new(RefreshScheduler::new(
            coordinator.clone(),
            repos.settings.clone(),
        ));
        let rate_limiter = RefreshRateLimiter::new(
            repos.rate_limits.clone(),
            Duration::from_secs(config.refresh.manual_cooldown_secs),
        );

        Ok(Self {
            wallets: WalletService::new(repos.wallets.clone()),
            vault,
            provider_factory,
            coordinator,
            scheduler,
            rate_limiter,
            pool,
            config,
        })
    }
}
