//! 刷新协调器
//!
//! 一次运行：取钱包列表 → 一次性加载该用户的凭据与阈值 → 有界并发抓取 →
//! 每个成功钱包单独一个事务写快照 → 写一条 RefreshLog（无论结果如何）。
//! 钱包级错误只收集不抛出；跨钱包不共享事务，某个钱包写失败不会回滚其他钱包。

use std::{
    collections::{BTreeMap, HashSet},
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{
    balance_fetcher::BalanceFetcher,
    credential_vault::CredentialVault,
    providers::{ProviderCredentials, ProviderFactory},
};
use crate::{
    config::RefreshConfig,
    domain::{
        BalanceSnapshot, FetchError, FetchErrorKind, PortfolioSummary, RefreshLog, RefreshResult,
        RefreshTrigger, Token, Wallet, WalletBalanceData, WalletFetchResult,
    },
    repository::{
        settings::TOKEN_THRESHOLD_KEY, RefreshLogRepository, SettingScope, SettingsRepository,
        SnapshotRepository, TokenRepository, WalletRepository,
    },
};

/// 历史查询单页上限
const MAX_HISTORY_LIMIT: i64 = 500;

/// 运行参数
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    pub max_concurrent_wallets: usize,
    pub run_timeout: Option<Duration>,
    pub default_token_threshold_usd: Decimal,
    pub history_page_size: i64,
}

impl RefreshOptions {
    pub fn from_config(config: &RefreshConfig) -> Self {
        Self {
            max_concurrent_wallets: config.max_concurrent_wallets.max(1),
            run_timeout: config.run_timeout_secs.map(Duration::from_secs),
            default_token_threshold_usd: config.default_token_threshold_usd,
            history_page_size: config.history_page_size,
        }
    }
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self::from_config(&RefreshConfig::default())
    }
}

/// 协调器依赖的存储
#[derive(Clone)]
pub struct CoordinatorRepositories {
    pub wallets: Arc<dyn WalletRepository>,
    pub tokens: Arc<dyn TokenRepository>,
    pub snapshots: Arc<dyn SnapshotRepository>,
    pub refresh_logs: Arc<dyn RefreshLogRepository>,
    pub settings: Arc<dyn SettingsRepository>,
}

/// 单槽运行守卫（CAS），同一时刻只允许一个持有者
#[derive(Debug, Default)]
pub struct RefreshGuard {
    running: AtomicBool,
}

/// 持有期间守卫处于占用状态，drop 时释放
#[derive(Debug)]
pub struct RefreshGuardToken<'a> {
    guard: &'a RefreshGuard,
}

impl RefreshGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<RefreshGuardToken<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshGuardToken { guard: self })
    }

    pub fn is_held(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for RefreshGuardToken<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

pub struct RefreshCoordinator {
    repos: CoordinatorRepositories,
    vault: Arc<CredentialVault>,
    fetcher: BalanceFetcher,
    options: RefreshOptions,
    all_users_guard: RefreshGuard,
}

impl RefreshCoordinator {
    pub fn new(
        repos: CoordinatorRepositories,
        vault: Arc<CredentialVault>,
        factory: Arc<dyn ProviderFactory>,
        options: RefreshOptions,
    ) -> Self {
        Self {
            repos,
            vault,
            fetcher: BalanceFetcher::new(factory),
            options,
            all_users_guard: RefreshGuard::new(),
        }
    }

    pub fn options(&self) -> &RefreshOptions {
        &self.options
    }

    /// 全量运行是否正在进行
    pub fn is_refreshing(&self) -> bool {
        self.all_users_guard.is_held()
    }

    /// 刷新一个用户的全部钱包
    pub async fn refresh_user(&self, user_id: Uuid, trigger: RefreshTrigger) -> Result<RefreshResult> {
        let started = Instant::now();
        let wallets = self.repos.wallets.list_by_user(user_id).await?;
        Ok(self.run_for_user(user_id, wallets, trigger, started).await)
    }

    /// 刷新所有用户；每个用户一条 RefreshLog，返回合并结果
    pub async fn refresh_all(&self, trigger: RefreshTrigger) -> Result<RefreshResult> {
        let started = Instant::now();
        let wallets = self.repos.wallets.list_all().await?;

        let mut by_user: BTreeMap<Uuid, Vec<Wallet>> = BTreeMap::new();
        for wallet in wallets {
            by_user.entry(wallet.user_id).or_default().push(wallet);
        }

        tracing::info!(
            trigger = trigger.as_str(),
            users = by_user.len(),
            "Starting refresh for all users"
        );

        let mut combined = RefreshResult::empty(trigger);
        for (user_id, wallets) in by_user {
            let user_result = self
                .run_for_user(user_id, wallets, trigger, Instant::now())
                .await;
            combined = combined.merge(user_result);
        }
        combined.duration_ms = elapsed_ms(started);

        tracing::info!(
            trigger = trigger.as_str(),
            status = combined.status.as_str(),
            attempted = combined.wallets_attempted,
            succeeded = combined.wallets_succeeded,
            failed = combined.wallets_failed,
            duration_ms = combined.duration_ms,
            "Refresh for all users complete"
        );

        Ok(combined)
    }

    /// 与其他全量运行互斥；已有运行时返回 None
    pub async fn refresh_all_exclusive(
        &self,
        trigger: RefreshTrigger,
    ) -> Result<Option<RefreshResult>> {
        let Some(_token) = self.all_users_guard.try_acquire() else {
            return Ok(None);
        };
        self.refresh_all(trigger).await.map(Some)
    }

    /// 刷新单个钱包；钱包不存在或不属于该用户时返回 None
    pub async fn refresh_single_wallet(
        &self,
        user_id: Uuid,
        wallet_id: Uuid,
    ) -> Result<Option<WalletFetchResult>> {
        let Some(wallet) = self.find_owned_wallet(user_id, wallet_id).await? else {
            return Ok(None);
        };

        let credentials = self.vault.load_provider_credentials(user_id).await?;
        let threshold = self.token_threshold(user_id).await;
        let taken_at = Utc::now();

        let result = match self
            .fetcher
            .fetch_wallet(&wallet, &credentials, threshold)
            .await
        {
            Ok(data) => self.persist(&wallet, data, taken_at).await,
            Err(e) => Err(e),
        };

        Ok(Some(result))
    }

    async fn run_for_user(
        &self,
        user_id: Uuid,
        wallets: Vec<Wallet>,
        trigger: RefreshTrigger,
        started: Instant,
    ) -> RefreshResult {
        let (successful, errors) = if wallets.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            match self.vault.load_provider_credentials(user_id).await {
                Ok(credentials) => {
                    let threshold = self.token_threshold(user_id).await;
                    self.fan_out(&wallets, &credentials, threshold).await
                }
                Err(e) => {
                    tracing::error!(user_id = %user_id, error = ?e, "Failed to load credentials");
                    let errors = wallets
                        .iter()
                        .map(|w| {
                            FetchError::new(
                                w.id,
                                w.address.clone(),
                                w.network,
                                FetchErrorKind::Unknown,
                                "Failed to load credentials",
                            )
                        })
                        .collect();
                    (Vec::new(), errors)
                }
            }
        };

        let result = RefreshResult::from_outcomes(trigger, successful, errors, elapsed_ms(started));

        if let Err(e) = self.repos.refresh_logs.insert(Some(user_id), &result).await {
            tracing::error!(user_id = %user_id, error = ?e, "Failed to persist refresh log");
        }

        tracing::info!(
            user_id = %user_id,
            trigger = trigger.as_str(),
            status = result.status.as_str(),
            attempted = result.wallets_attempted,
            succeeded = result.wallets_succeeded,
            failed = result.wallets_failed,
            duration_ms = result.duration_ms,
            "Refresh run complete"
        );

        result
    }

    /// 有界并发抓取；超过运行期限时未完成的钱包记为 timeout
    async fn fan_out(
        &self,
        wallets: &[Wallet],
        credentials: &ProviderCredentials,
        threshold: Decimal,
    ) -> (Vec<WalletBalanceData>, Vec<FetchError>) {
        let taken_at = Utc::now();
        let deadline = self
            .options
            .run_timeout
            .map(|t| tokio::time::Instant::now() + t);

        let mut successful = Vec::with_capacity(wallets.len());
        let mut errors = Vec::new();
        let mut finished: HashSet<Uuid> = HashSet::with_capacity(wallets.len());
        let mut timed_out = false;

        {
            let fetcher = &self.fetcher;
            let mut fetches = futures::stream::iter(wallets.iter().cloned())
                .map(|wallet: Wallet| async move {
                    let result = fetcher.fetch_wallet(&wallet, credentials, threshold).await;
                    (wallet, result)
                })
                .buffer_unordered(self.options.max_concurrent_wallets.max(1));

            loop {
                let next = match deadline {
                    Some(deadline) => match tokio::time::timeout_at(deadline, fetches.next()).await
                    {
                        Ok(next) => next,
                        Err(_) => {
                            timed_out = true;
                            break;
                        }
                    },
                    None => fetches.next().await,
                };

                let Some((wallet, result)) = next else {
                    break;
                };
                finished.insert(wallet.id);

                let outcome = match result {
                    Ok(data) => self.persist(&wallet, data, taken_at).await,
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(data) => successful.push(data),
                    Err(e) => errors.push(e),
                }
            }
        }

        if timed_out {
            let unfinished: Vec<&Wallet> =
                wallets.iter().filter(|w| !finished.contains(&w.id)).collect();
            tracing::warn!(
                unfinished = unfinished.len(),
                "Refresh run deadline exceeded, abandoning in-flight wallets"
            );
            errors.extend(unfinished.into_iter().map(|w| {
                FetchError::new(
                    w.id,
                    w.address.clone(),
                    w.network,
                    FetchErrorKind::Timeout,
                    "Refresh run deadline exceeded",
                )
            }));
        }

        (successful, errors)
    }

    /// 写快照；失败时转为该钱包的错误
    async fn persist(
        &self,
        wallet: &Wallet,
        data: WalletBalanceData,
        taken_at: DateTime<Utc>,
    ) -> WalletFetchResult {
        if let Err(e) = self.repos.snapshots.write_snapshot(&data, taken_at).await {
            tracing::error!(wallet_id = %wallet.id, error = ?e, "Failed to persist snapshot");
            return Err(FetchError::new(
                wallet.id,
                wallet.address.clone(),
                wallet.network,
                FetchErrorKind::Unknown,
                "Failed to persist snapshot",
            )
            .with_details(Some(e.to_string())));
        }

        let tokens: Vec<Token> = data
            .tokens
            .iter()
            .map(|t| Token {
                network: data.network,
                contract_address: t.contract_address.clone(),
                symbol: t.symbol.clone(),
                name: t.name.clone(),
                decimals: t.decimals,
                logo_url: t.logo_url.clone(),
            })
            .collect();
        if !tokens.is_empty() {
            if let Err(e) = self.repos.tokens.upsert_many(&tokens).await {
                tracing::warn!(wallet_id = %wallet.id, error = ?e, "Failed to upsert token metadata");
            }
        }

        Ok(data)
    }

    /// 用户代币阈值；未设置或无法解析时使用默认值
    pub async fn token_threshold(&self, user_id: Uuid) -> Decimal {
        let default = self.options.default_token_threshold_usd;
        match self
            .repos
            .settings
            .get(SettingScope::User(user_id), TOKEN_THRESHOLD_KEY)
            .await
        {
            Ok(Some(raw)) => Decimal::from_str(raw.trim()).unwrap_or_else(|_| {
                tracing::warn!(user_id = %user_id, value = %raw, "Invalid token threshold setting");
                default
            }),
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = ?e, "Failed to read token threshold");
                default
            }
        }
    }

    pub async fn set_token_threshold(&self, user_id: Uuid, threshold: Decimal) -> Result<()> {
        anyhow::ensure!(!threshold.is_sign_negative(), "threshold must not be negative");
        self.repos
            .settings
            .set(
                SettingScope::User(user_id),
                TOKEN_THRESHOLD_KEY,
                &threshold.normalize().to_string(),
            )
            .await
    }

    pub async fn find_owned_wallet(&self, user_id: Uuid, wallet_id: Uuid) -> Result<Option<Wallet>> {
        Ok(self
            .repos
            .wallets
            .find_by_id(wallet_id)
            .await?
            .filter(|w| w.user_id == user_id))
    }

    pub async fn latest_snapshot(&self, wallet_id: Uuid) -> Result<Option<BalanceSnapshot>> {
        self.repos.snapshots.latest(wallet_id).await
    }

    /// 最新在前；limit 缺省为配置的页大小
    pub async fn snapshot_history(
        &self,
        wallet_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<BalanceSnapshot>> {
        let limit = limit
            .unwrap_or(self.options.history_page_size)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.repos.snapshots.history(wallet_id, limit).await
    }

    pub async fn portfolio_summary(&self, user_id: Uuid) -> Result<PortfolioSummary> {
        let wallets = self.repos.wallets.list_by_user(user_id).await?;
        let ids: Vec<Uuid> = wallets.iter().map(|w| w.id).collect();
        let latest = if ids.is_empty() {
            Vec::new()
        } else {
            self.repos.snapshots.latest_for_wallets(&ids).await?
        };

        Ok(PortfolioSummary {
            total_usd_value: latest.iter().map(|s| s.total_usd_value).sum(),
            wallet_count: wallets.len(),
            last_updated: latest.iter().map(|s| s.taken_at).max(),
        })
    }

    pub async fn recent_refresh_logs(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<RefreshLog>> {
        self.repos
            .refresh_logs
            .recent(user_id, limit.clamp(1, MAX_HISTORY_LIMIT))
            .await
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
