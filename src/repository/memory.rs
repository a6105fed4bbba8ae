//! 内存版 Repository 实现
//!
//! 用于单元/集成测试与无数据库联调，语义与 Pg 实现保持一致

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    credentials::CredentialRepository,
    rate_limits::{remaining_cooldown, RateLimitDecision, RateLimitRepository},
    refresh_logs::RefreshLogRepository,
    settings::{SettingScope, SettingsRepository},
    snapshots::{build_snapshot, SnapshotRepository},
    tokens::TokenRepository,
    wallets::{CreateWalletParams, WalletRepository},
};
use crate::domain::{BalanceSnapshot, Network, RefreshLog, RefreshResult, Token, Wallet, WalletBalanceData};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| anyhow!("in-memory store poisoned"))
}

#[derive(Default)]
pub struct InMemoryWalletRepository {
    wallets: Mutex<Vec<Wallet>>,
}

impl InMemoryWalletRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletRepository for InMemoryWalletRepository {
    async fn create(&self, params: CreateWalletParams) -> Result<Option<Wallet>> {
        let mut wallets = lock(&self.wallets)?;
        let duplicate = wallets.iter().any(|w| {
            w.user_id == params.user_id
                && w.network == params.network
                && w.address == params.address
        });
        if duplicate {
            return Ok(None);
        }

        let wallet = Wallet {
            id: Uuid::new_v4(),
            user_id: params.user_id,
            network: params.network,
            address: params.address,
            name: params.name,
            created_at: Utc::now(),
        };
        wallets.push(wallet.clone());
        Ok(Some(wallet))
    }

    async fn find_by_id(&self, wallet_id: Uuid) -> Result<Option<Wallet>> {
        Ok(lock(&self.wallets)?
            .iter()
            .find(|w| w.id == wallet_id)
            .cloned())
    }

    async fn delete(&self, wallet_id: Uuid) -> Result<bool> {
        let mut wallets = lock(&self.wallets)?;
        let before = wallets.len();
        wallets.retain(|w| w.id != wallet_id);
        Ok(wallets.len() != before)
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Wallet>> {
        Ok(lock(&self.wallets)?
            .iter()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Wallet>> {
        let mut wallets = lock(&self.wallets)?.clone();
        wallets.sort_by_key(|w| (w.user_id, w.created_at));
        Ok(wallets)
    }
}

#[derive(Default)]
pub struct InMemoryTokenRepository {
    tokens: Mutex<HashMap<(Network, String), Token>>,
}

impl InMemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TokenRepository for InMemoryTokenRepository {
    async fn upsert_many(&self, tokens: &[Token]) -> Result<()> {
        let mut store = lock(&self.tokens)?;
        for token in tokens {
            store.insert(
                (token.network, token.contract_address.clone()),
                token.clone(),
            );
        }
        Ok(())
    }

    async fn find(&self, network: Network, contract_address: &str) -> Result<Option<Token>> {
        Ok(lock(&self.tokens)?
            .get(&(network, contract_address.to_string()))
            .cloned())
    }
}

/// 可选注入写入失败，用于验证"快照失败不影响其他钱包"
#[derive(Default)]
pub struct InMemorySnapshotRepository {
    snapshots: Mutex<Vec<BalanceSnapshot>>,
    failing_wallets: Mutex<Vec<Uuid>>,
}

impl InMemorySnapshotRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes_for(&self, wallet_id: Uuid) {
        if let Ok(mut failing) = self.failing_wallets.lock() {
            failing.push(wallet_id);
        }
    }

    pub fn all(&self) -> Vec<BalanceSnapshot> {
        self.snapshots.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SnapshotRepository for InMemorySnapshotRepository {
    async fn write_snapshot(
        &self,
        data: &WalletBalanceData,
        taken_at: DateTime<Utc>,
    ) -> Result<BalanceSnapshot> {
        if lock(&self.failing_wallets)?.contains(&data.wallet_id) {
            return Err(anyhow!("simulated snapshot write failure"));
        }

        let mut snapshots = lock(&self.snapshots)?;
        if snapshots
            .iter()
            .any(|s| s.wallet_id == data.wallet_id && s.taken_at == taken_at)
        {
            return Err(anyhow!("duplicate snapshot timestamp for wallet"));
        }

        let snapshot = build_snapshot(data, taken_at);
        snapshots.push(snapshot.clone());
        Ok(snapshot)
    }

    async fn latest(&self, wallet_id: Uuid) -> Result<Option<BalanceSnapshot>> {
        Ok(lock(&self.snapshots)?
            .iter()
            .filter(|s| s.wallet_id == wallet_id)
            .max_by_key(|s| s.taken_at)
            .cloned())
    }

    async fn history(&self, wallet_id: Uuid, limit: i64) -> Result<Vec<BalanceSnapshot>> {
        let mut history: Vec<BalanceSnapshot> = lock(&self.snapshots)?
            .iter()
            .filter(|s| s.wallet_id == wallet_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.taken_at.cmp(&a.taken_at));
        history.truncate(limit.max(0) as usize);
        Ok(history)
    }

    async fn latest_for_wallets(&self, wallet_ids: &[Uuid]) -> Result<Vec<BalanceSnapshot>> {
        let snapshots = lock(&self.snapshots)?;
        Ok(wallet_ids
            .iter()
            .filter_map(|id| {
                snapshots
                    .iter()
                    .filter(|s| s.wallet_id == *id)
                    .max_by_key(|s| s.taken_at)
                    .map(|s| BalanceSnapshot {
                        tokens: Vec::new(),
                        ..s.clone()
                    })
            })
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryRefreshLogRepository {
    logs: Mutex<Vec<RefreshLog>>,
}

impl InMemoryRefreshLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<RefreshLog> {
        self.logs.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RefreshLogRepository for InMemoryRefreshLogRepository {
    async fn insert(&self, user_id: Option<Uuid>, result: &RefreshResult) -> Result<Uuid> {
        let log = RefreshLog {
            id: Uuid::new_v4(),
            user_id,
            trigger: result.trigger,
            status: result.status,
            wallets_attempted: result.wallets_attempted as i32,
            wallets_succeeded: result.wallets_succeeded as i32,
            wallets_failed: result.wallets_failed as i32,
            duration_ms: result.duration_ms as i64,
            created_at: Utc::now(),
            errors: result.errors.clone(),
        };
        let id = log.id;
        lock(&self.logs)?.push(log);
        Ok(id)
    }

    async fn recent(&self, user_id: Option<Uuid>, limit: i64) -> Result<Vec<RefreshLog>> {
        let logs = lock(&self.logs)?;
        Ok(logs
            .iter()
            .rev()
            .filter(|l| user_id.is_none() || l.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryCredentialRepository {
    credentials: Mutex<HashMap<(Uuid, String), String>>,
}

impl InMemoryCredentialRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接读取密文（测试中验证未以明文存储）
    pub fn raw(&self, user_id: Uuid, key_name: &str) -> Option<String> {
        self.credentials
            .lock()
            .ok()
            .and_then(|c| c.get(&(user_id, key_name.to_string())).cloned())
    }

    /// 直接写入密文（测试中模拟损坏数据）
    pub fn put_raw(&self, user_id: Uuid, key_name: &str, value: &str) {
        if let Ok(mut credentials) = self.credentials.lock() {
            credentials.insert((user_id, key_name.to_string()), value.to_string());
        }
    }
}

#[async_trait]
impl CredentialRepository for InMemoryCredentialRepository {
    async fn upsert(&self, user_id: Uuid, key_name: &str, ciphertext: &str) -> Result<()> {
        lock(&self.credentials)?.insert((user_id, key_name.to_string()), ciphertext.to_string());
        Ok(())
    }

    async fn get(&self, user_id: Uuid, key_name: &str) -> Result<Option<String>> {
        Ok(lock(&self.credentials)?
            .get(&(user_id, key_name.to_string()))
            .cloned())
    }

    async fn delete(&self, user_id: Uuid, key_name: &str) -> Result<bool> {
        Ok(lock(&self.credentials)?
            .remove(&(user_id, key_name.to_string()))
            .is_some())
    }

    async fn list_names(&self, user_id: Uuid) -> Result<Vec<String>> {
        let mut names: Vec<String> = lock(&self.credentials)?
            .keys()
            .filter(|(uid, _)| *uid == user_id)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[derive(Default)]
pub struct InMemorySettingsRepository {
    settings: Mutex<HashMap<(String, String), String>>,
}

impl InMemorySettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn get(&self, scope: SettingScope, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.settings)?
            .get(&(scope.as_key(), key.to_string()))
            .cloned())
    }

    async fn set(&self, scope: SettingScope, key: &str, value: &str) -> Result<()> {
        lock(&self.settings)?.insert((scope.as_key(), key.to_string()), value.to_string());
        Ok(())
    }
}

/// 检查与更新在同一把锁内完成
#[derive(Default)]
pub struct InMemoryRateLimitRepository {
    markers: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryRateLimitRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitRepository for InMemoryRateLimitRepository {
    async fn try_acquire(
        &self,
        key: &str,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<RateLimitDecision> {
        let mut markers = lock(&self.markers)?;
        if let Some(last_action) = markers.get(key) {
            let retry_after = remaining_cooldown(*last_action, now, cooldown);
            if !retry_after.is_zero() {
                return Ok(RateLimitDecision::Limited { retry_after });
            }
        }
        markers.insert(key.to_string(), now);
        Ok(RateLimitDecision::Allowed)
    }
}

/// 一组共享的内存 Repository
#[derive(Clone, Default)]
pub struct InMemoryRepositories {
    pub wallets: Arc<InMemoryWalletRepository>,
    pub tokens: Arc<InMemoryTokenRepository>,
    pub snapshots: Arc<InMemorySnapshotRepository>,
    pub refresh_logs: Arc<InMemoryRefreshLogRepository>,
    pub credentials: Arc<InMemoryCredentialRepository>,
    pub settings: Arc<InMemorySettingsRepository>,
    pub rate_limits: Arc<InMemoryRateLimitRepository>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wallet_duplicate_rejected() {
        let repo = InMemoryWalletRepository::new();
        let user_id = Uuid::new_v4();
        let params = CreateWalletParams {
            user_id,
            network: Network::Ethereum,
            address: "0xabc".into(),
            name: None,
        };

        assert!(repo.create(params.clone()).await.unwrap().is_some());
        assert!(repo.create(params.clone()).await.unwrap().is_none());

        // 同地址不同网络允许
        let other_network = CreateWalletParams {
            network: Network::Base,
            ..params
        };
        assert!(repo.create(other_network).await.unwrap().is_some());
        assert_eq!(repo.list_by_user(user_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_cas() {
        let repo = InMemoryRateLimitRepository::new();
        let now = Utc::now();
        let cooldown = Duration::from_secs(60);

        assert_eq!(
            repo.try_acquire("k", now, cooldown).await.unwrap(),
            RateLimitDecision::Allowed
        );
        match repo
            .try_acquire("k", now + chrono::Duration::seconds(10), cooldown)
            .await
            .unwrap()
        {
            RateLimitDecision::Limited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(50))
            }
            other => panic!("expected limited, got {:?}", other),
        }
        assert_eq!(
            repo.try_acquire("k", now + chrono::Duration::seconds(61), cooldown)
                .await
                .unwrap(),
            RateLimitDecision::Allowed
        );
    }
}
