//! 设置 Repository（键值，按全局 / 用户分区）

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// 用户代币阈值（USD）
pub const TOKEN_THRESHOLD_KEY: &str = "token_threshold_usd";
/// 最近一次定时刷新完成时间（RFC 3339）
pub const LAST_SCHEDULED_REFRESH_KEY: &str = "last_scheduled_refresh";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingScope {
    Global,
    User(Uuid),
}

impl SettingScope {
    pub fn as_key(&self) -> String {
        match self {
            Self::Global => "global".to_string(),
            Self::User(id) => id.to_string(),
        }
    }
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, scope: SettingScope, key: &str) -> Result<Option<String>>;

    async fn set(&self, scope: SettingScope, key: &str, value: &str) -> Result<()>;
}

pub struct PgSettingsRepository {
    pool: PgPool,
}

impl PgSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for PgSettingsRepository {
    async fn get(&self, scope: SettingScope, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM settings WHERE scope = $1 AND key = $2",
        )
        .bind(scope.as_key())
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to read setting {}", key))?;

        Ok(value)
    }

    async fn set(&self, scope: SettingScope, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (scope, key, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (scope, key)
            DO UPDATE SET value = EXCLUDED.value, updated_at = now()
            "#,
        )
        .bind(scope.as_key())
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to write setting {}", key))?;

        Ok(())
    }
}
