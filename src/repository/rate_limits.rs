//! 限流标记 Repository
//!
//! 检查与更新在同一条 upsert 语句里完成（数据库级 CAS），
//! 并发请求不会同时越过冷却窗口

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// 已放行，标记已更新为本次时间
    Allowed,
    /// 仍在冷却中
    Limited { retry_after: Duration },
}

/// 剩余冷却时间（已过期返回零）
pub fn remaining_cooldown(
    last_action: DateTime<Utc>,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> Duration {
    let elapsed = (now - last_action).to_std().unwrap_or(Duration::ZERO);
    cooldown.saturating_sub(elapsed)
}

#[async_trait]
pub trait RateLimitRepository: Send + Sync {
    /// 原子地检查并占用：last_action 早于 now - cooldown（或不存在）时写入 now 并放行
    async fn try_acquire(
        &self,
        key: &str,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<RateLimitDecision>;
}

pub struct PgRateLimitRepository {
    pool: PgPool,
}

impl PgRateLimitRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitRepository for PgRateLimitRepository {
    async fn try_acquire(
        &self,
        key: &str,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<RateLimitDecision> {
        let cooldown_chrono =
            chrono::Duration::from_std(cooldown).context("cooldown out of range")?;
        let threshold = now - cooldown_chrono;

        let acquired = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            INSERT INTO rate_limits (key, last_action)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET last_action = EXCLUDED.last_action
            WHERE rate_limits.last_action <= $3
            RETURNING last_action
            "#,
        )
        .bind(key)
        .bind(now)
        .bind(threshold)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update rate limit marker")?;

        if acquired.is_some() {
            return Ok(RateLimitDecision::Allowed);
        }

        let last_action = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT last_action FROM rate_limits WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read rate limit marker")?
        .unwrap_or(now);

        Ok(RateLimitDecision::Limited {
            retry_after: remaining_cooldown(last_action, now, cooldown),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_cooldown() {
        let now = Utc::now();
        let cooldown = Duration::from_secs(60);

        assert_eq!(
            remaining_cooldown(now - chrono::Duration::seconds(15), now, cooldown),
            Duration::from_secs(45)
        );
        assert_eq!(
            remaining_cooldown(now - chrono::Duration::seconds(90), now, cooldown),
            Duration::ZERO
        );
        // 时钟回拨：视为刚刚发生
        assert_eq!(
            remaining_cooldown(now + chrono::Duration::seconds(5), now, cooldown),
            cooldown
        );
    }
}
