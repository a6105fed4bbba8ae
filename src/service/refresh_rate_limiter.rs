//! 手动刷新限流
//!
//! 每个用户一条标记，放行时在开始抓取之前就写入本次时间，
//! 慢运行期间到达的并发请求会被拒绝

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::repository::{RateLimitDecision, RateLimitRepository};

pub struct RefreshRateLimiter {
    repo: Arc<dyn RateLimitRepository>,
    cooldown: Duration,
}

impl RefreshRateLimiter {
    pub fn new(repo: Arc<dyn RateLimitRepository>, cooldown: Duration) -> Self {
        Self { repo, cooldown }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    fn key(user_id: Uuid) -> String {
        format!("refresh:manual:{}", user_id)
    }

    pub async fn check(&self, user_id: Uuid) -> Result<RateLimitDecision> {
        self.check_at(user_id, Utc::now()).await
    }

    /// 原子检查并占用冷却窗口
    pub async fn check_at(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<RateLimitDecision> {
        let decision = self
            .repo
            .try_acquire(&Self::key(user_id), now, self.cooldown)
            .await?;

        if let RateLimitDecision::Limited { retry_after } = decision {
            tracing::info!(
                user_id = %user_id,
                retry_after_ms = retry_after.as_millis() as u64,
                "Manual refresh rate limited"
            );
        }

        Ok(decision)
    }
}
