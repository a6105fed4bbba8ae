//! 定时刷新调度
//!
//! 单个 cron 任务（UTC）触发全量刷新。运行互斥由协调器的单槽守卫保证，
//! 上一次还没跑完时新的 tick 只记日志，不排队。修改 cron 需要先停再起。

use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use super::refresh_coordinator::RefreshCoordinator;
use crate::{
    config::RefreshConfig,
    domain::{RefreshResult, RefreshTrigger},
    repository::{settings::LAST_SCHEDULED_REFRESH_KEY, SettingScope, SettingsRepository},
};

/// 默认每 4 小时一次（每天 6 次）
pub const DEFAULT_CRON: &str = "0 0 */4 * * *";

/// 每日刷新次数 → cron（秒 分 时 日 月 周）
pub fn cron_for_refreshes_per_day(refreshes_per_day: u32) -> &'static str {
    match refreshes_per_day {
        1 => "0 0 12 * * *",
        3 => "0 0 8,14,20 * * *",
        10 => "0 0 0,2,5,7,10,12,14,17,19,22 * * *",
        _ => "0 0 6,10,14,18,22 * * *",
    }
}

/// 显式 cron 优先，其次每日次数预设，最后默认值
pub fn resolve_cron(config: &RefreshConfig) -> String {
    if let Some(cron) = config.cron.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        return cron.to_string();
    }
    match config.refreshes_per_day {
        Some(n) => cron_for_refreshes_per_day(n).to_string(),
        None => DEFAULT_CRON.to_string(),
    }
}

/// 一次定时运行（可在 cron 回调里克隆使用）
#[derive(Clone)]
struct ScheduledRun {
    coordinator: Arc<RefreshCoordinator>,
    settings: Arc<dyn SettingsRepository>,
    last_run: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl ScheduledRun {
    async fn execute(&self) -> Result<Option<RefreshResult>> {
        tracing::info!("Scheduled balance refresh starting");

        let Some(result) = self
            .coordinator
            .refresh_all_exclusive(RefreshTrigger::Scheduled)
            .await?
        else {
            tracing::warn!("Previous scheduled refresh still running, skipping this tick");
            return Ok(None);
        };

        let finished_at = Utc::now();
        if let Ok(mut last_run) = self.last_run.write() {
            *last_run = Some(finished_at);
        }
        if let Err(e) = self
            .settings
            .set(
                SettingScope::Global,
                LAST_SCHEDULED_REFRESH_KEY,
                &finished_at.to_rfc3339(),
            )
            .await
        {
            tracing::warn!(error = ?e, "Failed to record last scheduled refresh time");
        }

        tracing::info!(
            status = result.status.as_str(),
            succeeded = result.wallets_succeeded,
            attempted = result.wallets_attempted,
            duration_ms = result.duration_ms,
            "Scheduled balance refresh complete"
        );
        for error in &result.errors {
            tracing::warn!(
                wallet_id = %error.wallet_id,
                network = %error.network,
                kind = %error.kind,
                error = %error.message,
                "Scheduled refresh wallet failure"
            );
        }

        Ok(Some(result))
    }
}

struct ActiveSchedule {
    scheduler: JobScheduler,
    job_id: Uuid,
    cron: String,
}

pub struct RefreshScheduler {
    run: ScheduledRun,
    active: Mutex<Option<ActiveSchedule>>,
}

impl RefreshScheduler {
    pub fn new(coordinator: Arc<RefreshCoordinator>, settings: Arc<dyn SettingsRepository>) -> Self {
        Self {
            run: ScheduledRun {
                coordinator,
                settings,
                last_run: Arc::new(RwLock::new(None)),
            },
            active: Mutex::new(None),
        }
    }

    /// 注册并启动 cron 任务；已在运行时先停止旧任务
    pub async fn start(&self, cron: &str) -> Result<()> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            Self::shutdown(previous).await;
        }

        let scheduler = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;

        let run = self.run.clone();
        let job = Job::new_async(cron, move |_uuid, _lock| {
            let run = run.clone();
            Box::pin(async move {
                if let Err(e) = run.execute().await {
                    tracing::error!(error = ?e, "Scheduled balance refresh failed");
                }
            })
        })
        .with_context(|| format!("Invalid cron expression: {}", cron))?;

        let job_id = scheduler
            .add(job)
            .await
            .context("Failed to add refresh job")?;
        scheduler
            .start()
            .await
            .context("Failed to start job scheduler")?;

        tracing::info!(cron, "Refresh scheduler started");
        *active = Some(ActiveSchedule {
            scheduler,
            job_id,
            cron: cron.to_string(),
        });
        Ok(())
    }

    pub async fn stop(&self) {
        if let Some(previous) = self.active.lock().await.take() {
            Self::shutdown(previous).await;
            tracing::info!("Refresh scheduler stopped");
        }
    }

    /// 先停后起；不影响正在进行的运行
    pub async fn reschedule(&self, cron: &str) -> Result<()> {
        tracing::info!(cron, "Rescheduling refresh job");
        self.start(cron).await
    }

    async fn shutdown(mut schedule: ActiveSchedule) {
        if let Err(e) = schedule.scheduler.remove(&schedule.job_id).await {
            tracing::warn!(error = %e, "Failed to remove refresh job");
        }
        if let Err(e) = schedule.scheduler.shutdown().await {
            tracing::warn!(error = %e, "Failed to shut down job scheduler");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    pub async fn cron(&self) -> Option<String> {
        self.active.lock().await.as_ref().map(|a| a.cron.clone())
    }

    pub async fn next_run(&self) -> Option<DateTime<Utc>> {
        let active = self.active.lock().await;
        let schedule = active.as_ref()?;
        let mut scheduler = schedule.scheduler.clone();
        match scheduler.next_tick_for_job(schedule.job_id).await {
            Ok(next) => next,
            Err(e) => {
                tracing::debug!(error = %e, "Could not compute next refresh tick");
                None
            }
        }
    }

    /// 最近一次完成的定时运行；进程重启后从设置中恢复
    pub async fn last_run(&self) -> Option<DateTime<Utc>> {
        if let Some(last) = self.run.last_run.read().ok().and_then(|l| *l) {
            return Some(last);
        }

        let stored = self
            .run
            .settings
            .get(SettingScope::Global, LAST_SCHEDULED_REFRESH_KEY)
            .await
            .ok()
            .flatten()?;
        DateTime::parse_from_rfc3339(&stored)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// 立即执行一次定时运行（与 cron 回调相同的路径）；被守卫拒绝时返回 None
    pub async fn run_scheduled_once(&self) -> Result<Option<RefreshResult>> {
        self.run.execute().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(cron_for_refreshes_per_day(1), "0 0 12 * * *");
        assert_eq!(cron_for_refreshes_per_day(3), "0 0 8,14,20 * * *");
        assert_eq!(cron_for_refreshes_per_day(5), "0 0 6,10,14,18,22 * * *");
        assert_eq!(
            cron_for_refreshes_per_day(10),
            "0 0 0,2,5,7,10,12,14,17,19,22 * * *"
        );
        assert_eq!(cron_for_refreshes_per_day(7), "0 0 6,10,14,18,22 * * *");
    }

    #[test]
    fn test_resolve_cron_order() {
        let mut config = RefreshConfig {
            cron: None,
            refreshes_per_day: None,
            ..RefreshConfig::default()
        };
        assert_eq!(resolve_cron(&config), DEFAULT_CRON);

        config.refreshes_per_day = Some(3);
        assert_eq!(resolve_cron(&config), "0 0 8,14,20 * * *");

        config.cron = Some("0 30 * * * *".into());
        assert_eq!(resolve_cron(&config), "0 30 * * * *");

        config.cron = Some("   ".into());
        assert_eq!(resolve_cron(&config), "0 0 8,14,20 * * *");
    }
}
