//! 刷新日志 Repository：每次运行一条日志 + 失败明细子表

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::domain::{
    FetchError, FetchErrorKind, RefreshLog, RefreshResult, RefreshStatus, RefreshTrigger,
};

#[async_trait]
pub trait RefreshLogRepository: Send + Sync {
    /// 写入一次运行的日志与全部失败明细，返回日志 ID
    async fn insert(&self, user_id: Option<Uuid>, result: &RefreshResult) -> Result<Uuid>;

    /// 最近的运行日志（最新在前）
    async fn recent(&self, user_id: Option<Uuid>, limit: i64) -> Result<Vec<RefreshLog>>;
}

#[derive(Debug, FromRow)]
struct RefreshLogRow {
    id: Uuid,
    user_id: Option<Uuid>,
    trigger: String,
    status: String,
    wallets_attempted: i32,
    wallets_succeeded: i32,
    wallets_failed: i32,
    duration_ms: i64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct RefreshErrorRow {
    refresh_log_id: Uuid,
    wallet_id: Uuid,
    wallet_address: String,
    network: String,
    error_kind: String,
    message: String,
    details: Option<String>,
}

impl TryFrom<RefreshErrorRow> for FetchError {
    type Error = anyhow::Error;

    fn try_from(row: RefreshErrorRow) -> Result<Self> {
        Ok(FetchError {
            wallet_id: row.wallet_id,
            wallet_address: row.wallet_address,
            network: row.network.parse()?,
            kind: FetchErrorKind::from_db(&row.error_kind),
            message: row.message,
            details: row.details,
        })
    }
}

pub struct PgRefreshLogRepository {
    pool: PgPool,
}

impl PgRefreshLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshLogRepository for PgRefreshLogRepository {
    async fn insert(&self, user_id: Option<Uuid>, result: &RefreshResult) -> Result<Uuid> {
        let log_id = Uuid::new_v4();
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO refresh_logs (
                id, user_id, trigger, status, wallets_attempted, wallets_succeeded,
                wallets_failed, duration_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(log_id)
        .bind(user_id)
        .bind(result.trigger.as_str())
        .bind(result.status.as_str())
        .bind(result.wallets_attempted as i32)
        .bind(result.wallets_succeeded as i32)
        .bind(result.wallets_failed as i32)
        .bind(result.duration_ms as i64)
        .execute(&mut *tx)
        .await
        .context("Failed to insert refresh log")?;

        for error in &result.errors {
            sqlx::query(
                r#"
                INSERT INTO refresh_errors (
                    id, refresh_log_id, wallet_id, wallet_address, network, error_kind,
                    message, details
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(log_id)
            .bind(error.wallet_id)
            .bind(&error.wallet_address)
            .bind(error.network.as_str())
            .bind(error.kind.as_str())
            .bind(&error.message)
            .bind(&error.details)
            .execute(&mut *tx)
            .await
            .context("Failed to insert refresh error")?;
        }

        tx.commit().await.context("Failed to commit refresh log")?;
        Ok(log_id)
    }

    async fn recent(&self, user_id: Option<Uuid>, limit: i64) -> Result<Vec<RefreshLog>> {
        let rows = sqlx::query_as::<_, RefreshLogRow>(
            r#"
            SELECT id, user_id, trigger, status, wallets_attempted, wallets_succeeded,
                   wallets_failed, duration_ms, created_at
            FROM refresh_logs
            WHERE ($1::UUID IS NULL OR user_id = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query refresh logs")?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let error_rows = if ids.is_empty() {
            Vec::new()
        } else {
            sqlx::query_as::<_, RefreshErrorRow>(
                r#"
                SELECT refresh_log_id, wallet_id, wallet_address, network, error_kind,
                       message, details
                FROM refresh_errors
                WHERE refresh_log_id = ANY($1)
                "#,
            )
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query refresh errors")?
        };

        let mut errors: HashMap<Uuid, Vec<FetchError>> = HashMap::new();
        for row in error_rows {
            let log_id = row.refresh_log_id;
            errors.entry(log_id).or_default().push(row.try_into()?);
        }

        Ok(rows
            .into_iter()
            .map(|row| RefreshLog {
                errors: errors.remove(&row.id).unwrap_or_default(),
                id: row.id,
                user_id: row.user_id,
                trigger: RefreshTrigger::from_db(&row.trigger),
                status: RefreshStatus::from_db(&row.status),
                wallets_attempted: row.wallets_attempted,
                wallets_succeeded: row.wallets_succeeded,
                wallets_failed: row.wallets_failed,
                duration_ms: row.duration_ms,
                created_at: row.created_at,
            })
            .collect())
    }
}
