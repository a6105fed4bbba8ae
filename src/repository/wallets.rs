// 钱包数据访问 Repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::domain::{Network, Wallet};

/// 创建钱包参数（地址已规范化）
#[derive(Debug, Clone)]
pub struct CreateWalletParams {
    pub user_id: Uuid,
    pub network: Network,
    pub address: String,
    pub name: Option<String>,
}

#[derive(Debug, FromRow)]
struct WalletRow {
    id: Uuid,
    user_id: Uuid,
    network: String,
    address: String,
    name: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<WalletRow> for Wallet {
    type Error = anyhow::Error;

    fn try_from(row: WalletRow) -> Result<Self> {
        Ok(Wallet {
            id: row.id,
            user_id: row.user_id,
            network: row.network.parse()?,
            address: row.address,
            name: row.name,
            created_at: row.created_at,
        })
    }
}

fn into_wallets(rows: Vec<WalletRow>) -> Result<Vec<Wallet>> {
    rows.into_iter().map(Wallet::try_from).collect()
}

#[async_trait]
pub trait WalletRepository: Send + Sync {
    /// 创建钱包；(user, network, address) 已存在时返回 None
    async fn create(&self, params: CreateWalletParams) -> Result<Option<Wallet>>;

    /// 根据 ID 查询钱包
    async fn find_by_id(&self, wallet_id: Uuid) -> Result<Option<Wallet>>;

    /// 删除钱包（快照级联删除）
    async fn delete(&self, wallet_id: Uuid) -> Result<bool>;

    /// 列出用户的所有钱包
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Wallet>>;

    /// 列出所有钱包（定时刷新）
    async fn list_all(&self) -> Result<Vec<Wallet>>;
}

// ============ PostgreSQL 实现 ============

pub struct PgWalletRepository {
    pool: PgPool,
}

impl PgWalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const WALLET_COLUMNS: &str = "id, user_id, network, address, name, created_at";

#[async_trait]
impl WalletRepository for PgWalletRepository {
    async fn create(&self, params: CreateWalletParams) -> Result<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>(&format!(
            "INSERT INTO wallets (id, user_id, network, address, name)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (user_id, network, address) DO NOTHING
             RETURNING {WALLET_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(params.user_id)
        .bind(params.network.as_str())
        .bind(&params.address)
        .bind(&params.name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to insert wallet")?;

        row.map(Wallet::try_from).transpose()
    }

    async fn find_by_id(&self, wallet_id: Uuid) -> Result<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE id = $1"
        ))
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query wallet by id")?;

        row.map(Wallet::try_from).transpose()
    }

    async fn delete(&self, wallet_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM wallets WHERE id = $1")
            .bind(wallet_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete wallet")?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Wallet>> {
        let rows = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = $1 ORDER BY created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list wallets for user")?;

        into_wallets(rows)
    }

    async fn list_all(&self) -> Result<Vec<Wallet>> {
        let rows = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets ORDER BY user_id, created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list wallets")?;

        into_wallets(rows)
    }
}
