//! 快照存储
//!
//! 每个钱包一次写入 = 一个事务：父快照 + 全部代币快照，要么全部可见要么都不存在
//! 快照只追加，不更新

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::domain::{BalanceSnapshot, TokenSnapshot, WalletBalanceData};

/// 由估值结果构造待写入的快照；总值按落库的代币行重新计算
pub fn build_snapshot(data: &WalletBalanceData, taken_at: DateTime<Utc>) -> BalanceSnapshot {
    let tokens: Vec<TokenSnapshot> = data
        .tokens
        .iter()
        .map(|t| TokenSnapshot {
            contract_address: t.contract_address.clone(),
            symbol: t.symbol.clone(),
            decimals: t.decimals,
            balance: t.balance.clone(),
            balance_usd: t.balance_usd,
            price_usd: t.price_usd,
        })
        .collect();
    let tokens_usd_value: Decimal = tokens.iter().map(|t| t.balance_usd).sum();

    BalanceSnapshot {
        id: Uuid::new_v4(),
        wallet_id: data.wallet_id,
        native_balance: data.native_balance.clone(),
        native_balance_usd: data.native_balance_usd,
        native_price_usd: data.native_price_usd,
        tokens_usd_value,
        total_usd_value: data.native_balance_usd + tokens_usd_value,
        taken_at,
        tokens,
    }
}

#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// 原子写入一个钱包的快照
    async fn write_snapshot(
        &self,
        data: &WalletBalanceData,
        taken_at: DateTime<Utc>,
    ) -> Result<BalanceSnapshot>;

    /// 钱包最新快照（含代币行）
    async fn latest(&self, wallet_id: Uuid) -> Result<Option<BalanceSnapshot>>;

    /// 历史快照，最新在前
    async fn history(&self, wallet_id: Uuid, limit: i64) -> Result<Vec<BalanceSnapshot>>;

    /// 多个钱包各自的最新快照（不含代币行）
    async fn latest_for_wallets(&self, wallet_ids: &[Uuid]) -> Result<Vec<BalanceSnapshot>>;
}

#[derive(Debug, FromRow)]
struct SnapshotRow {
    id: Uuid,
    wallet_id: Uuid,
    native_balance: String,
    native_balance_usd: Decimal,
    native_price_usd: Decimal,
    tokens_usd_value: Decimal,
    total_usd_value: Decimal,
    taken_at: DateTime<Utc>,
}

impl SnapshotRow {
    fn into_snapshot(self, tokens: Vec<TokenSnapshot>) -> BalanceSnapshot {
        BalanceSnapshot {
            id: self.id,
            wallet_id: self.wallet_id,
            native_balance: self.native_balance,
            native_balance_usd: self.native_balance_usd,
            native_price_usd: self.native_price_usd,
            tokens_usd_value: self.tokens_usd_value,
            total_usd_value: self.total_usd_value,
            taken_at: self.taken_at,
            tokens,
        }
    }
}

#[derive(Debug, FromRow)]
struct TokenSnapshotRow {
    snapshot_id: Uuid,
    contract_address: String,
    symbol: String,
    decimals: i32,
    balance: String,
    balance_usd: Decimal,
    price_usd: Decimal,
}

impl From<TokenSnapshotRow> for TokenSnapshot {
    fn from(row: TokenSnapshotRow) -> Self {
        TokenSnapshot {
            contract_address: row.contract_address,
            symbol: row.symbol,
            decimals: row.decimals.max(0) as u32,
            balance: row.balance,
            balance_usd: row.balance_usd,
            price_usd: row.price_usd,
        }
    }
}

const SNAPSHOT_COLUMNS: &str = "id, wallet_id, native_balance, native_balance_usd, \
     native_price_usd, tokens_usd_value, total_usd_value, taken_at";

pub struct PgSnapshotRepository {
    pool: PgPool,
}

impl PgSnapshotRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_tokens(&self, snapshot_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<TokenSnapshot>>> {
        if snapshot_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, TokenSnapshotRow>(
            r#"
            SELECT snapshot_id, contract_address, symbol, decimals, balance, balance_usd, price_usd
            FROM token_snapshots
            WHERE snapshot_id = ANY($1)
            ORDER BY balance_usd DESC
            "#,
        )
        .bind(snapshot_ids)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load token snapshots")?;

        let mut grouped: HashMap<Uuid, Vec<TokenSnapshot>> = HashMap::new();
        for row in rows {
            grouped.entry(row.snapshot_id).or_default().push(row.into());
        }
        Ok(grouped)
    }
}

#[async_trait]
impl SnapshotRepository for PgSnapshotRepository {
    async fn write_snapshot(
        &self,
        data: &WalletBalanceData,
        taken_at: DateTime<Utc>,
    ) -> Result<BalanceSnapshot> {
        let snapshot = build_snapshot(data, taken_at);

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO balance_snapshots (
                id, wallet_id, native_balance, native_balance_usd, native_price_usd,
                tokens_usd_value, total_usd_value, taken_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(snapshot.id)
        .bind(snapshot.wallet_id)
        .bind(&snapshot.native_balance)
        .bind(snapshot.native_balance_usd)
        .bind(snapshot.native_price_usd)
        .bind(snapshot.tokens_usd_value)
        .bind(snapshot.total_usd_value)
        .bind(snapshot.taken_at)
        .execute(&mut *tx)
        .await
        .context("Failed to insert balance snapshot")?;

        for token in &snapshot.tokens {
            sqlx::query(
                r#"
                INSERT INTO token_snapshots (
                    id, snapshot_id, contract_address, symbol, decimals, balance,
                    balance_usd, price_usd
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(snapshot.id)
            .bind(&token.contract_address)
            .bind(&token.symbol)
            .bind(token.decimals as i32)
            .bind(&token.balance)
            .bind(token.balance_usd)
            .bind(token.price_usd)
            .execute(&mut *tx)
            .await
            .context("Failed to insert token snapshot")?;
        }

        // 任一插入失败时 tx 被 drop，自动回滚
        tx.commit().await.context("Failed to commit snapshot")?;

        Ok(snapshot)
    }

    async fn latest(&self, wallet_id: Uuid) -> Result<Option<BalanceSnapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM balance_snapshots
             WHERE wallet_id = $1 ORDER BY taken_at DESC LIMIT 1"
        ))
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query latest snapshot")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut tokens = self.load_tokens(&[row.id]).await?;
        let snapshot_tokens = tokens.remove(&row.id).unwrap_or_default();
        Ok(Some(row.into_snapshot(snapshot_tokens)))
    }

    async fn history(&self, wallet_id: Uuid, limit: i64) -> Result<Vec<BalanceSnapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM balance_snapshots
             WHERE wallet_id = $1 ORDER BY taken_at DESC LIMIT $2"
        ))
        .bind(wallet_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query snapshot history")?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut tokens = self.load_tokens(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let snapshot_tokens = tokens.remove(&row.id).unwrap_or_default();
                row.into_snapshot(snapshot_tokens)
            })
            .collect())
    }

    async fn latest_for_wallets(&self, wallet_ids: &[Uuid]) -> Result<Vec<BalanceSnapshot>> {
        if wallet_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT DISTINCT ON (wallet_id) {SNAPSHOT_COLUMNS} FROM balance_snapshots
             WHERE wallet_id = ANY($1)
             ORDER BY wallet_id, taken_at DESC"
        ))
        .bind(wallet_ids)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query latest snapshots")?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_snapshot(Vec::new()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Network, TokenData};

    fn token(symbol: &str, usd: Decimal) -> TokenData {
        TokenData {
            contract_address: format!("0x{}", symbol.to_lowercase()),
            symbol: symbol.into(),
            name: None,
            decimals: 6,
            balance: "1000000".into(),
            balance_formatted: Decimal::ONE,
            balance_usd: usd,
            price_usd: usd,
            logo_url: None,
        }
    }

    #[test]
    fn test_build_snapshot_recomputes_total() {
        let data = WalletBalanceData {
            wallet_id: Uuid::new_v4(),
            network: Network::Ethereum,
            address: "0xabc".into(),
            native_balance: "1500000000000000000".into(),
            native_balance_formatted: Decimal::new(15, 1),
            native_balance_usd: Decimal::from(3000),
            native_price_usd: Decimal::from(2000),
            tokens: vec![token("USDC", Decimal::new(50, 2)), token("DAI", Decimal::from(2))],
            // 故意给出不一致的聚合值
            tokens_usd_value: Decimal::from(999),
            total_usd_value: Decimal::from(999),
        };

        let snapshot = build_snapshot(&data, Utc::now());
        assert_eq!(snapshot.tokens.len(), 2);
        assert_eq!(snapshot.tokens_usd_value, Decimal::new(250, 2));
        assert_eq!(snapshot.total_usd_value, Decimal::new(300250, 2));
    }
}
