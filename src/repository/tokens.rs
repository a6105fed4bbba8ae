//! 代币注册表 Repository
//! 抓取到非零余额时顺带更新，网络内共享

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use crate::domain::{Network, Token};

#[derive(Debug, FromRow)]
struct TokenRow {
    network: String,
    contract_address: String,
    symbol: String,
    name: Option<String>,
    decimals: i32,
    logo_url: Option<String>,
}

impl TryFrom<TokenRow> for Token {
    type Error = anyhow::Error;

    fn try_from(row: TokenRow) -> Result<Self> {
        Ok(Token {
            network: row.network.parse()?,
            contract_address: row.contract_address,
            symbol: row.symbol,
            name: row.name,
            decimals: u32::try_from(row.decimals).context("negative token decimals")?,
            logo_url: row.logo_url,
        })
    }
}

/// Repository Trait
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// 批量 upsert（按 network + contract_address）
    async fn upsert_many(&self, tokens: &[Token]) -> Result<()>;

    /// 根据地址和网络获取代币
    async fn find(&self, network: Network, contract_address: &str) -> Result<Option<Token>>;
}

/// PostgreSQL 实现
pub struct PgTokenRepository {
    pool: PgPool,
}

impl PgTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for PgTokenRepository {
    async fn upsert_many(&self, tokens: &[Token]) -> Result<()> {
        if tokens.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        for token in tokens {
            sqlx::query(
                r#"
                INSERT INTO tokens (network, contract_address, symbol, name, decimals, logo_url)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (network, contract_address) DO UPDATE SET
                    symbol = EXCLUDED.symbol,
                    name = COALESCE(EXCLUDED.name, tokens.name),
                    decimals = EXCLUDED.decimals,
                    logo_url = COALESCE(EXCLUDED.logo_url, tokens.logo_url),
                    updated_at = now()
                "#,
            )
            .bind(token.network.as_str())
            .bind(&token.contract_address)
            .bind(&token.symbol)
            .bind(&token.name)
            .bind(token.decimals as i32)
            .bind(&token.logo_url)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert token {}", token.contract_address))?;
        }
        tx.commit().await.context("Failed to commit token upsert")?;

        Ok(())
    }

    async fn find(&self, network: Network, contract_address: &str) -> Result<Option<Token>> {
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT network, contract_address, symbol, name, decimals, logo_url
            FROM tokens
            WHERE network = $1 AND contract_address = $2
            "#,
        )
        .bind(network.as_str())
        .bind(contract_address)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query token")?;

        row.map(Token::try_from).transpose()
    }
}
