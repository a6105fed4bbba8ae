//! 凭据 Repository：只存密文，明文不落库

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn upsert(&self, user_id: Uuid, key_name: &str, ciphertext: &str) -> Result<()>;

    async fn get(&self, user_id: Uuid, key_name: &str) -> Result<Option<String>>;

    async fn delete(&self, user_id: Uuid, key_name: &str) -> Result<bool>;

    /// 用户已配置的凭据名称
    async fn list_names(&self, user_id: Uuid) -> Result<Vec<String>>;
}

pub struct PgCredentialRepository {
    pool: PgPool,
}

impl PgCredentialRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialRepository for PgCredentialRepository {
    async fn upsert(&self, user_id: Uuid, key_name: &str, ciphertext: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO credentials (user_id, key_name, ciphertext)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, key_name)
            DO UPDATE SET ciphertext = EXCLUDED.ciphertext, updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(key_name)
        .bind(ciphertext)
        .execute(&self.pool)
        .await
        .context("Failed to upsert credential")?;

        Ok(())
    }

    async fn get(&self, user_id: Uuid, key_name: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT ciphertext FROM credentials WHERE user_id = $1 AND key_name = $2",
        )
        .bind(user_id)
        .bind(key_name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query credential")?;

        Ok(value)
    }

    async fn delete(&self, user_id: Uuid, key_name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE user_id = $1 AND key_name = $2")
            .bind(user_id)
            .bind(key_name)
            .execute(&self.pool)
            .await
            .context("Failed to delete credential")?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_names(&self, user_id: Uuid) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT key_name FROM credentials WHERE user_id = $1 ORDER BY key_name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list credentials")?;

        Ok(names)
    }
}
