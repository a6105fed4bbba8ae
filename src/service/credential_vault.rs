//! 凭据保险库
//!
//! 用户的 provider API key 以 AES-256-GCM 密文落库，密钥在进程启动时由
//! scrypt 派生一次并常驻内存。读取路径失败关闭：解密或认证失败一律视为未配置。
//! 日志只出现 key 名称，不出现明文或密文。

use std::sync::Arc;

use anyhow::{Context, Result};
use uuid::Uuid;

use super::providers::{ProviderCredentials, ProviderError, ProviderFactory};
use crate::{
    config::{VaultConfig, DEFAULT_VAULT_SALT},
    domain::Network,
    infrastructure::encryption::{self, EncryptionKey, VaultError},
    repository::CredentialRepository,
};

pub const ALCHEMY_API_KEY: &str = "alchemy_api_key";
pub const HELIUS_API_KEY: &str = "helius_api_key";
pub const COINGECKO_API_KEY: &str = "coingecko_api_key";

/// 可存储的凭据名称
pub const KNOWN_CREDENTIALS: [&str; 3] = [ALCHEMY_API_KEY, HELIUS_API_KEY, COINGECKO_API_KEY];

/// 网络抓取余额所必需的凭据（Bitcoin 不需要）
pub fn required_credential(network: Network) -> Option<&'static str> {
    match network {
        Network::Bitcoin => None,
        Network::Solana => Some(HELIUS_API_KEY),
        Network::Ethereum | Network::Arbitrum | Network::Base | Network::Polygon => {
            Some(ALCHEMY_API_KEY)
        }
    }
}

pub fn is_known_credential(key_name: &str) -> bool {
    KNOWN_CREDENTIALS.contains(&key_name)
}

pub struct CredentialVault {
    repo: Arc<dyn CredentialRepository>,
    key: EncryptionKey,
}

impl CredentialVault {
    /// 派生密钥；secret 缺失属于配置错误，调用方应中止启动
    pub fn new(repo: Arc<dyn CredentialRepository>, config: &VaultConfig) -> Result<Self, VaultError> {
        if config.salt == DEFAULT_VAULT_SALT {
            tracing::warn!(
                "Credential vault is using the built-in default salt; set ENCRYPTION_SALT per deployment"
            );
        }

        let key = encryption::derive_key(&config.secret, &config.salt)?;
        tracing::info!("Credential vault key derived");

        Ok(Self { repo, key })
    }

    pub async fn store(&self, user_id: Uuid, key_name: &str, plaintext: &str) -> Result<()> {
        anyhow::ensure!(
            is_known_credential(key_name),
            "Unknown credential name: {}",
            key_name
        );
        let ciphertext = encryption::encrypt_string(plaintext, &self.key)
            .with_context(|| format!("Failed to encrypt credential {}", key_name))?;

        self.repo.upsert(user_id, key_name, &ciphertext).await?;
        tracing::info!(user_id = %user_id, key_name, "Credential stored");
        Ok(())
    }

    /// 未配置或无法解密时返回 None
    pub async fn retrieve(&self, user_id: Uuid, key_name: &str) -> Result<Option<String>> {
        let Some(ciphertext) = self.repo.get(user_id, key_name).await? else {
            return Ok(None);
        };

        match encryption::decrypt_string(&ciphertext, &self.key) {
            Ok(plaintext) => Ok(Some(plaintext)),
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    key_name,
                    error = %e,
                    "Stored credential could not be decrypted, treating as not configured"
                );
                Ok(None)
            }
        }
    }

    pub async fn exists(&self, user_id: Uuid, key_name: &str) -> Result<bool> {
        Ok(self.repo.get(user_id, key_name).await?.is_some())
    }

    pub async fn delete(&self, user_id: Uuid, key_name: &str) -> Result<bool> {
        let deleted = self.repo.delete(user_id, key_name).await?;
        if deleted {
            tracing::info!(user_id = %user_id, key_name, "Credential deleted");
        }
        Ok(deleted)
    }

    pub async fn list_names(&self, user_id: Uuid) -> Result<Vec<String>> {
        self.repo.list_names(user_id).await
    }

    /// 用于展示：只保留首尾各 4 个字符
    pub fn mask(value: &str) -> String {
        let chars: Vec<char> = value.chars().collect();
        if chars.len() <= 8 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{}{}", head, "*".repeat(chars.len() - 8), tail)
    }

    /// 一次取齐某用户全部 provider 凭据
    pub async fn load_provider_credentials(&self, user_id: Uuid) -> Result<ProviderCredentials> {
        let (alchemy, helius, coingecko) = tokio::try_join!(
            self.retrieve(user_id, ALCHEMY_API_KEY),
            self.retrieve(user_id, HELIUS_API_KEY),
            self.retrieve(user_id, COINGECKO_API_KEY),
        )?;

        Ok(ProviderCredentials {
            alchemy_api_key: alchemy,
            helius_api_key: helius,
            coingecko_api_key: coingecko,
        })
    }
}

/// 保存前用对应 provider 的探测接口验证 key
pub async fn probe_credential(
    factory: &dyn ProviderFactory,
    key_name: &str,
    value: &str,
) -> Result<(), ProviderError> {
    match key_name {
        ALCHEMY_API_KEY => {
            let creds = ProviderCredentials {
                alchemy_api_key: Some(value.to_string()),
                ..Default::default()
            };
            factory
                .balance_provider(Network::Ethereum, &creds)?
                .test_connection()
                .await
        }
        HELIUS_API_KEY => {
            let creds = ProviderCredentials {
                helius_api_key: Some(value.to_string()),
                ..Default::default()
            };
            factory
                .balance_provider(Network::Solana, &creds)?
                .test_connection()
                .await
        }
        COINGECKO_API_KEY => {
            let creds = ProviderCredentials {
                coingecko_api_key: Some(value.to_string()),
                ..Default::default()
            };
            factory.price_provider(&creds).test_connection().await
        }
        other => Err(ProviderError::api(format!("Unknown credential: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::InMemoryCredentialRepository;

    fn vault() -> (CredentialVault, Arc<InMemoryCredentialRepository>) {
        let repo = Arc::new(InMemoryCredentialRepository::new());
        let config = VaultConfig {
            secret: "unit-test-vault-secret".into(),
            salt: "unit-test-salt".into(),
        };
        let vault = CredentialVault::new(repo.clone(), &config).unwrap();
        (vault, repo)
    }

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let (vault, repo) = vault();
        let user = Uuid::new_v4();

        vault.store(user, ALCHEMY_API_KEY, "alchemy-secret").await.unwrap();

        let raw = repo.raw(user, ALCHEMY_API_KEY).unwrap();
        assert!(!raw.contains("alchemy-secret"));
        let parts: Vec<&str> = raw.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 32);
        assert_eq!(parts[1].len(), 32);

        assert_eq!(
            vault.retrieve(user, ALCHEMY_API_KEY).await.unwrap().as_deref(),
            Some("alchemy-secret")
        );
        assert!(vault.exists(user, ALCHEMY_API_KEY).await.unwrap());
        assert!(!vault.exists(user, HELIUS_API_KEY).await.unwrap());
        assert!(vault.retrieve(Uuid::new_v4(), ALCHEMY_API_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retrieve_fails_closed_on_tampered_ciphertext() {
        let (vault, repo) = vault();
        let user = Uuid::new_v4();
        vault.store(user, HELIUS_API_KEY, "helius-secret").await.unwrap();

        let raw = repo.raw(user, HELIUS_API_KEY).unwrap();
        let mut parts: Vec<String> = raw.split(':').map(String::from).collect();
        let flipped = if parts[2].starts_with('0') { "1" } else { "0" };
        parts[2].replace_range(0..1, flipped);
        repo.put_raw(user, HELIUS_API_KEY, &parts.join(":"));

        assert!(vault.retrieve(user, HELIUS_API_KEY).await.unwrap().is_none());

        repo.put_raw(user, HELIUS_API_KEY, "garbage");
        assert!(vault.retrieve(user, HELIUS_API_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_provider_credentials_and_delete() {
        let (vault, _) = vault();
        let user = Uuid::new_v4();
        vault.store(user, ALCHEMY_API_KEY, "a-key").await.unwrap();
        vault.store(user, COINGECKO_API_KEY, "cg-key").await.unwrap();

        let creds = vault.load_provider_credentials(user).await.unwrap();
        assert_eq!(creds.alchemy_api_key.as_deref(), Some("a-key"));
        assert!(creds.helius_api_key.is_none());
        assert_eq!(creds.coingecko_api_key.as_deref(), Some("cg-key"));

        assert!(vault.delete(user, ALCHEMY_API_KEY).await.unwrap());
        assert!(!vault.delete(user, ALCHEMY_API_KEY).await.unwrap());
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        let repo = Arc::new(InMemoryCredentialRepository::new());
        let config = VaultConfig {
            secret: String::new(),
            salt: "s".into(),
        };
        assert!(matches!(
            CredentialVault::new(repo, &config),
            Err(VaultError::MissingSecret)
        ));
    }

    #[test]
    fn test_mask() {
        assert_eq!(CredentialVault::mask("abcd1234efgh5678"), "abcd********5678");
        assert_eq!(CredentialVault::mask("short"), "*****");
    }

    #[test]
    fn test_required_credential() {
        assert_eq!(required_credential(Network::Bitcoin), None);
        assert_eq!(required_credential(Network::Solana), Some(HELIUS_API_KEY));
        assert_eq!(required_credential(Network::Polygon), Some(ALCHEMY_API_KEY));
        assert!(is_known_credential(COINGECKO_API_KEY));
        assert!(!is_known_credential("openai_api_key"));
    }
}
