//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::{path::Path, str::FromStr};

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 默认应用级盐（所有未覆盖的部署共享）
pub const DEFAULT_VAULT_SALT: &str = "pulsar-salt";

/// 应用配置结构体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

/// JWT配置（只校验，不签发）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: String,
}

/// 凭据保险库配置
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub secret: String,
    pub salt: String,
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("secret", &"***")
            .field("salt", &self.salt)
            .finish()
    }
}

/// 上游数据源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// `{network}` 与 `{api_key}` 会被替换
    pub alchemy_url_template: String,
    pub helius_url: String,
    pub blockstream_url: String,
    pub coingecko_url: String,
    pub coingecko_pro_url: String,
    pub request_timeout_secs: u64,
    pub token_metadata_batch_size: usize,
    pub price_batch_size: usize,
    pub price_batch_delay_ms: u64,
}

/// 刷新与调度配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// 显式 cron（6 段，含秒），优先于 refreshes_per_day
    pub cron: Option<String>,
    pub refreshes_per_day: Option<u32>,
    pub manual_cooldown_secs: u64,
    pub default_token_threshold_usd: Decimal,
    pub max_concurrent_wallets: usize,
    /// 单次运行的截止时间；不设置则不限时
    pub run_timeout_secs: Option<u64>,
    pub history_page_size: i64,
    pub scheduler_enabled: bool,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env_string("DATABASE_URL", "postgres://postgres@localhost:5432/pulsar"),
            max_connections: env_parse("DB_MAX_CONNS", 16),
            min_connections: env_parse("DB_MIN_CONNS", 2),
            acquire_timeout_secs: env_parse("DB_ACQ_TIMEOUT_SECS", 5),
            idle_timeout_secs: env_parse("DB_IDLE_TIMEOUT_SECS", 300),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: env_string("BIND_ADDR", "0.0.0.0:8088"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: env_string("LOG_LEVEL", "info"),
            format: env_string("LOG_FORMAT", "text"),
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: env_string("JWT_SECRET", ""),
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            secret: env_string("ENCRYPTION_SECRET", ""),
            salt: env_string("ENCRYPTION_SALT", DEFAULT_VAULT_SALT),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            alchemy_url_template: env_string(
                "ALCHEMY_URL_TEMPLATE",
                "https://{network}.g.alchemy.com/v2/{api_key}",
            ),
            helius_url: env_string("HELIUS_URL", "https://mainnet.helius-rpc.com"),
            blockstream_url: env_string("BLOCKSTREAM_URL", "https://blockstream.info/api"),
            coingecko_url: env_string("COINGECKO_BASE_URL", "https://api.coingecko.com/api/v3"),
            coingecko_pro_url: env_string(
                "COINGECKO_PRO_BASE_URL",
                "https://pro-api.coingecko.com/api/v3",
            ),
            request_timeout_secs: env_parse("PROVIDER_TIMEOUT_SECS", 30),
            token_metadata_batch_size: env_parse("TOKEN_METADATA_BATCH_SIZE", 10),
            price_batch_size: env_parse("PRICE_BATCH_SIZE", 100),
            price_batch_delay_ms: env_parse("PRICE_BATCH_DELAY_MS", 200),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            cron: std::env::var("REFRESH_CRON").ok().filter(|v| !v.is_empty()),
            refreshes_per_day: std::env::var("REFRESHES_PER_DAY")
                .ok()
                .and_then(|s| s.parse().ok()),
            manual_cooldown_secs: env_parse("MANUAL_REFRESH_COOLDOWN_SECS", 60),
            default_token_threshold_usd: env_parse(
                "DEFAULT_TOKEN_THRESHOLD_USD",
                Decimal::new(10, 2),
            ),
            max_concurrent_wallets: env_parse("REFRESH_MAX_CONCURRENT_WALLETS", 4),
            run_timeout_secs: std::env::var("REFRESH_RUN_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
            history_page_size: env_parse("SNAPSHOT_HISTORY_PAGE_SIZE", 30),
            scheduler_enabled: std::env::var("SCHEDULER_ENABLED")
                .map(|v| v != "0" && v.to_lowercase() != "false")
                .unwrap_or(true),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Ok(Self::default())
    }

    /// 从配置文件加载配置（文件中缺失的段回落到环境变量默认值）
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(path) if path.as_ref().exists() => Self::from_file(path),
            _ => Self::from_env(),
        }
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.starts_with("postgres://")
            && !self.database.url.starts_with("postgresql://")
        {
            anyhow::bail!("DATABASE_URL must start with postgres:// or postgresql://");
        }

        if self.jwt.secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters");
        }

        if self.vault.secret.is_empty() {
            anyhow::bail!("ENCRYPTION_SECRET must be set");
        }
        if self.vault.secret.len() < 16 {
            anyhow::bail!("ENCRYPTION_SECRET must be at least 16 characters");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        if let Some(cron) = &self.refresh.cron {
            let fields = cron.split_whitespace().count();
            if !(6..=7).contains(&fields) {
                anyhow::bail!(
                    "REFRESH_CRON must have 6 or 7 fields (with seconds), got {}: {:?}",
                    fields,
                    cron
                );
            }
        }

        if self.refresh.max_concurrent_wallets == 0 {
            anyhow::bail!("REFRESH_MAX_CONCURRENT_WALLETS must be greater than 0");
        }

        if self.refresh.default_token_threshold_usd.is_sign_negative() {
            anyhow::bail!("DEFAULT_TOKEN_THRESHOLD_USD must not be negative");
        }

        if self.refresh.history_page_size <= 0 {
            anyhow::bail!("SNAPSHOT_HISTORY_PAGE_SIZE must be greater than 0");
        }

        if self.providers.token_metadata_batch_size == 0 || self.providers.price_batch_size == 0 {
            anyhow::bail!("provider batch sizes must be greater than 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.database.url = "postgres://localhost/pulsar".into();
        config.jwt.secret = "x".repeat(32);
        config.vault.secret = "vault-secret-for-tests".into();
        config.logging.level = "info".into();
        config.logging.format = "text".into();
        config.refresh.cron = None;
        config.refresh.max_concurrent_wallets = 4;
        config
    }

    #[test]
    fn test_validate_accepts_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_vault_secret() {
        let mut config = valid_config();
        config.vault.secret = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ENCRYPTION_SECRET"));
    }

    #[test]
    fn test_validate_rejects_bad_cron() {
        let mut config = valid_config();
        config.refresh.cron = Some("0 */4 * * *".into());
        assert!(config.validate().is_err());

        config.refresh.cron = Some("0 0 */4 * * *".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = valid_config();
        config.refresh.max_concurrent_wallets = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[refresh]
cron = "0 0 12 * * *"
manual_cooldown_secs = 120
default_token_threshold_usd = "0.25"
max_concurrent_wallets = 2
history_page_size = 10
scheduler_enabled = false
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.refresh.cron.as_deref(), Some("0 0 12 * * *"));
        assert_eq!(config.refresh.manual_cooldown_secs, 120);
        assert_eq!(config.refresh.default_token_threshold_usd, Decimal::new(25, 2));
        assert!(!config.refresh.scheduler_enabled);
        // 未出现的段使用默认值
        assert_eq!(config.providers.price_batch_size, 100);
    }
}
