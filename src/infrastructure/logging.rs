//! 日志系统配置模块
//! 支持结构化日志与日志级别配置

use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::config::LoggingConfig;

/// 初始化日志系统（RUST_LOG 优先于配置中的级别）
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))?;

    if config.format == "json" {
        Registry::default()
            .with(filter)
            .with(fmt::layer().json().with_timer(ChronoUtc::rfc_3339()))
            .try_init()?;
    } else {
        Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(true),
            )
            .try_init()?;
    }

    Ok(())
}

/// 从日志中抹掉 URL 里的 API key（Alchemy 路径段、Helius 查询参数）
pub fn redact_url(url: &str) -> String {
    let mut redacted = url.to_string();

    if let Some(pos) = redacted.find("api-key=") {
        let start = pos + "api-key=".len();
        let end = redacted[start..]
            .find('&')
            .map(|i| start + i)
            .unwrap_or(redacted.len());
        redacted.replace_range(start..end, "***");
    }

    if let Some(pos) = redacted.find("/v2/") {
        let start = pos + "/v2/".len();
        let end = redacted[start..]
            .find(['/', '?'])
            .map(|i| start + i)
            .unwrap_or(redacted.len());
        if end > start {
            redacted.replace_range(start..end, "***");
        }
    }

    redacted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("https://eth-mainnet.g.alchemy.com/v2/abc123"),
            "https://eth-mainnet.g.alchemy.com/v2/***"
        );
        assert_eq!(
            redact_url("https://mainnet.helius-rpc.com/?api-key=secret&x=1"),
            "https://mainnet.helius-rpc.com/?api-key=***&x=1"
        );
        assert_eq!(
            redact_url("https://blockstream.info/api/address/bc1q"),
            "https://blockstream.info/api/address/bc1q"
        );
    }
}
