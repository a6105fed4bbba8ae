//! 网络标识与元数据
//!
//! 统一所有网络相关常量：原生币精度、CoinGecko ID、Alchemy 子域
//! 取代散落在各个 provider 中的字符串匹配

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// 支持的网络
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Bitcoin,
    Ethereum,
    Arbitrum,
    Base,
    Polygon,
    Solana,
}

impl Network {
    pub const ALL: [Network; 6] = [
        Network::Bitcoin,
        Network::Ethereum,
        Network::Arbitrum,
        Network::Base,
        Network::Polygon,
        Network::Solana,
    ];

    /// 数据库/接口中使用的规范名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bitcoin => "bitcoin",
            Self::Ethereum => "ethereum",
            Self::Arbitrum => "arbitrum",
            Self::Base => "base",
            Self::Polygon => "polygon",
            Self::Solana => "solana",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Bitcoin => "Bitcoin",
            Self::Ethereum => "Ethereum",
            Self::Arbitrum => "Arbitrum",
            Self::Base => "Base",
            Self::Polygon => "Polygon",
            Self::Solana => "Solana",
        }
    }

    /// 原生币符号
    pub fn native_symbol(&self) -> &'static str {
        match self {
            Self::Bitcoin => "BTC",
            Self::Ethereum | Self::Arbitrum | Self::Base => "ETH",
            Self::Polygon => "MATIC",
            Self::Solana => "SOL",
        }
    }

    /// 原生币最小单位的精度（satoshi / wei / lamport）
    pub fn native_decimals(&self) -> u32 {
        match self {
            Self::Bitcoin => 8,
            Self::Solana => 9,
            Self::Ethereum | Self::Arbitrum | Self::Base | Self::Polygon => 18,
        }
    }

    pub fn is_evm(&self) -> bool {
        matches!(
            self,
            Self::Ethereum | Self::Arbitrum | Self::Base | Self::Polygon
        )
    }

    /// 是否存在代币概念（Bitcoin 没有 ERC-20/SPL 类资产）
    pub fn has_tokens(&self) -> bool {
        !matches!(self, Self::Bitcoin)
    }

    /// CoinGecko 原生币 ID（L2 复用 ETH 价格）
    pub fn coingecko_native_id(&self) -> &'static str {
        match self {
            Self::Bitcoin => "bitcoin",
            Self::Ethereum | Self::Arbitrum | Self::Base => "ethereum",
            Self::Polygon => "matic-network",
            Self::Solana => "solana",
        }
    }

    /// CoinGecko 代币价格平台 ID
    pub fn coingecko_platform_id(&self) -> Option<&'static str> {
        match self {
            Self::Bitcoin => None,
            Self::Ethereum => Some("ethereum"),
            Self::Arbitrum => Some("arbitrum-one"),
            Self::Base => Some("base"),
            Self::Polygon => Some("polygon-pos"),
            Self::Solana => Some("solana"),
        }
    }

    /// Alchemy 网络子域
    pub fn alchemy_slug(&self) -> Option<&'static str> {
        match self {
            Self::Ethereum => Some("eth-mainnet"),
            Self::Arbitrum => Some("arb-mainnet"),
            Self::Base => Some("base-mainnet"),
            Self::Polygon => Some("polygon-mainnet"),
            Self::Bitcoin | Self::Solana => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bitcoin" | "btc" => Ok(Self::Bitcoin),
            "ethereum" | "eth" => Ok(Self::Ethereum),
            "arbitrum" | "arb" => Ok(Self::Arbitrum),
            "base" => Ok(Self::Base),
            "polygon" | "matic" => Ok(Self::Polygon),
            "solana" | "sol" => Ok(Self::Solana),
            other => Err(anyhow::anyhow!("Unsupported network: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("ETH".parse::<Network>().unwrap(), Network::Ethereum);
        assert_eq!("sol".parse::<Network>().unwrap(), Network::Solana);
        assert_eq!(" polygon ".parse::<Network>().unwrap(), Network::Polygon);
        assert!("ton".parse::<Network>().is_err());
    }

    #[test]
    fn test_native_metadata() {
        assert_eq!(Network::Bitcoin.native_symbol(), "BTC");
        assert_eq!(Network::Base.native_symbol(), "ETH");
        assert_eq!(Network::Polygon.native_symbol(), "MATIC");
        assert_eq!(Network::Solana.native_decimals(), 9);
    }

    #[test]
    fn test_l2_networks_share_eth_price() {
        assert_eq!(Network::Arbitrum.coingecko_native_id(), "ethereum");
        assert_eq!(Network::Base.coingecko_native_id(), "ethereum");
        assert_eq!(Network::Polygon.coingecko_native_id(), "matic-network");
    }

    #[test]
    fn test_bitcoin_has_no_token_support() {
        assert!(!Network::Bitcoin.has_tokens());
        assert!(Network::Bitcoin.coingecko_platform_id().is_none());
        assert!(Network::Bitcoin.alchemy_slug().is_none());
        assert_eq!(Network::Bitcoin.native_decimals(), 8);
    }

    #[test]
    fn test_round_trip_through_str() {
        for network in Network::ALL {
            assert_eq!(network.as_str().parse::<Network>().unwrap(), network);
        }
    }
}
