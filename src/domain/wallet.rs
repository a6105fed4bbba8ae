//! 钱包、代币与快照实体

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::network::Network;

/// 被跟踪的 (network, address)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub network: Network,
    pub address: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 网络级代币元数据，多个钱包共享
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub network: Network,
    pub contract_address: String,
    pub symbol: String,
    pub name: Option<String>,
    pub decimals: u32,
    pub logo_url: Option<String>,
}

/// 代币快照行（父快照的子记录）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSnapshot {
    pub contract_address: String,
    pub symbol: String,
    pub decimals: u32,
    pub balance: String,
    pub balance_usd: Decimal,
    pub price_usd: Decimal,
}

/// 不可变的钱包估值快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub native_balance: String,
    pub native_balance_usd: Decimal,
    pub native_price_usd: Decimal,
    pub tokens_usd_value: Decimal,
    pub total_usd_value: Decimal,
    pub taken_at: DateTime<Utc>,
    pub tokens: Vec<TokenSnapshot>,
}

/// 用户资产总览（每个钱包取最新快照）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub total_usd_value: Decimal,
    pub wallet_count: usize,
    pub last_updated: Option<DateTime<Utc>>,
}
