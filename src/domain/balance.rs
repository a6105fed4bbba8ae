//! 余额换算与估值数据模型
//!
//! 链上原始余额一律以十进制数字字符串保存（最小单位），
//! 换算成可读数量时只做字符串层面的整数除法 + 小数补零，不经过浮点

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::network::Network;

/// rust_decimal 的有效位上限
const MAX_DECIMAL_DIGITS: usize = 28;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BalanceError {
    #[error("invalid raw balance: {0:?}")]
    InvalidRaw(String),
    #[error("invalid formatted balance: {0:?}")]
    InvalidFormatted(String),
    #[error("balance out of range: {0}")]
    Overflow(String),
}

/// 原生币余额（最小单位 + 精度）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBalance {
    pub amount: String,
    pub decimals: u32,
}

/// provider 返回的代币余额（未估值）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTokenBalance {
    pub contract_address: String,
    pub symbol: String,
    pub name: Option<String>,
    pub decimals: u32,
    pub amount: String,
    pub logo_url: Option<String>,
}

/// 估值后的代币持仓
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenData {
    pub contract_address: String,
    pub symbol: String,
    pub name: Option<String>,
    pub decimals: u32,
    pub balance: String,
    pub balance_formatted: Decimal,
    pub balance_usd: Decimal,
    pub price_usd: Decimal,
    pub logo_url: Option<String>,
}

/// 单个钱包一次完整估值的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalanceData {
    pub wallet_id: Uuid,
    pub network: Network,
    pub address: String,
    pub native_balance: String,
    pub native_balance_formatted: Decimal,
    pub native_balance_usd: Decimal,
    pub native_price_usd: Decimal,
    /// 已按阈值过滤
    pub tokens: Vec<TokenData>,
    pub tokens_usd_value: Decimal,
    pub total_usd_value: Decimal,
}

impl WalletBalanceData {
    /// 按持仓重新计算代币总值与钱包总值
    pub fn recompute_totals(&mut self) {
        self.tokens_usd_value = self.tokens.iter().map(|t| t.balance_usd).sum();
        self.total_usd_value = self.native_balance_usd + self.tokens_usd_value;
    }
}

fn normalize_raw(raw: &str) -> Result<&str, BalanceError> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BalanceError::InvalidRaw(raw.to_string()));
    }
    let stripped = raw.trim_start_matches('0');
    Ok(if stripped.is_empty() { "0" } else { stripped })
}

/// 拆分为整数部分与补零后的小数部分
fn split_raw(raw: &str, decimals: u32) -> Result<(String, String), BalanceError> {
    let digits = normalize_raw(raw)?;
    let decimals = decimals as usize;
    if decimals == 0 {
        return Ok((digits.to_string(), String::new()));
    }

    let padded = if digits.len() <= decimals {
        format!("{:0>width$}", digits, width = decimals + 1)
    } else {
        digits.to_string()
    };
    let (whole, frac) = padded.split_at(padded.len() - decimals);
    Ok((whole.to_string(), frac.to_string()))
}

/// 最小单位 -> 可读数量字符串（去掉小数末尾的 0）
pub fn format_balance(raw: &str, decimals: u32) -> Result<String, BalanceError> {
    let (whole, frac) = split_raw(raw, decimals)?;
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        Ok(whole)
    } else {
        Ok(format!("{}.{}", whole, frac))
    }
}

/// 可读数量字符串 -> 最小单位（超出精度的小数位截断）
pub fn parse_balance(formatted: &str, decimals: u32) -> Result<String, BalanceError> {
    let formatted = formatted.trim();
    let mut parts = formatted.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let frac = parts.next().unwrap_or_default();

    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !is_digits(whole) || !is_digits(frac) {
        return Err(BalanceError::InvalidFormatted(formatted.to_string()));
    }

    let decimals = decimals as usize;
    let mut combined = String::with_capacity(whole.len() + decimals);
    combined.push_str(whole);
    let kept = &frac[..frac.len().min(decimals)];
    combined.push_str(kept);
    combined.extend(std::iter::repeat('0').take(decimals - kept.len()));

    let stripped = combined.trim_start_matches('0');
    Ok(if stripped.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    })
}

/// 最小单位 -> Decimal，用于乘以价格
///
/// 整数部分超过 28 位视为溢出；小数部分按剩余有效位截断
pub fn raw_to_decimal(raw: &str, decimals: u32) -> Result<Decimal, BalanceError> {
    let (whole, frac) = split_raw(raw, decimals)?;
    if whole.len() > MAX_DECIMAL_DIGITS {
        return Err(BalanceError::Overflow(raw.to_string()));
    }

    let room = MAX_DECIMAL_DIGITS - whole.len();
    let frac = frac.trim_end_matches('0');
    let frac = &frac[..frac.len().min(room)];
    let text = if frac.is_empty() {
        whole
    } else {
        format!("{}.{}", whole, frac)
    };

    Decimal::from_str(&text).map_err(|_| BalanceError::Overflow(raw.to_string()))
}
