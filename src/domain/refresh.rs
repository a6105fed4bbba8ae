//! 刷新运行的领域模型
//!
//! 一次刷新运行的状态机：pending → running → {success | partial_failure | complete_failure}

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{balance::WalletBalanceData, network::Network};

/// 抓取失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    ApiError,
    Timeout,
    RateLimit,
    ParseError,
    NetworkError,
    PriceError,
    NotFound,
    Unknown,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiError => "api_error",
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::ParseError => "parse_error",
            Self::NetworkError => "network_error",
            Self::PriceError => "price_error",
            Self::NotFound => "not_found",
            Self::Unknown => "unknown",
        }
    }

    /// 从数据库字符串解析（未知值归为 unknown）
    pub fn from_db(s: &str) -> Self {
        match s {
            "api_error" => Self::ApiError,
            "timeout" => Self::Timeout,
            "rate_limit" => Self::RateLimit,
            "parse_error" => Self::ParseError,
            "network_error" => Self::NetworkError,
            "price_error" => Self::PriceError,
            "not_found" => Self::NotFound,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个钱包的抓取失败
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchError {
    pub wallet_id: Uuid,
    pub wallet_address: String,
    pub network: Network,
    pub kind: FetchErrorKind,
    pub message: String,
    /// provider 原始错误信息，只落库，不对外返回
    pub details: Option<String>,
}

impl FetchError {
    pub fn new(
        wallet_id: Uuid,
        wallet_address: impl Into<String>,
        network: Network,
        kind: FetchErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            wallet_id,
            wallet_address: wallet_address.into(),
            network,
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Option<String>) -> Self {
        self.details = details;
        self
    }
}

/// 单钱包抓取结果：要么完整估值，要么一个分类错误
pub type WalletFetchResult = Result<WalletBalanceData, FetchError>;

/// 刷新触发方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshTrigger {
    Scheduled,
    Manual,
}

impl RefreshTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "scheduled" => Self::Scheduled,
            _ => Self::Manual,
        }
    }
}

/// 刷新运行的最终状态（运行中由协调器的守卫表示，不落库）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    Success,
    PartialFailure,
    CompleteFailure,
}

impl RefreshStatus {
    /// 根据尝试数与失败数归类最终状态
    pub fn classify(attempted: usize, failed: usize) -> Self {
        if failed == 0 {
            Self::Success
        } else if failed >= attempted {
            Self::CompleteFailure
        } else {
            Self::PartialFailure
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialFailure => "partial_failure",
            Self::CompleteFailure => "complete_failure",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "partial_failure" => Self::PartialFailure,
            _ => Self::CompleteFailure,
        }
    }
}

impl fmt::Display for RefreshStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次刷新运行的汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResult {
    pub trigger: RefreshTrigger,
    pub status: RefreshStatus,
    pub wallets_attempted: usize,
    pub wallets_succeeded: usize,
    pub wallets_failed: usize,
    pub duration_ms: u64,
    pub successful: Vec<WalletBalanceData>,
    pub errors: Vec<FetchError>,
}

impl RefreshResult {
    /// 没有任何钱包的运行视为成功
    pub fn empty(trigger: RefreshTrigger) -> Self {
        Self {
            trigger,
            status: RefreshStatus::Success,
            wallets_attempted: 0,
            wallets_succeeded: 0,
            wallets_failed: 0,
            duration_ms: 0,
            successful: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn from_outcomes(
        trigger: RefreshTrigger,
        successful: Vec<WalletBalanceData>,
        errors: Vec<FetchError>,
        duration_ms: u64,
    ) -> Self {
        let wallets_succeeded = successful.len();
        let wallets_failed = errors.len();
        let wallets_attempted = wallets_succeeded + wallets_failed;

        Self {
            trigger,
            status: RefreshStatus::classify(wallets_attempted, wallets_failed),
            wallets_attempted,
            wallets_succeeded,
            wallets_failed,
            duration_ms,
            successful,
            errors,
        }
    }

    /// 合并多个用户的运行结果（refresh_all）
    pub fn merge(mut self, other: RefreshResult) -> Self {
        self.wallets_attempted += other.wallets_attempted;
        self.wallets_succeeded += other.wallets_succeeded;
        self.wallets_failed += other.wallets_failed;
        self.duration_ms = self.duration_ms.max(other.duration_ms);
        self.successful.extend(other.successful);
        self.errors.extend(other.errors);
        self.status = RefreshStatus::classify(self.wallets_attempted, self.wallets_failed);
        self
    }
}

/// 已落库的刷新日志
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub trigger: RefreshTrigger,
    pub status: RefreshStatus,
    pub wallets_attempted: i32,
    pub wallets_succeeded: i32,
    pub wallets_failed: i32,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
    pub errors: Vec<FetchError>,
}
