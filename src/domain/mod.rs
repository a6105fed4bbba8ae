//! Domain 模块
//!
//! 网络元数据、余额换算与刷新运行的领域模型

pub mod balance;
pub mod network;
pub mod refresh;
pub mod wallet;

// 重新导出常用类型
pub use balance::{RawBalance, RawTokenBalance, TokenData, WalletBalanceData};
pub use network::Network;
pub use refresh::{
    FetchError, FetchErrorKind, RefreshLog, RefreshResult, RefreshStatus, RefreshTrigger,
    WalletFetchResult,
};
pub use wallet::{BalanceSnapshot, PortfolioSummary, Token, TokenSnapshot, Wallet};
