//! Pulsar - 多链钱包余额刷新与快照服务
//!
//! 定时/手动从上游 provider 拉取余额与价格，估值后写入不可变快照

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod repository;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use app_state::AppState;
pub use error::{AppError, AppErrorCode};

pub mod prelude {
    pub use crate::{
        app_state::AppState,
        domain::{Network, RefreshResult, RefreshTrigger, Wallet},
        error::{AppError, AppErrorCode},
    };
}
