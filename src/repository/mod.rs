// Repository 抽象层：trait + PostgreSQL 实现，内存实现用于测试与联调

pub mod credentials;
pub mod memory;
pub mod rate_limits;
pub mod refresh_logs;
pub mod settings;
pub mod snapshots;
pub mod tokens;
pub mod wallets;

pub use credentials::{CredentialRepository, PgCredentialRepository};
pub use rate_limits::{PgRateLimitRepository, RateLimitDecision, RateLimitRepository};
pub use refresh_logs::{PgRefreshLogRepository, RefreshLogRepository};
pub use settings::{PgSettingsRepository, SettingScope, SettingsRepository};
pub use snapshots::{PgSnapshotRepository, SnapshotRepository};
pub use tokens::{PgTokenRepository, TokenRepository};
pub use wallets::{CreateWalletParams, PgWalletRepository, WalletRepository};
