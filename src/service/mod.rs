pub mod balance_fetcher;
pub mod credential_vault;
pub mod providers;
pub mod refresh_coordinator;
pub mod refresh_rate_limiter;
pub mod refresh_scheduler;
pub mod wallet_service;

pub use balance_fetcher::BalanceFetcher;
pub use credential_vault::CredentialVault;
pub use refresh_coordinator::{
    CoordinatorRepositories, RefreshCoordinator, RefreshGuard, RefreshOptions,
};
pub use refresh_rate_limiter::RefreshRateLimiter;
pub use refresh_scheduler::RefreshScheduler;
pub use wallet_service::WalletService;
