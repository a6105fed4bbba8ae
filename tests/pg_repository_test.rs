//! Postgres Repository 集成测试
//!
//! 运行方式：
//! ```bash
//! TEST_DATABASE_URL=postgres://... cargo test --test pg_repository_test -- --ignored
//! ```

mod common;

use std::time::Duration;

use chrono::Utc;
use common::dec;
use pulsar::{
    domain::{Network, TokenData, WalletBalanceData},
    repository::{
        CreateWalletParams, PgRateLimitRepository, PgSnapshotRepository, PgWalletRepository,
        RateLimitDecision, RateLimitRepository, SnapshotRepository, WalletRepository,
    },
};
use sqlx::PgPool;
use uuid::Uuid;

async fn test_pool() -> PgPool {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://postgres@localhost:5432/pulsar_test".into());

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to create test database pool");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

#[tokio::test]
#[ignore]
async fn test_wallet_uniqueness_per_user() {
    let repo = PgWalletRepository::new(test_pool().await);
    let user = Uuid::new_v4();
    let params = || CreateWalletParams {
        user_id: user,
        network: Network::Ethereum,
        address: "0x52908400098527886e0f7030069857d2e4169ee7".into(),
        name: Some("main".into()),
    };

    let created = repo.create(params()).await.unwrap();
    assert!(created.is_some());
    assert!(repo.create(params()).await.unwrap().is_none());
    assert_eq!(repo.list_by_user(user).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore]
async fn test_snapshot_written_with_tokens() {
    let pool = test_pool().await;
    let wallets = PgWalletRepository::new(pool.clone());
    let snapshots = PgSnapshotRepository::new(pool);

    let wallet = wallets
        .create(CreateWalletParams {
            user_id: Uuid::new_v4(),
            network: Network::Ethereum,
            address: "0x52908400098527886e0f7030069857d2e4169ee7".into(),
            name: None,
        })
        .await
        .unwrap()
        .unwrap();

    let data = WalletBalanceData {
        wallet_id: wallet.id,
        network: Network::Ethereum,
        address: wallet.address.clone(),
        native_balance: "1500000000000000000".into(),
        native_balance_formatted: dec("1.5"),
        native_balance_usd: dec("3000"),
        native_price_usd: dec("2000"),
        tokens: vec![TokenData {
            contract_address: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".into(),
            symbol: "USDC".into(),
            name: Some("USD Coin".into()),
            decimals: 6,
            balance: "500000".into(),
            balance_formatted: dec("0.5"),
            balance_usd: dec("0.5"),
            price_usd: dec("1"),
            logo_url: None,
        }],
        tokens_usd_value: dec("0.5"),
        total_usd_value: dec("3000.5"),
    };

    snapshots.write_snapshot(&data, Utc::now()).await.unwrap();
    let latest = snapshots.latest(wallet.id).await.unwrap().unwrap();

    assert_eq!(latest.native_balance, "1500000000000000000");
    assert_eq!(latest.total_usd_value, dec("3000.5"));
    assert_eq!(latest.tokens.len(), 1);
    assert_eq!(latest.tokens[0].symbol, "USDC");
    assert_eq!(snapshots.history(wallet.id, 30).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore]
async fn test_rate_limit_marker_blocks_within_cooldown() {
    let repo = PgRateLimitRepository::new(test_pool().await);
    let key = format!("refresh:manual:{}", Uuid::new_v4());
    let now = Utc::now();
    let cooldown = Duration::from_secs(60);

    assert_eq!(
        repo.try_acquire(&key, now, cooldown).await.unwrap(),
        RateLimitDecision::Allowed
    );
    match repo
        .try_acquire(&key, now + chrono::Duration::seconds(10), cooldown)
        .await
        .unwrap()
    {
        RateLimitDecision::Limited { retry_after } => {
            assert!(retry_after <= Duration::from_secs(50));
            assert!(retry_after > Duration::from_secs(48));
        }
        other => panic!("expected Limited, got {:?}", other),
    }
}
