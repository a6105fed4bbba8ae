//! Pulsar 主入口

use std::sync::Arc;

use anyhow::{Context, Result};
use pulsar::{
    api,
    app_state::AppState,
    config::Config,
    infrastructure::{db, logging},
    service::refresh_scheduler::resolve_cron,
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载环境变量与配置文件
    dotenvy::dotenv().ok();
    let config_path = std::env::var("CONFIG_PATH").ok();
    let config = Config::from_env_and_file(config_path.as_deref())?;

    // 2. 初始化日志
    logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    config.validate().context("Invalid configuration")?;

    tracing::info!(
        bind_addr = %config.server.bind_addr,
        log_format = %config.logging.format,
        "Starting Pulsar balance service"
    );

    // 3. 连接数据库
    let pool = db::init_pool(&config.database)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // 4. 数据库迁移（SKIP_MIGRATIONS 可跳过）
    if std::env::var("SKIP_MIGRATIONS").is_err() {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Database migrations failed")?;
        tracing::info!("Database migrations completed");
    } else {
        tracing::info!("Database migrations skipped (SKIP_MIGRATIONS set)");
    }

    // 5. 初始化应用状态
    let config = Arc::new(config);
    let state = Arc::new(AppState::new(pool, config.clone())?);

    // 6. 启动定时刷新
    if config.refresh.scheduler_enabled {
        let cron = resolve_cron(&config.refresh);
        state
            .scheduler
            .start(&cron)
            .await
            .context("Failed to start refresh scheduler")?;
    } else {
        tracing::info!("Refresh scheduler disabled (SCHEDULER_ENABLED=false)");
    }

    // 7. 启动服务器
    let app = api::routes(state.clone());
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    tracing::info!(bind_addr = %config.server.bind_addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.scheduler.stop().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
