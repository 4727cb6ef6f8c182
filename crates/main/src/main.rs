//! 主应用程序入口
//!
//! 加载配置、选择消息表后端，启动 Axum Web API 与推送通道服务。

use std::sync::Arc;

use anyhow::Context;
use application::{
    ChatService, ChatServiceDependencies, Clock, MessageStore, MessageTable, SystemClock,
};
use config::{AppConfig, StorageBackend};
use infrastructure::{create_pg_pool, BroadcastHub, InMemoryMessageTable, PgMessageTable};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

async fn build_table(config: &AppConfig) -> anyhow::Result<Arc<dyn MessageTable>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("使用内存消息表，重启后历史消息会丢失");
            Ok(Arc::new(InMemoryMessageTable::new()))
        }
        StorageBackend::Postgres => {
            let database_url = config
                .storage
                .database_url
                .as_deref()
                .context("storage.database_url is required for the postgres backend")?;
            tracing::info!(
                "连接数据库: {}",
                database_url.split('@').next_back().unwrap_or("unknown")
            );
            let pool = create_pg_pool(database_url, config.storage.max_connections).await?;
            Ok(Arc::new(PgMessageTable::new(pool)))
        }
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听关闭信号");
        return;
    }
    tracing::info!("收到关闭信号，开始优雅退出");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(MessageStore::new(build_table(&config).await?, clock));
    let shutdown = CancellationToken::new();

    // 提前建表，失败时仍然启动，首次请求会重试
    if let Err(err) = store.initialize(&shutdown).await {
        tracing::warn!(error = %err, "消息表初始化失败");
    }

    let hub = Arc::new(BroadcastHub::new());
    let chat_service = ChatService::new(ChatServiceDependencies {
        store,
        broadcaster: hub.clone(),
    });

    let state = AppState::new(
        Arc::new(chat_service),
        hub,
        shutdown.clone(),
        config.hub.outbound_capacity,
        config.server.request_timeout(),
    );

    let app = router(state);
    let bind_addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("聊天室服务器启动在 http://{}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}
