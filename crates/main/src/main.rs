//! 服务入口
//!
//! 装配配置、数据库连接池、进程内实时组件与应用服务，
//! 然后启动 Axum Web 服务器。

use std::sync::Arc;
use std::time::Duration;

use application::{
    ChatService, ChatServiceDependencies, Clock, ConnectionRegistry, EventBus, NewRoomFanout,
    SystemClock, UserJoinedFanout, UserService, UserServiceDependencies,
};
use config::AppConfig;
use domain::ChatEventKind;
use infrastructure::{create_pg_pool, PgStorage};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();
    config.validate()?;

    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').next_back().unwrap_or("unknown")
    );
    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    let storage = PgStorage::new(pg_pool);

    // 进程内实时组件：连接注册表 + 通知总线
    let registry = Arc::new(ConnectionRegistry::new());
    let bus = Arc::new(EventBus::new());
    bus.subscribe(
        ChatEventKind::NewRoom,
        Arc::new(NewRoomFanout::new(registry.clone())),
    )
    .await;
    bus.subscribe(
        ChatEventKind::UserJoined,
        Arc::new(UserJoinedFanout::new(registry.clone())),
    )
    .await;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // 装配应用层服务
    let user_service = UserService::new(UserServiceDependencies {
        user_repository: storage.user_repository.clone(),
        clock: clock.clone(),
    });

    let chat_service = ChatService::new(ChatServiceDependencies {
        room_repository: storage.room_repository.clone(),
        membership_repository: storage.membership_repository.clone(),
        message_repository: storage.message_repository.clone(),
        user_repository: storage.user_repository.clone(),
        clock,
        bus: bus.clone(),
    });

    let state = AppState::new(
        Arc::new(user_service),
        Arc::new(chat_service),
        registry,
        bus,
        Duration::from_secs(config.websocket.auth_timeout_secs),
    );

    // 启动 Web 服务器
    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("树洞聊天服务启动在 http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
