use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use group_pricing::{AppState, config::Config, router::build_router};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'group_pricing';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // Redis 可选，未配置时 RPM 采样恒为 0
    let redis = match config.redis_url.as_deref() {
        Some(url) => Some(Arc::new(
            redis::Client::open(url).expect("Failed to create Redis client"),
        )),
        None => {
            tracing::warn!("REDIS_URL not set, RPM based ratios are disabled");
            None
        }
    };

    let state = AppState::new(pool, config.clone(), redis);

    // 启动时加载配置项，失败时使用内置默认值
    if let Err(e) = state.settings.reload().await {
        tracing::error!("Failed to load options, using defaults: {}", e);
    }
    state
        .settings
        .clone()
        .spawn_sync(config.option_sync_interval());

    let app = build_router(state);

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
