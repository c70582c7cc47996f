/// LaaS Dashboard - Server
///
/// 实验室资源预约后端，提供 REST API 服务

mod api;
mod app_state;
mod cloud_init;
mod config;
mod db;
mod liblaas;
mod metrics;
mod middleware;
mod services;
mod tasks;
mod workflow;

use axum::{
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    app_state::AppState,
    db::establish_connection,
    liblaas::LibLaasClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
        )
        .init();

    info!("🚀 启动 LaaS Dashboard Server...");

    // 加载环境变量
    dotenvy::dotenv().ok();

    // 加载配置
    let cfg = config::Config::from_env()?;
    info!("✅ 配置加载成功");

    // 建立数据库连接 (SeaORM)
    let sea_db = establish_connection(&cfg.database_url)
        .await
        .expect("数据库连接失败");
    info!("✅ 数据库连接成功");

    // 初始化外部编排服务客户端
    let liblaas = LibLaasClient::new(&cfg.liblaas_url)?;
    info!("✅ 编排服务客户端初始化成功 ({})", cfg.liblaas_url);

    // 创建应用状态
    let app_state = AppState::new(sea_db, liblaas);

    // 启动向导会话清理（2小时闲置超时，每10分钟检查一次）
    app_state.sessions().start_session_sweeper(7200, 600);
    info!("✅ 向导会话清理任务已启动");

    // 启动后台周期任务（预约回收、主机清扫、到期提醒、邮件投递）
    tasks::start_background_tasks(app_state.clone());
    info!("✅ 后台周期任务已启动");

    // 设置CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 构建应用路由
    let app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(api::metrics::get_metrics))
        .nest("/api", api::api_routes(app_state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(app_state.clone());

    // 启动服务器
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server_port));
    info!("🎯 服务器监听在 http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root_handler() -> &'static str {
    "LaaS Dashboard Server API v1"
}

async fn health_handler() -> &'static str {
    "OK"
}
