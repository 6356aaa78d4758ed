use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post},
    Router,
};
use invoice_voucher_rust::api::{self, AppState};
use invoice_voucher_rust::{create_pool, db, AppConfig, GlmClient};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::from_env();
    info!(
        "Starting server | listen {}:{} | upload dir {} | rules {:?}",
        config.server.host, config.server.port, config.upload.dir, config.rules
    );

    // 创建数据库连接池并建表
    let pool = create_pool(&config.database.url).await?;
    db::init_schema(&pool).await?;
    info!("Database pool created, schema ready");

    // 上传目录
    tokio::fs::create_dir_all(&config.upload.dir).await?;

    let glm = Arc::new(GlmClient::new(config.glm.clone()));
    let upload_dir = config.upload.dir.clone();
    let body_limit = config.upload.max_file_size * config.upload.max_files_per_batch;
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState {
        pool,
        glm,
        config: Arc::new(config),
    };

    // 构建路由
    let app = Router::new()
        .route("/health", get(api::health_check))
        .route("/api/invoices/upload", post(api::upload_invoices))
        .route("/api/invoices", get(api::list_invoices))
        .route("/api/invoices/summary", get(api::get_summary))
        .route("/api/invoices/export", get(api::export_workbook))
        .route(
            "/api/invoices/:id",
            get(api::get_invoice)
                .patch(api::update_invoice)
                .delete(api::delete_invoice),
        )
        .route(
            "/api/invoices/vouchers/generate",
            post(api::generate_voucher_entries),
        )
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state);

    // 启动服务器
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST   /api/invoices/upload             - 批量上传识别");
    info!("  GET    /api/invoices                    - 发票列表");
    info!("  GET    /api/invoices/summary            - 汇总统计");
    info!("  GET    /api/invoices/export             - 导出报表");
    info!("  GET    /api/invoices/:id                - 单张详情");
    info!("  PATCH  /api/invoices/:id                - 人工修正");
    info!("  DELETE /api/invoices/:id                - 删除发票");
    info!("  POST   /api/invoices/vouchers/generate  - 生成凭证分录");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
