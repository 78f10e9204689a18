use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use faceless_video::{
    app_state::AppState,
    config::AppConfig,
    db, routes,
    services::store::{JobStore, MemoryJobStore, PgJobStore},
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing faceless-video server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe();

    // Job store: Postgres when configured, otherwise process memory
    let store: Arc<dyn JobStore> = match AppConfig::key(&config.database_url) {
        Some(url) => {
            tracing::info!("Connecting to PostgreSQL database");
            let db_pool = db::init_pool(url)
                .await
                .expect("Failed to connect to database");

            tracing::info!("Running database migrations");
            db::run_migrations(&db_pool)
                .await
                .expect("Failed to run database migrations");

            Arc::new(PgJobStore::new(db_pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; jobs are kept in memory and lost on restart");
            Arc::new(MemoryJobStore::new())
        }
    };

    let state = AppState::from_config(&config, store).expect("Failed to initialize pipeline");
    state
        .storage
        .init()
        .await
        .expect("Failed to create media directory");

    if !state.transcoder.is_available().await {
        tracing::warn!(ffmpeg = %config.ffmpeg_path.display(), "ffmpeg not available; rendering will fail");
    }

    let dispatcher = Arc::clone(&state.dispatcher);
    let media_dir = state.storage.root().to_path_buf();

    let app = routes::api_router(state)
        // Generated artifacts
        .nest_service(&config.public_media_prefix, ServeDir::new(media_dir))
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(64 * 1024));

    tracing::info!("Starting faceless-video on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Waiting for running pipelines to finish");
    let finished = dispatcher.join_all().await;
    tracing::info!(jobs = finished.len(), "Shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
