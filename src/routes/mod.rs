use axum::routing::get;
use axum::Router;

use crate::app_state::AppState;

pub mod health;
pub mod metrics;
pub mod videos;

/// Health and video API routes. Metrics and static media are mounted by the binary.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/videos", get(videos::list_videos).post(videos::create_video))
        .route(
            "/api/v1/videos/{id}",
            get(videos::get_video).delete(videos::delete_video),
        )
        .route("/api/v1/videos/{id}/download", get(videos::download_video))
        .with_state(state)
}
