use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

/// Register descriptions for the pipeline metrics.
pub fn describe() {
    metrics::describe_counter!("video_jobs_total", "Total video jobs submitted");
    metrics::describe_counter!("video_jobs_completed", "Total video jobs completed");
    metrics::describe_counter!("video_jobs_failed", "Total video jobs that failed");
    metrics::describe_gauge!("video_jobs_active", "Pipelines currently running");
    metrics::describe_histogram!("video_stage_seconds", "Time spent in each pipeline stage");
    metrics::describe_counter!(
        "video_script_fallback_total",
        "Scripts produced from the template after the model failed"
    );
    metrics::describe_counter!(
        "video_scenes_dropped_total",
        "Scenes omitted because no footage was found"
    );
    metrics::describe_counter!(
        "video_caption_burn_skipped_total",
        "Videos rendered without captions after burn-in failed"
    );
}

/// GET /metrics: Prometheus text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
}
