use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use garde::Validate;
use serde_json::json;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::{JobStatus, VideoJob};
use crate::models::video::{CreateVideoRequest, ListQuery, VideoListResponse, VideoResponse};
use crate::services::dispatcher::DispatchError;
use crate::services::store::StoreError;

const MAX_PAGE: i64 = 100;

/// Handler error rendered as `{error, code}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::Validation(_) => "validation_error",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Conflict(_) => "conflict",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Server error in API handler");
        }
        let body = json!({ "error": self.to_string(), "code": self.code() });
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ApiError::NotFound(format!("video {id} not found")),
            StoreError::Duplicate(_) | StoreError::Terminal { .. } => ApiError::Conflict(e.to_string()),
            StoreError::Database(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::AlreadyRunning(_) => ApiError::Conflict(e.to_string()),
            DispatchError::Store(inner) => inner.into(),
        }
    }
}

impl From<garde::Report> for ApiError {
    fn from(report: garde::Report) -> Self {
        ApiError::Validation(report.to_string())
    }
}

async fn load(state: &AppState, id: Uuid) -> Result<VideoJob, ApiError> {
    state
        .store
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("video {id} not found")))
}

/// POST /api/v1/videos: start generating a video.
pub async fn create_video(
    State(state): State<AppState>,
    Json(request): Json<CreateVideoRequest>,
) -> Result<(StatusCode, Json<VideoResponse>), ApiError> {
    request.validate()?;
    let topic = request.topic.trim();
    if topic.chars().count() < 3 {
        return Err(ApiError::Validation("topic must not be blank".into()));
    }

    let job = state
        .dispatcher
        .submit(topic, request.duration, request.style)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(VideoResponse::from_job(job, &state.media_prefix)),
    ))
}

/// GET /api/v1/videos/{id}
pub async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VideoResponse>, ApiError> {
    let job = load(&state, id).await?;
    Ok(Json(VideoResponse::from_job(job, &state.media_prefix)))
}

/// GET /api/v1/videos?skip=&limit=
pub async fn list_videos(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<VideoListResponse>, ApiError> {
    let limit = query.limit.clamp(1, MAX_PAGE);
    let (jobs, total) = state.store.list(query.skip.max(0), limit).await?;
    let videos = jobs
        .into_iter()
        .map(|job| VideoResponse::from_job(job, &state.media_prefix))
        .collect();
    Ok(Json(VideoListResponse { videos, total }))
}

/// DELETE /api/v1/videos/{id}: drop the job and its files. A run still in
/// flight notices at its next write and stops.
pub async fn delete_video(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !state.store.delete(id).await? {
        return Err(ApiError::NotFound(format!("video {id} not found")));
    }
    if let Err(e) = state.storage.delete_job(id).await {
        tracing::warn!(job_id = %id, error = %e, "Failed to remove job files");
    }
    tracing::info!(job_id = %id, "Video deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/videos/{id}/download: the finished MP4.
pub async fn download_video(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let job = load(&state, id).await?;
    if job.status != JobStatus::Completed {
        return Err(ApiError::BadRequest(format!("video is not ready (status: {})", job.status)));
    }
    let key = job
        .video_key
        .ok_or_else(|| ApiError::NotFound("video file not found".into()))?;

    let file = match tokio::fs::File::open(state.storage.resolve(&key)).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("video file not found".into()))
        }
        Err(e) => return Err(ApiError::Internal(e.to_string())),
    };
    let length = file
        .metadata()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .len();

    Ok((
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (header::CONTENT_LENGTH, length.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"video_{id}.mp4\""),
            ),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_statuses() {
        let id = Uuid::new_v4();
        assert_eq!(ApiError::from(StoreError::NotFound(id)).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(StoreError::Terminal { id, status: JobStatus::Completed }).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(ApiError::from(DispatchError::AlreadyRunning(id)).code(), "conflict");
    }

    #[test]
    fn validation_is_422() {
        let err = ApiError::Validation("topic: length is lower than 3".into());
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
