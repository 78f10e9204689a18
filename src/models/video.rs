use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{JobStatus, VideoJob};

fn default_duration() -> i32 {
    60
}

fn default_style() -> String {
    "engaging".to_string()
}

/// Request to generate a video from a topic.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateVideoRequest {
    #[garde(length(chars, min = 3, max = 200))]
    pub topic: String,

    #[garde(range(min = 30, max = 180))]
    #[serde(default = "default_duration")]
    pub duration: i32,

    #[garde(length(max = 50))]
    #[serde(default = "default_style")]
    pub style: String,
}

/// Pagination for the job listing.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

/// Public view of a job.
#[derive(Debug, Serialize, Deserialize)]
pub struct VideoResponse {
    pub id: Uuid,
    pub topic: String,
    pub status: JobStatus,
    pub progress: i32,
    pub script: Option<String>,
    pub script_fallback: bool,
    pub dropped_scenes: i32,
    pub audio_url: Option<String>,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl VideoResponse {
    /// Build the view, turning storage keys into URLs under `media_prefix`.
    pub fn from_job(job: VideoJob, media_prefix: &str) -> Self {
        let url = |key: Option<String>| {
            key.map(|k| format!("{}/{}", media_prefix.trim_end_matches('/'), k))
        };
        Self {
            id: job.id,
            topic: job.topic,
            status: job.status,
            progress: job.progress,
            script: job.script,
            script_fallback: job.script_fallback,
            dropped_scenes: job.dropped_scenes,
            audio_url: url(job.narration_key),
            video_url: url(job.video_key),
            thumbnail_url: url(job.thumbnail_key),
            created_at: job.created_at,
            updated_at: job.updated_at,
            error_message: job.error_message,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VideoListResponse {
    pub videos: Vec<VideoResponse>,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_and_bounds() {
        let req: CreateVideoRequest =
            serde_json::from_str(r#"{"topic": "10 Amazing Facts About Space"}"#).unwrap();
        assert_eq!(req.duration, 60);
        assert_eq!(req.style, "engaging");
        assert!(req.validate().is_ok());

        let short: CreateVideoRequest = serde_json::from_str(r#"{"topic": "ab"}"#).unwrap();
        assert!(short.validate().is_err());

        let long: CreateVideoRequest =
            serde_json::from_str(r#"{"topic": "Space facts", "duration": 181}"#).unwrap();
        assert!(long.validate().is_err());
    }

    #[test]
    fn urls_use_media_prefix() {
        let mut job = VideoJob::new("Space facts", 60, "engaging");
        job.video_key = Some(format!("{}/video.mp4", job.id));
        let id = job.id;

        let view = VideoResponse::from_job(job, "/media/");
        assert_eq!(view.video_url, Some(format!("/media/{id}/video.mp4")));
        assert_eq!(view.audio_url, None);
    }
}
