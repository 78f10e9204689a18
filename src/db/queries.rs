use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::job::{JobStatus, VideoJob};

const JOB_COLUMNS: &str = r#"
    id, topic, target_duration_seconds, style, status, progress, script,
    script_fallback, dropped_scenes, narration_key, video_key, thumbnail_key,
    error_message, created_at, updated_at
"#;

fn job_from_row(r: &PgRow) -> Result<VideoJob, sqlx::Error> {
    let status_str: String = r.try_get("status")?;
    let status = status_str
        .parse::<JobStatus>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(VideoJob {
        id: r.try_get("id")?,
        topic: r.try_get("topic")?,
        target_duration_seconds: r.try_get("target_duration_seconds")?,
        style: r.try_get("style")?,
        status,
        progress: r.try_get("progress")?,
        script: r.try_get("script")?,
        script_fallback: r.try_get("script_fallback")?,
        dropped_scenes: r.try_get("dropped_scenes")?,
        narration_key: r.try_get("narration_key")?,
        video_key: r.try_get("video_key")?,
        thumbnail_key: r.try_get("thumbnail_key")?,
        error_message: r.try_get("error_message")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
    })
}

/// Insert a new job
pub async fn create_job(pool: &PgPool, job: &VideoJob) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO video_jobs (
            id, topic, target_duration_seconds, style, status, progress, script,
            script_fallback, dropped_scenes, narration_key, video_key, thumbnail_key,
            error_message, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(job.id)
    .bind(&job.topic)
    .bind(job.target_duration_seconds)
    .bind(&job.style)
    .bind(job.status.as_ref())
    .bind(job.progress)
    .bind(&job.script)
    .bind(job.script_fallback)
    .bind(job.dropped_scenes)
    .bind(&job.narration_key)
    .bind(&job.video_key)
    .bind(&job.thumbnail_key)
    .bind(&job.error_message)
    .bind(job.created_at)
    .bind(job.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<VideoJob>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM video_jobs WHERE id = $1"))
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Overwrite the mutable fields of a job that is not yet terminal.
/// Returns the number of rows touched (0 when missing or terminal).
pub async fn update_job(pool: &PgPool, job: &VideoJob) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE video_jobs
        SET status = $2,
            progress = $3,
            script = $4,
            script_fallback = $5,
            dropped_scenes = $6,
            narration_key = $7,
            video_key = $8,
            thumbnail_key = $9,
            error_message = $10,
            updated_at = $11
        WHERE id = $1
          AND status NOT IN ('completed', 'failed')
        "#,
    )
    .bind(job.id)
    .bind(job.status.as_ref())
    .bind(job.progress)
    .bind(&job.script)
    .bind(job.script_fallback)
    .bind(job.dropped_scenes)
    .bind(&job.narration_key)
    .bind(&job.video_key)
    .bind(&job.thumbnail_key)
    .bind(&job.error_message)
    .bind(job.updated_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Current status of a job, if it exists
pub async fn get_job_status(pool: &PgPool, job_id: Uuid) -> Result<Option<JobStatus>, sqlx::Error> {
    let row = sqlx::query("SELECT status FROM video_jobs WHERE id = $1")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(r) => {
            let status: String = r.try_get("status")?;
            status
                .parse::<JobStatus>()
                .map(Some)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))
        }
        None => Ok(None),
    }
}

/// Delete a job. Returns false if it did not exist.
pub async fn delete_job(pool: &PgPool, job_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM video_jobs WHERE id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Page of jobs, newest first
pub async fn list_jobs(pool: &PgPool, offset: i64, limit: i64) -> Result<Vec<VideoJob>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM video_jobs ORDER BY created_at DESC OFFSET $1 LIMIT $2"
    ))
    .bind(offset)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Total number of jobs
pub async fn count_jobs(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS total FROM video_jobs")
        .fetch_one(pool)
        .await?;

    row.try_get("total")
}
