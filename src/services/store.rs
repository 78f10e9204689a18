//! Persistent job store: one trait, a Postgres implementation and an
//! in-memory one with identical semantics.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::queries;
use crate::models::job::{JobStatus, VideoJob};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {0} already exists")]
    Duplicate(Uuid),

    #[error("job {id} is {status} and can no longer be written")]
    Terminal { id: Uuid, status: JobStatus },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Storage for [`VideoJob`] records.
///
/// `update` must reject writes to a job whose stored status is terminal.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &VideoJob) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<VideoJob>, StoreError>;

    async fn update(&self, job: &VideoJob) -> Result<(), StoreError>;

    /// Returns false when no such job existed.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Page of jobs (newest first) and the total count.
    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<VideoJob>, i64), StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// [`JobStore`] over the `video_jobs` Postgres table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: &VideoJob) -> Result<(), StoreError> {
        match queries::create_job(&self.pool, job).await {
            Ok(()) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::Duplicate(job.id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<VideoJob>, StoreError> {
        Ok(queries::get_job(&self.pool, id).await?)
    }

    async fn update(&self, job: &VideoJob) -> Result<(), StoreError> {
        if queries::update_job(&self.pool, job).await? > 0 {
            return Ok(());
        }
        match queries::get_job_status(&self.pool, job.id).await? {
            Some(status) => Err(StoreError::Terminal { id: job.id, status }),
            None => Err(StoreError::NotFound(job.id)),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(queries::delete_job(&self.pool, id).await?)
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<VideoJob>, i64), StoreError> {
        let jobs = queries::list_jobs(&self.pool, offset.max(0), limit.max(0)).await?;
        let total = queries::count_jobs(&self.pool).await?;
        Ok((jobs, total))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Process-local [`JobStore`].
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, VideoJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &VideoJob) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Duplicate(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<VideoJob>, StoreError> {
        Ok(self.jobs.read().get(&id).cloned())
    }

    async fn update(&self, job: &VideoJob) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write();
        let stored = jobs.get_mut(&job.id).ok_or(StoreError::NotFound(job.id))?;
        if stored.status.is_terminal() {
            return Err(StoreError::Terminal {
                id: job.id,
                status: stored.status,
            });
        }
        let created_at = stored.created_at;
        *stored = job.clone();
        stored.created_at = created_at;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.jobs.write().remove(&id).is_some())
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<VideoJob>, i64), StoreError> {
        let jobs = self.jobs.read();
        let mut all: Vec<VideoJob> = jobs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = all.len() as i64;
        let page = all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
