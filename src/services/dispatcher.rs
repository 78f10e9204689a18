//! Background execution of pipeline runs.
//!
//! Each job gets one Tokio task; a semaphore bounds how many run at once. The
//! active set holds a job id from dispatch until its task exits, so a second
//! run of the same id cannot start while the first is still going, even while
//! someone is waiting on it. `join` / `join_all` are the await points for
//! tests and shutdown.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::job::VideoJob;
use crate::services::pipeline::{Pipeline, RunOutcome};
use crate::services::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("job {0} is already running")]
    AlreadyRunning(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct JobDispatcher {
    pipeline: Arc<Pipeline>,
    permits: Arc<Semaphore>,
    running: Mutex<HashMap<Uuid, JoinHandle<RunOutcome>>>,
    active: Arc<Mutex<HashSet<Uuid>>>,
}

/// Clears the job from the active set when its task exits, panics included.
struct ActiveRun {
    active: Arc<Mutex<HashSet<Uuid>>>,
    job_id: Uuid,
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.active.lock().remove(&self.job_id);
    }
}

impl JobDispatcher {
    pub fn new(pipeline: Arc<Pipeline>, max_concurrent_jobs: usize) -> Self {
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            running: Mutex::new(HashMap::new()),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Create a `Pending` job and schedule it. Returns as soon as the job is
    /// stored.
    pub async fn submit(
        &self,
        topic: impl Into<String>,
        target_duration_seconds: i32,
        style: impl Into<String>,
    ) -> Result<VideoJob, DispatchError> {
        let job = VideoJob::new(topic, target_duration_seconds, style);
        self.pipeline.store().create(&job).await?;
        metrics::counter!("video_jobs_total").increment(1);
        tracing::info!(job_id = %job.id, topic = %job.topic, "Video job submitted");

        self.dispatch(job.id)?;
        Ok(job)
    }

    /// Schedule a run for an existing job.
    pub fn dispatch(&self, job_id: Uuid) -> Result<(), DispatchError> {
        let mut running = self.running.lock();
        if !self.active.lock().insert(job_id) {
            return Err(DispatchError::AlreadyRunning(job_id));
        }
        running.retain(|_, handle| !handle.is_finished());

        let guard = ActiveRun {
            active: Arc::clone(&self.active),
            job_id,
        };
        let pipeline = Arc::clone(&self.pipeline);
        let permits = Arc::clone(&self.permits);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            let Ok(_permit) = permits.acquire_owned().await else {
                return RunOutcome::Skipped;
            };
            pipeline.run(job_id).await
        });
        running.insert(job_id, handle);
        Ok(())
    }

    /// Whether a run for `job_id` is in flight.
    pub fn is_running(&self, job_id: Uuid) -> bool {
        self.active.lock().contains(&job_id)
    }

    /// Wait for the run of `job_id`. `None` when no run is tracked (never
    /// dispatched, or already reaped after finishing).
    pub async fn join(&self, job_id: Uuid) -> Option<RunOutcome> {
        let handle = self.running.lock().remove(&job_id)?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Pipeline task panicked");
                None
            }
        }
    }

    /// Wait for every tracked run, including runs dispatched while waiting.
    pub async fn join_all(&self) -> Vec<(Uuid, RunOutcome)> {
        let mut finished = Vec::new();
        loop {
            let batch: Vec<(Uuid, JoinHandle<RunOutcome>)> = self.running.lock().drain().collect();
            if batch.is_empty() {
                return finished;
            }
            for (id, handle) in batch {
                match handle.await {
                    Ok(outcome) => finished.push((id, outcome)),
                    Err(e) => tracing::error!(job_id = %id, error = %e, "Pipeline task panicked"),
                }
            }
        }
    }
}
