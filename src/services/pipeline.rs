//! Job orchestration: drives one job through every stage and owns the
//! conversion of stage failures into the `Failed` state.

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::models::job::{JobStatus, TransitionError, VideoJob, CAPTIONS_PROGRESS, THUMBNAIL_PROGRESS};
use crate::services::captions;
use crate::services::compositor::{CompositionError, CompositionPaths, Compositor};
use crate::services::footage::{FootageError, FootageResolver};
use crate::services::narration::{NarrationSynthesizer, SynthesisError};
use crate::services::script::ScriptGenerator;
use crate::services::storage::{ArtifactStorage, StorageError};
use crate::services::store::{JobStore, StoreError};

pub const NARRATION_FILE: &str = "narration.wav";
pub const VIDEO_FILE: &str = "video.mp4";
pub const THUMBNAIL_FILE: &str = "thumbnail.jpg";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("narration synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("footage resolution failed: {0}")]
    Footage(#[from] FootageError),

    #[error("video composition failed: {0}")]
    Composition(#[from] CompositionError),

    #[error("artifact storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("job store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid job transition: {0}")]
    Transition(#[from] TransitionError),

    /// The job row vanished mid-run.
    #[error("job was deleted")]
    Deleted,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed,
    /// The job was deleted while running.
    Abandoned,
    /// Nothing to do: unknown id or already terminal.
    Skipped,
}

/// Runs the stage sequence for a job. Components are injected so tests can
/// swap any of them.
pub struct Pipeline {
    store: Arc<dyn JobStore>,
    storage: ArtifactStorage,
    scripts: ScriptGenerator,
    narrator: NarrationSynthesizer,
    footage: FootageResolver,
    compositor: Compositor,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn JobStore>,
        storage: ArtifactStorage,
        scripts: ScriptGenerator,
        narrator: NarrationSynthesizer,
        footage: FootageResolver,
        compositor: Compositor,
    ) -> Self {
        Self {
            store,
            storage,
            scripts,
            narrator,
            footage,
            compositor,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn storage(&self) -> &ArtifactStorage {
        &self.storage
    }

    /// Run the job to a terminal state. Never returns an error: failures end
    /// up on the job record.
    pub async fn run(&self, job_id: Uuid) -> RunOutcome {
        let mut job = match self.store.get(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job_id = %job_id, "Job not found, nothing to run");
                return RunOutcome::Skipped;
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to load job");
                return RunOutcome::Skipped;
            }
        };
        if job.status.is_terminal() {
            tracing::warn!(job_id = %job_id, status = %job.status, "Job already finished, not rerunning");
            return RunOutcome::Skipped;
        }

        tracing::info!(job_id = %job_id, topic = %job.topic, duration = job.target_duration_seconds, "Starting video pipeline");
        metrics::gauge!("video_jobs_active").increment(1.0);
        let start = Instant::now();

        let outcome = match self.execute(&mut job).await {
            Ok(()) => {
                metrics::counter!("video_jobs_completed").increment(1);
                tracing::info!(
                    job_id = %job_id,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    script_fallback = job.script_fallback,
                    dropped_scenes = job.dropped_scenes,
                    "Video pipeline completed"
                );
                RunOutcome::Completed
            }
            Err(PipelineError::Deleted) => {
                tracing::info!(job_id = %job_id, "Job deleted, abandoning run");
                RunOutcome::Abandoned
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, status = %job.status, progress = job.progress, error = %e, "Video pipeline failed");
                metrics::counter!("video_jobs_failed").increment(1);
                self.mark_failed(&mut job, &e).await
            }
        };

        self.cleanup(job_id, outcome).await;
        metrics::gauge!("video_jobs_active").decrement(1.0);
        outcome
    }

    async fn mark_failed(&self, job: &mut VideoJob, error: &PipelineError) -> RunOutcome {
        if let Err(e) = job.fail(error.to_string()) {
            tracing::error!(job_id = %job.id, error = %e, "Cannot mark job failed");
            return RunOutcome::Failed;
        }
        match self.store.update(job).await {
            Ok(()) => RunOutcome::Failed,
            Err(StoreError::NotFound(_)) => RunOutcome::Abandoned,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to persist job failure");
                RunOutcome::Failed
            }
        }
    }

    /// Scratch files go in every terminal case; a deleted job loses its whole
    /// directory since nothing references it anymore.
    async fn cleanup(&self, job_id: Uuid, outcome: RunOutcome) {
        let result = match outcome {
            RunOutcome::Abandoned => self.storage.delete_job(job_id).await,
            _ => self.storage.purge_scratch(job_id).await,
        };
        if let Err(e) = result {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to clean up job files");
        }
    }

    async fn persist(&self, job: &VideoJob) -> Result<(), PipelineError> {
        match self.store.update(job).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound(_)) => Err(PipelineError::Deleted),
            Err(e) => Err(e.into()),
        }
    }

    async fn enter(&self, job: &mut VideoJob, status: JobStatus) -> Result<(), PipelineError> {
        job.advance(status, status.entry_progress())?;
        self.persist(job).await?;
        tracing::info!(job_id = %job.id, status = %status, progress = job.progress, "Stage started");
        Ok(())
    }

    async fn checkpoint(&self, job: &mut VideoJob, progress: i32) -> Result<(), PipelineError> {
        job.advance(job.status, progress)?;
        self.persist(job).await
    }

    async fn execute(&self, job: &mut VideoJob) -> Result<(), PipelineError> {
        let id = job.id;
        self.storage.prepare_job(id).await?;
        let scratch = self.storage.scratch_dir(id);

        // Script
        self.enter(job, JobStatus::GeneratingScript).await?;
        let stage = Instant::now();
        let script = self
            .scripts
            .generate(&job.topic, job.target_duration_seconds, &job.style)
            .await;
        record_stage("script", stage);
        job.record_script(script.full_script.clone(), script.fallback)?;
        self.persist(job).await?;
        if script.fallback {
            tracing::warn!(job_id = %id, "Using templated fallback script");
        }
        let narration_text = script.narration_text();

        // Voice
        self.enter(job, JobStatus::GeneratingVoice).await?;
        let stage = Instant::now();
        let narration_path = self.storage.artifact_path(id, NARRATION_FILE);
        self.narrator.synthesize(&narration_text, &narration_path).await?;
        record_stage("voice", stage);
        job.record_narration(self.storage.existing_key(&narration_path).await?)?;
        self.persist(job).await?;

        // Footage
        self.enter(job, JobStatus::FetchingClips).await?;
        let stage = Instant::now();
        let footage = self.footage.resolve(&script.scenes, &scratch).await?;
        record_stage("footage", stage);
        tracing::info!(
            job_id = %id,
            clips = footage.clips.len(),
            dropped = footage.dropped,
            placeholder = footage.used_placeholder,
            "Footage resolved"
        );
        job.record_dropped_scenes(footage.dropped as i32)?;
        self.persist(job).await?;

        // Captions
        let track = captions::build(&narration_text);
        let caption_files = if track.is_empty() {
            None
        } else {
            match track.write_files(&scratch, &job.topic).await {
                Ok(files) => Some(files),
                Err(e) => {
                    tracing::warn!(job_id = %id, error = %e, "Failed to write caption files, rendering without captions");
                    None
                }
            }
        };
        self.checkpoint(job, CAPTIONS_PROGRESS).await?;

        // Render
        self.enter(job, JobStatus::Rendering).await?;
        let stage = Instant::now();
        let paths = CompositionPaths {
            scratch_dir: scratch.clone(),
            video: self.storage.artifact_path(id, VIDEO_FILE),
            thumbnail: self.storage.artifact_path(id, THUMBNAIL_FILE),
        };
        let composition = self
            .compositor
            .compose(
                &footage.clips,
                &narration_path,
                caption_files.as_ref(),
                job.target_duration_seconds,
                &paths,
            )
            .await?;
        record_stage("render", stage);
        job.record_video(self.storage.existing_key(&composition.video).await?)?;
        self.persist(job).await?;

        if let Some(thumbnail) = &composition.thumbnail {
            match self.storage.existing_key(thumbnail).await {
                Ok(key) => job.record_thumbnail(key)?,
                Err(e) => tracing::warn!(job_id = %id, error = %e, "Thumbnail missing after extraction"),
            }
        }
        self.checkpoint(job, THUMBNAIL_PROGRESS).await?;

        self.enter(job, JobStatus::Completed).await
    }
}

fn record_stage(stage: &'static str, start: Instant) {
    metrics::histogram!("video_stage_seconds", "stage" => stage).record(start.elapsed().as_secs_f64());
}
