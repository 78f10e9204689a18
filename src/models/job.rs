use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Status of a video generation job.
///
/// Variants are declared in pipeline order; `Failed` may be entered from any
/// non-terminal state.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    GeneratingScript,
    GeneratingVoice,
    FetchingClips,
    Rendering,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// The status the pipeline enters after this one. `None` for terminal
    /// states.
    pub fn next(self) -> Option<JobStatus> {
        match self {
            JobStatus::Pending => Some(JobStatus::GeneratingScript),
            JobStatus::GeneratingScript => Some(JobStatus::GeneratingVoice),
            JobStatus::GeneratingVoice => Some(JobStatus::FetchingClips),
            JobStatus::FetchingClips => Some(JobStatus::Rendering),
            JobStatus::Rendering => Some(JobStatus::Completed),
            JobStatus::Completed | JobStatus::Failed => None,
        }
    }

    /// Progress value reported when the pipeline enters this status.
    pub fn entry_progress(self) -> i32 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::GeneratingScript => 10,
            JobStatus::GeneratingVoice => 25,
            JobStatus::FetchingClips => 45,
            JobStatus::Rendering => 75,
            JobStatus::Completed => 100,
            JobStatus::Failed => 0,
        }
    }
}

/// Progress checkpoint after captions are built (no status change).
pub const CAPTIONS_PROGRESS: i32 = 60;

/// Progress checkpoint after the thumbnail step (no status change).
pub const THUMBNAIL_PROGRESS: i32 = 90;

/// A video generation job and its persisted state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoJob {
    pub id: Uuid,
    pub topic: String,
    pub target_duration_seconds: i32,
    pub style: String,
    pub status: JobStatus,
    pub progress: i32,
    pub script: Option<String>,
    pub script_fallback: bool,
    pub dropped_scenes: i32,
    pub narration_key: Option<String>,
    pub video_key: Option<String>,
    pub thumbnail_key: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rejected mutation of a [`VideoJob`].
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TransitionError {
    #[error("job is already {0} and cannot be modified")]
    Terminal(JobStatus),

    #[error("cannot move from {from} back to {to}")]
    Backward { from: JobStatus, to: JobStatus },

    #[error("cannot skip from {from} to {to}")]
    Skipped { from: JobStatus, to: JobStatus },

    #[error("progress cannot decrease from {from} to {to}")]
    ProgressRegression { from: i32, to: i32 },

    #[error("{0} is already set")]
    AlreadySet(&'static str),
}

impl VideoJob {
    /// A fresh job in `Pending`.
    pub fn new(topic: impl Into<String>, target_duration_seconds: i32, style: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            target_duration_seconds,
            style: style.into(),
            status: JobStatus::Pending,
            progress: 0,
            script: None,
            script_fallback: false,
            dropped_scenes: 0,
            narration_key: None,
            video_key: None,
            thumbnail_key: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn ensure_mutable(&self) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Move to `status` with `progress`. Only the immediate successor is
    /// accepted; staying in the same status records a progress checkpoint.
    pub fn advance(&mut self, status: JobStatus, progress: i32) -> Result<(), TransitionError> {
        self.ensure_mutable()?;
        if status == JobStatus::Failed || status < self.status {
            return Err(TransitionError::Backward {
                from: self.status,
                to: status,
            });
        }
        if status != self.status && self.status.next() != Some(status) {
            return Err(TransitionError::Skipped {
                from: self.status,
                to: status,
            });
        }
        if progress < self.progress {
            return Err(TransitionError::ProgressRegression {
                from: self.progress,
                to: progress,
            });
        }
        self.status = status;
        self.progress = progress.min(100);
        self.touch();
        Ok(())
    }

    pub fn record_script(&mut self, script: String, fallback: bool) -> Result<(), TransitionError> {
        self.ensure_mutable()?;
        if self.script.is_some() {
            return Err(TransitionError::AlreadySet("script"));
        }
        self.script = Some(script);
        self.script_fallback = fallback;
        self.touch();
        Ok(())
    }

    pub fn record_dropped_scenes(&mut self, dropped: i32) -> Result<(), TransitionError> {
        self.ensure_mutable()?;
        self.dropped_scenes = dropped;
        self.touch();
        Ok(())
    }

    pub fn record_narration(&mut self, key: String) -> Result<(), TransitionError> {
        self.ensure_mutable()?;
        set_once(&mut self.narration_key, key, "narration")?;
        self.touch();
        Ok(())
    }

    pub fn record_video(&mut self, key: String) -> Result<(), TransitionError> {
        self.ensure_mutable()?;
        set_once(&mut self.video_key, key, "video")?;
        self.touch();
        Ok(())
    }

    pub fn record_thumbnail(&mut self, key: String) -> Result<(), TransitionError> {
        self.ensure_mutable()?;
        set_once(&mut self.thumbnail_key, key, "thumbnail")?;
        self.touch();
        Ok(())
    }

    /// Enter `Failed`, keeping progress at its last value.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        self.ensure_mutable()?;
        self.status = JobStatus::Failed;
        self.error_message = Some(message.into());
        self.touch();
        Ok(())
    }
}

fn set_once(slot: &mut Option<String>, value: String, name: &'static str) -> Result<(), TransitionError> {
    if slot.as_deref().is_some_and(|v| !v.is_empty()) {
        return Err(TransitionError::AlreadySet(name));
    }
    *slot = Some(value);
    Ok(())
}
