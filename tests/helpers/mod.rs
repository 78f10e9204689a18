//! Test doubles and a harness that wires them into a real pipeline.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use uuid::Uuid;

use faceless_video::models::job::{JobStatus, VideoJob};
use faceless_video::models::scene::ClipSource;
use faceless_video::services::{
    compositor::Compositor,
    dispatcher::JobDispatcher,
    footage::{AssetFetcher, FootageCandidate, FootageError, FootageProvider, FootageResolver, Orientation, ResolverSettings},
    narration::{NarrationSynthesizer, SpeechEngine, SynthesisError},
    pipeline::Pipeline,
    script::{GenerationParams, ModelError, RetrySettings, ScriptGenerator, TextModel},
    storage::ArtifactStorage,
    store::{JobStore, MemoryJobStore, StoreError},
    transcoder::{TranscodeError, TranscodeKind, TranscodeOp, Transcoder},
};

// ---------------------------------------------------------------------------
// Script model
// ---------------------------------------------------------------------------

/// Replays queued replies, then keeps reporting the model as loading.
pub struct StubModel {
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    calls: AtomicU32,
}

impl StubModel {
    pub fn replying(text: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Ok(text.to_string())])),
            calls: AtomicU32::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextModel for StubModel {
    async fn complete(&self, _prompt: &str, _params: &GenerationParams) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies.lock().pop_front().unwrap_or(Err(ModelError::Warming))
    }
}

// ---------------------------------------------------------------------------
// Speech
// ---------------------------------------------------------------------------

/// Writes fixed bytes as the narration. An optional gate holds the call until
/// the test adds a permit.
pub struct StubSpeech {
    audio: Vec<u8>,
    gate: Option<Arc<Semaphore>>,
}

impl StubSpeech {
    pub fn working() -> Self {
        Self {
            audio: b"RIFF\0\0\0\0WAVEfmt narration".to_vec(),
            gate: None,
        }
    }

    /// Engine that "succeeds" without producing any audio.
    pub fn silent() -> Self {
        Self {
            audio: Vec::new(),
            gate: None,
        }
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::working()
        }
    }
}

#[async_trait]
impl SpeechEngine for StubSpeech {
    async fn speak(&self, _text: &str, output: &Path) -> Result<(), SynthesisError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        tokio::fs::write(output, &self.audio).await.expect("write narration");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Footage
// ---------------------------------------------------------------------------

/// Provider that either serves every query or none.
pub struct StubProvider {
    serves: bool,
    pub queries: Mutex<Vec<String>>,
}

impl StubProvider {
    pub fn serving() -> Self {
        Self {
            serves: true,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self {
            serves: false,
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl FootageProvider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn search(
        &self,
        query: &str,
        _orientation: Orientation,
        _min_duration: u32,
    ) -> Result<Option<FootageCandidate>, FootageError> {
        self.queries.lock().push(query.to_string());
        Ok(self.serves.then(|| FootageCandidate {
            url: format!("https://footage.test/{}", query.replace(' ', "-")),
            duration_seconds: 12.0,
            width: 1080,
            height: 1920,
            source: ClipSource::Other,
        }))
    }
}

pub struct StubFetcher;

#[async_trait]
impl AssetFetcher for StubFetcher {
    async fn download(&self, _url: &str, dest: &Path) -> Result<u64, FootageError> {
        tokio::fs::write(dest, vec![1u8; 4096])
            .await
            .map_err(|e| FootageError::Io(dest.to_path_buf(), e))?;
        Ok(4096)
    }
}

// ---------------------------------------------------------------------------
// Transcoder
// ---------------------------------------------------------------------------

/// Writes a small file for every op (a real JPEG for thumbnails) and fails the
/// kinds it is told to.
#[derive(Default)]
pub struct StubTranscoder {
    failing: Vec<TranscodeKind>,
    ops: Mutex<Vec<TranscodeOp>>,
}

impl StubTranscoder {
    pub fn failing(kinds: &[TranscodeKind]) -> Self {
        Self {
            failing: kinds.to_vec(),
            ..Default::default()
        }
    }

    pub fn kinds(&self) -> Vec<TranscodeKind> {
        self.ops.lock().iter().map(|op| op.kind).collect()
    }

    pub fn ops(&self) -> Vec<TranscodeOp> {
        self.ops.lock().clone()
    }
}

#[async_trait]
impl Transcoder for StubTranscoder {
    async fn run(&self, op: &TranscodeOp) -> Result<(), TranscodeError> {
        self.ops.lock().push(op.clone());
        if self.failing.contains(&op.kind) {
            return Err(TranscodeError::MissingOutput {
                kind: op.kind,
                path: op.output.clone(),
            });
        }
        if op.kind == TranscodeKind::Thumbnail {
            image::RgbImage::new(16, 16).save(&op.output).expect("write thumbnail");
        } else {
            tokio::fs::write(&op.output, format!("{}\n", op.kind)).await.expect("write output");
        }
        Ok(())
    }

    async fn is_available(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// In-memory store that remembers every accepted write.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryJobStore,
    writes: Mutex<Vec<(Uuid, JobStatus, i32)>>,
}

impl RecordingStore {
    /// `(status, progress)` of every accepted write for `id`, in order.
    pub fn history(&self, id: Uuid) -> Vec<(JobStatus, i32)> {
        self.writes
            .lock()
            .iter()
            .filter(|(job_id, _, _)| *job_id == id)
            .map(|(_, status, progress)| (*status, *progress))
            .collect()
    }
}

#[async_trait]
impl JobStore for RecordingStore {
    async fn create(&self, job: &VideoJob) -> Result<(), StoreError> {
        self.inner.create(job).await?;
        self.writes.lock().push((job.id, job.status, job.progress));
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<VideoJob>, StoreError> {
        self.inner.get(id).await
    }

    async fn update(&self, job: &VideoJob) -> Result<(), StoreError> {
        self.inner.update(job).await?;
        self.writes.lock().push((job.id, job.status, job.progress));
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        self.inner.delete(id).await
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<VideoJob>, i64), StoreError> {
        self.inner.list(offset, limit).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub media: TempDir,
    pub store: Arc<RecordingStore>,
    pub storage: ArtifactStorage,
    pub model: Arc<StubModel>,
    pub transcoder: Arc<StubTranscoder>,
    pub dispatcher: Arc<JobDispatcher>,
}

pub struct HarnessBuilder {
    model: StubModel,
    speech: StubSpeech,
    providers: Vec<Arc<dyn FootageProvider>>,
    transcoder: StubTranscoder,
    max_concurrent_jobs: usize,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            model: StubModel::replying(crate::fixtures::SPACE_SCRIPT),
            speech: StubSpeech::working(),
            providers: vec![Arc::new(StubProvider::serving())],
            transcoder: StubTranscoder::default(),
            max_concurrent_jobs: 4,
        }
    }

    pub fn model(mut self, model: StubModel) -> Self {
        self.model = model;
        self
    }

    pub fn speech(mut self, speech: StubSpeech) -> Self {
        self.speech = speech;
        self
    }

    pub fn providers(mut self, providers: Vec<Arc<dyn FootageProvider>>) -> Self {
        self.providers = providers;
        self
    }

    pub fn transcoder(mut self, transcoder: StubTranscoder) -> Self {
        self.transcoder = transcoder;
        self
    }

    pub fn build(self) -> Harness {
        let media = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(RecordingStore::default());
        let storage = ArtifactStorage::new(media.path());
        let model = Arc::new(self.model);
        let transcoder = Arc::new(self.transcoder);

        let pipeline = Pipeline::new(
            store.clone(),
            storage.clone(),
            ScriptGenerator::new(model.clone()).with_retry(RetrySettings::immediate()),
            NarrationSynthesizer::new(Arc::new(self.speech)),
            FootageResolver::new(self.providers, Arc::new(StubFetcher), transcoder.clone()).with_settings(
                ResolverSettings {
                    inter_scene_delay: Duration::ZERO,
                    ..Default::default()
                },
            ),
            Compositor::new(transcoder.clone()),
        );
        let dispatcher = Arc::new(JobDispatcher::new(Arc::new(pipeline), self.max_concurrent_jobs));

        Harness {
            media,
            store,
            storage,
            model,
            transcoder,
            dispatcher,
        }
    }
}

impl Harness {
    pub async fn job(&self, id: Uuid) -> VideoJob {
        self.store.get(id).await.expect("store").expect("job exists")
    }

    /// Poll until the job reaches `status` (or give up after a few seconds).
    pub async fn wait_for_status(&self, id: Uuid, status: JobStatus) {
        for _ in 0..500 {
            if let Ok(Some(job)) = self.store.get(id).await {
                if job.status == status {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never reached {status}");
    }
}
