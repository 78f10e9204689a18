use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{
    compositor::Compositor,
    dispatcher::JobDispatcher,
    footage::{FootageError, FootageProvider, FootageResolver, HttpFetcher, PexelsProvider, PixabayProvider},
    narration::{CommandSpeechEngine, NarrationSynthesizer},
    pipeline::Pipeline,
    script::{HuggingFaceClient, ModelError, ScriptGenerator},
    storage::ArtifactStorage,
    store::JobStore,
    transcoder::{FfmpegTranscoder, Transcoder},
};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("script model client: {0}")]
    Model(#[from] ModelError),

    #[error("footage client: {0}")]
    Footage(#[from] FootageError),
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub storage: ArtifactStorage,
    pub dispatcher: Arc<JobDispatcher>,
    pub transcoder: Arc<dyn Transcoder>,
    pub media_prefix: String,
}

impl AppState {
    pub fn new(dispatcher: Arc<JobDispatcher>, transcoder: Arc<dyn Transcoder>, media_prefix: impl Into<String>) -> Self {
        let store = Arc::clone(dispatcher.pipeline().store());
        let storage = dispatcher.pipeline().storage().clone();
        Self {
            store,
            storage,
            dispatcher,
            transcoder,
            media_prefix: media_prefix.into(),
        }
    }

    /// Wire the production components from configuration.
    pub fn from_config(config: &AppConfig, store: Arc<dyn JobStore>) -> Result<Self, StartupError> {
        let storage = ArtifactStorage::new(&config.media_dir);
        let transcoder: Arc<dyn Transcoder> = Arc::new(FfmpegTranscoder::new(&config.ffmpeg_path));

        let model = HuggingFaceClient::new(
            &config.script_model_url,
            AppConfig::key(&config.huggingface_token).map(str::to_string),
        )?;

        let mut providers: Vec<Arc<dyn FootageProvider>> = Vec::new();
        match AppConfig::key(&config.pexels_api_key) {
            Some(key) => providers.push(Arc::new(PexelsProvider::new(key)?)),
            None => tracing::warn!("Pexels API key not configured"),
        }
        match AppConfig::key(&config.pixabay_api_key) {
            Some(key) => providers.push(Arc::new(PixabayProvider::new(key)?)),
            None => tracing::warn!("Pixabay API key not configured"),
        }
        if providers.is_empty() {
            tracing::warn!("No footage providers configured; every video will use the placeholder clip");
        }

        let pipeline = Pipeline::new(
            Arc::clone(&store),
            storage,
            ScriptGenerator::new(Arc::new(model)),
            NarrationSynthesizer::new(Arc::new(CommandSpeechEngine::from_template(
                &config.tts_program,
                &config.tts_args,
            ))),
            FootageResolver::new(providers, Arc::new(HttpFetcher::new()?), Arc::clone(&transcoder)),
            Compositor::new(Arc::clone(&transcoder)),
        );
        let dispatcher = JobDispatcher::new(Arc::new(pipeline), config.max_concurrent_jobs);

        Ok(Self::new(Arc::new(dispatcher), transcoder, &config.public_media_prefix))
    }
}
