use std::path::PathBuf;

use serde::Deserialize;

use crate::services::script::DEFAULT_MODEL_URL;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string. Jobs are kept in memory when unset.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Root directory for generated artifacts
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,

    /// URL prefix under which `media_dir` is served
    #[serde(default = "default_media_prefix")]
    pub public_media_prefix: String,

    /// Hugging Face Inference API token
    #[serde(default)]
    pub huggingface_token: Option<String>,

    /// Text generation endpoint for scripts
    #[serde(default = "default_model_url")]
    pub script_model_url: String,

    /// Pexels API key; provider is skipped when unset
    #[serde(default)]
    pub pexels_api_key: Option<String>,

    /// Pixabay API key; provider is skipped when unset
    #[serde(default)]
    pub pixabay_api_key: Option<String>,

    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Speech engine executable
    #[serde(default = "default_tts_program")]
    pub tts_program: PathBuf,

    /// Speech engine arguments; `{output}` is replaced by the target file
    #[serde(default = "default_tts_args")]
    pub tts_args: String,

    /// Upper bound on pipelines running at once
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("./media")
}

fn default_media_prefix() -> String {
    "/media".to_string()
}

fn default_model_url() -> String {
    DEFAULT_MODEL_URL.to_string()
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_tts_program() -> PathBuf {
    PathBuf::from("espeak-ng")
}

fn default_tts_args() -> String {
    "-v en-us -s 165 --stdin -w {output}".to_string()
}

fn default_max_concurrent_jobs() -> usize {
    4
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env::<Self>()?.validated()
    }

    /// Same as [`from_env`](Self::from_env) but over explicit pairs.
    pub fn from_vars<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter::<_, Self>(vars)?.validated()
    }

    /// Normalize `public_media_prefix` to `/segment` form. The media directory
    /// cannot be mounted at the root, where it would shadow the API.
    fn validated(mut self) -> Result<Self, envy::Error> {
        let prefix = self.public_media_prefix.trim().trim_matches('/');
        if prefix.is_empty() {
            return Err(envy::Error::Custom(format!(
                "PUBLIC_MEDIA_PREFIX must name a path below the root, got {:?}",
                self.public_media_prefix
            )));
        }
        self.public_media_prefix = format!("/{prefix}");
        Ok(self)
    }

    /// Non-empty key, if configured.
    pub fn key(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
}
