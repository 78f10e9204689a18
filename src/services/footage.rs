//! Stock footage lookup and download.
//!
//! Providers are tried in priority order per scene. A scene nobody can serve
//! is dropped and counted; if every scene is dropped a placeholder clip is
//! rendered so composition always has something to work with.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use strum::AsRefStr;
use tokio::io::AsyncWriteExt;

use crate::models::scene::{ClipSource, FootageClip, Scene};
use crate::services::transcoder::{
    TranscodeError, TranscodeOp, Transcoder, CANVAS_HEIGHT, CANVAS_WIDTH, PLACEHOLDER_SECS,
};

pub const PEXELS_API_URL: &str = "https://api.pexels.com/videos/search";
pub const PIXABAY_API_URL: &str = "https://pixabay.com/api/videos/";

/// Downloads at or below this size are treated as corrupt.
pub const MIN_DOWNLOAD_BYTES: u64 = 1000;

const DOWNLOAD_BUFFER_BYTES: usize = 8192;
const MAX_SOURCE_WIDTH: u32 = 1920;
const RESULTS_PER_PAGE: u32 = 5;
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// A remote clip chosen by a provider, not yet downloaded.
#[derive(Debug, Clone, PartialEq)]
pub struct FootageCandidate {
    pub url: String,
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub source: ClipSource,
}

#[derive(Debug, thiserror::Error)]
pub enum FootageError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by {0}")]
    RateLimited(&'static str),

    #[error("{provider} returned {status}")]
    Status {
        provider: &'static str,
        status: StatusCode,
    },

    #[error("download too small ({bytes} bytes)")]
    TooSmall { bytes: u64 },

    #[error("I/O error writing {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("placeholder clip failed: {0}")]
    Placeholder(#[from] TranscodeError),
}

/// A stock footage search backend.
#[async_trait]
pub trait FootageProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(
        &self,
        query: &str,
        orientation: Orientation,
        min_duration: u32,
    ) -> Result<Option<FootageCandidate>, FootageError>;
}

/// Fetches a remote asset to a local file.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Returns the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FootageError>;
}

fn search_client() -> Result<Client, FootageError> {
    Ok(Client::builder().timeout(SEARCH_TIMEOUT).build()?)
}

fn check_status(provider: &'static str, status: StatusCode) -> Result<(), FootageError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::TOO_MANY_REQUESTS => Err(FootageError::RateLimited(provider)),
        status => Err(FootageError::Status { provider, status }),
    }
}

// ---------------------------------------------------------------------------
// Pexels
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PexelsResponse {
    #[serde(default)]
    videos: Vec<PexelsVideo>,
}

#[derive(Debug, Deserialize)]
struct PexelsVideo {
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    video_files: Vec<PexelsFile>,
}

#[derive(Debug, Clone, Deserialize)]
struct PexelsFile {
    #[serde(default)]
    quality: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    link: String,
}

pub struct PexelsProvider {
    http: Client,
    api_key: String,
    base_url: String,
}

impl PexelsProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, FootageError> {
        Ok(Self {
            http: search_client()?,
            api_key: api_key.into(),
            base_url: PEXELS_API_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Largest hd/sd rendition no wider than [`MAX_SOURCE_WIDTH`].
fn pick_pexels_file(files: &[PexelsFile]) -> Option<&PexelsFile> {
    let mut best: Option<&PexelsFile> = None;
    for file in files {
        let tier_ok = matches!(file.quality.as_deref(), Some("hd") | Some("sd"));
        let width = file.width.unwrap_or(0);
        if !tier_ok || width > MAX_SOURCE_WIDTH {
            continue;
        }
        if best.is_none_or(|b| width > b.width.unwrap_or(0)) {
            best = Some(file);
        }
    }
    best
}

#[async_trait]
impl FootageProvider for PexelsProvider {
    fn name(&self) -> &'static str {
        "pexels"
    }

    async fn search(
        &self,
        query: &str,
        orientation: Orientation,
        min_duration: u32,
    ) -> Result<Option<FootageCandidate>, FootageError> {
        let response = self
            .http
            .get(&self.base_url)
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", query.to_string()),
                ("orientation", orientation.as_ref().to_string()),
                ("per_page", RESULTS_PER_PAGE.to_string()),
                ("min_duration", min_duration.to_string()),
            ])
            .send()
            .await?;
        check_status(self.name(), response.status())?;

        let body: PexelsResponse = response.json().await?;
        let Some(video) = body.videos.first() else {
            return Ok(None);
        };
        Ok(pick_pexels_file(&video.video_files).map(|file| FootageCandidate {
            url: file.link.clone(),
            duration_seconds: video.duration.unwrap_or(10.0),
            width: file.width.unwrap_or(CANVAS_WIDTH),
            height: file.height.unwrap_or(CANVAS_HEIGHT),
            source: ClipSource::Pexels,
        }))
    }
}

// ---------------------------------------------------------------------------
// Pixabay
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PixabayResponse {
    #[serde(default)]
    hits: Vec<PixabayHit>,
}

#[derive(Debug, Deserialize)]
struct PixabayHit {
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    videos: PixabaySizes,
}

#[derive(Debug, Default, Deserialize)]
struct PixabaySizes {
    large: Option<PixabayRendition>,
    medium: Option<PixabayRendition>,
    small: Option<PixabayRendition>,
}

#[derive(Debug, Clone, Deserialize)]
struct PixabayRendition {
    #[serde(default)]
    url: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

impl PixabaySizes {
    /// medium, then small, then large; renditions without a URL don't count.
    fn preferred(&self) -> Option<&PixabayRendition> {
        [&self.medium, &self.small, &self.large]
            .into_iter()
            .flatten()
            .find(|r| !r.url.is_empty())
    }
}

pub struct PixabayProvider {
    http: Client,
    api_key: String,
    base_url: String,
}

impl PixabayProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, FootageError> {
        Ok(Self {
            http: search_client()?,
            api_key: api_key.into(),
            base_url: PIXABAY_API_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl FootageProvider for PixabayProvider {
    fn name(&self) -> &'static str {
        "pixabay"
    }

    async fn search(
        &self,
        query: &str,
        orientation: Orientation,
        _min_duration: u32,
    ) -> Result<Option<FootageCandidate>, FootageError> {
        let video_type = match orientation {
            Orientation::Landscape => "film",
            Orientation::Portrait => "all",
        };
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("key", self.api_key.clone()),
                ("q", query.to_string()),
                ("video_type", video_type.to_string()),
                ("per_page", RESULTS_PER_PAGE.to_string()),
            ])
            .send()
            .await?;
        check_status(self.name(), response.status())?;

        let body: PixabayResponse = response.json().await?;
        let Some(hit) = body.hits.first() else {
            return Ok(None);
        };
        Ok(hit.videos.preferred().map(|r| FootageCandidate {
            url: r.url.clone(),
            duration_seconds: hit.duration.unwrap_or(10.0),
            width: r.width.unwrap_or(CANVAS_WIDTH),
            height: r.height.unwrap_or(CANVAS_HEIGHT),
            source: ClipSource::Pixabay,
        }))
    }
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// Streams remote assets to disk with reqwest.
pub struct HttpFetcher {
    http: Client,
    min_bytes: u64,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FootageError> {
        Ok(Self {
            http: Client::builder().timeout(DOWNLOAD_TIMEOUT).build()?,
            min_bytes: MIN_DOWNLOAD_BYTES,
        })
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FootageError> {
        let response = self.http.get(url).send().await?;
        check_status("download", response.status())?;

        save_stream(response.bytes_stream(), dest, self.min_bytes).await
    }
}

/// Write `stream` to `dest`, keeping the file only if the whole body arrived
/// and is larger than `min_bytes`.
async fn save_stream<S, B, E>(stream: S, dest: &Path, min_bytes: u64) -> Result<u64, FootageError>
where
    S: futures::Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<FootageError>,
{
    let result = match write_stream(stream, dest).await {
        Ok(written) if written <= min_bytes => Err(FootageError::TooSmall { bytes: written }),
        other => other,
    };
    if result.is_err() {
        let _ = tokio::fs::remove_file(dest).await;
    }
    result
}

async fn write_stream<S, B, E>(stream: S, dest: &Path) -> Result<u64, FootageError>
where
    S: futures::Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<FootageError>,
{
    let io_err = |e| FootageError::Io(dest.to_path_buf(), e);
    let file = tokio::fs::File::create(dest).await.map_err(io_err)?;
    let mut writer = tokio::io::BufWriter::with_capacity(DOWNLOAD_BUFFER_BYTES, file);

    let mut stream = std::pin::pin!(stream);
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => return Err(e.into()),
        };
        let chunk = chunk.as_ref();
        writer.write_all(chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
    }
    writer.flush().await.map_err(io_err)?;
    Ok(written)
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Pause between scenes to stay under provider rate limits.
    pub inter_scene_delay: Duration,
    pub orientation: Orientation,
    pub min_duration: u32,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            inter_scene_delay: Duration::from_millis(500),
            orientation: Orientation::Portrait,
            min_duration: 5,
        }
    }
}

/// Result of resolving footage for a script.
#[derive(Debug, Clone)]
pub struct ResolvedFootage {
    /// In scene order; never empty.
    pub clips: Vec<FootageClip>,
    /// Scenes no provider could serve.
    pub dropped: usize,
    pub used_placeholder: bool,
}

pub struct FootageResolver {
    providers: Vec<Arc<dyn FootageProvider>>,
    fetcher: Arc<dyn AssetFetcher>,
    transcoder: Arc<dyn Transcoder>,
    settings: ResolverSettings,
}

impl FootageResolver {
    pub fn new(
        providers: Vec<Arc<dyn FootageProvider>>,
        fetcher: Arc<dyn AssetFetcher>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            providers,
            fetcher,
            transcoder,
            settings: ResolverSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ResolverSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Download one clip per scene into `dir`. Only a failing placeholder
    /// render is an error.
    pub async fn resolve(&self, scenes: &[Scene], dir: &Path) -> Result<ResolvedFootage, FootageError> {
        let mut clips = Vec::with_capacity(scenes.len());
        let mut dropped = 0;

        for (i, scene) in scenes.iter().enumerate() {
            let query = scene_query(scene);
            tracing::info!(scene = scene.index, query = %query, "Fetching footage");

            match self.resolve_scene(scene, &query, dir).await {
                Some(clip) => clips.push(clip),
                None => {
                    tracing::warn!(scene = scene.index, query = %query, "No footage found, dropping scene");
                    dropped += 1;
                }
            }

            if i + 1 < scenes.len() && !self.settings.inter_scene_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_scene_delay).await;
            }
        }

        if dropped > 0 {
            metrics::counter!("video_scenes_dropped_total").increment(dropped as u64);
        }

        if !clips.is_empty() {
            return Ok(ResolvedFootage {
                clips,
                dropped,
                used_placeholder: false,
            });
        }

        tracing::warn!("No footage for any scene, rendering placeholder clip");
        let path = dir.join("placeholder.mp4");
        self.transcoder.run(&TranscodeOp::placeholder(&path)).await?;
        Ok(ResolvedFootage {
            clips: vec![FootageClip {
                scene_index: 0,
                query: String::new(),
                path,
                duration_seconds: PLACEHOLDER_SECS as f64,
                width: CANVAS_WIDTH,
                height: CANVAS_HEIGHT,
                source: ClipSource::Placeholder,
            }],
            dropped,
            used_placeholder: true,
        })
    }

    async fn resolve_scene(&self, scene: &Scene, query: &str, dir: &Path) -> Option<FootageClip> {
        for provider in &self.providers {
            let candidate = match provider
                .search(query, self.settings.orientation, self.settings.min_duration)
                .await
            {
                Ok(Some(c)) => c,
                Ok(None) => {
                    tracing::debug!(provider = provider.name(), query = %query, "No results");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "Footage search failed");
                    continue;
                }
            };

            let path = dir.join(format!("scene_{}.mp4", scene.index));
            match self.fetcher.download(&candidate.url, &path).await {
                Ok(bytes) => {
                    tracing::info!(provider = provider.name(), scene = scene.index, bytes, "Footage downloaded");
                    return Some(FootageClip {
                        scene_index: scene.index,
                        query: query.to_string(),
                        path,
                        duration_seconds: candidate.duration_seconds,
                        width: candidate.width,
                        height: candidate.height,
                        source: candidate.source,
                    });
                }
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "Footage download failed");
                }
            }
        }
        None
    }
}

/// Search query from the first two keywords.
pub fn scene_query(scene: &Scene) -> String {
    let words: Vec<&str> = scene.keywords.iter().take(2).map(String::as_str).collect();
    if words.is_empty() {
        "video".to_string()
    } else {
        words.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::transcoder::{TranscodeKind, TranscodeOp};
    use parking_lot::Mutex;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scene(index: usize, keywords: &[&str]) -> Scene {
        Scene {
            index,
            text: "text".into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            estimated_seconds: 3.0,
        }
    }

    fn fast() -> ResolverSettings {
        ResolverSettings {
            inter_scene_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Answers only the queries it knows.
    struct MapProvider {
        name: &'static str,
        hits: Vec<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FootageProvider for MapProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn search(&self, query: &str, _: Orientation, _: u32) -> Result<Option<FootageCandidate>, FootageError> {
            self.calls.lock().push(query.to_string());
            Ok(self.hits.iter().any(|h| *h == query).then(|| FootageCandidate {
                url: format!("https://cdn/{}/{query}", self.name),
                duration_seconds: 8.0,
                width: 1080,
                height: 1920,
                source: ClipSource::Other,
            }))
        }
    }

    struct FileFetcher;

    #[async_trait]
    impl AssetFetcher for FileFetcher {
        async fn download(&self, _url: &str, dest: &Path) -> Result<u64, FootageError> {
            tokio::fs::write(dest, vec![0u8; 2048]).await.unwrap();
            Ok(2048)
        }
    }

    #[derive(Default)]
    struct RecordingTranscoder {
        ops: Mutex<Vec<TranscodeKind>>,
    }

    #[async_trait]
    impl Transcoder for RecordingTranscoder {
        async fn run(&self, op: &TranscodeOp) -> Result<(), TranscodeError> {
            self.ops.lock().push(op.kind);
            tokio::fs::write(&op.output, b"placeholder").await.unwrap();
            Ok(())
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    #[test]
    fn query_uses_two_keywords() {
        assert_eq!(scene_query(&scene(1, &["galaxy", "nebula", "stars"])), "galaxy nebula");
        assert_eq!(scene_query(&scene(1, &[])), "video");
    }

    #[test]
    fn pexels_picks_largest_file_within_cap() {
        let files = vec![
            PexelsFile { quality: Some("uhd".into()), width: Some(2160), height: None, link: "uhd".into() },
            PexelsFile { quality: Some("hd".into()), width: Some(2560), height: None, link: "too-wide".into() },
            PexelsFile { quality: Some("sd".into()), width: Some(540), height: None, link: "sd".into() },
            PexelsFile { quality: Some("hd".into()), width: Some(1080), height: None, link: "hd".into() },
        ];
        assert_eq!(pick_pexels_file(&files).unwrap().link, "hd");
    }

    #[tokio::test]
    async fn secondary_provider_covers_primary_misses() {
        let dir = tempfile::tempdir().unwrap();
        let primary = Arc::new(MapProvider { name: "primary", hits: vec!["galaxy"], calls: Mutex::new(vec![]) });
        let secondary = Arc::new(MapProvider { name: "secondary", hits: vec!["ocean"], calls: Mutex::new(vec![]) });
        let resolver = FootageResolver::new(
            vec![primary.clone(), secondary.clone()],
            Arc::new(FileFetcher),
            Arc::new(RecordingTranscoder::default()),
        )
        .with_settings(fast());

        let scenes = vec![scene(1, &["galaxy"]), scene(2, &["ocean"]), scene(3, &["nothing"])];
        let resolved = resolver.resolve(&scenes, dir.path()).await.unwrap();

        assert_eq!(resolved.clips.len(), 2);
        assert_eq!(resolved.clips[0].scene_index, 1);
        assert_eq!(resolved.clips[1].scene_index, 2);
        assert_eq!(resolved.dropped, 1);
        assert!(!resolved.used_placeholder);
        assert_eq!(*secondary.calls.lock(), vec!["ocean", "nothing"]);
    }

    #[tokio::test]
    async fn placeholder_when_nothing_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = Arc::new(RecordingTranscoder::default());
        let empty = Arc::new(MapProvider { name: "empty", hits: vec![], calls: Mutex::new(vec![]) });
        let resolver = FootageResolver::new(vec![empty], Arc::new(FileFetcher), transcoder.clone())
            .with_settings(fast());

        let resolved = resolver
            .resolve(&[scene(1, &["a"]), scene(2, &["b"])], dir.path())
            .await
            .unwrap();

        assert_eq!(resolved.clips.len(), 1);
        assert_eq!(resolved.clips[0].source, ClipSource::Placeholder);
        assert_eq!(resolved.dropped, 2);
        assert_eq!(*transcoder.ops.lock(), vec![TranscodeKind::Placeholder]);
    }

    #[tokio::test]
    async fn no_providers_still_yields_a_clip() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = FootageResolver::new(vec![], Arc::new(FileFetcher), Arc::new(RecordingTranscoder::default()))
            .with_settings(fast());
        let resolved = resolver.resolve(&[scene(1, &["a"])], dir.path()).await.unwrap();
        assert!(resolved.used_placeholder);
    }

    #[tokio::test]
    async fn pexels_search_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos/search"))
            .and(header("authorization", "px-key"))
            .and(query_param("query", "deep ocean"))
            .and(query_param("orientation", "portrait"))
            .and(query_param("per_page", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "videos": [{
                    "duration": 14,
                    "video_files": [
                        { "quality": "sd", "width": 540, "height": 960, "link": "https://v/sd.mp4" },
                        { "quality": "hd", "width": 1080, "height": 1920, "link": "https://v/hd.mp4" }
                    ]
                }]
            })))
            .mount(&server)
            .await;

        let provider = PexelsProvider::new("px-key")
            .unwrap()
            .with_base_url(format!("{}/videos/search", server.uri()));
        let candidate = provider
            .search("deep ocean", Orientation::Portrait, 5)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(candidate.url, "https://v/hd.mp4");
        assert_eq!(candidate.duration_seconds, 14.0);
        assert_eq!(candidate.source, ClipSource::Pexels);
    }

    #[tokio::test]
    async fn pexels_rate_limit_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let provider = PexelsProvider::new("k").unwrap().with_base_url(server.uri());
        let err = provider.search("x", Orientation::Portrait, 5).await.unwrap_err();
        assert!(matches!(err, FootageError::RateLimited("pexels")));
    }

    #[tokio::test]
    async fn pixabay_prefers_medium_then_small() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("key", "pb-key"))
            .and(query_param("video_type", "all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hits": [{
                    "duration": 9,
                    "videos": {
                        "large": { "url": "https://p/large.mp4", "width": 1920, "height": 1080 },
                        "medium": { "url": "", "width": 0, "height": 0 },
                        "small": { "url": "https://p/small.mp4", "width": 960, "height": 540 }
                    }
                }]
            })))
            .mount(&server)
            .await;

        let provider = PixabayProvider::new("pb-key").unwrap().with_base_url(server.uri());
        let candidate = provider.search("forest", Orientation::Portrait, 5).await.unwrap().unwrap();
        assert_eq!(candidate.url, "https://p/small.mp4");
        assert_eq!(candidate.width, 960);
    }

    #[tokio::test]
    async fn pixabay_without_hits_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "hits": [] })))
            .mount(&server)
            .await;

        let provider = PixabayProvider::new("k").unwrap().with_base_url(server.uri());
        assert!(provider.search("x", Orientation::Landscape, 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tiny_downloads_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(path("/tiny.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 500]))
            .mount(&server)
            .await;
        Mock::given(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 20_000]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new().unwrap();

        let tiny = dir.path().join("tiny.mp4");
        let err = fetcher.download(&format!("{}/tiny.mp4", server.uri()), &tiny).await.unwrap_err();
        assert!(matches!(err, FootageError::TooSmall { bytes: 500 }));
        assert!(!tiny.exists());

        let clip = dir.path().join("clip.mp4");
        let bytes = fetcher.download(&format!("{}/clip.mp4", server.uri()), &clip).await.unwrap();
        assert_eq!(bytes, 20_000);
        assert_eq!(std::fs::metadata(&clip).unwrap().len(), 20_000);
    }

    #[tokio::test]
    async fn interrupted_stream_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("clip.mp4");
        let chunks: Vec<Result<Vec<u8>, FootageError>> = vec![
            Ok(vec![7u8; 4096]),
            Err(FootageError::Io(
                PathBuf::from("remote"),
                std::io::ErrorKind::ConnectionReset.into(),
            )),
        ];

        let err = save_stream(futures::stream::iter(chunks), &dest, MIN_DOWNLOAD_BYTES)
            .await
            .unwrap_err();
        assert!(matches!(err, FootageError::Io(..)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn complete_stream_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("clip.mp4");
        let chunks: Vec<Result<Vec<u8>, FootageError>> = vec![Ok(vec![1u8; 3000]), Ok(vec![2u8; 3000])];

        let written = save_stream(futures::stream::iter(chunks), &dest, MIN_DOWNLOAD_BYTES)
            .await
            .unwrap();
        assert_eq!(written, 6000);
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 6000);
    }

    #[tokio::test]
    async fn unwritable_destination_is_an_io_error() {
        let server = MockServer::start().await;
        Mock::given(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 20_000]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing").join("clip.mp4");
        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher.download(&format!("{}/clip.mp4", server.uri()), &dest).await.unwrap_err();
        assert!(matches!(err, FootageError::Io(..)));
        assert!(!dest.exists());
    }
}
