//! Narration script generation.
//!
//! A remote text model writes the script; transient failures (model warming,
//! rate limiting, transport errors) are retried up to [`MAX_ATTEMPTS`] times and
//! never escape this module. When every attempt fails a deterministic template
//! is used instead and the result is flagged as a fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::models::scene::{GeneratedScript, Scene};
use crate::services::captions::{normalize_whitespace, split_sentences, WORDS_PER_SECOND};

/// Narration rate used to size the script.
pub const WORDS_PER_MINUTE: f64 = 140.0;

pub const MAX_ATTEMPTS: u32 = 3;

const SENTENCES_PER_SCENE: usize = 2;
const MAX_KEYWORDS: usize = 3;

pub const DEFAULT_MODEL_URL: &str =
    "https://api-inference.huggingface.co/models/mistralai/Mistral-7B-Instruct-v0.2";

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did", "will", "would",
    "could", "should", "this", "that", "these", "those", "i", "you", "he", "she", "it", "we", "they",
    "me", "him", "her", "us", "them", "my", "your", "his", "its", "our", "their", "what", "which",
    "who", "when", "where", "why", "how", "all", "each", "every", "both", "few", "more", "most",
    "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than", "too", "very",
    "can", "just", "now", "get", "like", "one", "also", "know", "think", "see", "want", "come",
    "look", "use", "find", "give", "tell", "ask", "work", "seem", "feel", "try", "leave", "call",
];

const BOILERPLATE_PREFIXES: &[&str] = &[
    "Here is the script:",
    "Here is an engaging script:",
    "Video Script:",
    "Script:",
    "Here's",
    "Here is",
];

const INSTRUCTION_TOKENS: &[&str] = &["[INST]", "[/INST]", "<s>", "</s>"];

/// Sampling parameters sent with each completion request.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub return_full_text: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 500,
            temperature: 0.8,
            top_p: 0.95,
            return_full_text: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model is loading")]
    Warming,

    #[error("rate limited by model host")]
    RateLimited,

    #[error("model host returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model returned an empty completion")]
    Empty,
}

impl ModelError {
    /// Whether another attempt could succeed. Authentication and missing-model
    /// responses will not improve on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Status { status, .. } => !matches!(
                *status,
                StatusCode::BAD_REQUEST
                    | StatusCode::UNAUTHORIZED
                    | StatusCode::FORBIDDEN
                    | StatusCode::NOT_FOUND
            ),
            _ => true,
        }
    }
}

/// A remote text model.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String, ModelError>;
}

/// Hugging Face Inference API client.
pub struct HuggingFaceClient {
    http: Client,
    url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: &'a GenerationParams,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    List(Vec<GeneratedText>),
    Single(GeneratedText),
}

#[derive(Deserialize)]
struct GeneratedText {
    #[serde(default)]
    generated_text: String,
}

impl HuggingFaceClient {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Result<Self, ModelError> {
        let http = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            http,
            url: url.into(),
            token: token.filter(|t| !t.is_empty()),
        })
    }
}

#[async_trait]
impl TextModel for HuggingFaceClient {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String, ModelError> {
        let mut request = self.http.post(&self.url).json(&InferenceRequest {
            inputs: prompt,
            parameters: params,
        });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::SERVICE_UNAVAILABLE => return Err(ModelError::Warming),
            StatusCode::TOO_MANY_REQUESTS => return Err(ModelError::RateLimited),
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(ModelError::Status {
                    status,
                    body: body.chars().take(300).collect(),
                });
            }
        }

        let text = match response.json::<InferenceResponse>().await? {
            InferenceResponse::List(items) => items
                .into_iter()
                .next()
                .map(|g| g.generated_text)
                .unwrap_or_default(),
            InferenceResponse::Single(g) => g.generated_text,
        };
        if text.trim().is_empty() {
            return Err(ModelError::Empty);
        }
        Ok(text)
    }
}

/// Waits between attempts.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Wait after the model reports it is still loading.
    pub warmup_delay: Duration,
    /// Rate-limit wait grows by this step per attempt.
    pub rate_limit_step: Duration,
    /// Base of the exponential backoff for other failures.
    pub backoff_base: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            warmup_delay: Duration::from_secs(10),
            rate_limit_step: Duration::from_secs(5),
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetrySettings {
    /// No waiting at all; for tests.
    pub fn immediate() -> Self {
        Self {
            warmup_delay: Duration::ZERO,
            rate_limit_step: Duration::ZERO,
            backoff_base: Duration::ZERO,
        }
    }

    /// Delay before the next attempt, given the zero-based attempt that just failed.
    pub fn delay_for(&self, error: &ModelError, attempt: u32) -> Duration {
        match error {
            ModelError::Warming => self.warmup_delay,
            ModelError::RateLimited => self.rate_limit_step * (attempt + 1),
            _ => self.backoff_base * 2u32.saturating_pow(attempt),
        }
    }
}

/// Produces the narration script and its scene breakdown.
pub struct ScriptGenerator {
    model: Arc<dyn TextModel>,
    params: GenerationParams,
    retry: RetrySettings,
}

impl ScriptGenerator {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self {
            model,
            params: GenerationParams::default(),
            retry: RetrySettings::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    /// Generate a script for `topic` sized to `duration_seconds`. Never fails:
    /// the templated fallback covers exhausted retries.
    pub async fn generate(&self, topic: &str, duration_seconds: i32, style: &str) -> GeneratedScript {
        let prompt = build_prompt(topic, duration_seconds, style);

        for attempt in 0..MAX_ATTEMPTS {
            tracing::info!(topic = %topic, attempt = attempt + 1, "Requesting script from model");

            let error = match self.model.complete(&prompt, &self.params).await {
                Ok(raw) => {
                    let script = clean_script(&raw);
                    if !script.is_empty() {
                        let generated = assemble(script, false);
                        tracing::info!(
                            scenes = generated.scenes.len(),
                            words = generated.word_count,
                            "Script generated"
                        );
                        return generated;
                    }
                    ModelError::Empty
                }
                Err(e) => e,
            };

            tracing::warn!(attempt = attempt + 1, error = %error, "Script generation attempt failed");
            if !error.is_transient() {
                break;
            }
            if attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(self.retry.delay_for(&error, attempt)).await;
            }
        }

        tracing::warn!(topic = %topic, "All script attempts failed, using fallback template");
        metrics::counter!("video_script_fallback_total").increment(1);
        fallback_script(topic)
    }
}

/// Words the script should contain for a target duration.
pub fn target_word_count(duration_seconds: i32) -> usize {
    (duration_seconds as f64 / 60.0 * WORDS_PER_MINUTE) as usize
}

fn build_prompt(topic: &str, duration_seconds: i32, style: &str) -> String {
    let target_words = target_word_count(duration_seconds);
    format!(
        "<s>[INST] Write an {style}, viral short-form video script about \"{topic}\".\n\n\
         Requirements:\n\
         - Target length: {target_words} words (about {duration_seconds} seconds when spoken)\n\
         - Style: Attention-grabbing, conversational, perfect for TikTok/YouTube Shorts\n\
         - Structure: Hook in first 3 seconds, 3-5 key points, strong call-to-action at end\n\
         - Format: Return ONLY the script text, no stage directions or formatting\n\n\
         Make it exciting and shareable! [/INST]</s>"
    )
}

/// Strip instruction tokens and boilerplate, then collapse whitespace.
pub fn clean_script(raw: &str) -> String {
    let mut text = raw.to_string();
    for token in INSTRUCTION_TOKENS {
        text = text.replace(token, "");
    }

    let mut text = normalize_whitespace(&text);
    for prefix in BOILERPLATE_PREFIXES {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.trim_start().to_string();
        }
    }
    text.trim().to_string()
}

/// Group sentences two at a time into scenes.
pub fn split_into_scenes(script: &str) -> Vec<Scene> {
    split_sentences(script)
        .chunks(SENTENCES_PER_SCENE)
        .enumerate()
        .map(|(i, sentences)| {
            let text = sentences.join(" ");
            let keywords = extract_keywords(&text);
            let estimated_seconds = text.split_whitespace().count() as f64 / WORDS_PER_SECOND;
            Scene {
                index: i + 1,
                text,
                keywords,
                estimated_seconds,
            }
        })
        .collect()
}

/// Up to three search keywords, in first-occurrence order.
///
/// Hyphenated words count as separate words. A possessive `'s` is dropped and
/// any other contraction is skipped. Falls back to `["video", "content"]` when
/// nothing qualifies.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    let tokens = text.split(|c: char| c.is_whitespace() || c == '-');
    for raw in tokens {
        let word: String = raw
            .to_lowercase()
            .chars()
            .map(|c| if c == '\u{2019}' { '\'' } else { c })
            .filter(|c| c.is_alphanumeric() || *c == '\'')
            .collect();
        let word = word.trim_matches('\'');
        let word = word.strip_suffix("'s").unwrap_or(word);
        if word.contains('\'') || word.chars().count() <= 3 || STOP_WORDS.contains(&word) {
            continue;
        }
        if !keywords.iter().any(|k| k == word) {
            keywords.push(word.to_string());
            if keywords.len() == MAX_KEYWORDS {
                break;
            }
        }
    }

    if keywords.is_empty() {
        return vec!["video".to_string(), "content".to_string()];
    }
    keywords
}

fn assemble(full_script: String, fallback: bool) -> GeneratedScript {
    let scenes = split_into_scenes(&full_script);
    let word_count = full_script.split_whitespace().count();
    GeneratedScript {
        estimated_seconds: word_count as f64 / WORDS_PER_SECOND,
        word_count,
        scenes,
        full_script,
        fallback,
    }
}

/// Templated script: hook, three filler paragraphs and a call to action.
pub fn fallback_script(topic: &str) -> GeneratedScript {
    let hooks = [
        format!("You won't believe these facts about {topic}!"),
        format!("Stop everything and listen to this about {topic}!"),
        format!("This changed everything I knew about {topic}!"),
        format!("Mind = blown! Here's the truth about {topic}!"),
    ];
    // Stable per topic so the template is reproducible.
    let pick = topic.bytes().fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    let hook = &hooks[pick % hooks.len()];

    let script = format!(
        "{hook}\n\n\
         Did you know that {topic} has some incredible secrets that most people never discover? \
         Today, I'm going to share the most fascinating facts that will change your perspective forever.\n\n\
         First, let's talk about why {topic} matters more than you think. \
         The impact it has on our daily lives is absolutely mind-blowing when you really understand it.\n\n\
         Here's what nobody tells you: the real story behind {topic} is even more interesting than what you've heard. \
         There are hidden connections and surprising details that most experts don't even mention.\n\n\
         If you found this interesting, make sure to follow for more amazing content like this. \
         Drop a comment with your thoughts on {topic}!"
    );

    assemble(normalize_whitespace(&script), true)
}
