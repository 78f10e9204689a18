//! Text-to-speech for the narration track.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::services::command::{CommandError, ToolCommand};

/// Longest narration sent to the speech engine, in characters.
pub const MAX_NARRATION_CHARS: usize = 5000;

const STRIPPED_CHARS: &[char] = &['*', '#', '_', '~', '`', '|'];

const OUTPUT_PLACEHOLDER: &str = "{output}";

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("nothing to narrate")]
    EmptyText,

    #[error("speech engine failed: {0}")]
    Engine(#[from] CommandError),

    #[error("speech engine produced no audio at {0}")]
    EmptyOutput(PathBuf),
}

/// A speech engine writing audio for `text` to `output`.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    async fn speak(&self, text: &str, output: &Path) -> Result<(), SynthesisError>;
}

/// Speech engine driven through an external command (espeak-ng by default).
///
/// Text goes to stdin; `{output}` in the argument list is replaced by the
/// target path.
pub struct CommandSpeechEngine {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandSpeechEngine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(120),
        }
    }

    /// Split a whitespace-separated argument template.
    pub fn from_template(program: impl Into<PathBuf>, template: &str) -> Self {
        Self::new(program, template.split_whitespace().map(str::to_string).collect())
    }

    fn render_args(&self, output: &Path) -> Vec<String> {
        let out = output.to_string_lossy();
        self.args
            .iter()
            .map(|a| a.replace(OUTPUT_PLACEHOLDER, &out))
            .collect()
    }
}

#[async_trait]
impl SpeechEngine for CommandSpeechEngine {
    async fn speak(&self, text: &str, output: &Path) -> Result<(), SynthesisError> {
        ToolCommand::new(&self.program)
            .args(self.render_args(output))
            .stdin(text.as_bytes().to_vec())
            .timeout(self.timeout)
            .execute()
            .await?;
        Ok(())
    }
}

/// Produces the single narration asset for a job.
pub struct NarrationSynthesizer {
    engine: Arc<dyn SpeechEngine>,
}

impl NarrationSynthesizer {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self { engine }
    }

    /// Sanitize `text` and synthesize it into `output`. Any engine failure or a
    /// missing/zero-byte result is fatal.
    pub async fn synthesize(&self, text: &str, output: &Path) -> Result<PathBuf, SynthesisError> {
        let clean = sanitize(text);
        if clean.is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        tracing::info!(chars = clean.chars().count(), output = %output.display(), "Synthesizing narration");
        self.engine.speak(&clean, output).await?;

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => {
                tracing::info!(bytes = meta.len(), "Narration synthesized");
                Ok(output.to_path_buf())
            }
            _ => {
                let _ = tokio::fs::remove_file(output).await;
                Err(SynthesisError::EmptyOutput(output.to_path_buf()))
            }
        }
    }
}

/// Collapse whitespace, drop markup characters and cap the length.
pub fn sanitize(text: &str) -> String {
    let kept: String = text.chars().filter(|c| !STRIPPED_CHARS.contains(c)).collect();
    let stripped = kept.split_whitespace().collect::<Vec<_>>().join(" ");

    let truncated = if stripped.chars().count() > MAX_NARRATION_CHARS {
        tracing::warn!(max = MAX_NARRATION_CHARS, "Narration text truncated");
        stripped.chars().take(MAX_NARRATION_CHARS).collect()
    } else {
        stripped
    };
    truncated.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct WritingEngine(&'static [u8]);

    #[async_trait]
    impl SpeechEngine for WritingEngine {
        async fn speak(&self, _text: &str, output: &Path) -> Result<(), SynthesisError> {
            tokio::fs::write(output, self.0).await.unwrap();
            Ok(())
        }
    }

    #[test]
    fn sanitize_strips_markup_and_whitespace() {
        assert_eq!(sanitize("  **Bold**   claim\n\n#1 | `code` ~x_y "), "Bold claim 1 code xy");
    }

    #[test]
    fn sanitize_truncates_long_text() {
        let long = "a".repeat(MAX_NARRATION_CHARS + 250);
        assert_eq!(sanitize(&long).chars().count(), MAX_NARRATION_CHARS);
    }

    #[test]
    fn output_placeholder_is_substituted() {
        let engine = CommandSpeechEngine::from_template("espeak-ng", "-v en-us --stdin -w {output}");
        assert_eq!(
            engine.render_args(Path::new("/m/n.wav")),
            vec!["-v", "en-us", "--stdin", "-w", "/m/n.wav"]
        );
    }

    #[tokio::test]
    async fn zero_byte_output_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("narration.wav");
        let synth = NarrationSynthesizer::new(Arc::new(WritingEngine(b"")));

        let err = synth.synthesize("Hello there.", &out).await.unwrap_err();
        assert!(matches!(err, SynthesisError::EmptyOutput(_)));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn produces_narration_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("narration.wav");
        let synth = NarrationSynthesizer::new(Arc::new(WritingEngine(b"RIFF....WAVE")));

        assert_eq!(synth.synthesize("Hello there.", &out).await.unwrap(), out);
    }

    #[tokio::test]
    async fn blank_text_is_rejected() {
        let synth = NarrationSynthesizer::new(Arc::new(WritingEngine(b"x")));
        let err = synth.synthesize(" ** ", Path::new("/tmp/never.wav")).await.unwrap_err();
        assert!(matches!(err, SynthesisError::EmptyText));
    }

    #[tokio::test]
    async fn missing_engine_program_is_an_engine_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CommandSpeechEngine::from_template("/nonexistent/tts-xyz", "-w {output}");
        let synth = NarrationSynthesizer::new(Arc::new(engine));
        let err = synth.synthesize("Hi.", &dir.path().join("n.wav")).await.unwrap_err();
        assert!(matches!(err, SynthesisError::Engine(CommandError::Spawn { .. })));
    }
}
