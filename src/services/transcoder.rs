//! Transcoding operations and the ffmpeg-backed [`Transcoder`].
//!
//! Each [`TranscodeOp`] is a self-contained descriptor (inputs, filter spec,
//! output path). The compositor and the footage resolver build ops; a
//! [`Transcoder`] runs them. Tests substitute their own transcoder.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use strum::{AsRefStr, Display};

use crate::services::command::{CommandError, ToolCommand, DEFAULT_TIMEOUT};

/// Final canvas for short-form vertical video.
pub const CANVAS_WIDTH: u32 = 1080;
pub const CANVAS_HEIGHT: u32 = 1920;

/// Offset of the thumbnail frame, in seconds.
pub const THUMBNAIL_OFFSET_SECS: u32 = 3;

/// Length of the synthesized placeholder clip, in seconds.
pub const PLACEHOLDER_SECS: u32 = 10;

const PLACEHOLDER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum TranscodeKind {
    Concat,
    ConcatReencode,
    MuxAudio,
    BurnCaptions,
    Normalize,
    Thumbnail,
    Placeholder,
}

/// One transcoder invocation.
#[derive(Debug, Clone)]
pub struct TranscodeOp {
    pub kind: TranscodeKind,
    pub args: Vec<String>,
    pub output: PathBuf,
    pub timeout: Duration,
}

fn path_arg(p: &Path) -> String {
    p.to_string_lossy().to_string()
}

fn letterbox_filter() -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black",
        w = CANVAS_WIDTH,
        h = CANVAS_HEIGHT
    )
}

impl TranscodeOp {
    fn new(kind: TranscodeKind, args: Vec<String>, output: &Path) -> Self {
        Self {
            kind,
            args,
            output: output.to_path_buf(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Stream-copy concatenation driven by a concat list file.
    pub fn concat(list_file: &Path, output: &Path) -> Self {
        let args = vec![
            "-y".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            path_arg(list_file),
            "-c".into(),
            "copy".into(),
            "-movflags".into(),
            "+faststart".into(),
            path_arg(output),
        ];
        Self::new(TranscodeKind::Concat, args, output)
    }

    /// Re-encoding concatenation for clips whose codecs or sizes differ.
    /// Audio is dropped; narration replaces it.
    pub fn concat_reencode(inputs: &[PathBuf], output: &Path) -> Self {
        let mut args: Vec<String> = vec!["-y".into()];
        for input in inputs {
            args.push("-i".into());
            args.push(path_arg(input));
        }

        let mut graph = String::new();
        for i in 0..inputs.len() {
            graph.push_str(&format!("[{i}:v]{},setsar=1,fps=30[v{i}];", letterbox_filter()));
        }
        for i in 0..inputs.len() {
            graph.push_str(&format!("[v{i}]"));
        }
        graph.push_str(&format!("concat=n={}:v=1:a=0[outv]", inputs.len()));

        args.extend([
            "-filter_complex".into(),
            graph,
            "-map".into(),
            "[outv]".into(),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "veryfast".into(),
            "-crf".into(),
            "23".into(),
            "-movflags".into(),
            "+faststart".into(),
            path_arg(output),
        ]);
        Self::new(TranscodeKind::ConcatReencode, args, output)
    }

    /// Attach narration as the only audio track, trimmed to the shorter input.
    pub fn mux_audio(video: &Path, audio: &Path, output: &Path) -> Self {
        let args = vec![
            "-y".into(),
            "-i".into(),
            path_arg(video),
            "-i".into(),
            path_arg(audio),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0".into(),
            "-c:v".into(),
            "copy".into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "192k".into(),
            "-shortest".into(),
            "-movflags".into(),
            "+faststart".into(),
            path_arg(output),
        ];
        Self::new(TranscodeKind::MuxAudio, args, output)
    }

    /// Rasterize a caption file onto the video.
    pub fn burn_captions(video: &Path, captions: &Path, output: &Path) -> Self {
        let is_ass = captions
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("ass"));
        let escaped = escape_filter_path(captions);
        let filter = if is_ass {
            format!("subtitles={escaped}")
        } else {
            format!(
                "subtitles={escaped}:force_style='FontSize=24,PrimaryColour=&HFFFFFF,OutlineColour=&H000000,Outline=2'"
            )
        };
        let args = vec![
            "-y".into(),
            "-i".into(),
            path_arg(video),
            "-vf".into(),
            filter,
            "-c:a".into(),
            "copy".into(),
            "-movflags".into(),
            "+faststart".into(),
            path_arg(output),
        ];
        Self::new(TranscodeKind::BurnCaptions, args, output)
    }

    /// Letterbox to the vertical canvas and re-encode for distribution.
    pub fn normalize(video: &Path, output: &Path) -> Self {
        let args = vec![
            "-y".into(),
            "-i".into(),
            path_arg(video),
            "-vf".into(),
            letterbox_filter(),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "fast".into(),
            "-crf".into(),
            "23".into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "128k".into(),
            "-movflags".into(),
            "+faststart".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            path_arg(output),
        ];
        Self::new(TranscodeKind::Normalize, args, output)
    }

    /// Grab one still frame at [`THUMBNAIL_OFFSET_SECS`].
    pub fn thumbnail(video: &Path, output: &Path) -> Self {
        let args = vec![
            "-y".into(),
            "-ss".into(),
            format!("{THUMBNAIL_OFFSET_SECS}"),
            "-i".into(),
            path_arg(video),
            "-vframes".into(),
            "1".into(),
            "-q:v".into(),
            "2".into(),
            path_arg(output),
        ];
        Self::new(TranscodeKind::Thumbnail, args, output)
    }

    /// Solid-colour canvas with low-level pink noise.
    pub fn placeholder(output: &Path) -> Self {
        let args = vec![
            "-y".into(),
            "-f".into(),
            "lavfi".into(),
            "-i".into(),
            format!(
                "color=c=0x1a1a2e:s={CANVAS_WIDTH}x{CANVAS_HEIGHT}:d={PLACEHOLDER_SECS}"
            ),
            "-f".into(),
            "lavfi".into(),
            "-i".into(),
            "anoisesrc=a=0.1:c=pink".into(),
            "-shortest".into(),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "ultrafast".into(),
            "-crf".into(),
            "28".into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "128k".into(),
            path_arg(output),
        ];
        let mut op = Self::new(TranscodeKind::Placeholder, args, output);
        op.timeout = PLACEHOLDER_TIMEOUT;
        op
    }
}

/// The subtitles filter parses `:` and `'` itself, so they need escaping.
fn escape_filter_path(p: &Path) -> String {
    path_arg(p)
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("{kind} failed: {source}")]
    Command {
        kind: TranscodeKind,
        source: CommandError,
    },

    #[error("{kind} reported success but produced no output at {path}")]
    MissingOutput { kind: TranscodeKind, path: PathBuf },
}

/// Runs [`TranscodeOp`]s.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn run(&self, op: &TranscodeOp) -> Result<(), TranscodeError>;

    /// Whether the backing tool is usable (for health checks).
    async fn is_available(&self) -> bool;
}

/// [`Transcoder`] that shells out to ffmpeg.
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn run(&self, op: &TranscodeOp) -> Result<(), TranscodeError> {
        tracing::debug!(kind = %op.kind, output = %op.output.display(), "Running ffmpeg");
        let start = std::time::Instant::now();

        ToolCommand::new(&self.program)
            .args(["-hide_banner", "-loglevel", "error"])
            .args(op.args.iter().cloned())
            .timeout(op.timeout)
            .execute()
            .await
            .map_err(|source| TranscodeError::Command {
                kind: op.kind,
                source,
            })?;

        if tokio::fs::metadata(&op.output).await.is_err() {
            return Err(TranscodeError::MissingOutput {
                kind: op.kind,
                path: op.output.clone(),
            });
        }

        tracing::debug!(
            kind = %op.kind,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ffmpeg finished"
        );
        Ok(())
    }

    async fn is_available(&self) -> bool {
        if which::which(&self.program).is_err() {
            return false;
        }
        ToolCommand::new(&self.program)
            .arg("-version")
            .timeout(Duration::from_secs(5))
            .execute()
            .await
            .is_ok()
    }
}
