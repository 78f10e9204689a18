//! Timed captions derived from the narration script.
//!
//! The script is cut into chunks of at most [`MAX_CHUNK_CHARS`] characters,
//! never across a sentence boundary and never mid-word. Chunks are laid out
//! back to back from t=0. SRT and ASS are two encodings of the same track.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Widest caption line, in characters.
pub const MAX_CHUNK_CHARS: usize = 40;

/// Reference speaking rate used to time captions.
pub const WORDS_PER_SECOND: f64 = 2.3;

/// Shortest time a caption stays on screen.
pub const MIN_CHUNK_SECONDS: f64 = 1.5;

/// One caption: text shown from `start` to `end` (seconds).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptionChunk {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CaptionTrack {
    pub chunks: Vec<CaptionChunk>,
}

/// Caption files written for the compositor.
#[derive(Debug, Clone)]
pub struct CaptionFiles {
    pub srt: PathBuf,
    pub ass: PathBuf,
}

impl CaptionFiles {
    /// The styled track is preferred for burn-in.
    pub fn preferred(&self) -> &Path {
        if self.ass.exists() {
            &self.ass
        } else {
            &self.srt
        }
    }
}

/// Split `script` into sentences: a sentence ends at `.`, `!` or `?` followed by whitespace.
pub fn split_sentences(script: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = script.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|n| n.is_whitespace()) {
            while chars.peek().is_some_and(|n| n.is_whitespace()) {
                chars.next();
            }
            push_trimmed(&mut sentences, &current);
            current.clear();
        }
    }
    push_trimmed(&mut sentences, &current);
    sentences
}

fn push_trimmed(out: &mut Vec<String>, s: &str) {
    let t = s.trim();
    if !t.is_empty() {
        out.push(t.to_string());
    }
}

/// Collapse all whitespace runs to single spaces.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut the script into caption-sized chunks.
///
/// A single word longer than [`MAX_CHUNK_CHARS`] becomes its own chunk rather
/// than being broken.
pub fn split_into_chunks(script: &str) -> Vec<String> {
    let normalized = normalize_whitespace(script);
    let mut chunks = Vec::new();

    for sentence in split_sentences(&normalized) {
        let mut current = String::new();
        for word in sentence.split_whitespace() {
            let needed = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };
            if needed <= MAX_CHUNK_CHARS || current.is_empty() {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(word);
            } else {
                chunks.push(std::mem::take(&mut current));
                current.push_str(word);
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }
    }
    chunks
}

/// On-screen time for a chunk of text.
pub fn chunk_duration(text: &str) -> f64 {
    let words = text.split_whitespace().count() as f64;
    (words / WORDS_PER_SECOND).max(MIN_CHUNK_SECONDS)
}

/// Build the caption track for a script.
pub fn build(script: &str) -> CaptionTrack {
    let mut cursor = 0.0;
    let chunks = split_into_chunks(script)
        .into_iter()
        .map(|text| {
            let start = cursor;
            let end = start + chunk_duration(&text);
            cursor = end;
            CaptionChunk { text, start, end }
        })
        .collect();
    CaptionTrack { chunks }
}

impl CaptionTrack {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// End time of the last caption.
    pub fn duration(&self) -> f64 {
        self.chunks.last().map(|c| c.end).unwrap_or(0.0)
    }

    /// SubRip encoding.
    pub fn to_srt(&self) -> String {
        let mut out = String::new();
        for (i, chunk) in self.chunks.iter().enumerate() {
            let _ = writeln!(out, "{}", i + 1);
            let _ = writeln!(out, "{} --> {}", srt_timestamp(chunk.start), srt_timestamp(chunk.end));
            let _ = writeln!(out, "{}", chunk.text);
            out.push('\n');
        }
        out
    }

    /// Advanced SubStation Alpha encoding with the vertical-video style.
    pub fn to_ass(&self, title: &str) -> String {
        let title = single_line(title);
        let mut out = format!(
            "[Script Info]\n\
             Title: {title}\n\
             ScriptType: v4.00+\n\
             PlayResX: 1080\n\
             PlayResY: 1920\n\
             \n\
             [V4+ Styles]\n\
             Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n\
             Style: Default,Arial,48,&H00FFFFFF,&H000000FF,&H00000000,&H00000000,1,0,0,0,100,100,0,0,1,3,0,2,10,10,50,1\n\
             \n\
             [Events]\n\
             Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n"
        );
        for chunk in &self.chunks {
            let _ = writeln!(
                out,
                "Dialogue: 0,{},{},Default,,0,0,0,,{}",
                ass_timestamp(chunk.start),
                ass_timestamp(chunk.end),
                ass_text(&chunk.text)
            );
        }
        out
    }

    /// Write both encodings into `dir` as `captions.srt` / `captions.ass`.
    pub async fn write_files(&self, dir: &Path, title: &str) -> std::io::Result<CaptionFiles> {
        let srt = dir.join("captions.srt");
        let ass = dir.join("captions.ass");
        tokio::fs::write(&srt, self.to_srt()).await?;
        tokio::fs::write(&ass, self.to_ass(title)).await?;
        Ok(CaptionFiles { srt, ass })
    }
}

fn single_line(text: &str) -> String {
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Dialogue text with braces escaped so libass does not read them as override
/// blocks.
fn ass_text(text: &str) -> String {
    single_line(text).replace('{', "\\{").replace('}', "\\}")
}

fn split_millis(seconds: f64) -> (u64, u64, u64, u64) {
    let total_ms = (seconds * 1000.0).round().max(0.0) as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    (hours, minutes, secs, total_ms % 1000)
}

/// `HH:MM:SS,mmm`
pub fn srt_timestamp(seconds: f64) -> String {
    let (h, m, s, ms) = split_millis(seconds);
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

/// `H:MM:SS.cc`
pub fn ass_timestamp(seconds: f64) -> String {
    let (h, m, s, ms) = split_millis(seconds);
    format!("{h}:{m:02}:{s:02}.{:02}", ms / 10)
}
