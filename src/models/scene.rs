use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::Display;

/// A contiguous span of the script mapped to one footage search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scene {
    /// 1-based, dense ordinal.
    pub index: usize,
    pub text: String,
    /// At most 3, ordered by first occurrence, deduplicated.
    pub keywords: Vec<String>,
    /// Estimated spoken duration in seconds.
    pub estimated_seconds: f64,
}

/// Output of the script generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedScript {
    pub full_script: String,
    pub scenes: Vec<Scene>,
    pub word_count: usize,
    pub estimated_seconds: f64,
    /// True when the templated fallback was used instead of the remote model.
    pub fallback: bool,
}

impl GeneratedScript {
    /// Scene texts joined in order; this is what gets narrated.
    pub fn narration_text(&self) -> String {
        self.scenes
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Where a footage clip came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClipSource {
    Pexels,
    Pixabay,
    Placeholder,
    /// Any other provider plugged in through the footage provider trait.
    Other,
}

/// A locally downloaded clip for one scene.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FootageClip {
    /// Ordinal of the scene this clip illustrates (0 for the placeholder).
    pub scene_index: usize,
    pub query: String,
    pub path: PathBuf,
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub source: ClipSource,
}
