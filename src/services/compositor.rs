//! Final video assembly.
//!
//! Four transcoding stages: concatenate, mux narration, burn captions,
//! normalize. Concatenation and muxing are fatal on failure; caption burn-in
//! and normalization fall back to the previous stage's output. The thumbnail
//! is optional.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::scene::FootageClip;
use crate::services::captions::CaptionFiles;
use crate::services::transcoder::{TranscodeError, TranscodeOp, Transcoder};

#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    #[error("no clips to compose")]
    NoClips,

    #[error("concatenation failed: {0}")]
    Concat(#[source] TranscodeError),

    #[error("adding narration failed: {0}")]
    Mux(#[source] TranscodeError),

    #[error("I/O error on {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
}

/// Where the compositor reads and writes for one job.
#[derive(Debug, Clone)]
pub struct CompositionPaths {
    /// Intermediate stage outputs.
    pub scratch_dir: PathBuf,
    pub video: PathBuf,
    pub thumbnail: PathBuf,
}

/// Outcome of a successful composition.
#[derive(Debug, Clone)]
pub struct Composition {
    pub video: PathBuf,
    pub thumbnail: Option<PathBuf>,
    pub captions_burned: bool,
    pub normalized: bool,
}

pub struct Compositor {
    transcoder: Arc<dyn Transcoder>,
}

impl Compositor {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self { transcoder }
    }

    pub async fn compose(
        &self,
        clips: &[FootageClip],
        narration: &Path,
        captions: Option<&CaptionFiles>,
        target_duration_seconds: i32,
        paths: &CompositionPaths,
    ) -> Result<Composition, CompositionError> {
        let footage_seconds: f64 = clips.iter().map(|c| c.duration_seconds).sum();
        if footage_seconds < target_duration_seconds as f64 {
            tracing::warn!(
                footage_seconds,
                target_duration_seconds,
                "Footage is shorter than the target duration; output follows the shorter stream"
            );
        }

        let concatenated = self.concatenate(clips, &paths.scratch_dir).await?;

        let muxed = paths.scratch_dir.join("with_audio.mp4");
        self.transcoder
            .run(&TranscodeOp::mux_audio(&concatenated, narration, &muxed))
            .await
            .map_err(CompositionError::Mux)?;

        let (captioned, captions_burned) = match captions {
            Some(files) => {
                let out = paths.scratch_dir.join("captioned.mp4");
                match self
                    .transcoder
                    .run(&TranscodeOp::burn_captions(&muxed, files.preferred(), &out))
                    .await
                {
                    Ok(()) => (out, true),
                    Err(e) => {
                        tracing::warn!(error = %e, "Caption burn-in failed, continuing without captions");
                        metrics::counter!("video_caption_burn_skipped_total").increment(1);
                        (muxed, false)
                    }
                }
            }
            None => (muxed, false),
        };

        let normalized = match self
            .transcoder
            .run(&TranscodeOp::normalize(&captioned, &paths.video))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Normalization failed, keeping the un-normalized video");
                tokio::fs::copy(&captioned, &paths.video)
                    .await
                    .map_err(|e| CompositionError::Io(paths.video.clone(), e))?;
                false
            }
        };

        let thumbnail = self.thumbnail(&paths.video, &paths.thumbnail).await;

        Ok(Composition {
            video: paths.video.clone(),
            thumbnail,
            captions_burned,
            normalized,
        })
    }

    /// Join clips in order. One clip passes through untouched; otherwise a
    /// stream copy is tried before a re-encode.
    async fn concatenate(&self, clips: &[FootageClip], scratch: &Path) -> Result<PathBuf, CompositionError> {
        match clips {
            [] => Err(CompositionError::NoClips),
            [only] => Ok(only.path.clone()),
            _ => {
                let list = scratch.join("concat_list.txt");
                tokio::fs::write(&list, concat_list(clips))
                    .await
                    .map_err(|e| CompositionError::Io(list.clone(), e))?;

                let out = scratch.join("concatenated.mp4");
                match self.transcoder.run(&TranscodeOp::concat(&list, &out)).await {
                    Ok(()) => Ok(out),
                    Err(e) => {
                        tracing::warn!(error = %e, "Stream-copy concat failed, re-encoding");
                        let inputs: Vec<PathBuf> = clips.iter().map(|c| c.path.clone()).collect();
                        self.transcoder
                            .run(&TranscodeOp::concat_reencode(&inputs, &out))
                            .await
                            .map_err(CompositionError::Concat)?;
                        Ok(out)
                    }
                }
            }
        }
    }

    async fn thumbnail(&self, video: &Path, output: &Path) -> Option<PathBuf> {
        if let Err(e) = self.transcoder.run(&TranscodeOp::thumbnail(video, output)).await {
            tracing::warn!(error = %e, "Thumbnail extraction failed");
            return None;
        }

        let probe = output.to_path_buf();
        match tokio::task::spawn_blocking(move || image::image_dimensions(&probe)).await {
            Ok(Ok((width, height))) => {
                tracing::debug!(width, height, "Thumbnail extracted");
                Some(output.to_path_buf())
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Thumbnail is not a readable image, discarding");
                let _ = tokio::fs::remove_file(output).await;
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Thumbnail probe task failed");
                None
            }
        }
    }
}

/// ffmpeg concat demuxer list.
fn concat_list(clips: &[FootageClip]) -> String {
    clips
        .iter()
        .map(|c| {
            let path = c.path.to_string_lossy().replace('\'', "'\\''");
            format!("file '{path}'\n")
        })
        .collect()
}
