//! Video encoding backend
//!
//! The narrow interface the degradation ladder uses to produce media. The
//! ladder never builds command lines itself; it hands an `EncodeSpec` to a
//! backend and only looks at the success flag.

mod ffmpeg;

pub use ffmpeg::{resolve_binary, FfmpegBackend};

use crate::config::EncoderConfig;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// What the encoder should read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeInput {
    /// Synthetic solid-colour card of the target size
    ColorCard { color: String },
}

/// x264 quality knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityKnobs {
    pub crf: u32,
    pub preset: String,
    pub threads: u32,
}

/// Description of one encode job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSpec {
    pub input: EncodeInput,
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub duration_secs: u32,
    pub quality: QualityKnobs,
    /// Text drawn centred over the clip
    pub overlay_text: Option<String>,
}

impl EncodeSpec {
    /// The most conservative clip the encoder config allows: a black card
    /// carrying `overlay_text`.
    pub fn minimal(config: &EncoderConfig, output_path: &Path, overlay_text: &str) -> Self {
        Self {
            input: EncodeInput::ColorCard {
                color: "black".to_string(),
            },
            output_path: output_path.to_path_buf(),
            width: config.width,
            height: config.height,
            frame_rate: config.frame_rate,
            duration_secs: config.duration_secs,
            quality: QualityKnobs {
                crf: config.crf,
                preset: config.preset.clone(),
                threads: config.threads,
            },
            overlay_text: Some(overlay_text.to_string()),
        }
    }
}

/// Result of an encode job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodeResult {
    pub success: bool,
    pub stderr: String,
}

impl EncodeResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stderr: stderr.into(),
        }
    }
}

/// Media production capability consumed by the ladder.
///
/// Every method reports failure through its return value; none of them
/// raises for a failed subprocess.
#[async_trait]
pub trait VideoEncodingBackend: Send + Sync {
    /// Encode a clip described by `spec`.
    async fn encode(&self, spec: &EncodeSpec) -> EncodeResult;

    /// Write the first frame of `input` to `output_image`.
    async fn extract_frame(&self, input: &Path, output_image: &Path) -> bool;

    /// Render `text` onto a blank still image at `output_image`.
    async fn render_still(&self, text: &str, width: u32, height: u32, output_image: &Path)
        -> bool;

    /// Backend name for logs
    fn name(&self) -> &str;
}
