//! Ladder data types

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Production strategy, ordered by fallback direction.
///
/// Failure at one tier always proceeds to the next greater tier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DegradationTier {
    ReuseStatic,
    Slideshow,
    MinimalEncode,
    Placeholder,
}

impl DegradationTier {
    /// All tiers in ascending order
    pub const ALL: [DegradationTier; 4] = [
        Self::ReuseStatic,
        Self::Slideshow,
        Self::MinimalEncode,
        Self::Placeholder,
    ];

    /// Tiers skipped entirely while processing is disabled
    pub fn requires_processing(&self) -> bool {
        matches!(self, Self::Slideshow | Self::MinimalEncode)
    }

    pub fn is_terminal(&self) -> bool {
        *self == Self::Placeholder
    }
}

impl std::fmt::Display for DegradationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ReuseStatic => "reuse_static",
            Self::Slideshow => "slideshow",
            Self::MinimalEncode => "minimal_encode",
            Self::Placeholder => "placeholder",
        };
        f.write_str(name)
    }
}

/// Caller-supplied knobs for a generation request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub style: Option<String>,
    /// Still images for the slideshow tier
    #[serde(default)]
    pub images: Vec<PathBuf>,
}

/// One generation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub task_id: String,
    pub output_path: PathBuf,
    pub style: Option<String>,
    #[serde(default)]
    pub images: Vec<PathBuf>,
}

impl GenerationRequest {
    pub fn new(
        prompt: impl Into<String>,
        task_id: impl Into<String>,
        output_path: impl Into<PathBuf>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            task_id: task_id.into(),
            output_path: output_path.into(),
            style: options.style,
            images: options.images,
        }
    }

    /// Directory the output lands in (`.` for a bare file name)
    pub fn output_dir(&self) -> &Path {
        match self.output_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Preview image path: `<taskId>.jpg` next to the output
    pub fn preview_path(&self) -> PathBuf {
        self.output_dir().join(format!("{}.jpg", self.task_id))
    }
}

/// Result handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub succeeded_tier: DegradationTier,
    pub output_path: PathBuf,
    pub preview_path: Option<PathBuf>,
    pub degraded: bool,
    /// Tiers attempted for this request, in order
    pub attempted: Vec<DegradationTier>,
}

/// What a tier committed to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierOutput {
    pub preview_path: Option<PathBuf>,
    pub degraded: bool,
}

/// Non-fatal result of one tier attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierAttempt {
    /// The output file was written
    Produced(TierOutput),
    /// The tier could not serve the request; the ladder moves on
    Failed(String),
}

impl TierAttempt {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// One rung of the ladder.
///
/// Expected failures are reported as `TierAttempt::Failed`; an `Err` is
/// reserved for conditions no later tier can recover from.
#[async_trait]
pub trait TierStrategy: Send + Sync {
    fn tier(&self) -> DegradationTier;

    async fn attempt(&self, request: &GenerationRequest) -> Result<TierAttempt>;
}
