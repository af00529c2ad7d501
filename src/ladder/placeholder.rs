//! Placeholder tier: the terminal safety net

use super::preview::{is_non_empty_file, write_text_preview};
use super::types::{DegradationTier, GenerationRequest, TierAttempt, TierOutput, TierStrategy};
use crate::error::{Error, Result};
use async_trait::async_trait;

#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderTier;

impl PlaceholderTier {
    pub fn new() -> Self {
        Self
    }

    /// Explanatory text written in place of the media file. Never empty.
    pub fn body(prompt: &str) -> String {
        let prompt = prompt.trim();
        let prompt = if prompt.is_empty() { "(no prompt)" } else { prompt };
        format!(
            "Video for: {}\nFailed to create due to memory constraints.\n",
            prompt
        )
    }
}

#[async_trait]
impl TierStrategy for PlaceholderTier {
    fn tier(&self) -> DegradationTier {
        DegradationTier::Placeholder
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<TierAttempt> {
        tokio::fs::write(&request.output_path, Self::body(&request.prompt))
            .await
            .map_err(|source| Error::PlaceholderWrite {
                path: request.output_path.clone(),
                source,
            })?;

        // Keep a still frame an earlier tier may have rendered.
        let preview = request.preview_path();
        let preview = if is_non_empty_file(&preview).await {
            Some(preview)
        } else {
            write_text_preview(&preview, &request.prompt).await
        };

        tracing::warn!(task_id = %request.task_id, "Wrote placeholder output");
        Ok(TierAttempt::Produced(TierOutput {
            preview_path: preview,
            degraded: true,
        }))
    }
}
