//! MinimalEncode tier: a tiny clip carrying the prompt as an overlay

use super::preview::{derive_preview, is_non_empty_file};
use super::types::{DegradationTier, GenerationRequest, TierAttempt, TierOutput, TierStrategy};
use crate::backend::{EncodeSpec, VideoEncodingBackend};
use crate::config::EncoderConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Overlay text used when the prompt sanitises to nothing
const DEFAULT_OVERLAY: &str = "Video";

/// Strip characters that break the overlay filter and cap the length.
///
/// The result is also passed to ImageMagick, which expands `%` escapes and
/// reads the text from a file when it starts with `@`; neither survives.
pub fn sanitize_prompt(prompt: &str, max_chars: usize) -> String {
    let cleaned: String = prompt
        .chars()
        .filter(|c| !matches!(c, '\'' | '"' | '\\' | ':' | '%') && !c.is_control())
        .take(max_chars)
        .collect();
    let trimmed = cleaned
        .trim_start_matches(|c: char| c == '@' || c.is_whitespace())
        .trim_end();
    if trimmed.is_empty() {
        DEFAULT_OVERLAY.to_string()
    } else {
        trimmed.to_string()
    }
}

pub struct MinimalEncodeTier {
    backend: Arc<dyn VideoEncodingBackend>,
    encoder: EncoderConfig,
    overlay_max_chars: usize,
}

impl MinimalEncodeTier {
    pub fn new(
        backend: Arc<dyn VideoEncodingBackend>,
        encoder: EncoderConfig,
        overlay_max_chars: usize,
    ) -> Self {
        Self {
            backend,
            encoder,
            overlay_max_chars,
        }
    }
}

#[async_trait]
impl TierStrategy for MinimalEncodeTier {
    fn tier(&self) -> DegradationTier {
        DegradationTier::MinimalEncode
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<TierAttempt> {
        let text = sanitize_prompt(&request.prompt, self.overlay_max_chars);
        let spec = EncodeSpec::minimal(&self.encoder, &request.output_path, &text);

        tracing::info!(
            task_id = %request.task_id,
            backend = self.backend.name(),
            "Generating minimal video"
        );
        let result = self.backend.encode(&spec).await;

        if !result.success {
            tracing::warn!(
                task_id = %request.task_id,
                stderr = %result.stderr,
                "Minimal encode failed, rendering still preview"
            );
            let preview = request.preview_path();
            if self
                .backend
                .render_still(&text, self.encoder.width, self.encoder.height, &preview)
                .await
            {
                tracing::info!(path = %preview.display(), "Created static preview image");
            }
            return Ok(TierAttempt::failed("encoder reported failure"));
        }

        if !is_non_empty_file(&request.output_path).await {
            return Ok(TierAttempt::failed("encoder produced no output"));
        }

        let preview = derive_preview(Some(self.backend.as_ref()), request, &text).await;
        Ok(TierAttempt::Produced(TierOutput {
            preview_path: preview,
            degraded: true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_quotes_and_caps_length() {
        assert_eq!(sanitize_prompt("a 'quoted' \"cat\"", 50), "a quoted cat");
        assert_eq!(sanitize_prompt("time: 10\\20", 50), "time 1020");
        assert_eq!(sanitize_prompt("line\nbreak", 50), "linebreak");
        assert_eq!(sanitize_prompt(&"x".repeat(80), 50).chars().count(), 50);
    }

    #[test]
    fn test_sanitize_empty_prompt_gets_default() {
        assert_eq!(sanitize_prompt("", 50), "Video");
        assert_eq!(sanitize_prompt("  '' ", 50), "Video");
    }

    #[test]
    fn test_sanitize_drops_file_reference_and_percent_escapes() {
        let text = sanitize_prompt("@/etc/passwd", 50);
        assert!(!text.starts_with('@'));
        assert_eq!(text, "/etc/passwd");
        assert_eq!(sanitize_prompt(" @@ @home", 50), "home");
        assert_eq!(sanitize_prompt("100% %[exif:*] sure", 50), "100 [exif*] sure");
        assert_eq!(sanitize_prompt("@", 50), "Video");
        assert_eq!(sanitize_prompt("me@example", 50), "me@example");
    }

    #[test]
    fn test_sanitize_counts_characters_not_bytes() {
        assert_eq!(sanitize_prompt("日本語の動画", 3), "日本語");
    }
}
