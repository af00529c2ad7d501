//! Preview image helpers shared by the tiers

use super::types::GenerationRequest;
use crate::backend::VideoEncodingBackend;
use std::path::{Path, PathBuf};

/// Whether `path` is a regular file with content.
pub(crate) async fn is_non_empty_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Write the textual stand-in used when no real preview frame exists.
pub(crate) async fn write_text_preview(path: &Path, label: &str) -> Option<PathBuf> {
    match tokio::fs::write(path, format!("Preview for {}", label)).await {
        Ok(()) => Some(path.to_path_buf()),
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to write preview stub: {}", e);
            None
        }
    }
}

/// Extract the first frame of the request's output as its preview, falling
/// back to a textual stub. Without a backend only the stub is written.
pub(crate) async fn derive_preview(
    backend: Option<&dyn VideoEncodingBackend>,
    request: &GenerationRequest,
    label: &str,
) -> Option<PathBuf> {
    let preview = request.preview_path();
    if let Some(backend) = backend {
        if backend.extract_frame(&request.output_path, &preview).await {
            return Some(preview);
        }
        tracing::debug!(
            task_id = %request.task_id,
            backend = backend.name(),
            "Preview extraction failed, writing text stub"
        );
    }
    write_text_preview(&preview, label).await
}
