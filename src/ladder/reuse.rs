//! ReuseStatic tier: copy an already finished artifact

use super::preview::{derive_preview, is_non_empty_file};
use super::types::{DegradationTier, GenerationRequest, TierAttempt, TierOutput, TierStrategy};
use crate::backend::VideoEncodingBackend;
use crate::error::Result;
use crate::store::{ArtifactRecord, ArtifactStore};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A chosen artifact and whether it actually matches the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection<'a> {
    pub record: &'a ArtifactRecord,
    /// `false` when the artifact is merely *a* valid clip
    pub exact: bool,
}

/// Picks one candidate out of the reusable artifacts.
///
/// The ladder only needs *a* valid artifact; relevance matching belongs to
/// selectors supplied by callers that have it. Output served from an
/// inexact selection is reported as degraded.
pub trait ArtifactSelector: Send + Sync {
    fn select<'a>(
        &self,
        candidates: &'a [ArtifactRecord],
        request: &GenerationRequest,
    ) -> Option<Selection<'a>>;
}

/// Uniformly random selection, never an exact match
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelector;

impl ArtifactSelector for RandomSelector {
    fn select<'a>(
        &self,
        candidates: &'a [ArtifactRecord],
        _request: &GenerationRequest,
    ) -> Option<Selection<'a>> {
        candidates
            .choose(&mut rand::thread_rng())
            .map(|record| Selection {
                record,
                exact: false,
            })
    }
}

pub struct ReuseStaticTier {
    store: Arc<ArtifactStore>,
    selector: Arc<dyn ArtifactSelector>,
    /// `None` while processing is disabled: previews fall back to stubs
    backend: Option<Arc<dyn VideoEncodingBackend>>,
}

impl ReuseStaticTier {
    pub fn new(
        store: Arc<ArtifactStore>,
        selector: Arc<dyn ArtifactSelector>,
        backend: Option<Arc<dyn VideoEncodingBackend>>,
    ) -> Self {
        Self {
            store,
            selector,
            backend,
        }
    }
}

#[async_trait]
impl TierStrategy for ReuseStaticTier {
    fn tier(&self) -> DegradationTier {
        DegradationTier::ReuseStatic
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<TierAttempt> {
        let store = self.store.clone();
        let mut candidates = match tokio::task::spawn_blocking(move || store.reusable_artifacts())
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => return Ok(TierAttempt::failed(format!("artifact scan aborted: {}", e))),
        };
        candidates.retain(|r| r.path != request.output_path);

        let Some(selection) = self.selector.select(&candidates, request) else {
            return Ok(TierAttempt::failed("no reusable artifact available"));
        };
        let source = &selection.record.path;

        // A timed-out attempt may leave its copy running in the background;
        // it only ever writes the staging file, never the output path.
        let staging = staging_path(request);
        if let Err(e) = tokio::fs::copy(source, &staging).await {
            discard(&staging).await;
            return Ok(TierAttempt::failed(format!(
                "copy from {} failed: {}",
                source.display(),
                e
            )));
        }
        if !is_non_empty_file(&staging).await {
            discard(&staging).await;
            return Ok(TierAttempt::failed("copied artifact is empty"));
        }
        if let Err(e) = tokio::fs::rename(&staging, &request.output_path).await {
            discard(&staging).await;
            return Ok(TierAttempt::failed(format!(
                "moving reused artifact into place failed: {}",
                e
            )));
        }

        tracing::info!(
            task_id = %request.task_id,
            source = %source.display(),
            exact = selection.exact,
            "Reused static artifact"
        );

        let preview = derive_preview(self.backend.as_deref(), request, &request.prompt).await;
        Ok(TierAttempt::Produced(TierOutput {
            preview_path: preview,
            degraded: !selection.exact,
        }))
    }
}

/// Hidden sibling of the output path the copy lands in before the rename
fn staging_path(request: &GenerationRequest) -> PathBuf {
    request.output_dir().join(format!(
        ".{}.{}.reuse.partial",
        request.task_id,
        uuid::Uuid::new_v4().simple()
    ))
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), "Failed to remove staging file: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ladder::types::GenerationOptions;
    use crate::store::{ArtifactKind, DirRole, ManagedDir};
    use std::time::SystemTime;
    use tempfile::TempDir;

    /// Treats a file named after the prompt as an exact match
    struct NameMatchSelector;

    impl ArtifactSelector for NameMatchSelector {
        fn select<'a>(
            &self,
            candidates: &'a [ArtifactRecord],
            request: &GenerationRequest,
        ) -> Option<Selection<'a>> {
            let exact = candidates
                .iter()
                .find(|r| r.path.file_stem().is_some_and(|s| s == request.prompt.as_str()));
            match exact {
                Some(record) => Some(Selection {
                    record,
                    exact: true,
                }),
                None => candidates.first().map(|record| Selection {
                    record,
                    exact: false,
                }),
            }
        }
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn store_over(dir: &std::path::Path) -> Arc<ArtifactStore> {
        let mp4 = vec!["mp4".to_string()];
        Arc::new(ArtifactStore::with_dirs(
            vec![],
            vec![],
            vec![ManagedDir::new(dir, DirRole::Static, &mp4, false)],
        ))
    }

    #[test]
    fn test_random_selector_picks_a_candidate() {
        let request = GenerationRequest::new("p", "t", "o.mp4", GenerationOptions::default());
        assert!(RandomSelector.select(&[], &request).is_none());

        let records: Vec<ArtifactRecord> = (0..3)
            .map(|i| ArtifactRecord {
                path: PathBuf::from(format!("{}.mp4", i)),
                kind: ArtifactKind::CacheVideo,
                size_bytes: 1,
                modified_at: SystemTime::now(),
            })
            .collect();
        let chosen = RandomSelector.select(&records, &request).unwrap();
        assert!(records.contains(chosen.record));
        assert!(!chosen.exact);
    }

    #[tokio::test]
    async fn test_exact_reuse_copies_bytes_and_writes_stub_preview() {
        let library = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        std::fs::write(library.path().join("sunset.mp4"), b"cached-bytes").unwrap();

        let tier =
            ReuseStaticTier::new(store_over(library.path()), Arc::new(NameMatchSelector), None);
        let request = GenerationRequest::new(
            "sunset",
            "t1",
            out_dir.path().join("t1.mp4"),
            GenerationOptions::default(),
        );

        let attempt = tier.attempt(&request).await.unwrap();
        let TierAttempt::Produced(output) = attempt else {
            panic!("expected reuse to succeed");
        };
        assert!(!output.degraded);
        assert_eq!(std::fs::read(&request.output_path).unwrap(), b"cached-bytes");
        let preview = output.preview_path.unwrap();
        assert_eq!(std::fs::read_to_string(preview).unwrap(), "Preview for sunset");
        assert_eq!(entries(out_dir.path()), vec!["t1.jpg", "t1.mp4"]);
    }

    #[tokio::test]
    async fn test_unrelated_reuse_is_degraded() {
        let library = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        std::fs::write(library.path().join("kittens.mp4"), b"kittens").unwrap();

        for selector in [
            Arc::new(RandomSelector) as Arc<dyn ArtifactSelector>,
            Arc::new(NameMatchSelector),
        ] {
            let tier = ReuseStaticTier::new(store_over(library.path()), selector, None);
            let request = GenerationRequest::new(
                "a rocket launch at night",
                "t2",
                out_dir.path().join("t2.mp4"),
                GenerationOptions::default(),
            );
            let TierAttempt::Produced(output) = tier.attempt(&request).await.unwrap() else {
                panic!("expected reuse to succeed");
            };
            assert!(output.degraded);
            assert_eq!(std::fs::read(&request.output_path).unwrap(), b"kittens");
        }
    }

    #[tokio::test]
    async fn test_failed_copy_leaves_existing_output_alone() {
        /// Picks a candidate that is evicted before the copy starts
        struct EvictedSelector;

        impl ArtifactSelector for EvictedSelector {
            fn select<'a>(
                &self,
                candidates: &'a [ArtifactRecord],
                _request: &GenerationRequest,
            ) -> Option<Selection<'a>> {
                let record = candidates.first()?;
                std::fs::remove_file(&record.path).ok()?;
                Some(Selection {
                    record,
                    exact: true,
                })
            }
        }

        let library = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        std::fs::write(library.path().join("clip.mp4"), b"cached").unwrap();
        let output_path = out_dir.path().join("t3.mp4");
        std::fs::write(&output_path, b"placeholder").unwrap();

        let tier =
            ReuseStaticTier::new(store_over(library.path()), Arc::new(EvictedSelector), None);
        let request =
            GenerationRequest::new("p", "t3", &output_path, GenerationOptions::default());

        let attempt = tier.attempt(&request).await.unwrap();
        assert!(matches!(attempt, TierAttempt::Failed(_)));
        assert_eq!(std::fs::read(&output_path).unwrap(), b"placeholder");
        assert_eq!(entries(out_dir.path()), vec!["t3.mp4"]);
    }

    #[tokio::test]
    async fn test_reuse_fails_without_candidates() {
        let library = TempDir::new().unwrap();
        std::fs::write(library.path().join("empty.mp4"), b"").unwrap();

        let tier = ReuseStaticTier::new(store_over(library.path()), Arc::new(RandomSelector), None);
        let request = GenerationRequest::new(
            "p",
            "t",
            library.path().join("out.mp4"),
            GenerationOptions::default(),
        );
        assert!(matches!(
            tier.attempt(&request).await.unwrap(),
            TierAttempt::Failed(_)
        ));
    }
}
