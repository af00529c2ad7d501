//! Degradation ladder
//!
//! Every generation request walks the tiers in ascending order and stops at
//! the first one that commits a non-empty output file:
//!
//! ```text
//!   ReuseStatic ──fail──► Slideshow ──fail──► MinimalEncode ──fail──► Placeholder
//!        │                    │                    │                      │
//!        └────────────────────┴──── success ───────┴──────────────────────┘
//!                                      ▼
//!                              GenerationOutcome
//! ```
//!
//! With processing disabled the two middle tiers are skipped and the
//! encoding backend is never invoked. Each non-terminal tier runs under a
//! timeout; a timeout counts as that tier's failure.

mod minimal;
mod placeholder;
mod preview;
mod reuse;
mod slideshow;
mod types;

pub use minimal::{sanitize_prompt, MinimalEncodeTier};
pub use placeholder::PlaceholderTier;
pub use reuse::{ArtifactSelector, RandomSelector, ReuseStaticTier, Selection};
pub use slideshow::SlideshowTier;
pub use types::{
    DegradationTier, GenerationOptions, GenerationOutcome, GenerationRequest, TierAttempt,
    TierOutput, TierStrategy,
};

use crate::backend::VideoEncodingBackend;
use crate::config::ReelGuardConfig;
use crate::controller::VideoGenerator;
use crate::error::{Error, Result};
use crate::store::ArtifactStore;
use async_trait::async_trait;
use preview::is_non_empty_file;
use std::sync::Arc;
use std::time::Duration;

/// Ordered set of tier strategies
pub struct DegradationLadder {
    tiers: Vec<Arc<dyn TierStrategy>>,
    disable_processing: bool,
    tier_timeout: Duration,
}

impl DegradationLadder {
    /// The standard four-tier ladder with random artifact selection.
    pub fn new(
        config: &ReelGuardConfig,
        store: Arc<ArtifactStore>,
        backend: Arc<dyn VideoEncodingBackend>,
    ) -> Self {
        Self::with_selector(config, store, backend, Arc::new(RandomSelector))
    }

    /// The standard ladder with a caller-supplied artifact selector.
    pub fn with_selector(
        config: &ReelGuardConfig,
        store: Arc<ArtifactStore>,
        backend: Arc<dyn VideoEncodingBackend>,
        selector: Arc<dyn ArtifactSelector>,
    ) -> Self {
        let generation = &config.generation;
        let reuse_backend = if generation.disable_processing {
            None
        } else {
            Some(backend.clone())
        };

        let tiers: Vec<Arc<dyn TierStrategy>> = vec![
            Arc::new(ReuseStaticTier::new(store, selector, reuse_backend)),
            Arc::new(SlideshowTier::new()),
            Arc::new(MinimalEncodeTier::new(
                backend,
                config.encoder.clone(),
                generation.overlay_max_chars,
            )),
            Arc::new(PlaceholderTier::new()),
        ];

        Self {
            tiers,
            disable_processing: generation.disable_processing,
            tier_timeout: generation.tier_timeout(),
        }
    }

    /// Build a ladder from arbitrary strategies. They are sorted by tier;
    /// duplicates are rejected and the terminal Placeholder tier is required.
    pub fn with_tiers(
        mut tiers: Vec<Arc<dyn TierStrategy>>,
        disable_processing: bool,
        tier_timeout: Duration,
    ) -> Result<Self> {
        tiers.sort_by_key(|t| t.tier());
        if tiers.windows(2).any(|w| w[0].tier() == w[1].tier()) {
            return Err(Error::Config("duplicate tier in ladder".to_string()));
        }
        if tiers.last().map(|t| t.tier()) != Some(DegradationTier::Placeholder) {
            return Err(Error::Config(
                "ladder must end with the placeholder tier".to_string(),
            ));
        }
        Ok(Self {
            tiers,
            disable_processing,
            tier_timeout,
        })
    }

    /// Tiers in the order they are attempted
    pub fn tiers(&self) -> Vec<DegradationTier> {
        self.tiers.iter().map(|t| t.tier()).collect()
    }

    pub fn disable_processing(&self) -> bool {
        self.disable_processing
    }

    fn validate(request: &GenerationRequest) -> Result<()> {
        let task_id = request.task_id.trim();
        if task_id.is_empty() {
            return Err(Error::InvalidRequest("task id is empty".to_string()));
        }
        if task_id.contains(['/', '\\']) || task_id == "." || task_id == ".." {
            return Err(Error::InvalidRequest(format!(
                "task id {:?} is not a plain file name",
                request.task_id
            )));
        }
        if request.output_path.file_name().is_none() {
            return Err(Error::InvalidRequest(format!(
                "output path {} has no file name",
                request.output_path.display()
            )));
        }
        Ok(())
    }

    async fn run_tier(
        &self,
        strategy: &dyn TierStrategy,
        request: &GenerationRequest,
    ) -> Result<TierAttempt> {
        if strategy.tier().is_terminal() {
            return strategy.attempt(request).await;
        }
        match tokio::time::timeout(self.tier_timeout, strategy.attempt(request)).await {
            Ok(result) => result,
            Err(_) => Ok(TierAttempt::failed(format!(
                "timed out after {:?}",
                self.tier_timeout
            ))),
        }
    }
}

#[async_trait]
impl VideoGenerator for DegradationLadder {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        Self::validate(request)?;

        let output_dir = request.output_dir();
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| Error::OutputDirectory {
                path: output_dir.to_path_buf(),
                source,
            })?;

        let mut attempted = Vec::with_capacity(self.tiers.len());
        for strategy in &self.tiers {
            let tier = strategy.tier();
            if self.disable_processing && tier.requires_processing() {
                tracing::debug!(
                    task_id = %request.task_id,
                    %tier,
                    "Processing disabled, skipping tier"
                );
                continue;
            }
            attempted.push(tier);

            let reason = match self.run_tier(strategy.as_ref(), request).await {
                Ok(TierAttempt::Produced(output)) => {
                    if is_non_empty_file(&request.output_path).await {
                        tracing::info!(
                            task_id = %request.task_id,
                            %tier,
                            degraded = output.degraded,
                            "Generation request completed"
                        );
                        return Ok(GenerationOutcome {
                            succeeded_tier: tier,
                            output_path: request.output_path.clone(),
                            preview_path: output.preview_path,
                            degraded: output.degraded,
                            attempted,
                        });
                    }
                    if tier.is_terminal() {
                        return Err(Error::PlaceholderWrite {
                            path: request.output_path.clone(),
                            source: std::io::Error::new(
                                std::io::ErrorKind::Other,
                                "placeholder output is missing or empty",
                            ),
                        });
                    }
                    "output missing or empty".to_string()
                }
                Ok(TierAttempt::Failed(reason)) => reason,
                Err(e) if e.is_fatal() => {
                    tracing::error!(task_id = %request.task_id, %tier, "{}", e);
                    return Err(e);
                }
                Err(e) => e.to_string(),
            };

            tracing::warn!(
                task_id = %request.task_id,
                %tier,
                reason = %reason,
                "Tier failed, falling through"
            );
        }

        Err(Error::Generation(format!(
            "no tier produced output for task {}",
            request.task_id
        )))
    }
}
