//! Generation entry point
//!
//! `GenerationController` is what request handlers call. The production
//! strategy behind it is an injected `VideoGenerator`; the degradation
//! ladder is the default one. The controller never serialises requests
//! itself. Callers that need a concurrency cap wrap the generator in an
//! `AdmissionGate`.

use crate::backend::VideoEncodingBackend;
use crate::config::ReelGuardConfig;
use crate::error::{Error, Result};
use crate::ladder::{DegradationLadder, GenerationOptions, GenerationOutcome, GenerationRequest};
use crate::store::ArtifactStore;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Capability to turn a request into an outcome
#[async_trait]
pub trait VideoGenerator: Send + Sync {
    /// Serve `request`. Expected failures are absorbed; only programmer
    /// errors and the fatal class are returned as `Err`.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome>;
}

/// Per-request entry point
pub struct GenerationController {
    generator: Arc<dyn VideoGenerator>,
}

impl GenerationController {
    /// Create a controller around an explicit strategy.
    pub fn new(generator: Arc<dyn VideoGenerator>) -> Self {
        Self { generator }
    }

    /// Create a controller backed by the standard degradation ladder.
    pub fn from_config(
        config: &ReelGuardConfig,
        store: Arc<ArtifactStore>,
        backend: Arc<dyn VideoEncodingBackend>,
    ) -> Self {
        Self::new(Arc::new(DegradationLadder::new(config, store, backend)))
    }

    /// Produce an output for `prompt` at `output_path`.
    pub async fn generate(
        &self,
        prompt: &str,
        task_id: &str,
        output_path: impl AsRef<Path>,
        options: GenerationOptions,
    ) -> Result<GenerationOutcome> {
        let request = GenerationRequest::new(prompt, task_id, output_path.as_ref(), options);
        self.submit(&request).await
    }

    /// Serve a fully built request.
    pub async fn submit(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        tracing::debug!(
            task_id = %request.task_id,
            output = %request.output_path.display(),
            "Generation request received"
        );
        self.generator.generate(request).await
    }
}

/// Bounds the number of requests in flight inside the wrapped generator.
pub struct AdmissionGate {
    inner: Arc<dyn VideoGenerator>,
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionGate {
    /// Allow at most `max_concurrent` requests at once (floored at one).
    pub fn new(inner: Arc<dyn VideoGenerator>, max_concurrent: usize) -> Self {
        let capacity = max_concurrent.max(1);
        Self {
            inner,
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl VideoGenerator for AdmissionGate {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        if self.permits.available_permits() == 0 {
            tracing::debug!(task_id = %request.task_id, "Waiting for a generation slot");
        }
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Generation("admission gate closed".to_string()))?;
        self.inner.generate(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ladder::DegradationTier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingGenerator {
        seen: Mutex<Vec<GenerationRequest>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl VideoGenerator for RecordingGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
            self.seen.lock().unwrap().push(request.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            Ok(GenerationOutcome {
                succeeded_tier: DegradationTier::Placeholder,
                output_path: request.output_path.clone(),
                preview_path: None,
                degraded: true,
                attempted: vec![DegradationTier::Placeholder],
            })
        }
    }

    #[tokio::test]
    async fn test_controller_delegates_to_injected_generator() {
        let generator = Arc::new(RecordingGenerator::default());
        let controller = GenerationController::new(generator.clone());

        let options = GenerationOptions {
            style: Some("noir".to_string()),
            images: vec![],
        };
        let outcome = controller
            .generate("a city", "t-7", "out/t-7.mp4", options)
            .await
            .unwrap();

        assert_eq!(outcome.output_path, Path::new("out/t-7.mp4"));
        let seen = generator.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].prompt, "a city");
        assert_eq!(seen[0].task_id, "t-7");
        assert_eq!(seen[0].style.as_deref(), Some("noir"));
    }

    #[tokio::test]
    async fn test_admission_gate_serialises_requests() {
        let inner = Arc::new(RecordingGenerator::default());
        let gate = Arc::new(AdmissionGate::new(inner.clone(), 1));
        assert_eq!(gate.capacity(), 1);

        let mut handles = Vec::new();
        for i in 0..4 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                let request = GenerationRequest::new(
                    "p",
                    format!("t{}", i),
                    format!("out/t{}.mp4", i),
                    GenerationOptions::default(),
                );
                gate.generate(&request).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(inner.seen.lock().unwrap().len(), 4);
        assert_eq!(inner.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(gate.available_permits(), 1);
    }

    #[test]
    fn test_admission_gate_capacity_floor() {
        let gate = AdmissionGate::new(Arc::new(RecordingGenerator::default()), 0);
        assert_eq!(gate.capacity(), 1);
    }
}
