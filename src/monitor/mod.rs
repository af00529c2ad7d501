//! Background pressure monitor
//!
//! A single dedicated task that samples memory on a fixed interval and
//! delegates to the eviction policy. Two logical states:
//!
//! ```text
//!   start ──► startup temp sweep ──► Idle ──(timer)──► Evaluating
//!                                     ▲                    │
//!                                     └────(always)────────┘
//!   shutdown requested ──► Stopped
//! ```
//!
//! Errors inside a pass are logged and the loop simply waits for the next
//! tick; that is the only retry policy. Shutdown is cooperative through a
//! `CancellationToken` and is observed within one sampling interval.

use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::eviction::{EvictionPolicy, EvictionReport, PassKind, Reclaimer};
use crate::metrics::{MemorySample, MetricsSource};
use crate::store::ArtifactStore;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Monitor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Sleeping until the next sampling tick
    Idle,
    /// Sampling and, if needed, evicting
    Evaluating,
    /// Loop exited after a shutdown request
    Stopped,
}

/// Counters exposed for diagnostics
#[derive(Debug, Clone, Default)]
pub struct MonitorStats {
    pub passes: u64,
    pub full_passes: u64,
    pub errors: u64,
    pub last_sample: Option<MemorySample>,
    pub last_report: Option<EvictionReport>,
}

/// Periodic memory sampler driving the eviction policy
pub struct PressureMonitor {
    metrics: Arc<dyn MetricsSource>,
    store: Arc<ArtifactStore>,
    policy: EvictionPolicy,
    reclaimer: Arc<dyn Reclaimer>,
    interval: Duration,
    startup_sweep: bool,
    state: Arc<RwLock<MonitorState>>,
    stats: Arc<RwLock<MonitorStats>>,
}

impl PressureMonitor {
    /// Create a monitor from its collaborators and the monitor configuration.
    pub fn new(
        config: &MonitorConfig,
        metrics: Arc<dyn MetricsSource>,
        store: Arc<ArtifactStore>,
        reclaimer: Arc<dyn Reclaimer>,
    ) -> Self {
        Self {
            metrics,
            store,
            policy: EvictionPolicy::from_config(config),
            reclaimer,
            interval: config.interval(),
            startup_sweep: config.startup_sweep,
            state: Arc::new(RwLock::new(MonitorState::Idle)),
            stats: Arc::new(RwLock::new(MonitorStats::default())),
        }
    }

    /// Current lifecycle state
    pub async fn state(&self) -> MonitorState {
        *self.state.read().await
    }

    /// Snapshot of the monitor counters
    pub async fn stats(&self) -> MonitorStats {
        self.stats.read().await.clone()
    }

    pub fn policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    /// Sweep temp directories once, clearing leftovers from a previous
    /// process lifetime.
    pub async fn startup_sweep(&self) -> Result<EvictionReport> {
        tracing::info!("Running start-of-life temp sweep");
        self.run_pass(PassKind::TempSweep).await
    }

    /// One Idle → Evaluating → Idle transition: sample, evict as the policy
    /// decides, reclaim after a full pass.
    pub async fn evaluate_once(&self) -> Result<EvictionReport> {
        *self.state.write().await = MonitorState::Evaluating;
        let result = self.evaluate_inner().await;
        *self.state.write().await = MonitorState::Idle;

        let mut stats = self.stats.write().await;
        stats.passes += 1;
        match &result {
            Ok(report) => {
                if report.pass == PassKind::Full {
                    stats.full_passes += 1;
                }
                stats.last_report = Some(report.clone());
            }
            Err(_) => stats.errors += 1,
        }
        result
    }

    async fn evaluate_inner(&self) -> Result<EvictionReport> {
        let sample = self.metrics.sample().await;
        self.stats.write().await.last_sample = Some(sample);

        let pass = self.policy.decide(&sample);
        if !sample.is_known() {
            tracing::debug!(
                source = self.metrics.name(),
                "Memory pressure unknown, temp sweep only"
            );
        } else if pass == PassKind::Full {
            tracing::warn!(
                percent_used = sample.percent_used,
                threshold = self.policy.threshold_percent(),
                "High memory usage detected, running full eviction pass"
            );
        } else {
            tracing::info!(
                "Memory usage: {:.1}% used, {:.1}MB available",
                sample.percent_used,
                sample.available_mib()
            );
        }

        self.run_pass(pass).await
    }

    /// Execute a pass of the given kind without sampling first.
    pub async fn run_pass(&self, pass: PassKind) -> Result<EvictionReport> {
        let store = self.store.clone();
        let policy = self.policy.clone();
        let reclaimer = self.reclaimer.clone();

        tokio::task::spawn_blocking(move || {
            let mut report = policy.execute(&store, pass, SystemTime::now());
            if report.needs_reclaim() {
                report.reclaim_rounds = policy.reclaim(reclaimer.as_ref());
            }
            report
        })
        .await
        .map_err(|e| Error::Monitor(format!("Eviction pass aborted: {}", e)))
    }

    /// Run the monitor loop until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            threshold = self.policy.threshold_percent(),
            "Starting pressure monitor"
        );

        if self.startup_sweep {
            if let Err(e) = self.startup_sweep().await {
                tracing::error!("Start-of-life temp sweep failed: {}", e);
            }
        }
        *self.state.write().await = MonitorState::Idle;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the monitor starts Idle.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.evaluate_once().await {
                        tracing::error!("Error in pressure monitor pass: {}", e);
                    }
                }
            }
        }

        *self.state.write().await = MonitorState::Stopped;
        tracing::info!("Pressure monitor stopped");
    }

    /// Spawn the loop on a dedicated task.
    pub fn spawn(self: &Arc<Self>) -> MonitorHandle {
        let cancel = CancellationToken::new();
        let monitor = Arc::clone(self);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { monitor.run(token).await });
        MonitorHandle { cancel, handle }
    }
}

/// Handle to a spawned monitor loop
pub struct MonitorHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl MonitorHandle {
    /// Request shutdown and wait for the loop to exit.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.handle
            .await
            .map_err(|e| Error::Monitor(format!("Monitor task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DirRole, ManagedDir};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct ScriptedMetrics {
        readings: Mutex<Vec<MemorySample>>,
        calls: AtomicUsize,
    }

    impl ScriptedMetrics {
        /// Returns the readings in order, then repeats the last one.
        fn new(readings: Vec<MemorySample>) -> Self {
            Self {
                readings: Mutex::new(readings),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MetricsSource for ScriptedMetrics {
        async fn sample(&self) -> MemorySample {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let readings = self.readings.lock().unwrap();
            readings
                .get(n)
                .or_else(|| readings.last())
                .copied()
                .unwrap_or_else(MemorySample::unknown)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct PanickyReclaimer {
        calls: AtomicU32,
    }

    impl Reclaimer for PanickyReclaimer {
        fn reclaim(&self) -> bool {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("allocator exploded");
            }
            false
        }

        fn name(&self) -> &str {
            "panicky"
        }
    }

    struct NoopReclaimer;

    impl Reclaimer for NoopReclaimer {
        fn reclaim(&self) -> bool {
            false
        }

        fn name(&self) -> &str {
            "noop"
        }
    }

    struct Dirs {
        _tmp: TempDir,
        tasks: PathBuf,
        temp: PathBuf,
        store: Arc<ArtifactStore>,
    }

    fn dirs() -> Dirs {
        let tmp = TempDir::new().unwrap();
        let tasks = tmp.path().join("tasks");
        let temp = tmp.path().join("scratch");
        std::fs::create_dir_all(&tasks).unwrap();
        std::fs::create_dir_all(&temp).unwrap();
        let mp4 = vec!["mp4".to_string()];
        let store = Arc::new(ArtifactStore::with_dirs(
            vec![ManagedDir::new(&tasks, DirRole::Tasks, &mp4, true)],
            vec![ManagedDir::new(&temp, DirRole::Temp, &mp4, true)],
            vec![],
        ));
        Dirs {
            _tmp: tmp,
            tasks,
            temp,
            store,
        }
    }

    fn stale_file(path: &Path) {
        std::fs::write(path, b"frames").unwrap();
        let old = SystemTime::now() - Duration::from_secs(48 * 3600);
        filetime::set_file_mtime(path, filetime::FileTime::from_system_time(old)).unwrap();
    }

    fn config(interval_secs: u64) -> MonitorConfig {
        MonitorConfig {
            interval_secs,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_evaluate_once_high_pressure_runs_full_pass_and_reclaims() {
        let d = dirs();
        let stale = d.tasks.join("old.mp4");
        stale_file(&stale);

        let monitor = PressureMonitor::new(
            &config(30),
            Arc::new(ScriptedMetrics::new(vec![MemorySample::new(90.0, 0)])),
            d.store.clone(),
            Arc::new(NoopReclaimer),
        );
        let report = monitor.evaluate_once().await.unwrap();
        assert_eq!(report.pass, PassKind::Full);
        assert_eq!(report.evicted, 1);
        assert_eq!(report.reclaim_rounds, 1);
        assert!(!stale.exists());
        assert_eq!(monitor.state().await, MonitorState::Idle);

        let stats = monitor.stats().await;
        assert_eq!(stats.passes, 1);
        assert_eq!(stats.full_passes, 1);
    }

    #[tokio::test]
    async fn test_evaluate_once_unknown_pressure_is_temp_sweep() {
        let d = dirs();
        let stale = d.tasks.join("old.mp4");
        stale_file(&stale);

        let monitor = PressureMonitor::new(
            &config(30),
            Arc::new(ScriptedMetrics::new(vec![MemorySample::unknown()])),
            d.store.clone(),
            Arc::new(NoopReclaimer),
        );
        let report = monitor.evaluate_once().await.unwrap();
        assert_eq!(report.pass, PassKind::TempSweep);
        assert_eq!(report.reclaim_rounds, 0);
        assert!(stale.exists());
    }

    #[tokio::test]
    async fn test_startup_sweep_clears_temp_leftovers() {
        let d = dirs();
        let leftover = d.temp.join("previous-run.mp4");
        std::fs::write(&leftover, b"partial").unwrap();

        let monitor = Arc::new(PressureMonitor::new(
            &config(3600),
            Arc::new(ScriptedMetrics::new(vec![MemorySample::new(10.0, 0)])),
            d.store.clone(),
            Arc::new(NoopReclaimer),
        ));
        let handle = monitor.spawn();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!leftover.exists());
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_is_observed_while_idle() {
        let d = dirs();
        let monitor = Arc::new(PressureMonitor::new(
            &config(3600),
            Arc::new(ScriptedMetrics::new(vec![MemorySample::new(10.0, 0)])),
            d.store.clone(),
            Arc::new(NoopReclaimer),
        ));
        let handle = monitor.spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
            .await
            .expect("monitor did not stop promptly")
            .unwrap();
        assert_eq!(monitor.state().await, MonitorState::Stopped);
        assert_eq!(monitor.stats().await.passes, 0);
    }

    #[tokio::test]
    async fn test_loop_survives_failed_pass() {
        let d = dirs();
        let metrics = Arc::new(ScriptedMetrics::new(vec![MemorySample::new(95.0, 0)]));
        let mut cfg = config(1);
        cfg.startup_sweep = false;
        let mut monitor = PressureMonitor::new(
            &cfg,
            metrics.clone(),
            d.store.clone(),
            Arc::new(PanickyReclaimer {
                calls: AtomicU32::new(0),
            }),
        );
        monitor.interval = Duration::from_millis(20);
        let monitor = Arc::new(monitor);

        let handle = monitor.spawn();
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.shutdown().await.unwrap();

        let stats = monitor.stats().await;
        assert_eq!(stats.errors, 1);
        assert!(stats.passes >= 2, "passes = {}", stats.passes);
        assert!(stats.full_passes >= 1);
        assert!(metrics.calls.load(Ordering::SeqCst) >= 2);
    }
}
