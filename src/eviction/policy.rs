//! Eviction decision rule and pass execution

use super::reclaim::Reclaimer;
use crate::config::MonitorConfig;
use crate::metrics::MemorySample;
use crate::store::{ArtifactStore, ManagedDir};
use serde::Serialize;
use std::time::{Duration, SystemTime};

/// Kind of eviction pass authorised by a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    /// Evict stale task/cache artifacts, then sweep temp directories
    Full,
    /// Sweep temp directories only
    TempSweep,
}

impl std::fmt::Display for PassKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::TempSweep => write!(f, "temp_sweep"),
        }
    }
}

/// Summary of one eviction pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    pub pass: PassKind,
    /// Task/cache artifacts examined
    pub examined: usize,
    /// Task/cache artifacts removed
    pub evicted: usize,
    /// Temp files removed
    pub temp_removed: usize,
    /// Deletions that failed and will be retried next pass
    pub failed: usize,
    /// Bytes released by successful deletions
    pub freed_bytes: u64,
    /// Reclamation rounds performed after the pass
    pub reclaim_rounds: u32,
}

impl EvictionReport {
    fn new(pass: PassKind) -> Self {
        Self {
            pass,
            examined: 0,
            evicted: 0,
            temp_removed: 0,
            failed: 0,
            freed_bytes: 0,
            reclaim_rounds: 0,
        }
    }

    /// Total files removed by the pass
    pub fn removed(&self) -> usize {
        self.evicted + self.temp_removed
    }

    /// Whether the caller should request memory reclamation afterwards.
    pub fn needs_reclaim(&self) -> bool {
        self.pass == PassKind::Full
    }
}

/// Age- and threshold-driven eviction policy
#[derive(Debug, Clone)]
pub struct EvictionPolicy {
    threshold_percent: f64,
    normal_cutoff: Duration,
    reclaim_passes: u32,
}

impl EvictionPolicy {
    /// Create a policy. `reclaim_passes` is raised to at least one.
    pub fn new(threshold_percent: f64, normal_cutoff: Duration, reclaim_passes: u32) -> Self {
        Self {
            threshold_percent,
            normal_cutoff,
            reclaim_passes: reclaim_passes.max(1),
        }
    }

    /// Build the policy from the monitor configuration.
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(
            config.threshold_percent,
            config.normal_cutoff(),
            config.reclaim_passes,
        )
    }

    pub fn threshold_percent(&self) -> f64 {
        self.threshold_percent
    }

    pub fn normal_cutoff(&self) -> Duration {
        self.normal_cutoff
    }

    /// Decide which pass a sample authorises. An unknown sample never
    /// triggers a full pass.
    pub fn decide(&self, sample: &MemorySample) -> PassKind {
        if sample.is_known() && sample.percent_used > self.threshold_percent {
            PassKind::Full
        } else {
            PassKind::TempSweep
        }
    }

    /// Execute a pass against the store. The age cutoff is measured from
    /// `now`, which callers take fresh for every pass.
    pub fn execute(
        &self,
        store: &ArtifactStore,
        pass: PassKind,
        now: SystemTime,
    ) -> EvictionReport {
        let mut report = EvictionReport::new(pass);

        if pass == PassKind::Full {
            for dir in store.eviction_dirs() {
                self.evict_stale(store, dir, now, &mut report);
            }
        }
        for dir in store.temp_dirs() {
            Self::sweep_temp(store, dir, &mut report);
        }

        if report.removed() > 0 || report.failed > 0 {
            tracing::info!(
                pass = %pass,
                evicted = report.evicted,
                temp_removed = report.temp_removed,
                failed = report.failed,
                freed_bytes = report.freed_bytes,
                "Eviction pass finished"
            );
        } else {
            tracing::debug!(
                pass = %pass,
                examined = report.examined,
                "Eviction pass removed nothing"
            );
        }
        report
    }

    fn evict_stale(
        &self,
        store: &ArtifactStore,
        dir: &ManagedDir,
        now: SystemTime,
        report: &mut EvictionReport,
    ) {
        let scanned: Vec<_> = store.scan(dir).collect();
        report.examined += scanned.len();

        for record in ArtifactStore::older_than_at(scanned, self.normal_cutoff, now) {
            if store.delete(&record) {
                report.evicted += 1;
                report.freed_bytes = report.freed_bytes.saturating_add(record.size_bytes);
            } else {
                report.failed += 1;
            }
        }
    }

    fn sweep_temp(store: &ArtifactStore, dir: &ManagedDir, report: &mut EvictionReport) {
        for record in store.scan(dir) {
            if ArtifactStore::is_write_locked(&record) {
                continue;
            }
            if store.delete(&record) {
                report.temp_removed += 1;
                report.freed_bytes = report.freed_bytes.saturating_add(record.size_bytes);
            } else {
                report.failed += 1;
            }
        }
    }

    /// Request reclamation at least once and at most `reclaim_passes` times,
    /// stopping early once a round releases nothing. Returns rounds run.
    pub fn reclaim(&self, reclaimer: &dyn Reclaimer) -> u32 {
        let mut rounds = 0;
        while rounds < self.reclaim_passes {
            rounds += 1;
            if !reclaimer.reclaim() {
                break;
            }
        }
        tracing::debug!(reclaimer = reclaimer.name(), rounds, "Requested memory reclamation");
        rounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DirRole;
    use filetime::{set_file_mtime, FileTime};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    struct Fixture {
        _tmp: TempDir,
        tasks: PathBuf,
        cache: PathBuf,
        temp: PathBuf,
        store: ArtifactStore,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let tasks = tmp.path().join("tasks");
        let cache = tmp.path().join("cache_videos");
        let temp = tmp.path().join("scratch");
        for dir in [&tasks, &cache, &temp] {
            std::fs::create_dir_all(dir).unwrap();
        }
        let exts = |l: &[&str]| l.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let store = ArtifactStore::with_dirs(
            vec![
                ManagedDir::new(&tasks, DirRole::Tasks, &exts(&["mp4", "jpg"]), true),
                ManagedDir::new(&cache, DirRole::Cache, &exts(&["mp4", "jpg"]), true),
            ],
            vec![ManagedDir::new(&temp, DirRole::Temp, &exts(&["mp4", "tmp"]), true)],
            vec![],
        );
        Fixture {
            _tmp: tmp,
            tasks,
            cache,
            temp,
            store,
        }
    }

    fn aged_file(path: &Path, age: Duration) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"0123456789").unwrap();
        let mtime = SystemTime::now() - age;
        set_file_mtime(path, FileTime::from_system_time(mtime)).unwrap();
    }

    struct CountingReclaimer {
        calls: AtomicU32,
        productive_rounds: u32,
    }

    impl Reclaimer for CountingReclaimer {
        fn reclaim(&self) -> bool {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            n <= self.productive_rounds
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[test]
    fn test_decide_above_threshold_is_full() {
        let policy = EvictionPolicy::new(65.0, 12 * HOUR, 3);
        for pct in [65.1, 70.0, 90.0, 100.0] {
            assert_eq!(policy.decide(&MemorySample::new(pct, 0)), PassKind::Full);
        }
    }

    #[test]
    fn test_decide_at_or_below_threshold_is_temp_sweep() {
        let policy = EvictionPolicy::new(65.0, 12 * HOUR, 3);
        for pct in [0.0, 10.0, 64.9, 65.0] {
            assert_eq!(policy.decide(&MemorySample::new(pct, 0)), PassKind::TempSweep);
        }
    }

    #[test]
    fn test_unknown_pressure_never_triggers_full_pass() {
        let policy = EvictionPolicy::new(0.0, 12 * HOUR, 3);
        assert_eq!(policy.decide(&MemorySample::unknown()), PassKind::TempSweep);
    }

    #[test]
    fn test_high_pressure_evicts_only_stale_task_and_cache_files() {
        let fx = fixture();
        let old_task = fx.tasks.join("old.mp4");
        let old_preview = fx.tasks.join("nested/old-task.jpg");
        let new_task = fx.tasks.join("new.mp4");
        let old_cache = fx.cache.join("stale.mp4");
        let new_cache = fx.cache.join("fresh.mp4");
        aged_file(&old_task, 13 * HOUR);
        aged_file(&old_preview, 24 * HOUR);
        aged_file(&new_task, HOUR);
        aged_file(&old_cache, 30 * HOUR);
        aged_file(&new_cache, 11 * HOUR);

        let policy = EvictionPolicy::new(65.0, 12 * HOUR, 3);
        let sample = MemorySample::new(90.0, 0);
        let pass = policy.decide(&sample);
        assert_eq!(pass, PassKind::Full);

        let report = policy.execute(&fx.store, pass, SystemTime::now());
        assert_eq!(report.evicted, 3);
        assert_eq!(report.examined, 5);
        assert_eq!(report.freed_bytes, 30);
        assert!(!old_task.exists());
        assert!(!old_preview.exists());
        assert!(!old_cache.exists());
        assert!(new_task.exists());
        assert!(new_cache.exists());
    }

    #[test]
    fn test_full_pass_sweeps_temp_regardless_of_age() {
        let fx = fixture();
        let fresh_tmp = fx.temp.join("encoder.tmp");
        let unrelated = fx.temp.join("keep.txt");
        aged_file(&fresh_tmp, Duration::ZERO);
        aged_file(&unrelated, 48 * HOUR);

        let policy = EvictionPolicy::new(65.0, 12 * HOUR, 3);
        let report = policy.execute(&fx.store, PassKind::Full, SystemTime::now());
        assert_eq!(report.temp_removed, 1);
        assert!(!fresh_tmp.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn test_low_pressure_runs_temp_sweep_only() {
        let fx = fixture();
        let old_task = fx.tasks.join("old.mp4");
        let scratch = fx.temp.join("frame.mp4");
        aged_file(&old_task, 48 * HOUR);
        aged_file(&scratch, Duration::ZERO);

        let policy = EvictionPolicy::new(65.0, 12 * HOUR, 3);
        let pass = policy.decide(&MemorySample::new(40.0, 0));
        let report = policy.execute(&fx.store, pass, SystemTime::now());

        assert_eq!(report.pass, PassKind::TempSweep);
        assert_eq!(report.evicted, 0);
        assert_eq!(report.examined, 0);
        assert_eq!(report.temp_removed, 1);
        assert!(old_task.exists());
        assert!(!scratch.exists());
        assert!(!report.needs_reclaim());
    }

    #[test]
    fn test_temp_sweep_skips_write_locked_files() {
        let fx = fixture();
        let locked = fx.temp.join("busy.tmp");
        aged_file(&locked, Duration::ZERO);
        let mut perms = std::fs::metadata(&locked).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&locked, perms).unwrap();

        let policy = EvictionPolicy::new(65.0, 12 * HOUR, 3);
        let report = policy.execute(&fx.store, PassKind::TempSweep, SystemTime::now());
        assert_eq!(report.temp_removed, 0);
        assert!(locked.exists());
    }

    #[test]
    fn test_empty_and_missing_directories_are_noops() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::with_dirs(
            vec![ManagedDir::new(tmp.path().join("nope"), DirRole::Tasks, &[], true)],
            vec![ManagedDir::new(tmp.path().join("gone"), DirRole::Temp, &[], true)],
            vec![],
        );
        let policy = EvictionPolicy::new(65.0, 12 * HOUR, 3);
        let report = policy.execute(&store, PassKind::Full, SystemTime::now());
        assert_eq!(report.removed(), 0);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn test_reclaim_runs_at_least_once() {
        let policy = EvictionPolicy::new(65.0, 12 * HOUR, 3);
        let reclaimer = CountingReclaimer {
            calls: AtomicU32::new(0),
            productive_rounds: 0,
        };
        assert_eq!(policy.reclaim(&reclaimer), 1);
        assert_eq!(reclaimer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reclaim_is_capped() {
        let policy = EvictionPolicy::new(65.0, 12 * HOUR, 3);
        let reclaimer = CountingReclaimer {
            calls: AtomicU32::new(0),
            productive_rounds: u32::MAX,
        };
        assert_eq!(policy.reclaim(&reclaimer), 3);
        assert_eq!(reclaimer.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_reclaim_passes_floor_is_one() {
        let policy = EvictionPolicy::new(65.0, 12 * HOUR, 0);
        let reclaimer = CountingReclaimer {
            calls: AtomicU32::new(0),
            productive_rounds: u32::MAX,
        };
        assert_eq!(policy.reclaim(&reclaimer), 1);
    }
}
