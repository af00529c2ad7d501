//! ReelGuard configuration management
//!
//! The configuration is built once at startup (file + environment flags),
//! validated, and then handed to the monitor and the generation controller
//! by reference. Nothing below `main` reads the environment.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main ReelGuard configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReelGuardConfig {
    /// Pressure monitor configuration
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Managed artifact directories
    #[serde(default)]
    pub storage: StorageConfig,

    /// Degradation ladder configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Video encoding backend configuration
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Process hardening applied by the binary at startup
    #[serde(default)]
    pub process: ProcessConfig,
}

/// Pressure monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Memory utilisation (percent) above which a full eviction pass runs
    pub threshold_percent: f64,

    /// Sampling interval in seconds
    pub interval_secs: u64,

    /// Age (hours) after which task/cache artifacts are evicted under pressure
    pub normal_cutoff_hours: f64,

    /// Maximum number of reclamation requests after a full pass
    pub reclaim_passes: u32,

    /// Upper bound on a single memory sample, in milliseconds
    pub sample_timeout_ms: u64,

    /// Sweep temp directories once before the first sample
    pub startup_sweep: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold_percent: 65.0,
            interval_secs: 30,
            normal_cutoff_hours: 12.0,
            reclaim_passes: 3,
            sample_timeout_ms: 2000,
            startup_sweep: true,
        }
    }
}

impl MonitorConfig {
    /// Sampling interval as a `Duration`
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Normal eviction cutoff as a `Duration`
    pub fn normal_cutoff(&self) -> Duration {
        Duration::try_from_secs_f64(self.normal_cutoff_hours.max(0.0) * 3600.0)
            .unwrap_or(Duration::MAX)
    }

    /// Sample timeout as a `Duration`
    pub fn sample_timeout(&self) -> Duration {
        Duration::from_millis(self.sample_timeout_ms)
    }
}

/// Managed artifact directories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Finished task outputs and their previews
    pub tasks_dir: PathBuf,

    /// Reusable cached videos
    pub cache_dir: PathBuf,

    /// Pre-rendered static videos for the reuse tier
    pub static_dir: PathBuf,

    /// System scratch directories swept for encoder leftovers
    pub temp_dirs: Vec<PathBuf>,

    /// Extensions evicted from the task and cache directories
    pub artifact_extensions: Vec<String>,

    /// Extensions swept from the temp directories
    pub temp_extensions: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = PathBuf::from("storage");
        Self {
            tasks_dir: base.join("tasks"),
            cache_dir: base.join("cache_videos"),
            static_dir: PathBuf::from("static_videos"),
            temp_dirs: vec![PathBuf::from("/tmp"), PathBuf::from("/var/tmp")],
            artifact_extensions: ["mp4", "jpg", "png", "wav", "mp3"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            temp_extensions: ["mp4", "avi", "mov", "mkv", "webm", "tmp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Degradation ladder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Never invoke the encoding backend: ReuseStatic falls straight to Placeholder
    pub disable_processing: bool,

    /// Global cap on concurrent generation requests (enforced by the admission gate)
    pub max_concurrent_tasks: usize,

    /// Per-tier timeout in seconds; a timeout counts as that tier's failure
    pub tier_timeout_secs: u64,

    /// Maximum prompt length rendered into the minimal encode overlay
    pub overlay_max_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            disable_processing: false,
            max_concurrent_tasks: 1,
            tier_timeout_secs: 120,
            overlay_max_chars: 50,
        }
    }
}

impl GenerationConfig {
    /// Per-tier timeout as a `Duration`
    pub fn tier_timeout(&self) -> Duration {
        Duration::from_secs(self.tier_timeout_secs)
    }
}

/// Video encoding backend configuration
///
/// The defaults are the most conservative settings available: single
/// thread, fastest preset, lowest useful quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// ffmpeg executable (name on PATH or absolute path)
    pub ffmpeg_binary: String,

    /// ImageMagick `convert` executable used for still-frame fallbacks
    pub convert_binary: String,

    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub duration_secs: u32,

    /// x264 constant rate factor (higher = lower quality)
    pub crf: u32,

    /// x264 preset
    pub preset: String,

    pub threads: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_binary: "ffmpeg".to_string(),
            convert_binary: "convert".to_string(),
            width: 320,
            height: 240,
            frame_rate: 1,
            duration_secs: 5,
            crf: 45,
            preset: "ultrafast".to_string(),
            threads: 1,
        }
    }
}

/// Process hardening configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Scheduling priority increment (`nice`); `None` leaves priority alone
    pub nice_increment: Option<i32>,

    /// Address-space limit in MiB; `None` means unlimited
    pub memory_limit_mb: Option<u64>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            nice_increment: Some(10),
            memory_limit_mb: None,
        }
    }
}

/// Address-space cap applied in extreme memory saving mode
const EXTREME_MODE_MEMORY_LIMIT_MB: u64 = 512;

fn flag_enabled(value: Option<String>) -> bool {
    value
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

impl ReelGuardConfig {
    /// Load configuration from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                toml::from_str(&content)?
            }
            None => Self::default(),
        };
        Ok(config)
    }

    /// Fold environment feature flags into the configuration.
    ///
    /// `lookup` resolves a variable name to its value; the binary passes
    /// `std::env::var`, tests pass a closure over a fixed map.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if flag_enabled(lookup("EXTREME_MEMORY_SAVING")) {
            tracing::warn!("Extreme memory saving mode enabled, disabling video processing");
            self.generation.disable_processing = true;
            self.generation.max_concurrent_tasks = 1;
            if self.process.memory_limit_mb.is_none() {
                self.process.memory_limit_mb = Some(EXTREME_MODE_MEMORY_LIMIT_MB);
            }
        }

        if flag_enabled(lookup("DISABLE_VIDEO_PROCESSING")) {
            self.generation.disable_processing = true;
        }

        if let Some(raw) = lookup("REELGUARD_MEMORY_THRESHOLD") {
            match raw.trim().parse::<f64>() {
                Ok(threshold) => self.monitor.threshold_percent = threshold,
                Err(e) => tracing::warn!(
                    value = %raw,
                    "Ignoring unparsable REELGUARD_MEMORY_THRESHOLD: {}",
                    e
                ),
            }
        }
    }

    /// Reject values the monitor or the ladder cannot run with.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.monitor.threshold_percent;
        if !(0.0..=100.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "monitor.threshold_percent must be within 0..=100, got {}",
                threshold
            )));
        }
        if self.monitor.interval_secs == 0 {
            return Err(Error::Config(
                "monitor.interval_secs must be greater than zero".to_string(),
            ));
        }
        let cutoff_hours = self.monitor.normal_cutoff_hours;
        if cutoff_hours < 0.0 || !cutoff_hours.is_finite() {
            return Err(Error::Config(
                "monitor.normal_cutoff_hours must be a non-negative number".to_string(),
            ));
        }
        if cutoff_hours * 3600.0 >= u64::MAX as f64 {
            return Err(Error::Config("monitor.normal_cutoff_hours is too large".to_string()));
        }
        if self.monitor.reclaim_passes == 0 {
            return Err(Error::Config(
                "monitor.reclaim_passes must be at least 1".to_string(),
            ));
        }
        if self.generation.max_concurrent_tasks == 0 {
            return Err(Error::Config(
                "generation.max_concurrent_tasks must be at least 1".to_string(),
            ));
        }
        if self.generation.tier_timeout_secs == 0 {
            return Err(Error::Config(
                "generation.tier_timeout_secs must be greater than zero".to_string(),
            ));
        }
        let enc = &self.encoder;
        if enc.width == 0 || enc.height == 0 || enc.frame_rate == 0 || enc.duration_secs == 0 {
            return Err(Error::Config(
                "encoder dimensions, frame_rate and duration_secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default configuration file location (`$XDG_CONFIG_HOME/reelguard/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join("reelguard").join("config.toml"))
}
