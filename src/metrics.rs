//! Memory pressure readings
//!
//! A `MetricsSource` reports current memory utilisation on demand. Sources
//! never fail: an unreadable or slow source yields `MemorySample::unknown()`
//! so the monitor degrades to a no-op pass instead of stopping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::System;

/// Percent value used to encode "pressure unknown"
pub const UNKNOWN_PERCENT: f64 = -1.0;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// A single memory utilisation reading. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemorySample {
    /// Percentage of memory in use (0..=100), or `-1` when unknown
    pub percent_used: f64,
    /// Bytes still available to new allocations
    pub available_bytes: u64,
    /// When the reading was taken
    pub taken_at: DateTime<Utc>,
}

impl MemorySample {
    /// Build a sample from a percent reading, clamping into `0..=100`.
    pub fn new(percent_used: f64, available_bytes: u64) -> Self {
        let percent_used = if percent_used.is_finite() {
            percent_used.clamp(0.0, 100.0)
        } else {
            UNKNOWN_PERCENT
        };
        Self {
            percent_used,
            available_bytes,
            taken_at: Utc::now(),
        }
    }

    /// Build a sample from total/available byte counts.
    pub fn from_totals(total_bytes: u64, available_bytes: u64) -> Self {
        if total_bytes == 0 {
            return Self::unknown();
        }
        let available = available_bytes.min(total_bytes);
        let used = (total_bytes - available) as f64;
        Self::new(used / total_bytes as f64 * 100.0, available)
    }

    /// The conservative "pressure unknown" sample.
    pub fn unknown() -> Self {
        Self {
            percent_used: UNKNOWN_PERCENT,
            available_bytes: 0,
            taken_at: Utc::now(),
        }
    }

    /// Whether this sample carries a real reading.
    pub fn is_known(&self) -> bool {
        self.percent_used >= 0.0
    }

    /// Available memory in MiB
    pub fn available_mib(&self) -> f64 {
        self.available_bytes as f64 / BYTES_PER_MIB
    }
}

/// Source of memory utilisation readings.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Take a reading. Must return within a short bounded time and must not
    /// fail; on any problem return `MemorySample::unknown()`.
    async fn sample(&self) -> MemorySample;

    /// Human-readable name for logs.
    fn name(&self) -> &str;
}

/// System-wide memory readings via `sysinfo`.
pub struct SystemMetricsSource {
    system: Arc<Mutex<System>>,
    timeout: Duration,
}

impl SystemMetricsSource {
    /// Create a source whose readings are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
            timeout,
        }
    }

    fn read_blocking(system: &Mutex<System>) -> MemorySample {
        let mut sys = match system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sys.refresh_memory();
        MemorySample::from_totals(sys.total_memory(), sys.available_memory())
    }
}

#[async_trait]
impl MetricsSource for SystemMetricsSource {
    async fn sample(&self) -> MemorySample {
        let system = self.system.clone();
        let read = tokio::task::spawn_blocking(move || Self::read_blocking(&system));

        match tokio::time::timeout(self.timeout, read).await {
            Ok(Ok(sample)) => sample,
            Ok(Err(e)) => {
                tracing::warn!("Memory sampling task failed: {}", e);
                MemorySample::unknown()
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Memory sampling timed out"
                );
                MemorySample::unknown()
            }
        }
    }

    fn name(&self) -> &str {
        "sysinfo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_totals() {
        let sample = MemorySample::from_totals(1000, 250);
        assert_eq!(sample.percent_used, 75.0);
        assert_eq!(sample.available_bytes, 250);
        assert!(sample.is_known());
    }

    #[test]
    fn test_available_larger_than_total_is_clamped() {
        let sample = MemorySample::from_totals(1000, 5000);
        assert_eq!(sample.percent_used, 0.0);
        assert_eq!(sample.available_bytes, 1000);
    }

    #[test]
    fn test_zero_total_is_unknown() {
        let sample = MemorySample::from_totals(0, 0);
        assert!(!sample.is_known());
        assert_eq!(sample.percent_used, UNKNOWN_PERCENT);
    }

    #[test]
    fn test_new_clamps_and_rejects_nan() {
        assert_eq!(MemorySample::new(140.0, 0).percent_used, 100.0);
        assert_eq!(MemorySample::new(-5.0, 0).percent_used, 0.0);
        assert!(!MemorySample::new(f64::NAN, 0).is_known());
    }

    #[test]
    fn test_available_mib() {
        let sample = MemorySample::new(50.0, 3 * 1024 * 1024);
        assert_eq!(sample.available_mib(), 3.0);
    }

    #[tokio::test]
    async fn test_system_source_returns_bounded_reading() {
        let source = SystemMetricsSource::new(Duration::from_secs(5));
        let sample = source.sample().await;
        // Either a real reading or the unknown sentinel; never anything else.
        assert!(
            sample.percent_used == UNKNOWN_PERCENT
                || (0.0..=100.0).contains(&sample.percent_used)
        );
        assert_eq!(source.name(), "sysinfo");
    }
}
