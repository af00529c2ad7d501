//! Process-level hardening applied once by the binary at startup
//!
//! Lowers scheduling priority and caps the address space so that a runaway
//! encoder child (which inherits both) cannot take the host down with it.
//! Everything here is best-effort: failures are logged and startup goes on.

use crate::config::ProcessConfig;

/// What was actually applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HardeningReport {
    /// Resulting niceness, when the priority change succeeded
    pub niceness: Option<i32>,
    /// Soft address-space limit in bytes, when it was set
    pub memory_limit_bytes: Option<u64>,
}

/// Convert a MiB limit to bytes without overflowing.
pub fn memory_limit_bytes(limit_mb: u64) -> u64 {
    limit_mb.saturating_mul(1024 * 1024)
}

/// Apply the configured priority and memory limit to the current process.
pub fn apply_process_hardening(config: &ProcessConfig) -> HardeningReport {
    let mut report = HardeningReport::default();

    if let Some(increment) = config.nice_increment.filter(|i| *i != 0) {
        match lower_priority(increment) {
            Ok(niceness) => {
                tracing::info!(niceness, "Lowered process priority");
                report.niceness = Some(niceness);
            }
            Err(e) => tracing::warn!("Failed to lower process priority: {}", e),
        }
    }

    if let Some(limit_mb) = config.memory_limit_mb {
        let bytes = memory_limit_bytes(limit_mb);
        match limit_address_space(bytes) {
            Ok(applied) => {
                tracing::info!(limit_mb, "Capped process address space");
                report.memory_limit_bytes = Some(applied);
            }
            Err(e) => tracing::warn!(limit_mb, "Failed to cap address space: {}", e),
        }
    }

    report
}

#[cfg(unix)]
fn lower_priority(increment: i32) -> std::io::Result<i32> {
    // SAFETY: nice(2) only adjusts the calling process's priority.
    let niceness = unsafe { libc::nice(increment) };
    if niceness == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error().unwrap_or(0) != 0 {
            return Err(err);
        }
    }
    Ok(niceness)
}

#[cfg(not(unix))]
fn lower_priority(_increment: i32) -> std::io::Result<i32> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "priority adjustment is only supported on unix",
    ))
}

/// Lower the soft RLIMIT_AS to `bytes`, never above the hard limit.
#[cfg(unix)]
fn limit_address_space(bytes: u64) -> std::io::Result<u64> {
    let mut current = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `current` is a valid, writable rlimit.
    if unsafe { libc::getrlimit(libc::RLIMIT_AS, &mut current) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    let wanted = bytes as libc::rlim_t;
    let soft = if current.rlim_max == libc::RLIM_INFINITY {
        wanted
    } else {
        wanted.min(current.rlim_max)
    };
    let limit = libc::rlimit {
        rlim_cur: soft,
        rlim_max: current.rlim_max,
    };
    // SAFETY: `limit` is a valid rlimit for the calling process.
    if unsafe { libc::setrlimit(libc::RLIMIT_AS, &limit) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(soft as u64)
}

#[cfg(not(unix))]
fn limit_address_space(_bytes: u64) -> std::io::Result<u64> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "address-space limits are only supported on unix",
    ))
}
