//! Best-effort memory reclamation after eviction

/// Asks the runtime to hand freed memory back to the operating system.
pub trait Reclaimer: Send + Sync {
    /// Perform one reclamation round. Returns `true` if the round released
    /// anything; `false` signals diminishing returns.
    fn reclaim(&self) -> bool;

    /// Human-readable name for logs.
    fn name(&self) -> &str;
}

/// Trims the process heap via `malloc_trim` where glibc provides it.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllocatorReclaimer;

impl Reclaimer for AllocatorReclaimer {
    fn reclaim(&self) -> bool {
        #[cfg(all(target_os = "linux", target_env = "gnu"))]
        {
            // SAFETY: malloc_trim only walks allocator-internal state and has
            // no preconditions on the caller.
            unsafe { libc::malloc_trim(0) == 1 }
        }
        #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
        {
            false
        }
    }

    fn name(&self) -> &str {
        "malloc_trim"
    }
}
