//! Pressure-driven eviction
//!
//! The policy is purely age- and threshold-driven: above the threshold a
//! full pass evicts stale task/cache artifacts and sweeps temp directories;
//! otherwise only the lightweight temp sweep runs.

mod policy;
mod reclaim;

pub use policy::{EvictionPolicy, EvictionReport, PassKind};
pub use reclaim::{AllocatorReclaimer, Reclaimer};
