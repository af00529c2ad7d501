//! On-disk artifact management
//!
//! Artifacts are discovered by scanning managed directories; nothing is
//! indexed in memory between scans, so every eviction pass sees the
//! filesystem as it is now.

pub mod artifact;
pub mod artifact_store;

pub use artifact::{ArtifactKind, ArtifactRecord, DirRole, ManagedDir};
pub use artifact_store::ArtifactStore;
