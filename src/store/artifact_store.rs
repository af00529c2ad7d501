//! Filesystem-backed artifact store
//!
//! Enumerates, filters and deletes generated artifacts across the managed
//! directories. Deletion is best-effort: a failed delete is logged and
//! picked up again by the next pass, never escalated.

use super::artifact::{ArtifactKind, ArtifactRecord, DirRole, ManagedDir};
use crate::config::StorageConfig;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Store over the task, cache, static and temp directories
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    /// Task and cache directories, evicted by age under pressure
    eviction_dirs: Vec<ManagedDir>,
    /// System scratch directories, swept regardless of age
    temp_dirs: Vec<ManagedDir>,
    /// Directories holding finished artifacts eligible for reuse
    reuse_dirs: Vec<ManagedDir>,
}

impl ArtifactStore {
    /// Build the store from the storage configuration.
    pub fn new(config: &StorageConfig) -> Self {
        let mp4 = vec!["mp4".to_string()];
        let eviction_dirs = vec![
            ManagedDir::new(
                &config.tasks_dir,
                DirRole::Tasks,
                &config.artifact_extensions,
                true,
            ),
            ManagedDir::new(
                &config.cache_dir,
                DirRole::Cache,
                &config.artifact_extensions,
                true,
            ),
        ];
        let temp_dirs = config
            .temp_dirs
            .iter()
            .map(|dir| ManagedDir::new(dir, DirRole::Temp, &config.temp_extensions, true))
            .collect();
        let reuse_dirs = vec![
            ManagedDir::new(&config.static_dir, DirRole::Static, &mp4, false),
            ManagedDir::new(&config.cache_dir, DirRole::Cache, &mp4, true),
        ];

        Self {
            eviction_dirs,
            temp_dirs,
            reuse_dirs,
        }
    }

    /// Build a store from explicit directory lists.
    pub fn with_dirs(
        eviction_dirs: Vec<ManagedDir>,
        temp_dirs: Vec<ManagedDir>,
        reuse_dirs: Vec<ManagedDir>,
    ) -> Self {
        Self {
            eviction_dirs,
            temp_dirs,
            reuse_dirs,
        }
    }

    pub fn eviction_dirs(&self) -> &[ManagedDir] {
        &self.eviction_dirs
    }

    pub fn temp_dirs(&self) -> &[ManagedDir] {
        &self.temp_dirs
    }

    pub fn reuse_dirs(&self) -> &[ManagedDir] {
        &self.reuse_dirs
    }

    /// Lazily enumerate the regular files in `dir` matching its extension
    /// filter. Symbolic links are never yielded. A missing directory is
    /// logged and yields nothing.
    pub fn scan(&self, dir: &ManagedDir) -> Box<dyn Iterator<Item = ArtifactRecord> + Send> {
        if !dir.path.is_dir() {
            tracing::info!(
                path = %dir.path.display(),
                role = ?dir.role,
                "Managed directory not found, skipping"
            );
            return Box::new(std::iter::empty());
        }

        let dir = dir.clone();
        let max_depth = if dir.recursive { usize::MAX } else { 1 };
        let walker = walkdir::WalkDir::new(&dir.path)
            .follow_links(false)
            .min_depth(1)
            .max_depth(max_depth);

        Box::new(walker.into_iter().filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    // Entries can race with deletion; only log unexpected errors.
                    let not_found = err
                        .io_error()
                        .map(|e| e.kind() == ErrorKind::NotFound)
                        .unwrap_or(false);
                    if !not_found {
                        tracing::debug!(
                            path = ?err.path().map(|p| p.display().to_string()),
                            error = %err,
                            "Failed to walk managed directory entry"
                        );
                    }
                    return None;
                }
            };
            if !entry.file_type().is_file() || !dir.matches(entry.path()) {
                return None;
            }
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(err) => {
                    tracing::debug!(
                        path = %entry.path().display(),
                        error = %err,
                        "Failed to stat artifact"
                    );
                    return None;
                }
            };
            let modified_at = meta.modified().ok()?;
            Some(ArtifactRecord {
                kind: ArtifactKind::classify(dir.role, entry.path()),
                path: entry.into_path(),
                size_bytes: meta.len(),
                modified_at,
            })
        }))
    }

    /// Remove an artifact. Returns `true` when the file is gone afterwards,
    /// including when it was already absent. Never raises.
    pub fn delete(&self, record: &ArtifactRecord) -> bool {
        match std::fs::remove_file(&record.path) {
            Ok(()) => {
                tracing::debug!(
                    path = %record.path.display(),
                    kind = ?record.kind,
                    size_bytes = record.size_bytes,
                    "Deleted artifact"
                );
                true
            }
            Err(err) if err.kind() == ErrorKind::NotFound => true,
            Err(err) => {
                tracing::warn!(
                    path = %record.path.display(),
                    error = %err,
                    "Failed to delete artifact, will retry on next pass"
                );
                false
            }
        }
    }

    /// Records strictly older than `cutoff` relative to the wall clock now.
    pub fn older_than(
        records: impl IntoIterator<Item = ArtifactRecord>,
        cutoff: Duration,
    ) -> Vec<ArtifactRecord> {
        Self::older_than_at(records, cutoff, SystemTime::now())
    }

    /// Records whose mtime is strictly before `now - cutoff`. Pure, no I/O.
    pub fn older_than_at(
        records: impl IntoIterator<Item = ArtifactRecord>,
        cutoff: Duration,
        now: SystemTime,
    ) -> Vec<ArtifactRecord> {
        let Some(threshold) = now.checked_sub(cutoff) else {
            return Vec::new();
        };
        records
            .into_iter()
            .filter(|r| r.modified_at < threshold)
            .collect()
    }

    /// Whether a file is currently protected against writing by this process.
    ///
    /// Missing files are not locked; unreadable metadata is treated as locked.
    pub fn is_write_locked(record: &ArtifactRecord) -> bool {
        match std::fs::symlink_metadata(&record.path) {
            Ok(meta) => meta.file_type().is_symlink() || meta.permissions().readonly(),
            Err(err) if err.kind() == ErrorKind::NotFound => false,
            Err(_) => true,
        }
    }

    /// Finished, non-empty videos available for the reuse tier.
    pub fn reusable_artifacts(&self) -> Vec<ArtifactRecord> {
        let mut seen = std::collections::HashSet::new();
        self.reuse_dirs
            .iter()
            .flat_map(|dir| self.scan(dir))
            .filter(|r| r.size_bytes > 0)
            .filter(|r| seen.insert(r.path.clone()))
            .collect()
    }

    /// Whether the directory exists on disk.
    pub fn dir_exists(dir: &ManagedDir) -> bool {
        Path::new(&dir.path).is_dir()
    }
}
