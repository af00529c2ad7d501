//! Artifact data types
//!
//! An `ArtifactRecord` describes one file under management. Records are
//! produced by scans and carry the filesystem mtime as their only clock.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Kind of a managed artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Finished generation output under the tasks directory
    TaskOutput,
    /// Reusable video under the cache or static directory
    CacheVideo,
    /// Preview image next to an output
    PreviewImage,
    /// Encoder scratch file in a system temp directory
    TempEncoderFile,
}

/// Role a managed directory plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirRole {
    Tasks,
    Cache,
    Static,
    Temp,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

impl ArtifactKind {
    /// Classify a file found in a directory with the given role.
    pub fn classify(role: DirRole, path: &Path) -> Self {
        if role == DirRole::Temp {
            return Self::TempEncoderFile;
        }
        let is_image = extension_of(path)
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false);
        if is_image {
            return Self::PreviewImage;
        }
        match role {
            DirRole::Tasks => Self::TaskOutput,
            DirRole::Cache | DirRole::Static => Self::CacheVideo,
            DirRole::Temp => Self::TempEncoderFile,
        }
    }
}

/// One file under management. `path` is the unique key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub size_bytes: u64,
    /// Filesystem mtime; the sole eviction clock
    pub modified_at: SystemTime,
}

impl ArtifactRecord {
    /// Age of the record relative to `now` (zero for future mtimes).
    pub fn age_at(&self, now: SystemTime) -> std::time::Duration {
        now.duration_since(self.modified_at).unwrap_or_default()
    }
}

/// A directory the store scans, with its matching rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedDir {
    pub path: PathBuf,
    pub role: DirRole,
    /// Lowercase extensions without the dot; empty matches every file
    pub extensions: Vec<String>,
    /// Descend into subdirectories
    pub recursive: bool,
}

impl ManagedDir {
    /// Create a managed directory, normalising the extension list.
    pub fn new(
        path: impl Into<PathBuf>,
        role: DirRole,
        extensions: &[String],
        recursive: bool,
    ) -> Self {
        let extensions = extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self {
            path: path.into(),
            role,
            extensions,
            recursive,
        }
    }

    /// Whether a file name matches this directory's extension filter.
    pub fn matches(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        match extension_of(path) {
            Some(ext) => self.extensions.iter().any(|e| *e == ext),
            None => false,
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
