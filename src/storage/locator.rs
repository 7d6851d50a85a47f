//! Output root discovery
//!
//! The pipeline only needs "a directory to write into, if one is mounted
//! right now". Identifying which removable volume that is belongs to the
//! locator implementation.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// Photo subdirectory under the output root
pub const PHOTO_DIR: &str = "Monitor_Photos";

/// Video subdirectory under the output root
pub const VIDEO_DIR: &str = "Monitor_Videos";

/// Resolves where artifacts go
pub trait StorageLocator: Send + Sync {
    /// Current output root, `None` when nothing usable is mounted
    fn locate_output_root(&self) -> Option<PathBuf>;
}

/// First configured root that currently exists as a directory
#[derive(Debug, Clone, Default)]
pub struct MountedRoots {
    roots: Vec<PathBuf>,
}

impl MountedRoots {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

impl StorageLocator for MountedRoots {
    fn locate_output_root(&self) -> Option<PathBuf> {
        let root = self.roots.iter().find(|root| root.is_dir()).cloned();
        if root.is_none() {
            tracing::debug!("None of {} output roots is mounted", self.roots.len());
        }
        root
    }
}

/// Create `root/name` if missing
pub fn ensure_subdir(root: &Path, name: &str) -> std::io::Result<PathBuf> {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Filename timestamp, `YYYYMMDD_HHMMSS`
pub fn timestamp(now: DateTime<Local>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}
