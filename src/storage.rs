// 💾 Storage Disk - Rooted directory for uploaded and generated files

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageDisk {
    root: PathBuf,
}

impl StorageDisk {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StorageDisk { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a disk-relative path; absolute paths pass through unchanged
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.root.join(relative)
        }
    }

    pub fn exists(&self, relative: impl AsRef<Path>) -> bool {
        self.path(relative).exists()
    }

    /// Create any missing directories of `path`.
    /// With `skip_last` the final component is treated as a file name.
    pub fn make_path(path: &Path, skip_last: bool) -> Result<()> {
        let dir = if skip_last { path.parent() } else { Some(path) };

        if let Some(dir) = dir.filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        Ok(())
    }

    /// Every file under `dir` (or the whole disk), recursively
    pub fn all_files(&self, dir: Option<&Path>) -> Vec<PathBuf> {
        self.walk(dir)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    }

    /// Every directory under `dir` (or the whole disk), deepest first
    pub fn all_directories(&self, dir: Option<&Path>) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .walk(dir)
            .filter(|e| e.file_type().is_dir())
            .map(|e| e.into_path())
            .collect();

        dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
        dirs
    }

    fn walk(&self, dir: Option<&Path>) -> impl Iterator<Item = walkdir::DirEntry> {
        let start = dir.map(|d| self.path(d)).unwrap_or_else(|| self.root.clone());

        WalkDir::new(start)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
    }
}
