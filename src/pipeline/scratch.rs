//! Per-conversion scratch directory for rendered page images.
//!
//! Layout: `<work_dir>/<timestamp_ms>-<seq>/<doc_stem>/page_{i}.png`.
//!
//! [`ScratchDir`] owns both directories. [`ScratchDir::release`] removes the
//! page images and then the directories; `Drop` runs the same release when
//! the owning future is cancelled or unwinds. Removal is best-effort: every
//! failure is logged and reported, never returned as an error.

use crate::error::{CleanupFailure, ScribeError};
use crate::output::CleanupReport;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub struct ScratchDir {
    stamp_dir: PathBuf,
    doc_dir: PathBuf,
    images: Vec<PathBuf>,
    released: bool,
}

impl ScratchDir {
    /// Create a fresh scratch directory for the document `doc_stem`.
    pub async fn create(work_dir: &Path, doc_stem: &str) -> Result<Self, ScribeError> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);

        let stamp_dir = work_dir.join(format!("{millis}-{seq}"));
        let doc_dir = stamp_dir.join(doc_stem);
        tokio::fs::create_dir_all(&doc_dir)
            .await
            .map_err(|source| ScribeError::Io {
                path: doc_dir.clone(),
                source,
            })?;

        debug!("Scratch directory: {}", doc_dir.display());
        Ok(Self {
            stamp_dir,
            doc_dir,
            images: Vec::new(),
            released: false,
        })
    }

    /// Directory the rasterizer writes page images into.
    pub fn image_dir(&self) -> &Path {
        &self.doc_dir
    }

    /// The `<timestamp_ms>-<seq>` directory above the image directory.
    pub fn root(&self) -> &Path {
        &self.stamp_dir
    }

    /// Record the rendered page images so release removes exactly these.
    pub fn set_images(&mut self, images: Vec<PathBuf>) {
        self.images = images;
    }

    /// Remove page images, then the document and timestamp directories.
    ///
    /// A page image that is already gone counts as removed. If any image
    /// cannot be removed the directories are left in place. Calling this
    /// more than once is a no-op after the first call.
    pub fn release(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        if self.released {
            return report;
        }
        self.released = true;

        for file in self.files_to_remove() {
            match std::fs::remove_file(&file) {
                Ok(()) => report.files_removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => report.files_removed += 1,
                Err(e) => {
                    warn!("Failed to remove page image '{}': {}", file.display(), e);
                    report.failures.push(CleanupFailure {
                        path: file,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !report.failures.is_empty() {
            warn!(
                "Leaving scratch directory '{}' in place after {} file failure(s)",
                self.stamp_dir.display(),
                report.failures.len()
            );
            return report;
        }

        for dir in [&self.doc_dir, &self.stamp_dir] {
            match std::fs::remove_dir(dir) {
                Ok(()) => report.directories_removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove directory '{}': {}", dir.display(), e);
                    report.failures.push(CleanupFailure {
                        path: dir.clone(),
                        reason: e.to_string(),
                    });
                    break;
                }
            }
        }

        debug!(
            "Scratch released: {} files, {} directories",
            report.files_removed, report.directories_removed
        );
        report
    }

    /// Recorded images plus any stray files a failed render left behind.
    fn files_to_remove(&self) -> Vec<PathBuf> {
        let mut files: BTreeSet<PathBuf> = self.images.iter().cloned().collect();
        if let Ok(entries) = std::fs::read_dir(&self.doc_dir) {
            for entry in entries.flatten() {
                if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    files.insert(entry.path());
                }
            }
        }
        files.into_iter().collect()
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if !self.released {
            let report = self.release();
            if !report.is_clean() {
                warn!("Scratch cleanup on drop left {} path(s) behind", report.failures.len());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn release_removes_images_and_directories() {
        let work = tempfile::tempdir().unwrap();
        let mut scratch = ScratchDir::create(work.path(), "report").await.unwrap();
        assert!(scratch.image_dir().ends_with("report"));

        let images: Vec<PathBuf> = (0..3)
            .map(|i| {
                let p = scratch.image_dir().join(format!("page_{i}.png"));
                std::fs::write(&p, b"png").unwrap();
                p
            })
            .collect();
        scratch.set_images(images);

        let root = scratch.root().to_path_buf();
        let report = scratch.release();
        assert!(report.is_clean());
        assert_eq!(report.files_removed, 3);
        assert_eq!(report.directories_removed, 2);
        assert!(!root.exists());
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_image_counts_as_removed() {
        let work = tempfile::tempdir().unwrap();
        let mut scratch = ScratchDir::create(work.path(), "doc").await.unwrap();
        scratch.set_images(vec![scratch.image_dir().join("page_0.png")]);

        let report = scratch.release();
        assert!(report.is_clean());
        assert_eq!(report.files_removed, 1);
        assert_eq!(report.directories_removed, 2);
    }

    #[tokio::test]
    async fn drop_cleans_up_unreleased_dir() {
        let work = tempfile::tempdir().unwrap();
        let root;
        {
            let scratch = ScratchDir::create(work.path(), "doc").await.unwrap();
            std::fs::write(scratch.image_dir().join("page_0.png"), b"png").unwrap();
            root = scratch.root().to_path_buf();
            assert!(root.exists());
        }
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn concurrent_conversions_get_distinct_dirs() {
        let work = tempfile::tempdir().unwrap();
        let a = ScratchDir::create(work.path(), "same").await.unwrap();
        let b = ScratchDir::create(work.path(), "same").await.unwrap();
        assert_ne!(a.image_dir(), b.image_dir());
    }

    #[tokio::test]
    async fn release_twice_is_noop() {
        let work = tempfile::tempdir().unwrap();
        let mut scratch = ScratchDir::create(work.path(), "doc").await.unwrap();
        assert_eq!(scratch.release().directories_removed, 2);
        let second = scratch.release();
        assert_eq!(second.directories_removed, 0);
        assert!(second.is_clean());
    }
}
