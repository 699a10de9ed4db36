//! Uploaded blob storage

use crate::error::{Result, SweepError};
use crate::observe::{SweepEvent, SweepObserver};
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Flat namespace of uploaded blobs
pub trait BlobStore {
    /// Names of all blobs. Failure to list is fatal to the caller.
    fn list(&self, observer: &dyn SweepObserver) -> Result<BTreeSet<String>>;

    fn remove(&self, name: &str) -> io::Result<()>;

    /// Where `name` lives, for reporting
    fn locate(&self, name: &str) -> PathBuf;
}

/// The uploads directory on the local filesystem
#[derive(Debug, Clone)]
pub struct UploadsDir {
    root: PathBuf,
}

impl UploadsDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn listing_error(&self, source: io::Error) -> SweepError {
        SweepError::UploadsDir {
            path: self.root.clone(),
            source,
        }
    }
}

impl BlobStore for UploadsDir {
    /// Direct children only; subdirectories are not blobs. A root that
    /// cannot be read fails with the walk error for that path.
    fn list(&self, observer: &dyn SweepObserver) -> Result<BTreeSet<String>> {
        if let Ok(meta) = std::fs::metadata(&self.root) {
            if !meta.is_dir() {
                return Err(self.listing_error(io::Error::other("not a directory")));
            }
        }

        let mut names = BTreeSet::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false);

        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_dir() {
                continue;
            }
            match entry.file_name().to_str() {
                Some(name) => {
                    names.insert(name.to_string());
                }
                None => observer.observe(SweepEvent::SkippedEntry {
                    path: entry.path().to_path_buf(),
                    reason: "file name is not valid UTF-8",
                }),
            }
        }

        Ok(names)
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        std::fs::remove_file(self.locate(name))
    }

    fn locate(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}
