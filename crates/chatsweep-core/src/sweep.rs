//! The reconciler
//!
//! A run is four passes in a fixed order:
//!
//! 1. expire unarchived chats older than the retention window
//! 2. delete file rows no chat or knowledge base references
//! 3. delete vector chunks of collections nothing references
//! 4. delete uploaded blobs no referenced file row points at
//!
//! Retention runs first so that files only reachable from expired chats are
//! collected in the same run. The referenced file ids from pass 2 are reused
//! by pass 4; pass 2 only removes ids outside that set, so resolving them
//! afterwards still sees every referenced row.
//!
//! Durability: both databases run inside one transaction each. They are
//! committed after all passes succeed, main first, and only outside dry-run
//! and debug modes. There is no cross-store transaction; a failure between
//! the two commits leaves the main database committed and the vector
//! database rolled back, which the next run reconciles. When both URLs name
//! the same database, one session and one transaction cover all tables.
//! Blob removal is immediate and is not undone by a later failure.

use crate::db::{MainStore, StoreKind, VectorStore};
use crate::error::Result;
use crate::filenames::resolve_filenames;
use crate::observe::{ItemKind, SetKind, SweepEvent, SweepObserver};
use crate::references::{referenced_collections, referenced_file_ids};
use crate::retention::{expire_chats, retention_cutoff};
use crate::unused::{unused_collections, unused_files, unused_uploads};
use crate::uploads::BlobStore;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;

/// How a run behaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOptions {
    /// Retention window for unarchived chats
    pub keep_days: u32,
    /// Skip blob removal and leave both databases uncommitted
    pub dry_run: bool,
    /// Replace every deletion with a selection; implies `dry_run`
    pub debug: bool,
    pub memory_collection_prefix: String,
}

impl SweepOptions {
    pub fn new(keep_days: u32) -> Self {
        Self {
            keep_days,
            dry_run: false,
            debug: false,
            memory_collection_prefix: crate::config::DEFAULT_MEMORY_COLLECTION_PREFIX.to_string(),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_memory_collection_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.memory_collection_prefix = prefix.into();
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run || self.debug
    }
}

/// Per-pass counts of one run. In debug mode the database counts are rows
/// selected; in dry-run mode the upload count is blobs that would go.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    pub chats: usize,
    pub files: usize,
    pub chunks: usize,
    pub uploads: usize,
    pub upload_failures: usize,
    pub committed: bool,
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} chats, {} files, {} vector chunks, {} uploads ({} failed); {}",
            self.chats,
            self.files,
            self.chunks,
            self.uploads,
            self.upload_failures,
            if self.committed { "committed" } else { "not committed" }
        )
    }
}

/// Runs the passes against already-open stores
pub struct Sweeper<'a> {
    options: &'a SweepOptions,
    observer: &'a dyn SweepObserver,
    now: DateTime<Utc>,
}

impl<'a> Sweeper<'a> {
    pub fn new(options: &'a SweepOptions, observer: &'a dyn SweepObserver) -> Self {
        Self {
            options,
            observer,
            now: Utc::now(),
        }
    }

    /// Evaluate retention as of `now`
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn run(
        &self,
        main: &MainStore,
        vector: &VectorStore,
        blobs: &dyn BlobStore,
    ) -> Result<SweepReport> {
        let observer = self.observer;
        let mut report = SweepReport::default();

        let cutoff = retention_cutoff(self.now, self.options.keep_days);
        report.chats = expire_chats(main, cutoff, self.options.debug, observer)?;

        let referenced_files = referenced_file_ids(main, observer)?;
        let doomed_files = unused_files(main, &referenced_files, observer)?;
        report.files = self.remove_files(main, &doomed_files)?;

        let referenced =
            referenced_collections(main, &self.options.memory_collection_prefix, observer)?;
        let doomed_collections = unused_collections(vector, &referenced, observer)?;
        report.chunks = self.remove_chunks(vector, &doomed_collections)?;

        let filenames = resolve_filenames(main, &referenced_files, observer)?;
        let doomed_uploads = unused_uploads(blobs, &filenames, observer)?;
        let (removed, failed) = self.remove_uploads(blobs, &doomed_uploads);
        report.uploads = removed;
        report.upload_failures = failed;

        if !self.options.is_dry_run() {
            main.commit()?;
            observer.observe(SweepEvent::Committed {
                store: StoreKind::Main,
            });
            vector.commit()?;
            observer.observe(SweepEvent::Committed {
                store: StoreKind::Vector,
            });
            report.committed = true;
        }

        Ok(report)
    }

    fn remove_files(&self, main: &MainStore, ids: &BTreeSet<String>) -> Result<usize> {
        let count = if self.options.debug {
            let rows = main.select_files(ids)?;
            self.list_selected(ItemKind::File, rows)
        } else {
            main.delete_files(ids)?
        };
        self.removed(ItemKind::File, count, self.options.debug);
        Ok(count)
    }

    fn remove_chunks(&self, vector: &VectorStore, collections: &BTreeSet<String>) -> Result<usize> {
        let count = if self.options.debug {
            let rows = vector.select_chunks(collections)?;
            self.list_selected(ItemKind::Collection, rows)
        } else {
            vector.delete_chunks(collections)?
        };
        self.removed(ItemKind::Collection, count, self.options.debug);
        Ok(count)
    }

    /// Returns `(removed, failed)`. A failed removal is reported and skipped.
    fn remove_uploads(&self, blobs: &dyn BlobStore, names: &BTreeSet<String>) -> (usize, usize) {
        let simulated = self.options.is_dry_run();
        let mut removed = 0;
        let mut failed = 0;

        for name in names {
            let path = blobs.locate(name);
            if simulated {
                self.observer.observe(SweepEvent::UploadRemoved { path, simulated });
                removed += 1;
                continue;
            }
            match blobs.remove(name) {
                Ok(()) => {
                    self.observer.observe(SweepEvent::UploadRemoved { path, simulated });
                    removed += 1;
                }
                Err(err) => {
                    self.observer.observe(SweepEvent::UploadRemoveFailed {
                        path,
                        error: err.to_string(),
                    });
                    failed += 1;
                }
            }
        }

        self.removed(ItemKind::Upload, removed, simulated);
        (removed, failed)
    }

    fn list_selected(&self, kind: ItemKind, rows: Vec<String>) -> usize {
        let count = rows.len();
        if self.observer.wants_listings() {
            self.observer.observe(SweepEvent::Listed {
                kind,
                set: SetKind::Selected,
                items: rows,
            });
        }
        count
    }

    fn removed(&self, kind: ItemKind, count: usize, simulated: bool) {
        self.observer.observe(SweepEvent::Removed {
            kind,
            count,
            simulated,
        });
    }
}

/// Open both databases, run every pass, and close both databases whatever
/// the outcome. Errors are reported to `observer` before being returned.
pub fn sweep(
    main_url: &str,
    vector_url: &str,
    blobs: &dyn BlobStore,
    options: &SweepOptions,
    observer: &dyn SweepObserver,
) -> Result<SweepReport> {
    let result = open_and_run(main_url, vector_url, blobs, options, observer);
    if let Err(err) = &result {
        observer.observe(SweepEvent::Failed {
            error: err.to_string(),
        });
    }
    result
}

fn open_and_run(
    main_url: &str,
    vector_url: &str,
    blobs: &dyn BlobStore,
    options: &SweepOptions,
    observer: &dyn SweepObserver,
) -> Result<SweepReport> {
    let main = MainStore::open(main_url)?;
    let vector = match VectorStore::open_alongside(vector_url, &main) {
        Ok(vector) => vector,
        Err(err) => {
            release(StoreKind::Main, main.close(), observer);
            return Err(err);
        }
    };

    let result = Sweeper::new(options, observer).run(&main, &vector, blobs);

    release(StoreKind::Vector, vector.close(), observer);
    release(StoreKind::Main, main.close(), observer);
    result
}

fn release(store: StoreKind, closed: Result<()>, observer: &dyn SweepObserver) {
    if let Err(err) = closed {
        observer.observe(SweepEvent::CloseFailed {
            store,
            error: err.to_string(),
        });
    }
}
