//! Unused-set calculation: what each store holds minus what is referenced

use crate::db::{MainStore, VectorStore};
use crate::error::Result;
use crate::observe::{report_set, ItemKind, SetKind, SweepObserver};
use crate::uploads::BlobStore;
use std::collections::BTreeSet;

/// `existing - referenced`
pub fn unused<T: Ord + Clone>(existing: &BTreeSet<T>, referenced: &BTreeSet<T>) -> BTreeSet<T> {
    existing.difference(referenced).cloned().collect()
}

/// File rows whose id is not referenced
pub fn unused_files(
    store: &MainStore,
    referenced: &BTreeSet<String>,
    observer: &dyn SweepObserver,
) -> Result<BTreeSet<String>> {
    let existing = store.file_ids()?;
    Ok(diff(ItemKind::File, "main DB", &existing, referenced, observer))
}

/// Collections in the vector store that nothing references
pub fn unused_collections(
    store: &VectorStore,
    referenced: &BTreeSet<String>,
    observer: &dyn SweepObserver,
) -> Result<BTreeSet<String>> {
    let existing = store.collection_names()?;
    Ok(diff(ItemKind::Collection, "vector DB", &existing, referenced, observer))
}

/// Blobs whose name matches no referenced file's basename
pub fn unused_uploads(
    blobs: &dyn BlobStore,
    referenced_filenames: &BTreeSet<String>,
    observer: &dyn SweepObserver,
) -> Result<BTreeSet<String>> {
    let existing = blobs.list(observer)?;
    Ok(diff(
        ItemKind::Upload,
        "uploads directory",
        &existing,
        referenced_filenames,
        observer,
    ))
}

fn diff(
    kind: ItemKind,
    scope: &'static str,
    existing: &BTreeSet<String>,
    referenced: &BTreeSet<String>,
    observer: &dyn SweepObserver,
) -> BTreeSet<String> {
    report_set(observer, kind, SetKind::Existing, scope, existing);
    let unused = unused(existing, referenced);
    report_set(observer, kind, SetKind::Unused, scope, &unused);
    unused
}
