//! Filename resolution: file ids to the basenames their blobs are stored under

use crate::db::MainStore;
use crate::error::Result;
use crate::observe::{report_set, ItemKind, SetKind, SweepObserver};
use std::collections::BTreeSet;

/// Basenames of the `path` of every file row in `ids`. Unknown ids are
/// ignored and an empty id set issues no query.
pub fn resolve_filenames(
    store: &MainStore,
    ids: &BTreeSet<String>,
    observer: &dyn SweepObserver,
) -> Result<BTreeSet<String>> {
    if ids.is_empty() {
        return Ok(BTreeSet::new());
    }

    let filenames: BTreeSet<String> = store
        .file_paths(ids)?
        .iter()
        .filter_map(|path| basename(path))
        .map(String::from)
        .collect();
    report_set(observer, ItemKind::Upload, SetKind::Referenced, "file paths", &filenames);
    Ok(filenames)
}

/// Component after the final `/`; `None` when that component is empty
pub fn basename(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    (!name.is_empty()).then_some(name)
}
