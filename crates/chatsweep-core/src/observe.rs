//! Sweep events and the sinks that receive them
//!
//! Core code never logs through a global logger. Every pass reports what it
//! found and what it removed as a [`SweepEvent`] to an injected
//! [`SweepObserver`]; the CLI plugs in [`TracingObserver`], tests plug in
//! [`RecordingObserver`].

use crate::db::StoreKind;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// What a counted or listed set contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Chat,
    File,
    Collection,
    Upload,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Chat => "chats",
            Self::File => "files",
            Self::Collection => "collections",
            Self::Upload => "uploads",
        })
    }
}

/// Which side of the reconciliation a set belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetKind {
    Referenced,
    Existing,
    Unused,
    /// Rows a debug run selected instead of deleting
    Selected,
}

impl fmt::Display for SetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Referenced => "referenced",
            Self::Existing => "existing",
            Self::Unused => "unused",
            Self::Selected => "selected",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepEvent {
    /// Size of a set; `scope` names the sources it was drawn from.
    Counted {
        kind: ItemKind,
        set: SetKind,
        scope: &'static str,
        count: usize,
    },
    /// Full contents of a set. Only emitted when the observer wants listings.
    Listed {
        kind: ItemKind,
        set: SetKind,
        items: Vec<String>,
    },
    /// End of a pass. `simulated` is set when nothing was actually removed.
    Removed {
        kind: ItemKind,
        count: usize,
        simulated: bool,
    },
    UploadRemoved {
        path: PathBuf,
        simulated: bool,
    },
    UploadRemoveFailed {
        path: PathBuf,
        error: String,
    },
    /// A stored JSON document that could not be parsed; it contributes nothing.
    MalformedDocument {
        table: &'static str,
        id: String,
        reason: String,
    },
    SkippedEntry {
        path: PathBuf,
        reason: &'static str,
    },
    Committed {
        store: StoreKind,
    },
    CloseFailed {
        store: StoreKind,
        error: String,
    },
    Failed {
        error: String,
    },
}

/// Receiver for sweep events
pub trait SweepObserver {
    fn observe(&self, event: SweepEvent);

    /// Whether [`SweepEvent::Listed`] events are worth building
    fn wants_listings(&self) -> bool {
        true
    }
}

/// Count a set and, when asked for, list its members
pub(crate) fn report_set(
    observer: &dyn SweepObserver,
    kind: ItemKind,
    set: SetKind,
    scope: &'static str,
    items: &BTreeSet<String>,
) {
    observer.observe(SweepEvent::Counted {
        kind,
        set,
        scope,
        count: items.len(),
    });
    if observer.wants_listings() {
        observer.observe(SweepEvent::Listed {
            kind,
            set,
            items: items.iter().cloned().collect(),
        });
    }
}

/// Renders events as `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SweepObserver for TracingObserver {
    fn observe(&self, event: SweepEvent) {
        match event {
            SweepEvent::Counted {
                kind,
                set,
                scope,
                count,
            } => {
                tracing::info!(%kind, %set, count, "Found {} {} {} in {}", count, set, kind, scope);
            }
            SweepEvent::Listed { kind, set, items } => {
                tracing::debug!(%kind, %set, "{} {}: {:?}", set, kind, items);
            }
            SweepEvent::Removed {
                kind,
                count,
                simulated,
            } => {
                tracing::info!(%kind, count, simulated, "Deleted {} {}", count, kind);
            }
            SweepEvent::UploadRemoved { path, simulated } => {
                tracing::debug!(simulated, "Deleted file: {}", path.display());
            }
            SweepEvent::UploadRemoveFailed { path, error } => {
                tracing::error!("Error deleting file {}: {}", path.display(), error);
            }
            SweepEvent::MalformedDocument { table, id, reason } => {
                tracing::warn!(table, id = %id, "Skipping unparsable {} document: {}", table, reason);
            }
            SweepEvent::SkippedEntry { path, reason } => {
                tracing::warn!("Skipping {}: {}", path.display(), reason);
            }
            SweepEvent::Committed { store } => {
                tracing::info!(%store, "Committed {} database", store);
            }
            SweepEvent::CloseFailed { store, error } => {
                tracing::error!(%store, "Error closing {} database: {}", store, error);
            }
            SweepEvent::Failed { error } => {
                tracing::error!("Error: {}", error);
            }
        }
    }

    fn wants_listings(&self) -> bool {
        tracing::enabled!(tracing::Level::DEBUG)
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: RefCell<Vec<SweepEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SweepEvent> {
        self.events.borrow().clone()
    }

    /// Latest count reported for `kind`/`set`
    pub fn count(&self, kind: ItemKind, set: SetKind) -> Option<usize> {
        self.events.borrow().iter().rev().find_map(|event| match event {
            SweepEvent::Counted {
                kind: k,
                set: s,
                count,
                ..
            } if *k == kind && *s == set => Some(*count),
            _ => None,
        })
    }

    /// Latest listing reported for `kind`/`set`
    pub fn listing(&self, kind: ItemKind, set: SetKind) -> Option<Vec<String>> {
        self.events.borrow().iter().rev().find_map(|event| match event {
            SweepEvent::Listed {
                kind: k,
                set: s,
                items,
            } if *k == kind && *s == set => Some(items.clone()),
            _ => None,
        })
    }
}

impl SweepObserver for RecordingObserver {
    fn observe(&self, event: SweepEvent) {
        self.events.borrow_mut().push(event);
    }
}
