//! Age-based chat retention

use crate::db::MainStore;
use crate::error::Result;
use crate::observe::{ItemKind, SetKind, SweepEvent, SweepObserver};
use chrono::{DateTime, Utc};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Epoch seconds before which unarchived chats expire
pub fn retention_cutoff(now: DateTime<Utc>, keep_days: u32) -> i64 {
    now.timestamp() - i64::from(keep_days) * SECONDS_PER_DAY
}

/// Remove unarchived chats created before `cutoff`. Archived chats are never
/// touched. In debug mode the chats are only selected and listed.
pub fn expire_chats(
    store: &MainStore,
    cutoff: i64,
    debug: bool,
    observer: &dyn SweepObserver,
) -> Result<usize> {
    let count = if debug {
        let ids = store.select_expired_chats(cutoff)?;
        if observer.wants_listings() {
            observer.observe(SweepEvent::Listed {
                kind: ItemKind::Chat,
                set: SetKind::Selected,
                items: ids.clone(),
            });
        }
        ids.len()
    } else {
        store.delete_expired_chats(cutoff)?
    };

    observer.observe(SweepEvent::Removed {
        kind: ItemKind::Chat,
        count,
        simulated: debug,
    });
    Ok(count)
}
