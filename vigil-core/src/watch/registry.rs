//! Wrapper Registry
//!
//! Process-wide table mapping record identity to its wrapper core. The
//! table enforces the identity-stability law: at most one live wrapper per
//! record, so repeated wrap calls return the same wrapper by reference.
//!
//! Entries are weak. A wrapper whose every handle has been dropped does not
//! linger here: its entry fails to upgrade and is pruned lazily, so wrapping
//! does not accumulate memory in long-running processes. A successful
//! upgrade proves identity — the live core holds its record strongly, so the
//! record's address cannot have been reused while the entry was alive.

use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use tracing::trace;

use super::record::{Record, RecordId};
use super::watchable::WatchCore;

static REGISTRY: OnceLock<DashMap<RecordId, Weak<WatchCore>>> = OnceLock::new();

fn table() -> &'static DashMap<RecordId, Weak<WatchCore>> {
    REGISTRY.get_or_init(DashMap::new)
}

/// Look up the live wrapper core for a record, if any.
pub(crate) fn lookup(record: &Record) -> Option<Arc<WatchCore>> {
    let id = record.id();
    let weak = table().get(&id).map(|entry| entry.value().clone())?;
    match weak.upgrade() {
        Some(core) => Some(core),
        None => {
            table().remove(&id);
            None
        }
    }
}

/// Register a freshly built wrapper core, pruning dead entries.
pub(crate) fn insert(record: &Record, core: &Arc<WatchCore>) {
    let registry = table();
    registry.retain(|_, weak| weak.strong_count() > 0);
    registry.insert(record.id(), Arc::downgrade(core));
    trace!(record = ?record.id(), watchable = core.id, "wrapper registered");
}
