//! Structural Reconciler
//!
//! Wrapped records stay mutable through their own handle, bypassing the
//! reactive surface entirely. The reconciler is the only mechanism that
//! notices: at the start of every dispatch it diffs the record's current
//! key set against the surface's last-known key set.
//!
//! - Removed keys detach the child wrapper's relay and drop the child.
//! - Added keys are animated and join the surface.
//! - Both directions mark the key dirty, so the dispatch's change summary
//!   names them.
//!
//! The diff runs on dispatch (or an explicit nudge), not on every read —
//! a key added by bypassing the wrapper stays invisible until then.

use std::sync::Arc;

use indexmap::IndexSet;
use tracing::{debug, warn};

use super::watchable::{self, WatchCore, Watchable};

pub(crate) fn reconcile(core: &Arc<WatchCore>) {
    let current: IndexSet<String> = core.record.keys().into_iter().collect();

    let (removed, added) = {
        let state = core.state.read().expect("state lock poisoned");
        let removed: Vec<String> = state
            .known_keys
            .iter()
            .filter(|key| !current.contains(*key))
            .cloned()
            .collect();
        let added: Vec<String> = current
            .iter()
            .filter(|key| !state.known_keys.contains(*key))
            .cloned()
            .collect();
        (removed, added)
    };
    if removed.is_empty() && added.is_empty() {
        return;
    }
    debug!(
        watchable = core.id,
        added = added.len(),
        removed = removed.len(),
        "reconciling structural changes"
    );

    let mut detached = Vec::new();
    {
        let mut state = core.state.write().expect("state lock poisoned");
        for key in &removed {
            state.known_keys.shift_remove(key);
            if let Some(child) = state.children.shift_remove(key) {
                detached.push(child);
            }
            state.dirty.insert(key.clone());
        }
    }
    for child in detached {
        child.detach_by_id(core.relay_id);
    }

    let wrapper = Watchable::from_core(Arc::clone(core));
    for key in added {
        // The slot may have vanished again between the diff and now.
        if let Some(slot) = core.record.slot(&key) {
            if let Err(err) = watchable::animate(&wrapper, &key, &slot) {
                warn!(field = %key, error = %err, "field left unwrapped during reconciliation");
            }
        }
        let mut state = core.state.write().expect("state lock poisoned");
        state.known_keys.insert(key.clone());
        state.dirty.insert(key);
    }
}
