//! Child Lifecycle Manager
//!
//! Wrapper liveness is a two-state machine {Active, Inactive}, and the
//! transitions live only here:
//!
//! - Active → Inactive when the listener count reaches zero. The wrapper
//!   detaches its relay from every child so deep graphs stop accumulating
//!   listener references once nobody above cares. Record and key
//!   bookkeeping are retained.
//! - Inactive → Active on any field access through the surface, provided
//!   at least one listener is registered. The relay is re-attached to
//!   every current child.
//!
//! Detaching the relay can empty a child's own listener set, so
//! deactivation cascades down the graph; reactivation cascades lazily as
//! each level is accessed again.

use std::sync::Arc;

use tracing::debug;

use super::dispatch;
use super::watchable::{WatchCore, Watchable};

/// Reactivate an inactive wrapper that has listeners. Called on every
/// surface access; a no-op when already active or nobody is listening.
pub(crate) fn activate_if_idle(core: &Arc<WatchCore>) {
    {
        let state = core.state.read().expect("state lock poisoned");
        if state.active || state.listeners.is_empty() {
            return;
        }
    }
    let children: Vec<(String, Watchable)> = {
        let mut state = core.state.write().expect("state lock poisoned");
        if state.active || state.listeners.is_empty() {
            return;
        }
        state.active = true;
        state
            .children
            .iter()
            .map(|(key, child)| (key.clone(), child.clone()))
            .collect()
    };
    debug!(watchable = core.id, children = children.len(), "watchable reactivated");
    for (key, child) in children {
        dispatch::attach_relay(&child, core, &key);
    }
}

/// Deactivate a wrapper whose last listener was removed, detaching its
/// relay from every child. State is kept so reactivation loses nothing.
pub(crate) fn deactivate_if_orphaned(core: &Arc<WatchCore>) {
    let children: Vec<Watchable> = {
        let mut state = core.state.write().expect("state lock poisoned");
        if !state.active {
            return;
        }
        state.active = false;
        state.children.values().cloned().collect()
    };
    debug!(watchable = core.id, children = children.len(), "watchable deactivated");
    for child in children {
        child.detach_by_id(core.relay_id);
    }
}
