//! Watchable Surfaces
//!
//! A [`Watchable`] is the reactive surface standing in for a [`Record`]: it
//! behaves like the record for reads and writes, and additionally notifies
//! registered listeners whenever any reachable field changes.
//!
//! # How Wrapping Works
//!
//! 1. [`watch`] consults the process-wide registry; a record that already
//!    has a live wrapper gets the same wrapper back (identity stability).
//!
//! 2. Otherwise the whole reachable record graph is validated for locked
//!    accessors up front, so a failing wrap commits nothing.
//!
//! 3. The new core registers *before* its fields animate, which is what
//!    makes wrapping terminate on cyclic record graphs.
//!
//! 4. Each key present at creation time is animated: nested records are
//!    wrapped recursively and the parent's relay listener is attached to
//!    the child, so changes anywhere below propagate upward.
//!
//! Keys added later by mutating the record directly are picked up lazily,
//! by the reconciliation that runs at the start of every dispatch — not on
//! every read. See the `reconcile` module.
//!
//! # Batching
//!
//! Method fields invoked through [`Watchable::call`] (and closures run via
//! [`Watchable::batch`]) suppress dispatch for their duration: any number of
//! field writes inside one top-level invocation collapse into at most one
//! notification after it returns. Re-entrant invocations do not toggle the
//! suppression state.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use indexmap::{IndexMap, IndexSet};

use super::dispatch;
use super::error::WatchError;
use super::lifecycle;
use super::listener::{Listener, ListenerId, RegisteredListener};
use super::record::{Record, RecordId};
use super::registry;
use super::value::{Slot, Value};

/// Counter for generating unique watchable IDs.
static WATCHABLE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_watchable_id() -> u64 {
    WATCHABLE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Per-wrapper mutable state.
///
/// Everything the dispatch, reconciliation, and lifecycle machinery needs
/// lives here as one explicit struct, accessed only through the operations
/// in this module tree.
pub(crate) struct WrapperState {
    /// A batched invocation is in progress; dispatches defer.
    pub(crate) suppressed: bool,
    /// A dispatch was requested while suppressed.
    pub(crate) pending: bool,
    /// Liveness: an inactive wrapper has detached its relay from children.
    pub(crate) active: bool,
    pub(crate) listeners: Vec<RegisteredListener>,
    /// Keys on the reactive surface as of the last reconciliation.
    pub(crate) known_keys: IndexSet<String>,
    /// Child wrappers for object-valued fields, by field name.
    pub(crate) children: IndexMap<String, Watchable>,
    /// Keys changed since the last dispatch, in first-touched order.
    pub(crate) dirty: IndexSet<String>,
}

impl Default for WrapperState {
    fn default() -> Self {
        Self {
            suppressed: false,
            pending: false,
            // Fresh wrappers start active even with zero listeners; the
            // first detach-to-zero deactivates them.
            active: true,
            listeners: Vec::new(),
            known_keys: IndexSet::new(),
            children: IndexMap::new(),
            dirty: IndexSet::new(),
        }
    }
}

/// Shared core of a watchable: the record, the relay identity this wrapper
/// uses on its children, and the wrapper state.
pub(crate) struct WatchCore {
    pub(crate) id: u64,
    pub(crate) record: Record,
    pub(crate) relay_id: ListenerId,
    pub(crate) state: RwLock<WrapperState>,
}

impl WatchCore {
    pub(crate) fn mark_dirty(&self, key: &str) {
        self.state
            .write()
            .expect("state lock poisoned")
            .dirty
            .insert(key.to_string());
    }
}

/// The reactive surface standing in for a record.
///
/// Cheap to clone; clones share state and compare equal. Exactly one live
/// `Watchable` core exists per record identity.
pub struct Watchable {
    core: Arc<WatchCore>,
}

impl Watchable {
    pub(crate) fn from_core(core: Arc<WatchCore>) -> Self {
        Self { core }
    }

    pub(crate) fn core(&self) -> &Arc<WatchCore> {
        &self.core
    }

    /// The wrapper's unique ID.
    pub fn id(&self) -> u64 {
        self.core.id
    }

    /// The underlying record.
    pub fn record(&self) -> Record {
        self.core.record.clone()
    }

    /// Read a field through the reactive surface.
    ///
    /// Returns `None` for keys not yet on the surface — including keys added
    /// to the record directly and not yet reconciled in. Accessor fields
    /// invoke their getter with this wrapper as receiver, so getter-internal
    /// writes notify listeners.
    pub fn get(&self, key: &str) -> Option<Value> {
        lifecycle::activate_if_idle(&self.core);
        {
            let state = self.core.state.read().expect("state lock poisoned");
            if !state.known_keys.contains(key) {
                return None;
            }
        }
        match self.core.record.slot(key)? {
            Slot::Data(value) => Some(value),
            Slot::Accessor(accessor) => accessor.getter().map(|get| get(self)),
        }
    }

    /// Write a field through the reactive surface.
    ///
    /// Every set dispatches, even when the value is unchanged. Record-valued
    /// fields are wrapped eagerly and joined to this wrapper's relay; a key
    /// not yet on the surface writes through raw and is animated by the
    /// dispatch that follows.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), WatchError> {
        let value = value.into();
        lifecycle::activate_if_idle(&self.core);

        let known = {
            let state = self.core.state.read().expect("state lock poisoned");
            state.known_keys.contains(key)
        };
        if !known {
            self.core.record.insert(key, value);
            dispatch::notify(&self.core);
            return Ok(());
        }

        match self.core.record.slot(key) {
            Some(Slot::Accessor(accessor)) => {
                match accessor.setter() {
                    Some(set) => set(self, value),
                    None => {
                        tracing::warn!(field = key, "write through getter-only accessor dropped")
                    }
                }
                self.core.mark_dirty(key);
                dispatch::notify(&self.core);
            }
            _ => {
                let new_child = match &value {
                    Value::Object(record) => Some(watch(record)?),
                    _ => None,
                };
                let old_child = {
                    let mut state = self.core.state.write().expect("state lock poisoned");
                    state.children.shift_remove(key)
                };
                if let Some(old) = old_child {
                    old.detach_by_id(self.core.relay_id);
                }
                self.core.record.insert(key, value);
                if let Some(child) = new_child {
                    dispatch::attach_relay(&child, &self.core, key);
                    let mut state = self.core.state.write().expect("state lock poisoned");
                    state.children.insert(key.to_string(), child);
                }
                self.core.mark_dirty(key);
                dispatch::notify(&self.core);
            }
        }
        Ok(())
    }

    /// Invoke a method field with batching semantics: field writes made
    /// inside the invocation collapse into at most one notification after
    /// the top-level call returns.
    pub fn call(&self, key: &str, args: &[Value]) -> Result<Value, WatchError> {
        lifecycle::activate_if_idle(&self.core);
        let known = {
            let state = self.core.state.read().expect("state lock poisoned");
            state.known_keys.contains(key)
        };
        if !known {
            return Err(WatchError::UnknownField(key.to_string()));
        }
        let method = match self.core.record.slot(key) {
            Some(Slot::Data(Value::Method(method))) => method,
            Some(_) => return Err(WatchError::NotCallable(key.to_string())),
            None => return Err(WatchError::UnknownField(key.to_string())),
        };
        Ok(self.batch(|surface| method.invoke(surface, args)))
    }

    /// Run a closure with dispatch suppressed, flushing at most one pending
    /// notification when the outermost batch completes. Re-entrant batches
    /// run inline without touching the suppression state.
    pub fn batch<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Watchable) -> R,
    {
        lifecycle::activate_if_idle(&self.core);
        let nested = {
            let mut state = self.core.state.write().expect("state lock poisoned");
            if state.suppressed {
                true
            } else {
                state.suppressed = true;
                false
            }
        };
        if nested {
            return f(self);
        }
        let _guard = dispatch::BatchGuard::new(Arc::clone(&self.core));
        f(self)
    }

    /// The canonical child wrapper for a record-valued field.
    pub fn child(&self, key: &str) -> Option<Watchable> {
        self.core
            .state
            .read()
            .expect("state lock poisoned")
            .children
            .get(key)
            .cloned()
    }

    /// Register a listener. Attaching an already-registered listener is a
    /// no-op. Returns the underlying record as a convenience.
    pub fn attach(&self, listener: &Listener) -> Record {
        self.attach_entry(RegisteredListener {
            id: listener.id(),
            filter: None,
            callback: listener.callback(),
        });
        self.core.record.clone()
    }

    /// Register a listener that only fires when one of `fields` changed.
    pub fn attach_filtered<I, K>(&self, listener: &Listener, fields: I) -> Record
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let filter = fields.into_iter().map(Into::into).collect();
        self.attach_entry(RegisteredListener {
            id: listener.id(),
            filter: Some(filter),
            callback: listener.callback(),
        });
        self.core.record.clone()
    }

    /// Remove a listener. When the listener set empties, the wrapper
    /// deactivates and detaches its relay from every child.
    pub fn detach(&self, listener: &Listener) {
        self.detach_by_id(listener.id());
    }

    /// Force an immediate notify cycle. Surfaces fields added to the record
    /// directly, without waiting for the next natural write.
    pub fn nudge(&self) {
        dispatch::notify(&self.core);
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.core
            .state
            .read()
            .expect("state lock poisoned")
            .listeners
            .len()
    }

    /// Whether the wrapper is currently relaying child changes.
    pub fn is_active(&self) -> bool {
        self.core.state.read().expect("state lock poisoned").active
    }

    pub(crate) fn attach_entry(&self, entry: RegisteredListener) {
        let mut state = self.core.state.write().expect("state lock poisoned");
        if state.listeners.iter().all(|l| l.id != entry.id) {
            state.listeners.push(entry);
        }
    }

    pub(crate) fn detach_by_id(&self, id: ListenerId) {
        let emptied = {
            let mut state = self.core.state.write().expect("state lock poisoned");
            state.listeners.retain(|l| l.id != id);
            state.listeners.is_empty()
        };
        if emptied {
            lifecycle::deactivate_if_orphaned(&self.core);
        }
    }
}

impl Clone for Watchable {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl PartialEq for Watchable {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl Debug for Watchable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchable")
            .field("id", &self.core.id)
            .field("record", &self.core.record.id())
            .field("listeners", &self.listener_count())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Options for [`watch_with`]: a listener attached at creation time, and an
/// optional field filter restricting which changed keys invoke it.
#[derive(Default)]
pub struct WatchOptions {
    pub default_listener: Option<Listener>,
    pub field_filter: Option<Vec<String>>,
}

/// Wrap a record, creating its watchable once and reusing it afterwards.
///
/// Fails with [`WatchError::LockedAccessor`] if the reachable record graph
/// carries a locked accessor; a failing wrap commits nothing.
pub fn watch(record: &Record) -> Result<Watchable, WatchError> {
    watch_with(record, WatchOptions::default())
}

/// Wrap a record with creation options. On a registry hit the existing
/// wrapper is returned with the default listener (if any) attached to it.
pub fn watch_with(record: &Record, options: WatchOptions) -> Result<Watchable, WatchError> {
    if let Some(core) = registry::lookup(record) {
        let wrapper = Watchable::from_core(core);
        apply_options(&wrapper, options);
        return Ok(wrapper);
    }

    validate_graph(record, &mut HashSet::new())?;

    let core = Arc::new(WatchCore {
        id: next_watchable_id(),
        record: record.clone(),
        relay_id: ListenerId::new(),
        state: RwLock::new(WrapperState::default()),
    });
    // Register before animating children so cyclic graphs terminate.
    registry::insert(record, &core);
    let wrapper = Watchable::from_core(core);

    for (key, slot) in record.snapshot() {
        animate(&wrapper, &key, &slot)?;
        let mut state = wrapper.core.state.write().expect("state lock poisoned");
        state.known_keys.insert(key);
    }

    apply_options(&wrapper, options);
    Ok(wrapper)
}

/// The live wrapper for a record, if one exists. This is the capability
/// check consumers use to ask "is this record watched".
pub fn lookup(record: &Record) -> Option<Watchable> {
    registry::lookup(record).map(Watchable::from_core)
}

fn apply_options(wrapper: &Watchable, options: WatchOptions) {
    if let Some(listener) = options.default_listener {
        match options.field_filter {
            Some(fields) => {
                wrapper.attach_filtered(&listener, fields);
            }
            None => {
                wrapper.attach(&listener);
            }
        }
    }
}

/// Wire one field into the reactive surface. Record-valued fields get their
/// canonical child wrapper and the parent's relay; method and primitive
/// fields need no extra wiring (method batching applies at `call` time, and
/// accessors bind to the surface at access time).
pub(crate) fn animate(wrapper: &Watchable, key: &str, slot: &Slot) -> Result<(), WatchError> {
    if let Slot::Data(Value::Object(record)) = slot {
        let child = watch(record)?;
        dispatch::attach_relay(&child, wrapper.core(), key);
        let mut state = wrapper.core.state.write().expect("state lock poisoned");
        state.children.insert(key.to_string(), child);
    }
    Ok(())
}

/// Reject locked accessors anywhere in the reachable graph before any
/// wrapper state is committed. Already-wrapped subtrees were validated when
/// they were wrapped and are skipped.
fn validate_graph(record: &Record, seen: &mut HashSet<RecordId>) -> Result<(), WatchError> {
    if !seen.insert(record.id()) {
        return Ok(());
    }
    for (key, slot) in record.snapshot() {
        match slot {
            Slot::Accessor(accessor) if accessor.is_locked() => {
                return Err(WatchError::LockedAccessor(key));
            }
            Slot::Data(Value::Object(nested)) => {
                if registry::lookup(&nested).is_none() {
                    validate_graph(&nested, seen)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::value::Accessor;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn repeated_wrap_returns_same_wrapper() {
        let record = Record::new();
        let first = watch(&record).expect("empty record wraps");
        let second = watch(&record).expect("second wrap");
        assert_eq!(first, second);
        assert_eq!(first.id(), second.id());
    }

    #[test]
    fn reads_pass_through_to_the_record() {
        let record = Record::new();
        record.insert("count", 3);
        record.insert("label", "items");

        let wrapper = watch(&record).expect("wraps");
        assert_eq!(wrapper.get("count"), record.get("count"));
        assert_eq!(wrapper.get("label"), record.get("label"));
        assert_eq!(wrapper.get("missing"), None);
    }

    #[test]
    fn writes_store_and_dispatch() {
        let record = Record::new();
        record.insert("count", 0);
        let wrapper = watch(&record).expect("wraps");

        let fired = Arc::new(AtomicI32::new(0));
        let fired_clone = Arc::clone(&fired);
        let listener = Listener::new(move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });
        wrapper.attach(&listener);

        wrapper.set("count", 5).expect("primitive write");
        assert_eq!(record.get("count"), Some(Value::Int(5)));
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // No value-equality short-circuit: same value still dispatches.
        wrapper.set("count", 5).expect("repeat write");
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn attach_returns_the_record_and_deduplicates() {
        let record = Record::new();
        let wrapper = watch(&record).expect("wraps");
        let listener = Listener::new(|_| {});

        let returned = wrapper.attach(&listener);
        assert_eq!(returned, record);

        wrapper.attach(&listener);
        assert_eq!(wrapper.listener_count(), 1);

        wrapper.detach(&listener);
        assert_eq!(wrapper.listener_count(), 0);
    }

    #[test]
    fn locked_accessor_rejects_the_whole_graph() {
        let nested = Record::new();
        nested.define(
            "stuck",
            Accessor::new().with_getter(|_| Value::Int(55)).locked(),
        );
        let record = Record::new();
        record.insert("pos", nested.clone());

        let err = watch(&record).expect_err("locked accessor must reject");
        assert!(matches!(err, WatchError::LockedAccessor(key) if key == "stuck"));
        // Nothing was committed for either record.
        assert!(lookup(&record).is_none());
        assert!(lookup(&nested).is_none());
    }

    #[test]
    fn cyclic_graphs_wrap_once() {
        let record = Record::new();
        record.insert("me", record.clone());

        let wrapper = watch(&record).expect("cycle terminates");
        let child = wrapper.child("me").expect("self child");
        assert_eq!(wrapper, child);
    }

    #[test]
    fn call_reports_misuse() {
        let record = Record::new();
        record.insert("n", 1);
        let wrapper = watch(&record).expect("wraps");

        assert!(matches!(
            wrapper.call("missing", &[]),
            Err(WatchError::UnknownField(_))
        ));
        assert!(matches!(
            wrapper.call("n", &[]),
            Err(WatchError::NotCallable(_))
        ));
    }

    #[test]
    fn default_listener_attaches_at_creation() {
        let record = Record::new();
        record.insert("n", 0);

        let fired = Arc::new(AtomicI32::new(0));
        let fired_clone = Arc::clone(&fired);
        let options = WatchOptions {
            default_listener: Some(Listener::new(move |_| {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            })),
            field_filter: None,
        };

        let wrapper = watch_with(&record, options).expect("wraps");
        assert_eq!(wrapper.listener_count(), 1);
        wrapper.set("n", 1).expect("write");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
