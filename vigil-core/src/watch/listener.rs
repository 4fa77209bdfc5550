//! Listeners
//!
//! A [`Listener`] is a callback registered on a watchable. Listener identity
//! is a stable [`ListenerId`]: attach/detach have set semantics, so a
//! listener is registered zero or one time per watchable, and clones of a
//! listener share identity.
//!
//! Listeners receive a [`ChangeSummary`] naming the keys that changed since
//! the previous dispatch.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use smallvec::SmallVec;

/// Unique identifier for a listener.
///
/// Uses an atomic counter to ensure uniqueness across threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Signature for listener callbacks.
pub type ListenerFn = dyn Fn(&ChangeSummary) + Send + Sync;

/// A change listener with stable identity.
///
/// # Example
///
/// ```rust,ignore
/// let listener = Listener::new(|summary| {
///     println!("changed: {:?}", summary.keys());
/// });
/// watchable.attach(&listener);
/// ```
#[derive(Clone)]
pub struct Listener {
    id: ListenerId,
    callback: Arc<ListenerFn>,
}

impl Listener {
    /// Create a listener from a callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&ChangeSummary) + Send + Sync + 'static,
    {
        Self {
            id: ListenerId::new(),
            callback: Arc::new(callback),
        }
    }

    /// The listener's identity, used for attach/detach matching.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub(crate) fn callback(&self) -> Arc<ListenerFn> {
        Arc::clone(&self.callback)
    }
}

impl Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish()
    }
}

/// A listener as registered on one watchable: identity, callback, and an
/// optional field filter restricting which changed keys invoke it.
#[derive(Clone)]
pub(crate) struct RegisteredListener {
    pub(crate) id: ListenerId,
    pub(crate) filter: Option<HashSet<String>>,
    pub(crate) callback: Arc<ListenerFn>,
}

impl RegisteredListener {
    /// Whether this listener should fire for the given summary.
    pub(crate) fn wants(&self, summary: &ChangeSummary) -> bool {
        match &self.filter {
            None => true,
            Some(fields) => summary.keys().iter().any(|key| fields.contains(key)),
        }
    }
}

/// The payload handed to listeners: the keys that changed since the
/// previous dispatch. This covers direct writes, accessor writes, keys
/// added or removed by reconciliation, and the field name of a nested
/// record whose change was relayed upward.
#[derive(Clone, Debug, Default)]
pub struct ChangeSummary {
    keys: SmallVec<[String; 4]>,
}

impl ChangeSummary {
    pub(crate) fn new(keys: SmallVec<[String; 4]>) -> Self {
        Self { keys }
    }

    /// The changed keys, in the order they were first touched.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Serialize for ChangeSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.keys.len()))?;
        for key in &self.keys {
            seq.serialize_element(key)?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn listener_ids_are_unique() {
        let id1 = ListenerId::new();
        let id2 = ListenerId::new();
        let id3 = ListenerId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn clones_share_identity() {
        let listener = Listener::new(|_| {});
        assert_eq!(listener.id(), listener.clone().id());
    }

    #[test]
    fn summary_reports_keys() {
        let summary = ChangeSummary::new(smallvec!["foo".to_string(), "bar".to_string()]);

        assert_eq!(summary.len(), 2);
        assert!(summary.contains("foo"));
        assert!(!summary.contains("baz"));
        assert_eq!(summary.keys(), ["foo", "bar"]);
    }

    #[test]
    fn filtered_listener_matches_on_intersection() {
        let registered = RegisteredListener {
            id: ListenerId::new(),
            filter: Some(["foo".to_string()].into_iter().collect()),
            callback: Arc::new(|_| {}),
        };

        let hit = ChangeSummary::new(smallvec!["foo".to_string()]);
        let miss = ChangeSummary::new(smallvec!["bar".to_string()]);
        assert!(registered.wants(&hit));
        assert!(!registered.wants(&miss));

        let unfiltered = RegisteredListener {
            id: ListenerId::new(),
            filter: None,
            callback: Arc::new(|_| {}),
        };
        assert!(unfiltered.wants(&miss));
        assert!(unfiltered.wants(&ChangeSummary::default()));
    }

    #[test]
    fn summary_serializes_as_key_list() {
        let summary = ChangeSummary::new(smallvec!["foo".to_string()]);
        let json = serde_json::to_value(&summary).expect("summary serializes");
        assert_eq!(json, serde_json::json!(["foo"]));
    }
}
