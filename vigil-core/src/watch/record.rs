//! Records
//!
//! A [`Record`] is the base object a watchable wraps: a mutable, dynamically
//! keyed map of [`Slot`]s behind a cheap-clone shared handle. The caller
//! owns it and may mutate it directly at any time.
//!
//! # Identity
//!
//! Record identity is the shared allocation, not the contents: clones of one
//! handle compare equal and share a [`RecordId`], while two records built
//! from identical data are distinct. The process-wide registry keys wrappers
//! by this identity, which is what makes repeated wrap calls on the same
//! record return the same wrapper.
//!
//! # Bypassing Observation
//!
//! Direct mutation through `insert`/`define`/`remove` deliberately does not
//! notify anyone. Keys added or removed this way become visible to a
//! wrapper's reactive surface only when its next dispatch (or an explicit
//! nudge) reconciles the key set.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::value::{Accessor, Slot, Value};

/// Identity of a record: the address of its shared slot table.
///
/// Valid for comparison only while something keeps the record alive; the
/// registry pairs ids with weak handles so a reused address can never be
/// confused with a live entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(usize);

/// A mutable, dynamically keyed record.
///
/// # Example
///
/// ```rust,ignore
/// let record = Record::new();
/// record.insert("count", 0);
/// record.insert("label", "items");
/// assert_eq!(record.get("count"), Some(Value::Int(0)));
/// ```
#[derive(Clone, Default)]
pub struct Record {
    slots: Arc<RwLock<IndexMap<String, Slot>>>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// The record's identity.
    pub fn id(&self) -> RecordId {
        RecordId(Arc::as_ptr(&self.slots) as *const () as usize)
    }

    /// Store a data value under `key`, replacing any previous slot.
    ///
    /// This bypasses observation; see the module docs.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.slots
            .write()
            .expect("slot lock poisoned")
            .insert(key.into(), Slot::Data(value.into()));
    }

    /// Install an accessor pair under `key`, replacing any previous slot.
    pub fn define(&self, key: impl Into<String>, accessor: Accessor) {
        self.slots
            .write()
            .expect("slot lock poisoned")
            .insert(key.into(), Slot::Accessor(accessor));
    }

    /// Remove `key`. Returns whether a slot was present.
    pub fn remove(&self, key: &str) -> bool {
        self.slots
            .write()
            .expect("slot lock poisoned")
            .shift_remove(key)
            .is_some()
    }

    /// Read the data value under `key`.
    ///
    /// Accessor slots need a reactive surface as receiver and are only
    /// served through a wrapper; they read as `None` here.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.slot(key)? {
            Slot::Data(value) => Some(value),
            Slot::Accessor(_) => None,
        }
    }

    /// The raw slot under `key`.
    pub fn slot(&self, key: &str) -> Option<Slot> {
        self.slots
            .read()
            .expect("slot lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.slots
            .read()
            .expect("slot lock poisoned")
            .contains_key(key)
    }

    /// Current keys, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.slots
            .read()
            .expect("slot lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.read().expect("slot lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().expect("slot lock poisoned").is_empty()
    }

    /// Snapshot of every slot, in insertion order.
    pub(crate) fn snapshot(&self) -> Vec<(String, Slot)> {
        self.slots
            .read()
            .expect("slot lock poisoned")
            .iter()
            .map(|(key, slot)| (key.clone(), slot.clone()))
            .collect()
    }

    /// Build a record from a JSON object. Returns `None` for non-objects.
    pub fn from_json(value: &serde_json::Value) -> Option<Record> {
        match Value::from(value.clone()) {
            Value::Object(record) => Some(record),
            _ => None,
        }
    }

    /// Export the record's data fields as a JSON object.
    ///
    /// Methods and accessors are not data and are skipped; nested record
    /// cycles are cut with `null`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut seen = HashSet::new();
        self.to_json_guarded(&mut seen)
    }

    pub(crate) fn to_json_guarded(&self, seen: &mut HashSet<RecordId>) -> serde_json::Value {
        if !seen.insert(self.id()) {
            return serde_json::Value::Null;
        }
        let mut map = serde_json::Map::new();
        for (key, slot) in self.snapshot() {
            match slot {
                Slot::Data(Value::Method(_)) | Slot::Accessor(_) => {}
                Slot::Data(value) => {
                    map.insert(key, value.to_json_guarded(seen));
                }
            }
        }
        seen.remove(&self.id());
        serde_json::Value::Object(map)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id())
            .field("keys", &self.keys())
            .finish()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let snapshot = self.snapshot();
        let mut map = serializer.serialize_map(Some(snapshot.len()))?;
        for (key, slot) in snapshot {
            match slot {
                Slot::Data(Value::Method(_)) | Slot::Accessor(_) => {}
                Slot::Data(value) => map.serialize_entry(&key, &value)?,
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let record = Record::new();
        record.insert("count", 3);
        record.insert("label", "items");

        assert_eq!(record.get("count"), Some(Value::Int(3)));
        assert_eq!(record.get("label"), Some(Value::from("items")));
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn keys_keep_insertion_order() {
        let record = Record::new();
        record.insert("b", 1);
        record.insert("a", 2);
        record.insert("c", 3);

        assert_eq!(record.keys(), vec!["b", "a", "c"]);
    }

    #[test]
    fn clones_share_identity_and_state() {
        let record = Record::new();
        let alias = record.clone();
        alias.insert("x", 1);

        assert_eq!(record.id(), alias.id());
        assert_eq!(record.get("x"), Some(Value::Int(1)));
        assert_ne!(record.id(), Record::new().id());
    }

    #[test]
    fn remove_reports_presence() {
        let record = Record::new();
        record.insert("x", 1);

        assert!(record.remove("x"));
        assert!(!record.remove("x"));
        assert!(record.is_empty());
    }

    #[test]
    fn accessor_slots_are_not_plain_data() {
        let record = Record::new();
        record.define("computed", Accessor::new().with_getter(|_| Value::Int(9)));

        assert_eq!(record.get("computed"), None);
        assert!(matches!(record.slot("computed"), Some(Slot::Accessor(_))));
    }

    #[test]
    fn json_round_trip_for_data_fields() {
        let source = serde_json::json!({"count": 2, "label": "x", "pos": {"x": 1.5}});
        let record = Record::from_json(&source).expect("object should convert");

        assert_eq!(record.get("count"), Some(Value::Int(2)));
        let nested = record.get("pos").and_then(|v| v.as_record().cloned());
        assert_eq!(
            nested.and_then(|r| r.get("x")),
            Some(Value::Float(1.5))
        );
        assert_eq!(record.to_json(), source);
    }

    #[test]
    fn json_export_skips_methods_and_cuts_cycles() {
        let record = Record::new();
        record.insert("n", 1);
        record.insert("f", Value::method(|_, _| Value::Null));
        record.insert("me", record.clone());

        assert_eq!(
            record.to_json(),
            serde_json::json!({"n": 1, "me": null})
        );
    }

    #[test]
    fn from_json_rejects_non_objects() {
        assert!(Record::from_json(&serde_json::json!(1)).is_none());
        assert!(Record::from_json(&serde_json::json!("x")).is_none());
    }
}
