//! Field Values
//!
//! Watched records are dynamically keyed and dynamically typed. This module
//! defines what a record key can hold:
//!
//! - [`Value`]: a data value (primitive, nested record, or callable method)
//! - [`Slot`]: what actually sits under a key — a data value or an accessor
//! - [`Method`]: a callable invoked with the reactive surface as receiver
//! - [`Accessor`]: a computed getter/setter pair
//!
//! # Methods and Receivers
//!
//! A [`Method`] stored in a record is not a free function: when invoked
//! through a watchable surface it receives that surface as its receiver, so
//! field writes made inside the method route through the reactive layer and
//! are batched into a single notification.
//!
//! # Accessors
//!
//! An [`Accessor`] is the computed-field counterpart of a getter/setter
//! property pair. Accessors are also invoked with the current wrapper as
//! receiver, so a getter that writes back through its receiver notifies
//! listeners like any other write. A *locked* accessor refuses to be bound
//! to a reactive surface; wrapping a record graph containing one fails.

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use super::record::Record;
use super::watchable::Watchable;

/// Signature for method bodies. The first argument is the reactive surface
/// the method was invoked through.
pub type MethodFn = dyn Fn(&Watchable, &[Value]) -> Value + Send + Sync;

/// Signature for accessor getters.
pub type GetterFn = dyn Fn(&Watchable) -> Value + Send + Sync;

/// Signature for accessor setters.
pub type SetterFn = dyn Fn(&Watchable, Value) + Send + Sync;

/// A callable field value.
///
/// Cloning a `Method` shares the underlying function; two clones compare
/// equal. Invocation through [`Watchable::call`] is dispatch-batched;
/// [`Method::invoke`] is the raw, unbatched entry point used for callables
/// passed around as plain values.
#[derive(Clone)]
pub struct Method {
    body: Arc<MethodFn>,
}

impl Method {
    /// Create a method from a closure.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&Watchable, &[Value]) -> Value + Send + Sync + 'static,
    {
        Self {
            body: Arc::new(body),
        }
    }

    /// Invoke the method with the given receiver and arguments.
    ///
    /// This does not touch dispatch batching; use [`Watchable::call`] to
    /// invoke a method field with batching semantics.
    pub fn invoke(&self, receiver: &Watchable, args: &[Value]) -> Value {
        (self.body)(receiver, args)
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
    }
}

impl Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Method")
    }
}

/// A computed getter/setter pair for a record key.
#[derive(Clone, Default)]
pub struct Accessor {
    get: Option<Arc<GetterFn>>,
    set: Option<Arc<SetterFn>>,
    locked: bool,
}

impl Accessor {
    /// Create an accessor with neither getter nor setter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a getter.
    pub fn with_getter<F>(mut self, get: F) -> Self
    where
        F: Fn(&Watchable) -> Value + Send + Sync + 'static,
    {
        self.get = Some(Arc::new(get));
        self
    }

    /// Attach a setter.
    pub fn with_setter<F>(mut self, set: F) -> Self
    where
        F: Fn(&Watchable, Value) + Send + Sync + 'static,
    {
        self.set = Some(Arc::new(set));
        self
    }

    /// Mark the accessor as locked. A locked accessor cannot be bound to a
    /// watchable surface, so wrapping a record that carries one fails.
    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    /// Whether the accessor refuses binding to a reactive surface.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub(crate) fn getter(&self) -> Option<Arc<GetterFn>> {
        self.get.clone()
    }

    pub(crate) fn setter(&self) -> Option<Arc<SetterFn>> {
        self.set.clone()
    }
}

impl Debug for Accessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accessor")
            .field("get", &self.get.is_some())
            .field("set", &self.set.is_some())
            .field("locked", &self.locked)
            .finish()
    }
}

/// What a record key holds: a plain data value or an accessor pair.
#[derive(Clone, Debug)]
pub enum Slot {
    /// A stored data value.
    Data(Value),
    /// A computed getter/setter pair.
    Accessor(Accessor),
}

/// A dynamically typed field value.
///
/// Equality compares primitives by value, nested records by identity, and
/// methods by function identity.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A nested record. After animation the record's canonical wrapper is
    /// registered in the parent's child map.
    Object(Record),
    Method(Method),
}

impl Value {
    /// Create a callable value from a closure.
    pub fn method<F>(body: F) -> Self
    where
        F: Fn(&Watchable, &[Value]) -> Value + Send + Sync + 'static,
    {
        Value::Method(Method::new(body))
    }

    /// Whether this value can be invoked.
    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Method(_))
    }

    /// Whether this value is a nested record.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view of the value. Integers coerce losslessly.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Object(record) => Some(record),
            _ => None,
        }
    }

    /// Convert to a JSON value. Methods are not data and map to `null`;
    /// record cycles are cut with `null` as well.
    pub fn to_json(&self) -> serde_json::Value {
        let mut seen = std::collections::HashSet::new();
        self.to_json_guarded(&mut seen)
    }

    pub(crate) fn to_json_guarded(
        &self,
        seen: &mut std::collections::HashSet<super::record::RecordId>,
    ) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(n) => serde_json::Value::from(*n),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Object(record) => record.to_json_guarded(seen),
            Value::Method(_) => serde_json::Value::Null,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.id() == b.id(),
            (Value::Method(a), Value::Method(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Object(value)
    }
}

impl From<serde_json::Value> for Value {
    /// Convert from JSON. Objects become nested [`Record`]s. Arrays have no
    /// direct counterpart in the keyed-record model and become records with
    /// stringified index keys, matching how keyed enumeration sees them.
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                let record = Record::new();
                for (index, item) in items.into_iter().enumerate() {
                    record.insert(index.to_string(), Value::from(item));
                }
                Value::Object(record)
            }
            serde_json::Value::Object(map) => {
                let record = Record::new();
                for (key, item) in map {
                    record.insert(key, Value::from(item));
                }
                Value::Object(record)
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(n) => serializer.serialize_f64(*n),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Object(record) => record.serialize(serializer),
            Value::Method(_) => serializer.serialize_unit(),
        }
    }
}
