//! Watchable State
//!
//! This module implements the watchable-object engine: transparent change
//! observation over mutable, arbitrarily nested records.
//!
//! # Concepts
//!
//! ## Records
//!
//! A [`Record`] is a mutable, dynamically keyed map of values — the base
//! object. The caller owns it and may keep mutating it directly.
//!
//! ## Watchables
//!
//! A [`Watchable`] wraps a record: reads and writes behave like the record
//! itself, but every write notifies registered listeners, nested records
//! are wrapped recursively, and changes anywhere below propagate to every
//! listening ancestor. Each record has exactly one live wrapper; wrapping
//! the same record twice returns the same wrapper.
//!
//! ## Listeners and Summaries
//!
//! A [`Listener`] is an identity-keyed callback receiving a
//! [`ChangeSummary`] — the keys changed since the previous dispatch.
//!
//! ## Batching
//!
//! Method fields invoked through the surface suppress dispatch for their
//! duration, so a method that writes several fields notifies listeners
//! once, not once per write.
//!
//! ## Reconciliation
//!
//! Keys added or removed by mutating the record directly are invisible to
//! the surface until the next dispatch (or an explicit
//! [`Watchable::nudge`]) reconciles the key set. This latency is
//! deliberate: structural detection is lazy, per-dispatch, never per-read.

mod dispatch;
mod error;
mod lifecycle;
mod listener;
mod reconcile;
mod record;
mod registry;
mod value;
mod watchable;

pub use error::WatchError;
pub use listener::{ChangeSummary, Listener, ListenerFn, ListenerId};
pub use record::{Record, RecordId};
pub use value::{Accessor, GetterFn, Method, MethodFn, SetterFn, Slot, Value};
pub use watchable::{lookup, watch, watch_with, WatchOptions, Watchable};
