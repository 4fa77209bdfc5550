//! Vigil Core
//!
//! This crate provides the core watchable-state engine for the Vigil
//! reactive UI framework. It implements:
//!
//! - Identity-preserving wrapping of mutable, nested records
//! - Listener dispatch with batching during method invocation
//! - Lazy structural reconciliation of added/removed fields
//! - Listener-count-driven child lifecycle management
//!
//! # Architecture
//!
//! The engine lives in one cohesive module:
//!
//! - `watch`: records, values, watchable surfaces, listeners, dispatch,
//!   reconciliation, and lifecycle
//!
//! # Example
//!
//! ```rust,ignore
//! use vigil_core::watch::{watch, Listener, Record, Value};
//!
//! // Build a record and wrap it
//! let record = Record::new();
//! record.insert("count", 0);
//! let state = watch(&record)?;
//!
//! // Subscribe to changes
//! let listener = Listener::new(|summary| {
//!     println!("changed: {:?}", summary.keys());
//! });
//! state.attach(&listener);
//!
//! // Write through the surface
//! state.set("count", 5)?;
//! // Listener runs, prints: changed: ["count"]
//! ```

pub mod watch;
