//! Error types for the watch engine.

use thiserror::Error;

/// Errors surfaced by watchable construction and surface operations.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The record graph carries a locked accessor, which cannot be bound to
    /// a reactive surface. Raised before any wrapper state is committed.
    #[error("accessor for field `{0}` is locked and cannot be bound to a watchable surface")]
    LockedAccessor(String),

    /// `call` named a field that is not on the reactive surface.
    #[error("no field named `{0}` on the watchable surface")]
    UnknownField(String),

    /// `call` named a field whose value is not a method.
    #[error("field `{0}` is not callable")]
    NotCallable(String),
}
