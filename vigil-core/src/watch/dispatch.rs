//! Change Notifier
//!
//! One dispatch cycle reconciles the record's key set, drains the dirty
//! keys into a [`ChangeSummary`], and invokes every registered listener
//! exactly once. No lock is held while listeners run, so listeners may
//! freely read or write back through the surface.
//!
//! During a batched invocation the suppression flag is set and a dispatch
//! request only marks the pending flag; [`BatchGuard`] restores the flag
//! and flushes at most one pending dispatch when the outermost batch
//! completes — including when the batched code panics, so the suppression
//! state can never be left wedged.

use std::sync::{Arc, Weak};

use smallvec::SmallVec;
use tracing::trace;

use super::listener::{ChangeSummary, ListenerFn, RegisteredListener};
use super::reconcile;
use super::watchable::{WatchCore, Watchable};

/// Run one notify cycle, or mark it pending if dispatch is suppressed.
pub(crate) fn notify(core: &Arc<WatchCore>) {
    {
        let mut state = core.state.write().expect("state lock poisoned");
        if state.suppressed {
            state.pending = true;
            trace!(watchable = core.id, "dispatch suppressed, marked pending");
            return;
        }
    }

    reconcile::reconcile(core);

    let (summary, listeners) = {
        let mut state = core.state.write().expect("state lock poisoned");
        let keys: SmallVec<[String; 4]> = state.dirty.drain(..).collect();
        let listeners: Vec<RegisteredListener> = state.listeners.clone();
        (ChangeSummary::new(keys), listeners)
    };

    trace!(
        watchable = core.id,
        listeners = listeners.len(),
        keys = ?summary.keys(),
        "dispatching change summary"
    );
    for listener in listeners {
        if listener.wants(&summary) {
            (listener.callback)(&summary);
        }
    }
}

/// Attach `parent`'s relay to a child wrapper under the given field name.
/// A child change then marks that field dirty on the parent and re-triggers
/// the parent's own dispatch.
pub(crate) fn attach_relay(child: &Watchable, parent: &Arc<WatchCore>, key: &str) {
    child.attach_entry(RegisteredListener {
        id: parent.relay_id,
        filter: None,
        callback: make_relay(parent, key.to_string()),
    });
}

/// Relays hold the parent weakly: a parent kept alive only by its children
/// would otherwise never be reclaimed.
fn make_relay(parent: &Arc<WatchCore>, key: String) -> Arc<ListenerFn> {
    let parent = Arc::downgrade(parent);
    Arc::new(move |_child_summary: &ChangeSummary| {
        if let Some(core) = Weak::upgrade(&parent) {
            core.mark_dirty(&key);
            notify(&core);
        }
    })
}

/// Drop guard for a batched invocation. Restores the suppression flag and
/// flushes a pending dispatch exactly once. The flush is skipped while
/// panicking so an unwinding batch cannot start a second dispatch.
pub(crate) struct BatchGuard {
    core: Arc<WatchCore>,
}

impl BatchGuard {
    pub(crate) fn new(core: Arc<WatchCore>) -> Self {
        Self { core }
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let flush = {
            let mut state = self.core.state.write().expect("state lock poisoned");
            state.suppressed = false;
            std::mem::take(&mut state.pending)
        };
        if flush && !std::thread::panicking() {
            notify(&self.core);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::listener::Listener;
    use super::super::record::Record;
    use super::super::watchable::watch;
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn batch_collapses_writes_into_one_dispatch() {
        let record = Record::new();
        record.insert("a", 0);
        record.insert("b", 0);
        let wrapper = watch(&record).expect("wraps");

        let fired = Arc::new(AtomicI32::new(0));
        let fired_clone = Arc::clone(&fired);
        wrapper.attach(&Listener::new(move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        }));

        wrapper.batch(|w| {
            w.set("a", 1).expect("write a");
            w.set("b", 2).expect("write b");
        });

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nested_batches_flush_once_at_the_top_level() {
        let record = Record::new();
        record.insert("a", 0);
        let wrapper = watch(&record).expect("wraps");

        let fired = Arc::new(AtomicI32::new(0));
        let fired_clone = Arc::clone(&fired);
        wrapper.attach(&Listener::new(move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        }));

        wrapper.batch(|w| {
            w.set("a", 1).expect("outer write");
            w.batch(|inner| {
                inner.set("a", 2).expect("inner write");
            });
            // Inner batch must not have flushed early.
            assert_eq!(fired.load(Ordering::SeqCst), 0);
        });

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn batch_without_writes_does_not_dispatch() {
        let record = Record::new();
        let wrapper = watch(&record).expect("wraps");

        let fired = Arc::new(AtomicI32::new(0));
        let fired_clone = Arc::clone(&fired);
        wrapper.attach(&Listener::new(move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        }));

        wrapper.batch(|_| {});
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn suppression_flag_is_restored_after_a_panic() {
        let record = Record::new();
        record.insert("a", 0);
        let wrapper = watch(&record).expect("wraps");

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            wrapper.batch(|w| {
                w.set("a", 1).expect("write");
                panic!("listener code went wrong");
            })
        }));
        assert!(result.is_err());

        // The flag is restored: later writes dispatch normally.
        let fired = Arc::new(AtomicI32::new(0));
        let fired_clone = Arc::clone(&fired);
        wrapper.attach(&Listener::new(move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        }));
        wrapper.set("a", 2).expect("write after panic");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
