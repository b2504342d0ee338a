#![forbid(unsafe_code)]

//! Single-value observable cell with equality-gated change notification.
//!
//! A [`ValueCell`] holds one value, a version counter, and a set of
//! listeners. `set` compares the incoming value against the stored one and
//! does nothing when they are equal; otherwise it stores the value, bumps
//! the version, and synchronously invokes every registered listener before
//! returning. [`notify_all`](ValueCell::notify_all) is the escape hatch that
//! forces a delivery pass without a value change.
//!
//! # Architecture
//!
//! `ValueCell<V>` is a cheap clonable handle over `Rc<RefCell<..>>` state
//! for single-threaded shared ownership. Listener callbacks are stored as
//! `Weak` pointers; the strong reference lives in the [`Subscription`]
//! guard, so dropping the guard is what detaches the listener. Dead entries
//! are reaped lazily at the end of a notification pass.
//!
//! Delivery is snapshot-then-iterate: the listener list is copied before
//! any callback runs, and each entry is re-checked for liveness right
//! before its turn. No `RefCell` borrow is held across a callback, so
//! listeners may freely call `get`, `set`, `subscribe`, or drop guards on
//! the same cell.
//!
//! # Invariants
//!
//! 1. The version increments exactly once per `set` that changes the value.
//! 2. Listeners are invoked in registration order, each exactly once per
//!    delivery pass.
//! 3. `set` with a value equal to the current one is a no-op: no version
//!    bump, no notification.
//! 4. A listener detached during a delivery pass is not invoked for that
//!    pass; a listener attached during a pass first fires on the next one.
//! 5. A listener that calls `get()` mid-notification observes the value
//!    that triggered the notification (or a newer one).
//!
//! # Failure Modes
//!
//! | Situation | Behavior |
//! |-----------|----------|
//! | Guard dropped after the cell is gone | No-op |
//! | Guard dropped after `clear_listeners` | No-op |
//! | Listener panics | Propagates to the `set` caller |
//! | Reentrant `set` from a listener | Nested delivery completes first |

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

// ---------------------------------------------------------------------------
// ValueCell<V>
// ---------------------------------------------------------------------------

struct Entry<V> {
    id: u64,
    callback: Weak<dyn Fn(&V)>,
}

struct Shared<V> {
    value: RefCell<V>,
    version: Cell<u64>,
    next_listener: Cell<u64>,
    listeners: RefCell<Vec<Entry<V>>>,
}

/// A single observable value: the unit of subscription.
///
/// Cloning the handle shares the underlying cell; use
/// [`same_cell`](ValueCell::same_cell) to ask whether two handles refer to
/// the same one. One owner writes, any number of handles read or subscribe.
pub struct ValueCell<V> {
    shared: Rc<Shared<V>>,
}

impl<V> Clone for ValueCell<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<V> ValueCell<V> {
    /// Create a cell seeded with `value`. Version starts at 0.
    #[must_use]
    pub fn new(value: V) -> Self {
        Self {
            shared: Rc::new(Shared {
                value: RefCell::new(value),
                version: Cell::new(0),
                next_listener: Cell::new(1),
                listeners: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Borrow the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&V) -> R) -> R {
        f(&self.shared.value.borrow())
    }

    /// Version counter: bumps exactly once per value-changing `set`.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.shared.version.get()
    }

    /// Register a listener, invoked synchronously on every value change.
    ///
    /// The listener stays attached for as long as the returned guard lives.
    #[must_use = "dropping the guard detaches the listener"]
    pub fn subscribe(&self, listener: impl Fn(&V) + 'static) -> Subscription
    where
        V: 'static,
    {
        let id = self.shared.next_listener.get();
        self.shared.next_listener.set(id + 1);

        let strong: Rc<dyn Fn(&V)> = Rc::new(listener);
        self.shared.listeners.borrow_mut().push(Entry {
            id,
            callback: Rc::downgrade(&strong),
        });

        #[cfg(feature = "tracing")]
        tracing::trace!(listener = id, "listener attached");

        let cell = Rc::downgrade(&self.shared);
        Subscription::active(move || {
            if let Some(shared) = cell.upgrade() {
                shared.listeners.borrow_mut().retain(|e| e.id != id);
            }
            drop(strong);
        })
    }

    /// Number of currently live listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.shared
            .listeners
            .borrow()
            .iter()
            .filter(|e| e.callback.strong_count() > 0)
            .count()
    }

    /// Abandon every listener without invoking it.
    ///
    /// Used by provider teardown: subscribers get no farewell signal and
    /// their outstanding guards become inert. The stored value is kept.
    pub fn clear_listeners(&self) {
        let dropped = self.shared.listeners.borrow().len();
        self.shared.listeners.borrow_mut().clear();

        #[cfg(feature = "tracing")]
        tracing::debug!(dropped, "listeners cleared");
        #[cfg(not(feature = "tracing"))]
        let _ = dropped;
    }

    /// Whether two handles refer to the same underlying cell.
    ///
    /// Scope chains index cells by this identity, never by value equality.
    #[must_use]
    pub fn same_cell(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    fn still_registered(&self, id: u64) -> bool {
        self.shared.listeners.borrow().iter().any(|e| e.id == id)
    }

    fn reap(&self) {
        self.shared
            .listeners
            .borrow_mut()
            .retain(|e| e.callback.strong_count() > 0);
    }
}

impl<V: Clone> ValueCell<V> {
    /// Clone of the current value, no side effects.
    #[must_use]
    pub fn get(&self) -> V {
        self.shared.value.borrow().clone()
    }

    /// Force a delivery pass to all current listeners without a value
    /// change. Does not bump the version.
    pub fn notify_all(&self) {
        self.notify();
    }

    fn notify(&self) {
        let snapshot: Vec<(u64, Weak<dyn Fn(&V)>)> = self
            .shared
            .listeners
            .borrow()
            .iter()
            .map(|e| (e.id, Weak::clone(&e.callback)))
            .collect();
        if snapshot.is_empty() {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(fanout = snapshot.len(), version = self.version(), "notifying");

        let current = self.get();
        for (id, weak) in snapshot {
            // Detached mid-pass: skip for this pass.
            if !self.still_registered(id) {
                continue;
            }
            if let Some(callback) = weak.upgrade() {
                callback(&current);
            }
        }
        self.reap();
    }
}

impl<V: Clone + PartialEq> ValueCell<V> {
    /// Store `value` and notify, unless it equals the current value, in
    /// which case nothing happens at all.
    ///
    /// Listeners run synchronously, strictly after the mutation and
    /// strictly before `set` returns.
    pub fn set(&self, value: V) {
        {
            let mut slot = self.shared.value.borrow_mut();
            if *slot == value {
                return;
            }
            *slot = value;
        }
        self.shared.version.set(self.shared.version.get() + 1);
        self.notify();
    }
}

impl<V: Default> Default for ValueCell<V> {
    fn default() -> Self {
        Self::new(V::default())
    }
}

impl<V: fmt::Debug> fmt::Debug for ValueCell<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let live = self
            .shared
            .listeners
            .borrow()
            .iter()
            .filter(|e| e.callback.strong_count() > 0)
            .count();
        f.debug_struct("ValueCell")
            .field("value", &self.shared.value.borrow())
            .field("version", &self.shared.version.get())
            .field("listeners", &live)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// RAII guard for a registered listener.
///
/// Dropping the guard detaches the listener; [`cancel`](Subscription::cancel)
/// does the same eagerly and consumes the guard, so double-detach is
/// unrepresentable. Detaching is always safe: after the cell is gone or its
/// listeners were cleared, the guard quietly does nothing.
#[must_use = "dropping the guard detaches the listener"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    fn active(detach: impl FnOnce() + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// A guard that was never attached to anything.
    ///
    /// This is the "no-op unsubscribe" handed out when a lookup resolves to
    /// nothing: the caller holds it like any other guard and it stays inert.
    #[must_use]
    pub fn inert() -> Self {
        Self { detach: None }
    }

    /// Whether the guard still holds a live detachment.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.detach.is_some()
    }

    /// Detach now instead of at drop time.
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
