#![forbid(unsafe_code)]

//! Consumer side: resolving keys and watching the cells they land on.
//!
//! [`read`] is the one-shot form: resolve a key against a chain, clone the
//! value, walk away. [`attach`] is the fire-and-forget form: subscribe a
//! callback to whatever cell the key resolves to right now. Most
//! consumers want [`LookupSubscriber`], which owns the callback across
//! re-evaluations and knows when *not* to resubscribe.
//!
//! A subscriber is re-evaluated by its host whenever the ambient chain it
//! was given might have changed. The contract that keeps this cheap: if
//! the key still resolves to the same cell (by identity), the existing
//! subscription is left untouched. Only an actual retarget, to a
//! different cell or to nothing, detaches and reattaches.
//!
//! # Invariants
//!
//! 1. A subscriber holds at most one live subscription at any time, so a
//!    value change triggers its callback at most once.
//! 2. Re-evaluation against the same resolved cell is subscription-neutral:
//!    no detach, no reattach, delivery order preserved.
//! 3. An unresolved key leaves the subscriber inert: `evaluate` returns
//!    `None` and no callback can fire until a later evaluation finds a
//!    provider.
//! 4. The empty key resolves nowhere and never attaches.

use std::fmt;
use std::rc::Rc;

use rootward_cell::{Subscription, ValueCell};

use crate::scope::ScopeChain;

// ---------------------------------------------------------------------------
// One-shot forms
// ---------------------------------------------------------------------------

/// Resolve `key` against `scope` and clone the current value.
///
/// No subscription is created; later changes go unseen.
#[must_use]
pub fn read<V: Clone>(scope: &ScopeChain<V>, key: &str) -> Option<V> {
    scope.resolve(key).map(|cell| cell.get())
}

/// Subscribe `listener` to the cell `key` resolves to right now.
///
/// When the key resolves to nothing the returned guard is
/// [inert](Subscription::inert): holding or dropping it does nothing.
/// The guard does not track later structure changes; that is
/// [`LookupSubscriber`]'s job.
#[must_use = "dropping the guard detaches the listener"]
pub fn attach<V: 'static>(
    scope: &ScopeChain<V>,
    key: &str,
    listener: impl Fn(&V) + 'static,
) -> Subscription {
    match scope.resolve(key) {
        Some(cell) => cell.subscribe(listener),
        None => Subscription::inert(),
    }
}

// ---------------------------------------------------------------------------
// LookupSubscriber<V>
// ---------------------------------------------------------------------------

struct Watch<V> {
    cell: ValueCell<V>,
    _guard: Subscription,
}

/// A keyed consumer that follows its provider across structure changes.
///
/// Owns the change callback and the current subscription. The host calls
/// [`evaluate`](LookupSubscriber::evaluate) with the ambient chain at this
/// consumer's position; everything else (retargeting, detaching, staying
/// put) follows from what the key resolves to.
pub struct LookupSubscriber<V> {
    key: String,
    on_change: Rc<dyn Fn(&V)>,
    watch: Option<Watch<V>>,
}

impl<V: 'static> LookupSubscriber<V> {
    /// A subscriber for `key`, not yet attached to anything.
    ///
    /// `on_change` fires on every value change of the watched cell, for as
    /// long as the subscriber stays attached to it.
    #[must_use]
    pub fn new(key: impl Into<String>, on_change: impl Fn(&V) + 'static) -> Self {
        Self {
            key: key.into(),
            on_change: Rc::new(on_change),
            watch: None,
        }
    }

    /// The key this subscriber resolves.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether a cell is currently being watched.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.watch.is_some()
    }

    /// The cell currently being watched, if any.
    #[must_use]
    pub fn resolved_cell(&self) -> Option<&ValueCell<V>> {
        self.watch.as_ref().map(|watch| &watch.cell)
    }

    /// Change the key. The current subscription is dropped immediately;
    /// the next [`evaluate`](LookupSubscriber::evaluate) resolves the new
    /// key. Setting the same key again changes nothing.
    pub fn set_key(&mut self, key: impl Into<String>) {
        let key = key.into();
        if key == self.key {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(from = self.key.as_str(), to = key.as_str(), "lookup re-keyed");

        self.key = key;
        self.watch = None;
    }

    /// Drop the current subscription, if any. Idempotent; the subscriber
    /// can be re-evaluated afterwards.
    pub fn detach(&mut self) {
        self.watch = None;
    }
}

impl<V: Clone + 'static> LookupSubscriber<V> {
    /// Resolve the key against `scope`, fix up the subscription, and
    /// return the current value.
    ///
    /// When the key resolves to the cell already being watched the
    /// subscription is reused as-is. When it resolves elsewhere (a new
    /// provider, a shadow, or nothing at all) the old subscription is
    /// dropped and a new one is created if there is a target.
    pub fn evaluate(&mut self, scope: &ScopeChain<V>) -> Option<V> {
        let target = scope.resolve(&self.key);

        let unchanged = match (&self.watch, &target) {
            (Some(watch), Some(cell)) => watch.cell.same_cell(cell),
            (None, None) => true,
            _ => false,
        };
        if !unchanged {
            #[cfg(feature = "tracing")]
            tracing::trace!(
                key = self.key.as_str(),
                attached = target.is_some(),
                "lookup retargeted"
            );

            self.watch = target.as_ref().map(|cell| {
                let on_change = Rc::clone(&self.on_change);
                Watch {
                    cell: cell.clone(),
                    _guard: cell.subscribe(move |v| (*on_change)(v)),
                }
            });
        }

        target.map(|cell| cell.get())
    }

    /// Current value of the watched cell, without re-resolving. `None`
    /// when detached.
    #[must_use]
    pub fn current(&self) -> Option<V> {
        self.watch.as_ref().map(|watch| watch.cell.get())
    }
}

impl<V> fmt::Debug for LookupSubscriber<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupSubscriber")
            .field("key", &self.key)
            .field("attached", &self.watch.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    fn chain_with(key: &str, value: i32) -> (ScopeChain<i32>, ValueCell<i32>) {
        let cell = ValueCell::new(value);
        (ScopeChain::root().extend(key, cell.clone()), cell)
    }

    // ---- one-shot forms ----

    #[test]
    fn read_returns_current_value() {
        let (scope, cell) = chain_with("k", 10);
        assert_eq!(read(&scope, "k"), Some(10));

        cell.set(11);
        assert_eq!(read(&scope, "k"), Some(11));
    }

    #[test]
    fn read_miss_and_empty_key_are_none() {
        let (scope, _cell) = chain_with("k", 10);
        assert_eq!(read(&scope, "missing"), None);
        assert_eq!(read(&scope, ""), None);
    }

    #[test]
    fn read_prefers_nearest_entry() {
        let scope = ScopeChain::root()
            .extend("k", ValueCell::new(1))
            .extend("k", ValueCell::new(2));
        assert_eq!(read(&scope, "k"), Some(2));
    }

    #[test]
    fn attach_fires_on_change() {
        let (scope, cell) = chain_with("k", 0);
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        let guard = attach(&scope, "k", move |v| s.set(*v));
        assert!(guard.is_active());

        cell.set(3);
        assert_eq!(seen.get(), 3);

        drop(guard);
        cell.set(4);
        assert_eq!(seen.get(), 3);
    }

    #[test]
    fn attach_on_absent_key_is_inert() {
        let (scope, cell) = chain_with("k", 0);
        let guard = attach(&scope, "other", |_: &i32| panic!("must never fire"));
        assert!(!guard.is_active());

        cell.set(1);
        drop(guard);
    }

    // ---- LookupSubscriber ----

    #[test]
    fn new_subscriber_is_detached() {
        let sub: LookupSubscriber<i32> = LookupSubscriber::new("k", |_| {});
        assert_eq!(sub.key(), "k");
        assert!(!sub.is_attached());
        assert_eq!(sub.current(), None);
    }

    #[test]
    fn evaluate_attaches_and_returns_value() {
        let (scope, cell) = chain_with("k", 7);
        let mut sub = LookupSubscriber::new("k", |_: &i32| {});

        assert_eq!(sub.evaluate(&scope), Some(7));
        assert!(sub.is_attached());
        assert!(sub.resolved_cell().unwrap().same_cell(&cell));
        assert_eq!(cell.listener_count(), 1);
    }

    #[test]
    fn callback_fires_on_provider_write() {
        let (scope, cell) = chain_with("k", 0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let mut sub = LookupSubscriber::new("k", move |v: &i32| s.borrow_mut().push(*v));
        let _ = sub.evaluate(&scope);

        cell.set(1);
        cell.set(1); // equality-gated: no second delivery
        cell.set(2);
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn repeated_evaluate_is_subscription_neutral() {
        let (scope, cell) = chain_with("k", 0);
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        let mut sub = LookupSubscriber::new("k", move |_: &i32| c.set(c.get() + 1));

        for _ in 0..5 {
            let _ = sub.evaluate(&scope);
        }
        assert_eq!(cell.listener_count(), 1, "one subscription, not five");

        cell.set(1);
        assert_eq!(count.get(), 1, "one delivery per change");
    }

    #[test]
    fn stable_target_keeps_subscription_order() {
        // Retained subscriptions keep their slot in the cell's delivery
        // order; a detach-and-reattach would move to the back.
        let (scope, cell) = chain_with("k", 0);
        let order = Rc::new(RefCell::new(Vec::new()));

        let o = Rc::clone(&order);
        let mut sub = LookupSubscriber::new("k", move |_: &i32| o.borrow_mut().push("lookup"));
        let _ = sub.evaluate(&scope);

        let o = Rc::clone(&order);
        let _sentinel = cell.subscribe(move |_| o.borrow_mut().push("sentinel"));

        // Same cell through a structurally different chain.
        let deeper = scope.extend("unrelated", ValueCell::new(9));
        let _ = sub.evaluate(&deeper);

        cell.set(1);
        assert_eq!(*order.borrow(), vec!["lookup", "sentinel"]);
    }

    #[test]
    fn shadowing_provider_retargets() {
        let outer = ValueCell::new(1);
        let inner = ValueCell::new(2);
        let base = ScopeChain::root().extend("k", outer.clone());
        let shadowed = base.extend("k", inner.clone());

        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let mut sub = LookupSubscriber::new("k", move |v: &i32| s.borrow_mut().push(*v));

        assert_eq!(sub.evaluate(&base), Some(1));
        assert_eq!(sub.evaluate(&shadowed), Some(2));
        assert_eq!(outer.listener_count(), 0, "old subscription dropped");
        assert_eq!(inner.listener_count(), 1);

        outer.set(10); // no longer watched
        inner.set(20);
        assert_eq!(*seen.borrow(), vec![20]);
    }

    #[test]
    fn present_to_absent_detaches() {
        let (scope, cell) = chain_with("k", 1);
        let mut sub = LookupSubscriber::new("k", |_: &i32| {});

        assert_eq!(sub.evaluate(&scope), Some(1));
        assert_eq!(sub.evaluate(&ScopeChain::root()), None);
        assert!(!sub.is_attached());
        assert_eq!(cell.listener_count(), 0);
    }

    #[test]
    fn absent_to_present_attaches() {
        let mut sub = LookupSubscriber::new("k", |_: &i32| {});
        assert_eq!(sub.evaluate(&ScopeChain::root()), None);
        assert!(!sub.is_attached());

        let (scope, _cell) = chain_with("k", 5);
        assert_eq!(sub.evaluate(&scope), Some(5));
        assert!(sub.is_attached());
    }

    #[test]
    fn set_key_detaches_immediately() {
        let (scope, cell) = chain_with("k", 1);
        let mut sub = LookupSubscriber::new("k", |_: &i32| {});
        let _ = sub.evaluate(&scope);
        assert_eq!(cell.listener_count(), 1);

        sub.set_key("elsewhere");
        assert!(!sub.is_attached());
        assert_eq!(cell.listener_count(), 0);
        assert_eq!(sub.key(), "elsewhere");

        // The next evaluation resolves the new key.
        let richer = scope.extend("elsewhere", ValueCell::new(42));
        assert_eq!(sub.evaluate(&richer), Some(42));
    }

    #[test]
    fn set_key_to_same_key_keeps_subscription() {
        let (scope, cell) = chain_with("k", 1);
        let mut sub = LookupSubscriber::new("k", |_: &i32| {});
        let _ = sub.evaluate(&scope);

        sub.set_key("k");
        assert!(sub.is_attached());
        assert_eq!(cell.listener_count(), 1);
    }

    #[test]
    fn detach_is_idempotent() {
        let (scope, cell) = chain_with("k", 1);
        let mut sub = LookupSubscriber::new("k", |_: &i32| {});
        let _ = sub.evaluate(&scope);

        sub.detach();
        sub.detach();
        assert!(!sub.is_attached());
        assert_eq!(cell.listener_count(), 0);
    }

    #[test]
    fn drop_detaches() {
        let (scope, cell) = chain_with("k", 1);
        let mut sub = LookupSubscriber::new("k", |_: &i32| {});
        let _ = sub.evaluate(&scope);
        assert_eq!(cell.listener_count(), 1);

        drop(sub);
        assert_eq!(cell.listener_count(), 0);
    }

    #[test]
    fn empty_key_never_attaches() {
        let (scope, _cell) = chain_with("k", 1);
        let mut sub = LookupSubscriber::new("", |_: &i32| panic!("must never fire"));
        assert_eq!(sub.evaluate(&scope), None);
        assert!(!sub.is_attached());
    }

    #[test]
    fn current_tracks_watched_cell() {
        let (scope, cell) = chain_with("k", 1);
        let mut sub = LookupSubscriber::new("k", |_: &i32| {});
        let _ = sub.evaluate(&scope);

        cell.set(9);
        assert_eq!(sub.current(), Some(9), "current() reads live, no re-evaluate needed");

        sub.detach();
        assert_eq!(sub.current(), None);
    }

    #[test]
    fn provider_teardown_leaves_subscriber_inert() {
        // Cleared listeners mean the callback can never fire again, but
        // the subscriber itself stays usable and re-attaches elsewhere.
        let (scope, cell) = chain_with("k", 1);
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        let mut sub = LookupSubscriber::new("k", move |_: &i32| c.set(c.get() + 1));
        let _ = sub.evaluate(&scope);

        cell.clear_listeners();
        cell.set(2);
        assert_eq!(count.get(), 0);

        let (fresh, fresh_cell) = chain_with("k", 3);
        assert_eq!(sub.evaluate(&fresh), Some(3));
        fresh_cell.set(4);
        assert_eq!(count.get(), 1);
    }
}
