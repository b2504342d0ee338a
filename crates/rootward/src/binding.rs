#![forbid(unsafe_code)]

//! Provider nodes: the write side of the propagation tree.
//!
//! A [`BindingNode`] owns one [`ValueCell`] for its whole lifetime and, on
//! each evaluation, exposes a scope chain that makes the cell visible to
//! the subtree below it under the node's key. Evaluation carries the two
//! channels separately:
//!
//! - the **value** goes into the cell through its equality gate, which is
//!   what notifies subscribers;
//! - the **structure** (exposed chain) is rebuilt only when the key or the
//!   ambient parent chain actually changed, and is otherwise returned with
//!   its identity intact.
//!
//! The second point is the load-bearing one. Hosts re-evaluate providers
//! freely (every frame, every update pass); as long as key and parent are
//! stable, every downstream consumer sees the *same* chain object and
//! skips re-resolution entirely.
//!
//! # Lifecycle
//!
//! A node starts unmounted, becomes active on its first
//! [`evaluate`](BindingNode::evaluate), and stays active until
//! [`teardown`](BindingNode::teardown) or drop. Teardown abandons the
//! cell's listeners without a farewell notification; consumers discover
//! the disappearance structurally, when their host next hands them a
//! chain that no longer contains the entry.
//!
//! # Invariants
//!
//! 1. The cell's identity is fixed for the node's lifetime: re-keying and
//!    re-parenting republish the same cell, they never mint a new one.
//! 2. `evaluate` returns an identical chain (per [`ScopeChain::same`])
//!    whenever key and parent identity are unchanged.
//! 3. An empty key exposes the parent chain itself: the node still holds
//!    and updates its cell, but nothing downstream can resolve it.
//!
//! # Failure Modes
//!
//! | Call | After teardown | Before first evaluate |
//! |------|----------------|-----------------------|
//! | `evaluate` | panics | mounts |
//! | `cell` | panics | panics |
//! | `teardown` | no-op | tears down |

use std::fmt;

use rootward_cell::ValueCell;

use crate::scope::ScopeChain;

// ---------------------------------------------------------------------------
// BindingNode<V>
// ---------------------------------------------------------------------------

struct Active<V> {
    key: String,
    cell: ValueCell<V>,
    parent: ScopeChain<V>,
    exposed: ScopeChain<V>,
}

enum State<V> {
    Unmounted,
    Active(Active<V>),
    TornDown,
}

/// A provider of one keyed value to everything below it.
///
/// Created unmounted; the first [`evaluate`](BindingNode::evaluate) seeds
/// the cell and exposes it. The node is the cell's sole writer by
/// convention: external code reaches the cell through
/// [`cell`](BindingNode::cell) or by resolving the exposed chain.
pub struct BindingNode<V> {
    state: State<V>,
}

impl<V: Clone + PartialEq + 'static> BindingNode<V> {
    /// A node that has not been evaluated yet. It owns no cell and exposes
    /// no scope until the first `evaluate`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::Unmounted,
        }
    }

    /// Mount or refresh the node at a position in the tree.
    ///
    /// `parent` is the chain visible just above this node, `key` the name
    /// the subtree resolves the value under, `input` the value to publish.
    /// Returns the chain to hand to the subtree.
    ///
    /// On the first call this seeds the cell with `input` (no
    /// notification; there is nobody to notify yet). On later calls the
    /// value flows through the cell's equality gate, then the exposed
    /// chain is rebuilt if and only if `key` differs or `parent` is not
    /// [`same`](ScopeChain::same) as before.
    ///
    /// An empty `key` makes the node pass-through: the returned chain *is*
    /// `parent`, identity included.
    ///
    /// # Panics
    ///
    /// Panics if the node was torn down.
    pub fn evaluate(&mut self, parent: &ScopeChain<V>, key: &str, input: V) -> ScopeChain<V> {
        match &mut self.state {
            State::TornDown => panic!("BindingNode::evaluate called after teardown"),
            State::Unmounted => {
                let cell = ValueCell::new(input);
                let exposed = expose(parent, key, &cell);

                #[cfg(feature = "tracing")]
                tracing::debug!(key, depth = exposed.depth(), "binding mounted");

                self.state = State::Active(Active {
                    key: key.to_owned(),
                    cell,
                    parent: parent.clone(),
                    exposed: exposed.clone(),
                });
                exposed
            }
            State::Active(active) => {
                active.cell.set(input);

                let rekeyed = active.key != key;
                let reparented = !active.parent.same(parent);
                if !rekeyed && !reparented {
                    return active.exposed.clone();
                }

                let exposed = expose(parent, key, &active.cell);

                #[cfg(feature = "tracing")]
                tracing::debug!(key, rekeyed, reparented, "binding scope rebuilt");

                active.key = key.to_owned();
                active.parent = parent.clone();
                active.exposed = exposed.clone();
                exposed
            }
        }
    }

    /// The cell this node publishes.
    ///
    /// Writing through it notifies subscribers exactly like passing a new
    /// `input` to `evaluate` would.
    ///
    /// # Panics
    ///
    /// Panics unless the node is active.
    #[must_use]
    pub fn cell(&self) -> &ValueCell<V> {
        match &self.state {
            State::Active(active) => &active.cell,
            State::Unmounted => panic!("BindingNode::cell called before first evaluate"),
            State::TornDown => panic!("BindingNode::cell called after teardown"),
        }
    }

    /// The key currently published under, or `None` when not active.
    /// Pass-through nodes report `Some("")`.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match &self.state {
            State::Active(active) => Some(active.key.as_str()),
            _ => None,
        }
    }

    /// The chain handed out by the last `evaluate`, or `None` when not
    /// active.
    #[must_use]
    pub fn exposed_scope(&self) -> Option<&ScopeChain<V>> {
        match &self.state {
            State::Active(active) => Some(&active.exposed),
            _ => None,
        }
    }

    /// Whether the node has been evaluated and not torn down.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Active(_))
    }

    /// Retire the node: abandon all cell listeners without notifying them
    /// and drop the owned chains. Idempotent. Dropping the node does the
    /// same.
    pub fn teardown(&mut self) {
        self.release();
    }
}

impl<V> BindingNode<V> {
    fn release(&mut self) {
        if let State::Active(active) = std::mem::replace(&mut self.state, State::TornDown) {
            active.cell.clear_listeners();

            #[cfg(feature = "tracing")]
            tracing::debug!(key = active.key.as_str(), "binding torn down");
        }
    }
}

impl<V> Drop for BindingNode<V> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<V: Clone + PartialEq + 'static> Default for BindingNode<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for BindingNode<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Unmounted => f.write_str("BindingNode(unmounted)"),
            State::Active(active) => write!(
                f,
                "BindingNode(key: {:?}, depth: {})",
                active.key,
                active.exposed.depth()
            ),
            State::TornDown => f.write_str("BindingNode(torn down)"),
        }
    }
}

fn expose<V>(parent: &ScopeChain<V>, key: &str, cell: &ValueCell<V>) -> ScopeChain<V> {
    if key.is_empty() {
        parent.clone()
    } else {
        parent.extend(key, cell.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
