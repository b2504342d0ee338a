#![forbid(unsafe_code)]

//! Immutable key-to-cell resolution chains.
//!
//! A [`ScopeChain`] is a persistent linked list of `(key, cell)` entries.
//! Extending a chain allocates one new link that points at the existing
//! chain; nothing is copied and the parent chain is never mutated. Sibling
//! subtrees can therefore extend the same parent independently, and a
//! chain handed to a consumer stays valid no matter what happens elsewhere
//! in the tree.
//!
//! Resolution walks from the newest link toward the root and returns the
//! first cell whose key matches, so an inner entry shadows an outer entry
//! with the same key while both cells stay alive.
//!
//! # Invariants
//!
//! 1. Chains are immutable: `extend` returns a new chain and leaves the
//!    receiver untouched.
//! 2. `resolve` returns the nearest match; entries past the first match
//!    are never consulted.
//! 3. Chain identity (`same`) is pointer identity of the newest link, not
//!    structural equality. Two chains built by identical `extend` calls
//!    are distinct.
//! 4. Keys are non-empty. The empty key is reserved as the pass-through
//!    marker and never names an entry; resolving it finds nothing.

use std::fmt;
use std::rc::Rc;

use rootward_cell::ValueCell;

// ---------------------------------------------------------------------------
// ScopeChain<V>
// ---------------------------------------------------------------------------

struct Link<V> {
    key: String,
    cell: ValueCell<V>,
    parent: ScopeChain<V>,
}

/// A resolution context: the set of keyed cells visible at one position in
/// a tree, nearest entry first.
///
/// Cloning is cheap (one `Rc` bump) and preserves identity: a clone is
/// [`same`](ScopeChain::same) as its source. The root chain is empty and
/// resolves nothing.
pub struct ScopeChain<V> {
    node: Option<Rc<Link<V>>>,
}

impl<V> Clone for ScopeChain<V> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.as_ref().map(Rc::clone),
        }
    }
}

impl<V> Default for ScopeChain<V> {
    fn default() -> Self {
        Self::root()
    }
}

impl<V> ScopeChain<V> {
    /// The empty chain. All root chains are [`same`](ScopeChain::same) as
    /// each other.
    #[must_use]
    pub fn root() -> Self {
        Self { node: None }
    }

    /// A new chain with `(key, cell)` stacked on top of `self`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is empty; the empty key marks pass-through bindings
    /// and never enters a chain.
    #[must_use]
    pub fn extend(&self, key: impl Into<String>, cell: ValueCell<V>) -> Self {
        let key = key.into();
        assert!(!key.is_empty(), "scope entries must have a non-empty key");
        Self {
            node: Some(Rc::new(Link {
                key,
                cell,
                parent: self.clone(),
            })),
        }
    }

    /// The nearest cell bound to `key`, if any entry in the chain names it.
    ///
    /// The empty key resolves to `None` unconditionally.
    #[must_use]
    pub fn resolve(&self, key: &str) -> Option<ValueCell<V>> {
        if key.is_empty() {
            return None;
        }
        let mut cursor = self.node.as_deref();
        while let Some(link) = cursor {
            if link.key == key {
                return Some(link.cell.clone());
            }
            cursor = link.parent.node.as_deref();
        }
        None
    }

    /// Whether two handles denote the same chain.
    ///
    /// This is the identity consumers key their re-attachment on: a stable
    /// chain means every resolution made against it is still valid.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        match (&self.node, &other.node) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Whether this is the empty chain.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.node.is_none()
    }

    /// Number of entries between here and the root, shadowed ones
    /// included.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.keys().count()
    }

    /// Key of the newest entry, or `None` at the root.
    #[must_use]
    pub fn local_key(&self) -> Option<&str> {
        self.node.as_deref().map(|link| link.key.as_str())
    }

    /// The chain without its newest entry, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<ScopeChain<V>> {
        self.node.as_deref().map(|link| link.parent.clone())
    }

    /// Entry keys from the newest link toward the root, shadowed entries
    /// included.
    pub fn keys(&self) -> Keys<'_, V> {
        Keys {
            cursor: self.node.as_deref(),
        }
    }
}

impl<V> fmt::Debug for ScopeChain<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScopeChain")
            .field(&self.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Iterator over chain keys, nearest first. See [`ScopeChain::keys`].
pub struct Keys<'a, V> {
    cursor: Option<&'a Link<V>>,
}

impl<'a, V> Iterator for Keys<'a, V> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let link = self.cursor?;
        self.cursor = link.parent.node.as_deref();
        Some(&link.key)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
