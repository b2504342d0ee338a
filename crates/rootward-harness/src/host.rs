#![forbid(unsafe_code)]

//! Id-addressed position tree with an explicit flush pass.
//!
//! [`TreeHost`] plays the host framework: it owns every provider
//! ([`BindingNode`]) and consumer ([`LookupSubscriber`]) at an addressable
//! position, decides who gets re-evaluated, and counts what happened.
//! Tests drive it with mount/unmount/set calls and then assert on the
//! counters.
//!
//! # Flush semantics
//!
//! [`flush`](TreeHost::flush) walks the tree top-down, parent before
//! children, and re-evaluates a position if and only if
//!
//! - it is dirty (freshly mounted, poked, given a new input or key, or
//!   invalidated by its own subscription callback), or
//! - the ambient chain arriving at its position is not identity-[`same`]
//!   as the one it last evaluated under.
//!
//! Everything else is walked but left untouched, so a provider whose
//! exposed chain came back identity-stable costs its subtree nothing.
//! Subscription callbacks fired while a pass runs mark their consumer
//! dirty; passes repeat until no dirt remains.
//!
//! # Counters
//!
//! `eval_count` is bumped once per re-evaluation of a position.
//! `notify_count` is bumped once per subscription callback delivery to a
//! lookup, which by the cell contract means once per actual value change
//! of the watched cell.
//!
//! # Failure Modes
//!
//! Queries on unknown ids return `None`. Mutations on unknown ids, kind
//! mismatches (`set_input` on a lookup), and unmounting the root panic;
//! those are test-author errors.
//!
//! [`same`]: ScopeChain::same

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use rootward::binding::BindingNode;
use rootward::lookup::LookupSubscriber;
use rootward::scope::ScopeChain;

const MAX_FLUSH_PASSES: u32 = 64;

// ---------------------------------------------------------------------------
// Tree storage
// ---------------------------------------------------------------------------

/// Address of a mounted position. Never reused within one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

enum Kind<V> {
    /// Transparent structural position.
    Group,
    /// Provider position: owns the binding and its pending input.
    Bind {
        binding: BindingNode<V>,
        key: String,
        input: V,
        exposed: ScopeChain<V>,
    },
    /// Consumer position: owns the subscriber and its last observed value.
    Lookup {
        subscriber: LookupSubscriber<V>,
        value: Option<V>,
        notifies: Rc<Cell<u64>>,
    },
}

struct Node<V> {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    last_ambient: Option<ScopeChain<V>>,
    evals: u64,
    kind: Kind<V>,
}

/// Deterministic single-threaded host tree. See the module docs.
pub struct TreeHost<V> {
    nodes: BTreeMap<NodeId, Node<V>>,
    root: NodeId,
    next_id: u64,
    dirty: BTreeSet<NodeId>,
    /// Consumer ids whose subscription callback fired; drained into
    /// `dirty` between passes. Shared with every lookup's callback.
    invalidations: Rc<RefCell<Vec<NodeId>>>,
}

impl<V: Clone + PartialEq + 'static> TreeHost<V> {
    /// An empty host: one implicit transparent root group, nothing dirty.
    #[must_use]
    pub fn new() -> Self {
        let root = NodeId(0);
        let mut nodes = BTreeMap::new();
        nodes.insert(
            root,
            Node {
                parent: None,
                children: Vec::new(),
                last_ambient: None,
                evals: 0,
                kind: Kind::Group,
            },
        );
        Self {
            nodes,
            root,
            next_id: 1,
            dirty: BTreeSet::new(),
            invalidations: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// The implicit root group every top-level mount hangs off.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    // ---- mounting -------------------------------------------------------

    /// Mount a provider under `parent`. Evaluated at the next flush.
    pub fn mount_bind(&mut self, parent: NodeId, key: &str, input: V) -> NodeId {
        self.ensure_mounted(parent);
        let id = self.alloc_id();
        self.register(
            parent,
            id,
            Kind::Bind {
                binding: BindingNode::new(),
                key: key.to_owned(),
                input,
                exposed: ScopeChain::root(),
            },
        );
        id
    }

    /// Mount a consumer of `key` under `parent`. Evaluated (and attached,
    /// if the key resolves) at the next flush.
    pub fn mount_lookup(&mut self, parent: NodeId, key: &str) -> NodeId {
        self.ensure_mounted(parent);
        let id = self.alloc_id();

        let notifies = Rc::new(Cell::new(0));
        let counter = Rc::clone(&notifies);
        let queue = Rc::clone(&self.invalidations);
        let subscriber = LookupSubscriber::new(key, move |_: &V| {
            counter.set(counter.get() + 1);
            queue.borrow_mut().push(id);
        });

        self.register(
            parent,
            id,
            Kind::Lookup {
                subscriber,
                value: None,
                notifies,
            },
        );
        id
    }

    /// Mount a transparent group under `parent`.
    pub fn mount_group(&mut self, parent: NodeId) -> NodeId {
        self.ensure_mounted(parent);
        let id = self.alloc_id();
        self.register(parent, id, Kind::Group);
        id
    }

    /// Splice a new provider between `child` and its current parent.
    /// `child` keeps its position; the new bind takes its slot and adopts
    /// it. The whole subtree re-resolves at the next flush.
    pub fn mount_bind_above(&mut self, child: NodeId, key: &str, input: V) -> NodeId {
        assert!(child != self.root, "cannot mount above the root group");
        let parent = self.node(child).parent.expect("non-root node has a parent");
        let id = self.alloc_id();

        let siblings = &mut self.node_mut(parent).children;
        let slot = siblings
            .iter()
            .position(|&c| c == child)
            .expect("child listed under its parent");
        siblings[slot] = id;

        self.node_mut(child).parent = Some(id);
        self.nodes.insert(
            id,
            Node {
                parent: Some(parent),
                children: vec![child],
                last_ambient: None,
                evals: 0,
                kind: Kind::Bind {
                    binding: BindingNode::new(),
                    key: key.to_owned(),
                    input,
                    exposed: ScopeChain::root(),
                },
            },
        );
        id
    }

    // ---- unmounting -----------------------------------------------------

    /// Remove a position and its whole subtree. Binds tear down (listeners
    /// abandoned), lookups detach.
    pub fn unmount(&mut self, id: NodeId) {
        assert!(id != self.root, "the root group cannot be unmounted");
        let parent = self.node(id).parent.expect("non-root node has a parent");

        let siblings = &mut self.node_mut(parent).children;
        let slot = siblings
            .iter()
            .position(|&c| c == id)
            .expect("child listed under its parent");
        siblings.remove(slot);

        let mut doomed = Vec::new();
        self.collect_subtree(id, &mut doomed);
        for gone in doomed {
            self.nodes.remove(&gone);
            self.dirty.remove(&gone);
        }
    }

    /// Remove a single position, reattaching its children to its parent in
    /// its old slot. The classic "unmount the provider, keep the
    /// consumers" move; the orphans re-resolve at the next flush.
    pub fn unmount_splice(&mut self, id: NodeId) {
        assert!(id != self.root, "the root group cannot be unmounted");
        let parent = self.node(id).parent.expect("non-root node has a parent");
        let orphans = self.node(id).children.clone();

        for &orphan in &orphans {
            self.node_mut(orphan).parent = Some(parent);
        }

        let siblings = &mut self.node_mut(parent).children;
        let slot = siblings
            .iter()
            .position(|&c| c == id)
            .expect("child listed under its parent");
        siblings.splice(slot..=slot, orphans.iter().copied());

        self.nodes.remove(&id); // bind teardown / lookup detach runs here
        self.dirty.remove(&id);
    }

    // ---- mutation -------------------------------------------------------

    /// Hand a bind a new input value, marking it dirty. The value reaches
    /// the cell (and, if changed, the subscribers) during the next flush.
    pub fn set_input(&mut self, id: NodeId, value: V) {
        match &mut self.node_mut(id).kind {
            Kind::Bind { input, .. } => *input = value,
            _ => panic!("{id:?} is not a bind"),
        }
        self.dirty.insert(id);
    }

    /// Re-key a bind, marking it dirty. Takes effect at the next flush;
    /// the empty string turns the bind pass-through.
    pub fn set_bind_key(&mut self, id: NodeId, key: &str) {
        match &mut self.node_mut(id).kind {
            Kind::Bind { key: current, .. } => *current = key.to_owned(),
            _ => panic!("{id:?} is not a bind"),
        }
        self.dirty.insert(id);
    }

    /// Mark a position dirty with nothing changed: the "unrelated
    /// re-render" probe for isolation tests.
    pub fn poke(&mut self, id: NodeId) {
        self.ensure_mounted(id);
        self.dirty.insert(id);
    }

    // ---- flushing -------------------------------------------------------

    /// Run evaluation passes until nothing is dirty.
    ///
    /// # Panics
    ///
    /// Panics if the tree fails to quiesce, which would mean a
    /// notification cycle; the engine's consumers cannot write, so this
    /// indicates a harness bug.
    pub fn flush(&mut self) {
        let mut passes = 0u32;
        loop {
            self.absorb_invalidations();
            {
                let _span = tracing::debug_span!("flush_pass", pass = passes).entered();
                self.flush_node(self.root, &ScopeChain::root());
            }
            passes += 1;

            self.absorb_invalidations();
            if self.dirty.is_empty() {
                break;
            }
            assert!(
                passes < MAX_FLUSH_PASSES,
                "flush failed to quiesce after {passes} passes"
            );
        }
    }

    fn flush_node(&mut self, id: NodeId, ambient: &ScopeChain<V>) {
        let child_ambient = {
            let was_dirty = self.dirty.remove(&id);
            let node = self.nodes.get_mut(&id).expect("tree edge leads to a live node");
            let moved = node
                .last_ambient
                .as_ref()
                .is_none_or(|prev| !prev.same(ambient));

            if was_dirty || moved {
                node.evals += 1;
                node.last_ambient = Some(ambient.clone());
                match &mut node.kind {
                    Kind::Group => {}
                    Kind::Bind {
                        binding,
                        key,
                        input,
                        exposed,
                    } => {
                        *exposed = binding.evaluate(ambient, key, input.clone());
                        tracing::trace!(?id, key = key.as_str(), "bind evaluated");
                    }
                    Kind::Lookup {
                        subscriber, value, ..
                    } => {
                        *value = subscriber.evaluate(ambient);
                        tracing::trace!(
                            ?id,
                            key = subscriber.key(),
                            attached = subscriber.is_attached(),
                            "lookup evaluated"
                        );
                    }
                }
            }

            match &node.kind {
                Kind::Bind { exposed, .. } => exposed.clone(),
                Kind::Group | Kind::Lookup { .. } => ambient.clone(),
            }
        };

        for child in self.node(id).children.clone() {
            self.flush_node(child, &child_ambient);
        }
    }

    fn absorb_invalidations(&mut self) {
        let mut fired = self.invalidations.borrow_mut();
        for id in fired.drain(..) {
            // A callback may outrace an unmount; stale ids are dropped.
            if self.nodes.contains_key(&id) {
                self.dirty.insert(id);
            }
        }
    }

    // ---- queries --------------------------------------------------------

    /// Whether `id` is currently mounted.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Mounted positions, implicit root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Children of a position in tree order. `None` for unknown ids.
    #[must_use]
    pub fn children_of(&self, id: NodeId) -> Option<Vec<NodeId>> {
        self.nodes.get(&id).map(|node| node.children.clone())
    }

    /// How many times this position has been evaluated. `None` for
    /// unknown ids.
    #[must_use]
    pub fn eval_count(&self, id: NodeId) -> Option<u64> {
        self.nodes.get(&id).map(|node| node.evals)
    }

    /// How many subscription deliveries this lookup has received. `None`
    /// for unknown ids or non-lookups.
    #[must_use]
    pub fn notify_count(&self, id: NodeId) -> Option<u64> {
        match &self.nodes.get(&id)?.kind {
            Kind::Lookup { notifies, .. } => Some(notifies.get()),
            _ => None,
        }
    }

    /// The value this lookup observed at its last evaluation. `None` for
    /// unknown ids, non-lookups, unflushed lookups, and absent keys.
    #[must_use]
    pub fn value_at(&self, id: NodeId) -> Option<V> {
        match &self.nodes.get(&id)?.kind {
            Kind::Lookup { value, .. } => value.clone(),
            _ => None,
        }
    }

    // ---- internals ------------------------------------------------------

    fn alloc_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn register(&mut self, parent: NodeId, id: NodeId, kind: Kind<V>) {
        self.node_mut(parent).children.push(id);
        self.nodes.insert(
            id,
            Node {
                parent: Some(parent),
                children: Vec::new(),
                last_ambient: None,
                evals: 0,
                kind,
            },
        );
    }

    fn collect_subtree(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        for &child in &self.node(id).children {
            self.collect_subtree(child, out);
        }
    }

    fn ensure_mounted(&self, id: NodeId) {
        assert!(self.nodes.contains_key(&id), "no node {id:?} in the tree");
    }

    fn node(&self, id: NodeId) -> &Node<V> {
        self.nodes
            .get(&id)
            .unwrap_or_else(|| panic!("no node {id:?} in the tree"))
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<V> {
        self.nodes
            .get_mut(&id)
            .unwrap_or_else(|| panic!("no node {id:?} in the tree"))
    }
}

impl<V: Clone + PartialEq + 'static> Default for TreeHost<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for TreeHost<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeHost")
            .field("nodes", &self.nodes.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
