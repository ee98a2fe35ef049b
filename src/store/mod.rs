//! The child store: owns a record's children, routes operations through
//! whichever [`Backend`] and [`Indexing`] discipline it was built with, and
//! dispatches Store-level agent actions (spec.md §4.3).
//!
//! Five backends share one contract (spec.md §4.4): `add`, `first`, `last`,
//! `find_by_name`, `find_by_key`, `find_by_position`, `prev`, `next`,
//! `remove`, `take`, `pop`, `traverse`/`order`, `delete_all_children`. Rather
//! than a `dyn` vtable (the backend set is closed, per Design Notes'
//! "Polymorphism over backends"), `Store` holds a closed `Backend` enum and
//! its public methods are a `match` into the active variant — the idiomatic
//! static-dispatch reading of a "small vtable of function references", the
//! same shape the teacher uses for `schema::blocks::BlockId`.
//!
//! Each backend module's mutating functions take `(tree: &mut Tree, owner:
//! RecordId, ...)` and internally detach their own backend state from the
//! owner's `Store` via [`take_backend`]/[`put_backend`] before touching
//! `tree` again. This sidesteps the aliasing that would otherwise arise from
//! a backend living inside the very arena its operations need to mutate
//! (sibling links, comparator callbacks that read other records).

pub mod array;
pub mod linked_list;
pub mod octree;
pub mod packed_queue;
pub mod red_black;

use std::cmp::Ordering;
use std::rc::Rc;

use crate::agent::AgentChain;
use crate::error::{CdpError, CdpResult};
use crate::ident::{AutoIdCounter, Dt, Naming};
use crate::record::{RecordId, Tree};

pub use octree::OctreeBound;

/// How a store orders and looks up its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indexing {
    /// Position is whatever the caller asked for at insert time.
    Insertion,
    /// Sorted by the child's name (`Dt` ordering).
    ByName,
    /// Sorted by a caller-supplied comparator (a "Catalog").
    ByFunction,
    /// Sorted by a hash of the child's name.
    ByHash,
}

/// Which backend a store is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    LinkedList,
    Array,
    PackedQueue,
    RedBlack,
    Octree,
}

/// A record-to-record comparator used by `ByFunction`/`ByHash` indexing and
/// by `sort`. Takes `&Tree` (not just the two records) because a comparator
/// may need to inspect a candidate's own children (spec.md §8 scenario 3:
/// "a catalog... sorted by an embedded `ENUMERATION` child").
pub type CompareFn = Rc<dyn Fn(&Tree, RecordId, RecordId) -> Ordering>;

/// Extra construction parameters, one shape per backend (spec.md §4.3 `new`).
pub enum StoreExtra {
    None,
    /// Initial chunk capacity for `Array`/`PackedQueue`.
    Capacity(usize),
    /// Comparator for `ByFunction` indexing on any sorted-capable backend.
    Compare(CompareFn),
    /// Bounding center/subwide and fit-test for `Octree`.
    Octree { bound: OctreeBound, fit: octree::FitFn },
}

/// The per-backend state a [`Store`] owns.
pub enum Backend {
    LinkedList(linked_list::LinkedListBackend),
    Array(array::ArrayBackend),
    PackedQueue(packed_queue::PackedQueueBackend),
    RedBlack(red_black::RedBlackBackend),
    Octree(octree::OctreeBackend),
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::LinkedList(_) => "LinkedList",
            Self::Array(_) => "Array",
            Self::PackedQueue(_) => "PackedQueue",
            Self::RedBlack(_) => "RedBlack",
            Self::Octree(_) => "Octree",
        };
        f.write_str(name)
    }
}

impl Backend {
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::LinkedList(_) => BackendKind::LinkedList,
            Self::Array(_) => BackendKind::Array,
            Self::PackedQueue(_) => BackendKind::PackedQueue,
            Self::RedBlack(_) => BackendKind::RedBlack,
            Self::Octree(_) => BackendKind::Octree,
        }
    }
}

/// Where to place a child in an `Insertion`-indexed store (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddContext {
    Prepend,
    Append,
    Index(usize),
}

/// Container of a record's children (spec.md §3 "Store").
#[derive(Debug)]
pub struct Store {
    pub dt: Dt,
    pub attribute: u32,
    pub owner: RecordId,
    pub indexing: Indexing,
    pub writable: bool,
    pub locked: bool,
    pub child_count: usize,
    pub autoid: AutoIdCounter,
    pub compare: Option<CompareFn>,
    pub agents: AgentChain,
    pub next: Option<Box<Store>>,
    pub backend: Backend,
}

impl Store {
    /// Constructs a store. Validates the closed-set invariant that
    /// Red-Black/Octree backends are never `Insertion`-indexed, and that
    /// Packed Queue is always `Insertion`-indexed (it has no sort order,
    /// spec.md §4.4.3).
    pub fn new(
        dt: Dt,
        attribute: u32,
        owner: RecordId,
        kind: BackendKind,
        indexing: Indexing,
        extra: StoreExtra,
    ) -> CdpResult<Self> {
        match (kind, indexing) {
            (BackendKind::RedBlack | BackendKind::Octree, Indexing::Insertion) => {
                return Err(CdpError::WrongIndexing);
            }
            (BackendKind::PackedQueue, indexing) if indexing != Indexing::Insertion => {
                return Err(CdpError::WrongIndexing);
            }
            _ => {}
        }

        let compare = match &extra {
            StoreExtra::Compare(f) => Some(f.clone()),
            _ => None,
        };
        if indexing == Indexing::ByFunction && compare.is_none() && kind != BackendKind::Octree {
            return Err(CdpError::WrongIndexing);
        }

        let backend = match kind {
            BackendKind::LinkedList => Backend::LinkedList(linked_list::LinkedListBackend::new()),
            BackendKind::Array => {
                let capacity = match extra {
                    StoreExtra::Capacity(c) => c,
                    _ => 0,
                };
                Backend::Array(array::ArrayBackend::new(capacity))
            }
            BackendKind::PackedQueue => {
                let capacity = match extra {
                    StoreExtra::Capacity(c) => c.max(1),
                    _ => 8,
                };
                Backend::PackedQueue(packed_queue::PackedQueueBackend::new(capacity))
            }
            BackendKind::RedBlack => Backend::RedBlack(red_black::RedBlackBackend::new()),
            BackendKind::Octree => {
                let (bound, fit) = match extra {
                    StoreExtra::Octree { bound, fit } => (bound, fit),
                    _ => return Err(CdpError::WrongBackend),
                };
                Backend::Octree(octree::OctreeBackend::new(bound, fit))
            }
        };

        Ok(Self {
            dt,
            attribute,
            owner,
            indexing,
            writable: true,
            locked: false,
            child_count: 0,
            autoid: AutoIdCounter::new(),
            compare,
            agents: AgentChain::new(),
            next: None,
            backend,
        })
    }

    fn store_of<'a>(tree: &'a Tree, owner: RecordId) -> CdpResult<&'a Store> {
        tree.get(owner)?.store.as_ref().ok_or(CdpError::WrongBackend)
    }

    pub(crate) fn store_of_mut<'a>(tree: &'a mut Tree, owner: RecordId) -> CdpResult<&'a mut Store> {
        tree.get_mut(owner)?.store.as_mut().ok_or(CdpError::WrongBackend)
    }

    /// Resolves `Id::AUTOID` against the store's counter, and advances the
    /// counter past any explicit `Numeric` name already at or beyond it
    /// (spec.md §3 autoid invariant).
    fn resolve_name(tree: &mut Tree, owner: RecordId, child: RecordId) -> CdpResult<Dt> {
        let child_name = tree.get(child)?.name;
        let store = Self::store_of_mut(tree, owner)?;
        let resolved = if child_name.tag.is_auto() {
            let next = store.autoid.next()?;
            Dt::new(child_name.domain, next)
        } else {
            if child_name.tag.naming() == Naming::Numeric {
                store.autoid.observe_explicit(child_name.tag.payload());
            }
            child_name
        };
        tree.get_mut(child)?.name = resolved;
        Ok(resolved)
    }

    fn key_comparator(tree: &Tree, owner: RecordId) -> CdpResult<CompareFn> {
        let store = Self::store_of(tree, owner)?;
        match store.indexing {
            Indexing::ByName => Ok(Rc::new(|tree: &Tree, a: RecordId, b: RecordId| {
                tree.get(a).unwrap().name.cmp(&tree.get(b).unwrap().name)
            }) as CompareFn),
            Indexing::ByFunction => store.compare.clone().ok_or(CdpError::WrongIndexing),
            Indexing::ByHash => Ok(Rc::new(|tree: &Tree, a: RecordId, b: RecordId| {
                hash_name(tree.get(a).unwrap().name).cmp(&hash_name(tree.get(b).unwrap().name))
            }) as CompareFn),
            Indexing::Insertion => Err(CdpError::WrongIndexing),
        }
    }

    /// Attaches `child` under `owner`'s store (spec.md §4.3 `add_child`).
    pub fn add_child(tree: &mut Tree, owner: RecordId, context: AddContext, child: RecordId) -> CdpResult<RecordId> {
        {
            let store = Self::store_of(tree, owner)?;
            if store.locked {
                return Err(CdpError::Locked);
            }
            if !store.writable {
                return Err(CdpError::ReadOnly);
            }
        }
        Self::resolve_name(tree, owner, child)?;

        let indexing = Self::store_of(tree, owner)?.indexing;
        match indexing {
            Indexing::Insertion => {
                let kind = Self::store_of(tree, owner)?.backend.kind();
                match kind {
                    BackendKind::LinkedList => linked_list::insert_at(tree, owner, context, child)?,
                    BackendKind::Array => array::insert_at(tree, owner, context, child)?,
                    BackendKind::PackedQueue => packed_queue::insert_at(tree, owner, context, child)?,
                    BackendKind::RedBlack | BackendKind::Octree => return Err(CdpError::WrongBackend),
                }
            }
            Indexing::ByName | Indexing::ByFunction | Indexing::ByHash => {
                let kind = Self::store_of(tree, owner)?.backend.kind();
                match kind {
                    BackendKind::Octree => octree::insert(tree, owner, child)?,
                    BackendKind::LinkedList | BackendKind::Array | BackendKind::RedBlack => {
                        let cmp = Self::key_comparator(tree, owner)?;
                        // Uniqueness is required for `ByName` on any backend, and always
                        // for Red-Black (whose indexing is ByName/ByFunction/ByHash but
                        // whose tree structure can't hold two equal keys). A `ByFunction`
                        // catalog on LinkedList/Array accepts ties (spec.md §3).
                        let unique = indexing == Indexing::ByName || kind == BackendKind::RedBlack;
                        match kind {
                            BackendKind::LinkedList => linked_list::sorted_insert(tree, owner, child, cmp.as_ref(), unique)?,
                            BackendKind::Array => array::sorted_insert(tree, owner, child, cmp.as_ref(), unique)?,
                            BackendKind::RedBlack => red_black::sorted_insert(tree, owner, child, cmp.as_ref())?,
                            _ => unreachable!(),
                        }
                    }
                    BackendKind::PackedQueue => return Err(CdpError::WrongBackend),
                }
            }
        }
        Self::store_of_mut(tree, owner)?.child_count += 1;
        Ok(child)
    }

    /// Bypasses indexing; only valid for `ByInsertion` backends.
    pub fn append_child(tree: &mut Tree, owner: RecordId, prepend: bool, child: RecordId) -> CdpResult<RecordId> {
        {
            let store = Self::store_of(tree, owner)?;
            if store.indexing != Indexing::Insertion {
                return Err(CdpError::WrongIndexing);
            }
            if store.locked {
                return Err(CdpError::Locked);
            }
            if !store.writable {
                return Err(CdpError::ReadOnly);
            }
        }
        let context = if prepend { AddContext::Prepend } else { AddContext::Append };
        let kind = Self::store_of(tree, owner)?.backend.kind();
        match kind {
            BackendKind::LinkedList => linked_list::insert_at(tree, owner, context, child)?,
            BackendKind::Array => array::insert_at(tree, owner, context, child)?,
            BackendKind::PackedQueue => packed_queue::insert_at(tree, owner, context, child)?,
            BackendKind::RedBlack | BackendKind::Octree => return Err(CdpError::WrongBackend),
        }
        Self::store_of_mut(tree, owner)?.child_count += 1;
        Ok(child)
    }

    pub fn first(tree: &Tree, owner: RecordId) -> CdpResult<Option<RecordId>> {
        let store = Self::store_of(tree, owner)?;
        Ok(match &store.backend {
            Backend::LinkedList(b) => b.head,
            Backend::Array(b) => b.items.first().copied(),
            Backend::PackedQueue(b) => b.first(),
            Backend::RedBlack(b) => b.leftmost(tree),
            Backend::Octree(_) => octree::order(tree, owner)?.first().copied(),
        })
    }

    pub fn last(tree: &Tree, owner: RecordId) -> CdpResult<Option<RecordId>> {
        let store = Self::store_of(tree, owner)?;
        Ok(match &store.backend {
            Backend::LinkedList(b) => b.tail,
            Backend::Array(b) => b.items.last().copied(),
            Backend::PackedQueue(b) => b.last(),
            Backend::RedBlack(b) => b.rightmost(tree),
            Backend::Octree(_) => octree::order(tree, owner)?.last().copied(),
        })
    }

    /// Linear scan by name. Shared across backends for simplicity (spec.md
    /// only mandates O(n) for Linked List; the others don't gain enough from
    /// a specialized path at this scale to be worth the extra code).
    pub fn find_by_name(tree: &Tree, owner: RecordId, name: Dt) -> CdpResult<Option<RecordId>> {
        for id in Self::order(tree, owner)? {
            if tree.get(id)?.name == name {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    pub fn find_by_key(
        tree: &Tree,
        owner: RecordId,
        compare: &dyn Fn(&Tree, RecordId, RecordId) -> Ordering,
        key: RecordId,
    ) -> CdpResult<Option<RecordId>> {
        for id in Self::order(tree, owner)? {
            if compare(tree, key, id) == Ordering::Equal {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    pub fn find_by_position(tree: &Tree, owner: RecordId, position: usize) -> CdpResult<Option<RecordId>> {
        Ok(Self::order(tree, owner)?.get(position).copied())
    }

    pub fn prev(tree: &Tree, owner: RecordId, child: RecordId) -> CdpResult<Option<RecordId>> {
        let store = Self::store_of(tree, owner)?;
        Ok(match &store.backend {
            Backend::LinkedList(_) => tree.links(child)?.list_prev,
            Backend::Array(b) => b.neighbor(child, -1),
            Backend::PackedQueue(b) => b.neighbor(child, -1),
            Backend::RedBlack(_) => red_black::predecessor(tree, child),
            Backend::Octree(_) => neighbor_in(&octree::order(tree, owner)?, child, -1),
        })
    }

    pub fn next(tree: &Tree, owner: RecordId, child: RecordId) -> CdpResult<Option<RecordId>> {
        let store = Self::store_of(tree, owner)?;
        Ok(match &store.backend {
            Backend::LinkedList(_) => tree.links(child)?.list_next,
            Backend::Array(b) => b.neighbor(child, 1),
            Backend::PackedQueue(b) => b.neighbor(child, 1),
            Backend::RedBlack(_) => red_black::successor(tree, child),
            Backend::Octree(_) => neighbor_in(&octree::order(tree, owner)?, child, 1),
        })
    }

    /// Detaches `child` from `owner`'s store without finalizing it.
    pub fn remove_child(tree: &mut Tree, owner: RecordId, child: RecordId) -> CdpResult<()> {
        let kind = Self::store_of(tree, owner)?.backend.kind();
        match kind {
            BackendKind::LinkedList => linked_list::remove(tree, owner, child)?,
            BackendKind::Array => array::remove(tree, owner, child)?,
            BackendKind::PackedQueue => packed_queue::remove(tree, owner, child)?,
            BackendKind::RedBlack => red_black::remove(tree, owner, child)?,
            BackendKind::Octree => octree::remove(tree, owner, child)?,
        }
        Self::store_of_mut(tree, owner)?.child_count -= 1;
        Ok(())
    }

    pub fn take(tree: &mut Tree, owner: RecordId) -> CdpResult<Option<RecordId>> {
        let kind = Self::store_of(tree, owner)?.backend.kind();
        if kind == BackendKind::PackedQueue {
            let id = packed_queue::take(tree, owner)?;
            if id.is_some() {
                Self::store_of_mut(tree, owner)?.child_count -= 1;
            }
            return Ok(id);
        }
        match Self::last(tree, owner)? {
            Some(id) => {
                Self::remove_child(tree, owner, id)?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    pub fn pop(tree: &mut Tree, owner: RecordId) -> CdpResult<Option<RecordId>> {
        let kind = Self::store_of(tree, owner)?.backend.kind();
        if kind == BackendKind::PackedQueue {
            let id = packed_queue::pop(tree, owner)?;
            if id.is_some() {
                Self::store_of_mut(tree, owner)?.child_count -= 1;
            }
            return Ok(id);
        }
        match Self::first(tree, owner)? {
            Some(id) => {
                Self::remove_child(tree, owner, id)?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Ordered enumeration of every child, per the backend's discipline
    /// (spec.md §5 ordering guarantees).
    pub fn order(tree: &Tree, owner: RecordId) -> CdpResult<Vec<RecordId>> {
        let store = Self::store_of(tree, owner)?;
        Ok(match &store.backend {
            Backend::LinkedList(b) => b.order(tree),
            Backend::Array(b) => b.items.clone(),
            Backend::PackedQueue(b) => b.order(),
            Backend::RedBlack(b) => b.order(tree),
            Backend::Octree(_) => octree::order(tree, owner)?,
        })
    }

    pub fn len(tree: &Tree, owner: RecordId) -> CdpResult<usize> {
        Ok(Self::store_of(tree, owner)?.child_count)
    }

    /// Resets backend storage to empty, keeping the store (and its config)
    /// alive for future inserts (spec.md §4.3 `delete_children`).
    pub fn clear(tree: &mut Tree, owner: RecordId) -> CdpResult<()> {
        let store = Self::store_of_mut(tree, owner)?;
        match &mut store.backend {
            Backend::LinkedList(b) => b.clear(),
            Backend::Array(b) => b.items.clear(),
            Backend::PackedQueue(b) => b.clear(),
            Backend::RedBlack(b) => b.root = None,
            Backend::Octree(b) => b.clear(),
        }
        store.child_count = 0;
        Ok(())
    }

    /// Re-sorts an `Insertion`-indexed store's backend in place by `cmp`.
    pub fn sort(tree: &mut Tree, owner: RecordId, cmp: &dyn Fn(&Tree, RecordId, RecordId) -> Ordering) -> CdpResult<()> {
        let indexing = Self::store_of(tree, owner)?.indexing;
        if indexing != Indexing::Insertion {
            return Err(CdpError::WrongIndexing);
        }
        let kind = Self::store_of(tree, owner)?.backend.kind();
        let mut order = Self::order(tree, owner)?;
        order.sort_by(|&a, &b| cmp(tree, a, b));
        match kind {
            BackendKind::LinkedList => linked_list::relink(tree, owner, &order)?,
            BackendKind::Array => {
                if let Backend::Array(b) = &mut Self::store_of_mut(tree, owner)?.backend {
                    b.items = order;
                }
            }
            BackendKind::PackedQueue | BackendKind::RedBlack | BackendKind::Octree => {
                return Err(CdpError::WrongBackend);
            }
        }
        Ok(())
    }

    /// Converts an `Insertion`-indexed Linked List/Array store to `ByName`
    /// indexing in place, re-threading its current children by name order.
    pub fn to_dictionary(tree: &mut Tree, owner: RecordId) -> CdpResult<()> {
        let indexing = Self::store_of(tree, owner)?.indexing;
        if indexing != Indexing::Insertion {
            return Err(CdpError::WrongIndexing);
        }
        let kind = Self::store_of(tree, owner)?.backend.kind();
        if !matches!(kind, BackendKind::LinkedList | BackendKind::Array) {
            return Err(CdpError::WrongBackend);
        }
        let name_cmp = |tree: &Tree, a: RecordId, b: RecordId| tree.get(a).unwrap().name.cmp(&tree.get(b).unwrap().name);
        Self::sort(tree, owner, &name_cmp)?;
        Self::store_of_mut(tree, owner)?.indexing = Indexing::ByName;
        Ok(())
    }
}

/// Detaches `owner`'s backend so it can be mutated standalone while `tree`
/// stays free for sibling-link/comparator access. Used internally by backend
/// modules whose mutation needs both at once.
pub(crate) fn take_backend(tree: &mut Tree, owner: RecordId) -> CdpResult<Backend> {
    let store = Store::store_of_mut(tree, owner)?;
    Ok(std::mem::replace(
        &mut store.backend,
        Backend::LinkedList(linked_list::LinkedListBackend::new()),
    ))
}

pub(crate) fn put_backend(tree: &mut Tree, owner: RecordId, backend: Backend) -> CdpResult<()> {
    Store::store_of_mut(tree, owner)?.backend = backend;
    Ok(())
}

fn neighbor_in(order: &[RecordId], id: RecordId, delta: isize) -> Option<RecordId> {
    let pos = order.iter().position(|&x| x == id)? as isize;
    let target = pos + delta;
    if target < 0 {
        return None;
    }
    order.get(target as usize).copied()
}

fn hash_name(dt: Dt) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    dt.hash(&mut hasher);
    hasher.finish()
}
