//! The record arena: `Record`, its lifecycle, and the record algebra of
//! spec.md §4.5 (`add`/`remove`/`find_*`/`path`/...).
//!
//! Records live in a single [`Tree`] arena keyed by [`RecordId`], the Rust
//! realization of the "back-pointer web" Design Notes call out: a record's
//! `parent` names *which record* owns it (looked up indirectly through the
//! arena) rather than holding a raw pointer into a buffer that might move.

use std::collections::HashSet;

use crate::agent::{self, Action};
use crate::data::Data;
use crate::error::{CdpError, CdpResult};
use crate::ident::Dt;
use crate::store::{AddContext, Store};

/// A handle into a [`Tree`]. Stable across insertions and removals of
/// *other* records; never reused while the record it names is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub usize);

/// The three live record kinds (`Void` is the absence of a record, i.e. `None`
/// at the Rust level rather than a variant here).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Normal,
    Flex,
    Link,
}

/// How many links currently target a record. Kept alongside [`ShadowSet`]
/// rather than derived from it so callers can check multiplicity without
/// matching; the two are always kept in sync by [`ShadowSet`]'s own methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shadowing {
    None,
    Single,
    Multiple,
}

/// The set of links pointing at a record (spec.md §3 "Shadow").
#[derive(Debug, Clone, Default)]
pub enum ShadowSet {
    #[default]
    None,
    Single(RecordId),
    Multiple(Vec<RecordId>),
}

impl ShadowSet {
    #[must_use]
    pub fn state(&self) -> Shadowing {
        match self {
            Self::None => Shadowing::None,
            Self::Single(_) => Shadowing::Single,
            Self::Multiple(_) => Shadowing::Multiple,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn add(&mut self, linker: RecordId) {
        *self = match std::mem::take(self) {
            Self::None => Self::Single(linker),
            Self::Single(existing) if existing == linker => Self::Single(existing),
            Self::Single(existing) => Self::Multiple(vec![existing, linker]),
            Self::Multiple(mut all) => {
                if !all.contains(&linker) {
                    all.push(linker);
                }
                Self::Multiple(all)
            }
        };
    }

    pub fn remove(&mut self, linker: RecordId) {
        *self = match std::mem::take(self) {
            Self::None => Self::None,
            Self::Single(existing) if existing == linker => Self::None,
            Self::Single(existing) => Self::Single(existing),
            Self::Multiple(mut all) => {
                all.retain(|&id| id != linker);
                match all.len() {
                    0 => Self::None,
                    1 => Self::Single(all[0]),
                    _ => Self::Multiple(all),
                }
            }
        };
    }

    #[must_use]
    pub fn holders(&self) -> Vec<RecordId> {
        match self {
            Self::None => Vec::new(),
            Self::Single(id) => vec![*id],
            Self::Multiple(all) => all.clone(),
        }
    }
}

/// A single node of the tree: a name, optional data, optional store, and
/// (for `Link` records) the record it targets.
#[derive(Debug)]
pub struct Record {
    pub name: Dt,
    pub rtype: RecordType,
    pub hidden: bool,
    /// The store of the *parent* record, never the parent record itself
    /// (spec.md §3). `None` for the root and for floating records.
    pub parent: Option<RecordId>,
    pub data: Option<Data>,
    pub store: Option<Store>,
    /// Target of a `Link` record; `None` for non-links.
    pub link: Option<RecordId>,
    pub shadow: ShadowSet,
}

impl Record {
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none() && self.rtype == RecordType::Normal && self.link.is_none()
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.store.as_ref().map_or(0, |s| s.child_count)
    }
}

/// Intrusive per-record bookkeeping used by whichever backend currently owns
/// the record. Only one backend is ever "live" for a given record at a time
/// (a record belongs to at most one store), so these fields simply sit idle
/// under backends that don't use them.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendLinks {
    /// Doubly linked list neighbors: used by `Backend::LinkedList`, and
    /// reused by `Backend::Octree` for the per-node straddling list.
    pub list_prev: Option<RecordId>,
    pub list_next: Option<RecordId>,
    /// Red-black tree links.
    pub rb_left: Option<RecordId>,
    pub rb_right: Option<RecordId>,
    pub rb_parent: Option<RecordId>,
    pub rb_red: bool,
}

#[derive(Debug)]
struct RecordSlot {
    record: Record,
    links: BackendLinks,
}

/// The process-wide arena of records. A single `Tree` backs one
/// [`crate::system::System`]; `root` is always the first record allocated.
#[derive(Debug)]
pub struct Tree {
    slots: Vec<Option<RecordSlot>>,
    free: Vec<usize>,
    pub root: RecordId,
}

impl Tree {
    /// Builds an empty arena with just a root Normal record (name `/`),
    /// store-less until the caller attaches one (see
    /// [`crate::system::System::startup`]).
    #[must_use]
    pub fn new() -> Self {
        let mut tree = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: RecordId(0),
        };
        let root = Record {
            name: Dt::words("system", "root").expect("static root name encodes"),
            rtype: RecordType::Normal,
            hidden: false,
            parent: None,
            data: None,
            store: None,
            link: None,
            shadow: ShadowSet::None,
        };
        let id = tree.alloc(root);
        debug_assert_eq!(id, tree.root);
        tree
    }

    fn alloc(&mut self, record: Record) -> RecordId {
        let slot = RecordSlot {
            record,
            links: BackendLinks::default(),
        };
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(slot);
            RecordId(idx)
        } else {
            self.slots.push(Some(slot));
            RecordId(self.slots.len() - 1)
        }
    }

    fn dealloc(&mut self, id: RecordId) -> Record {
        let slot = self.slots[id.0].take().expect("double free of record slot");
        self.free.push(id.0);
        slot.record
    }

    pub fn get(&self, id: RecordId) -> CdpResult<&Record> {
        self.slots
            .get(id.0)
            .and_then(|s| s.as_ref())
            .map(|s| &s.record)
            .ok_or(CdpError::NotFound)
    }

    pub fn get_mut(&mut self, id: RecordId) -> CdpResult<&mut Record> {
        self.slots
            .get_mut(id.0)
            .and_then(|s| s.as_mut())
            .map(|s| &mut s.record)
            .ok_or(CdpError::NotFound)
    }

    pub(crate) fn links(&self, id: RecordId) -> CdpResult<&BackendLinks> {
        self.slots
            .get(id.0)
            .and_then(|s| s.as_ref())
            .map(|s| &s.links)
            .ok_or(CdpError::NotFound)
    }

    pub(crate) fn links_mut(&mut self, id: RecordId) -> CdpResult<&mut BackendLinks> {
        self.slots
            .get_mut(id.0)
            .and_then(|s| s.as_mut())
            .map(|s| &mut s.links)
            .ok_or(CdpError::NotFound)
    }

    /// Constructs a floating `Normal`/`Flex` record, not yet attached to any
    /// parent (spec.md §3 "Lifecycles"). Attach it with [`Tree::add`] or
    /// [`Tree::append`].
    pub fn initialize(
        &mut self,
        rtype: RecordType,
        name: Dt,
        data: Option<Data>,
        store: Option<Store>,
    ) -> CdpResult<RecordId> {
        if rtype == RecordType::Link {
            return Err(CdpError::WrongRecordType);
        }
        Ok(self.alloc(Record {
            name,
            rtype,
            hidden: false,
            parent: None,
            data,
            store,
            link: None,
            shadow: ShadowSet::None,
        }))
    }

    /// Constructs a floating `Link` record targeting `target`. `target` must
    /// already belong to the tree and not be the root (spec.md §3).
    pub fn initialize_link(&mut self, name: Dt, target: RecordId) -> CdpResult<RecordId> {
        if target == self.root {
            return Err(CdpError::IsRoot);
        }
        self.get(target)?;
        let id = self.alloc(Record {
            name,
            rtype: RecordType::Link,
            hidden: false,
            parent: None,
            data: None,
            store: None,
            link: Some(target),
            shadow: ShadowSet::None,
        });
        self.get_mut(target)?.shadow.add(id);
        Ok(id)
    }

    /// Destroys a floating or attached record. Fails if it's the root, or if
    /// it or any descendant is still targeted by links (spec.md §4.5, §8:
    /// every shadow holder's link must be cleared before the target's
    /// memory is released, not just the deletion's root).
    pub fn finalize(&mut self, id: RecordId) -> CdpResult<()> {
        if id == self.root {
            return Err(CdpError::IsRoot);
        }
        if self.subtree_has_shadows(id)? {
            return Err(CdpError::HasShadows);
        }
        let record = self.get(id)?;
        if record.parent.is_some() {
            self.remove(id, Some(()))?;
            return Ok(());
        }
        self.finalize_floating(id)
    }

    /// True if `id` or any record in its subtree is still targeted by a link.
    fn subtree_has_shadows(&self, id: RecordId) -> CdpResult<bool> {
        if !self.get(id)?.shadow.is_empty() {
            return Ok(true);
        }
        if self.get(id)?.store.is_some() {
            for child in Store::order(self, id)? {
                if self.subtree_has_shadows(child)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Finalizes a record already detached from its parent store.
    fn finalize_floating(&mut self, id: RecordId) -> CdpResult<()> {
        let record = self.get(id)?;
        if let RecordType::Link = record.rtype {
            if let Some(target) = record.link {
                self.get_mut(target)?.shadow.remove(id);
            }
        }
        if let Some(store) = &self.get(id)?.store {
            let _ = store;
            self.delete_children(id)?;
        }
        self.dealloc(id);
        Ok(())
    }

    /// Attaches a floating `child` under `record`'s store at the position
    /// dictated by `context` (for `ByInsertion` stores) or by the store's
    /// indexing discipline (for sorted stores, where `context` is ignored).
    pub fn add(&mut self, record: RecordId, context: AddContext, child: RecordId) -> CdpResult<RecordId> {
        if self.get(child)?.parent.is_some() {
            return Err(CdpError::WrongRecordType);
        }
        Store::add_child(self, record, context, child)?;
        self.get_mut(child)?.parent = Some(record);
        Ok(child)
    }

    /// Bypasses indexing; valid only for `ByInsertion` stores.
    pub fn append(&mut self, record: RecordId, prepend: bool, child: RecordId) -> CdpResult<RecordId> {
        if self.get(child)?.parent.is_some() {
            return Err(CdpError::WrongRecordType);
        }
        Store::append_child(self, record, prepend, child)?;
        self.get_mut(child)?.parent = Some(record);
        Ok(child)
    }

    pub fn first(&self, record: RecordId) -> CdpResult<Option<RecordId>> {
        Store::first(self, record)
    }

    pub fn last(&self, record: RecordId) -> CdpResult<Option<RecordId>> {
        Store::last(self, record)
    }

    pub fn find_by_name(&self, record: RecordId, name: Dt) -> CdpResult<Option<RecordId>> {
        Store::find_by_name(self, record, name)
    }

    pub fn find_by_key(
        &self,
        record: RecordId,
        compare: &dyn Fn(&Tree, RecordId, RecordId) -> std::cmp::Ordering,
        key: RecordId,
    ) -> CdpResult<Option<RecordId>> {
        Store::find_by_key(self, record, compare, key)
    }

    pub fn find_by_position(&self, record: RecordId, position: usize) -> CdpResult<Option<RecordId>> {
        Store::find_by_position(self, record, position)
    }

    /// Walks `start` through `path`, one DT per hop, via `find_by_name`.
    pub fn find_by_path(&self, start: RecordId, path: &[Dt]) -> CdpResult<Option<RecordId>> {
        let mut current = start;
        for dt in path {
            match self.find_by_name(current, *dt)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    pub fn prev(&self, record: RecordId, child: RecordId) -> CdpResult<Option<RecordId>> {
        Store::prev(self, record, child)
    }

    pub fn next(&self, record: RecordId, child: RecordId) -> CdpResult<Option<RecordId>> {
        Store::next(self, record, child)
    }

    /// Resolves a `Link` record to its target, failing with
    /// `CdpError::LinkDangling` if the target has left the tree since the
    /// link was created (spec.md §7 "Link dangling" — a caller error, since
    /// the engine itself never lets a live link outlive its target: removal
    /// of a shadowed record is rejected by [`Tree::remove`]/[`Tree::finalize`]).
    pub fn deref_link(&self, link: RecordId) -> CdpResult<RecordId> {
        let record = self.get(link)?;
        if record.rtype != RecordType::Link {
            return Err(CdpError::WrongRecordType);
        }
        let target = record.link.ok_or(CdpError::LinkDangling)?;
        if self.get(target).is_err() {
            return Err(CdpError::LinkDangling);
        }
        Ok(target)
    }

    /// Root-to-leaf sequence of names, walking up via each record's parent
    /// store owner (spec.md §4.5 "Key algorithm").
    pub fn path(&self, record: RecordId) -> CdpResult<Vec<Dt>> {
        let mut names = Vec::new();
        let mut current = record;
        loop {
            let rec = self.get(current)?;
            if current == self.root {
                break;
            }
            names.push(rec.name);
            current = rec.parent.ok_or(CdpError::NotFound)?;
        }
        names.reverse();
        Ok(names)
    }

    /// Moves the last child out of `record`'s store.
    pub fn take(&mut self, record: RecordId) -> CdpResult<RecordId> {
        let child = Store::take(self, record)?.ok_or(CdpError::EmptyStore)?;
        self.get_mut(child)?.parent = None;
        Ok(child)
    }

    /// Moves the first child out of `record`'s store.
    pub fn pop(&mut self, record: RecordId) -> CdpResult<RecordId> {
        let child = Store::pop(self, record)?.ok_or(CdpError::EmptyStore)?;
        self.get_mut(child)?.parent = None;
        Ok(child)
    }

    /// Detaches `record` from its parent store. If `finalize_it` is true the
    /// record (and its subtree) is destroyed instead of returned floating,
    /// and the whole subtree is checked for shadows first (spec.md §8).
    pub fn remove(&mut self, record: RecordId, finalize_it: Option<()>) -> CdpResult<Option<RecordId>> {
        if record == self.root {
            return Err(CdpError::IsRoot);
        }
        if finalize_it.is_some() {
            if self.subtree_has_shadows(record)? {
                return Err(CdpError::HasShadows);
            }
        } else if !self.get(record)?.shadow.is_empty() {
            return Err(CdpError::HasShadows);
        }
        let parent = self.get(record)?.parent.ok_or(CdpError::NotFound)?;
        Store::remove_child(self, parent, record)?;
        self.get_mut(record)?.parent = None;
        if finalize_it.is_some() {
            self.finalize_floating(record)?;
            Ok(None)
        } else {
            Ok(Some(record))
        }
    }

    /// Deletes every child of `record`, preserving backend state so more
    /// children can be added afterward (spec.md §4.3 `delete_children`).
    /// Refuses if any descendant is still targeted by a link (spec.md §8).
    pub fn delete_children(&mut self, record: RecordId) -> CdpResult<()> {
        let order = Store::order(self, record)?;
        for &child in &order {
            if self.subtree_has_shadows(child)? {
                return Err(CdpError::HasShadows);
            }
        }
        for child in order {
            self.get_mut(child)?.parent = None;
            self.finalize_floating(child)?;
        }
        Store::clear(self, record)?;
        Ok(())
    }

    /// Re-sorts an insertion-indexed store using `cmp`. Fails for stores that
    /// are already sorted by indexing, or whose backend can't hold an
    /// arbitrary order (spec.md §4.5).
    pub fn sort(
        &mut self,
        record: RecordId,
        cmp: &dyn Fn(&Tree, RecordId, RecordId) -> std::cmp::Ordering,
    ) -> CdpResult<()> {
        Store::sort(self, record, cmp)
    }

    /// Converts an insertion-indexed store's backend into a name-indexed one
    /// in place, re-threading existing children by name order (spec.md
    /// §4.5). Only meaningful for `Backend::LinkedList`/`Array`.
    pub fn to_dictionary(&mut self, record: RecordId) -> CdpResult<()> {
        Store::to_dictionary(self, record)
    }

    /// Single-level ordered walk of `record`'s children (spec.md §4.5
    /// `traverse`). Stops and returns `false` as soon as `visit` does.
    pub fn traverse(
        &self,
        record: RecordId,
        visit: &mut dyn FnMut(&Tree, &crate::traverse::Entry) -> bool,
    ) -> CdpResult<bool> {
        crate::traverse::traverse(self, record, visit)
    }

    /// Iterative depth-first walk of the whole subtree rooted at `record`
    /// (spec.md §4.5 `deep_traverse`).
    pub fn deep_traverse(
        &self,
        record: RecordId,
        descend: &mut dyn FnMut(&Tree, &crate::traverse::Entry) -> bool,
        ascend: &mut dyn FnMut(&Tree, &crate::traverse::Entry) -> bool,
    ) -> CdpResult<bool> {
        crate::traverse::deep_traverse(self, record, descend, ascend)
    }

    /// Dispatches a Data/Store-level agent action against `record`.
    pub fn dispatch(&mut self, record: RecordId, action: Action, value: u64) -> CdpResult<agent::Status> {
        if action.is_instance() {
            agent::dispatch_instance(self, record, record, action, value)
        } else {
            match action {
                Action::DataNew | Action::DataUpdate | Action::DataDelete => {
                    agent::dispatch_data(self, record, record, action, value)
                }
                Action::StoreNew | Action::StoreAddItem | Action::StoreRemoveItem | Action::StoreDelete => {
                    agent::dispatch_store(self, record, record, action, value)
                }
                _ => unreachable!("instance actions handled above"),
            }
        }
    }

    /// Internal consistency assertion exercised by tests: `child_count`
    /// matches the number of ids `Store::order` yields, and no record
    /// appears twice in any store (spec.md §3 invariants).
    #[cfg(test)]
    pub(crate) fn debug_check_invariants(&self, record: RecordId) -> CdpResult<()> {
        let order = Store::order(self, record)?;
        let count = self.get(record)?.child_count();
        assert_eq!(order.len(), count, "childCount must match enumerable children");
        let mut seen = HashSet::new();
        for id in order {
            assert!(seen.insert(id), "duplicate child in store order");
            assert_eq!(self.get(id)?.parent, Some(record), "parent back-reference mismatch");
        }
        Ok(())
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}
