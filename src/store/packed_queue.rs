//! Packed queue backend (spec.md §4.4.3): a deque of fixed-capacity chunks.
//! Always `Insertion`-indexed; only `Prepend`/`Append` are valid placements,
//! matching a queue/deque's actual access pattern rather than a general
//! insert-at-position list.

use std::collections::VecDeque;

use crate::error::{CdpError, CdpResult};
use crate::record::{RecordId, Tree};
use crate::store::{AddContext, Backend, Store};

#[derive(Debug, Clone)]
pub struct PackedQueueBackend {
    chunks: VecDeque<Vec<RecordId>>,
    chunk_capacity: usize,
}

impl PackedQueueBackend {
    #[must_use]
    pub fn new(chunk_capacity: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            chunk_capacity,
        }
    }

    #[must_use]
    pub fn first(&self) -> Option<RecordId> {
        self.chunks.front().and_then(|c| c.first().copied())
    }

    #[must_use]
    pub fn last(&self) -> Option<RecordId> {
        self.chunks.back().and_then(|c| c.last().copied())
    }

    #[must_use]
    pub fn order(&self) -> Vec<RecordId> {
        self.chunks.iter().flatten().copied().collect()
    }

    #[must_use]
    pub fn neighbor(&self, id: RecordId, delta: isize) -> Option<RecordId> {
        let order = self.order();
        let pos = order.iter().position(|&x| x == id)? as isize;
        let target = pos + delta;
        if target < 0 {
            return None;
        }
        order.get(target as usize).copied()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    fn push_back(&mut self, child: RecordId) {
        match self.chunks.back_mut() {
            Some(chunk) if chunk.len() < self.chunk_capacity => chunk.push(child),
            _ => self.chunks.push_back(vec![child]),
        }
    }

    fn push_front(&mut self, child: RecordId) {
        match self.chunks.front_mut() {
            Some(chunk) if chunk.len() < self.chunk_capacity => chunk.insert(0, child),
            _ => self.chunks.push_front(vec![child]),
        }
    }

    fn pop_back(&mut self) -> Option<RecordId> {
        let chunk = self.chunks.back_mut()?;
        let id = chunk.pop();
        if chunk.is_empty() {
            self.chunks.pop_back();
        }
        id
    }

    fn pop_front(&mut self) -> Option<RecordId> {
        let chunk = self.chunks.front_mut()?;
        let id = if chunk.is_empty() { None } else { Some(chunk.remove(0)) };
        if chunk.is_empty() {
            self.chunks.pop_front();
        }
        id
    }

    /// Only the current first or last element may be removed directly
    /// (spec.md §4.4.3: "removing anywhere else is rejected" — a packed
    /// queue supports queue/deque semantics only, never arbitrary splice).
    fn remove_one(&mut self, child: RecordId) -> CdpResult<()> {
        if self.first() == Some(child) {
            self.pop_front();
            return Ok(());
        }
        if self.last() == Some(child) {
            self.pop_back();
            return Ok(());
        }
        if self.order().contains(&child) {
            return Err(CdpError::WrongIndexing);
        }
        Err(CdpError::NotFound)
    }
}

fn as_queue(backend: &mut Backend) -> CdpResult<&mut PackedQueueBackend> {
    match backend {
        Backend::PackedQueue(b) => Ok(b),
        _ => Err(CdpError::WrongBackend),
    }
}

pub fn insert_at(tree: &mut Tree, owner: RecordId, context: AddContext, child: RecordId) -> CdpResult<()> {
    let b = as_queue(&mut Store::store_of_mut(tree, owner)?.backend)?;
    match context {
        AddContext::Append => b.push_back(child),
        AddContext::Prepend => b.push_front(child),
        AddContext::Index(_) => return Err(CdpError::WrongIndexing),
    }
    Ok(())
}

pub fn remove(tree: &mut Tree, owner: RecordId, child: RecordId) -> CdpResult<()> {
    let b = as_queue(&mut Store::store_of_mut(tree, owner)?.backend)?;
    b.remove_one(child)
}

pub fn take(tree: &mut Tree, owner: RecordId) -> CdpResult<Option<RecordId>> {
    let b = as_queue(&mut Store::store_of_mut(tree, owner)?.backend)?;
    Ok(b.pop_back())
}

pub fn pop(tree: &mut Tree, owner: RecordId) -> CdpResult<Option<RecordId>> {
    let b = as_queue(&mut Store::store_of_mut(tree, owner)?.backend)?;
    Ok(b.pop_front())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::Dt;
    use crate::record::{RecordType, Tree as RecordTree};
    use crate::store::{AddContext, BackendKind, Indexing, Store, StoreExtra};

    fn queue(tree: &mut RecordTree) -> RecordId {
        let name = Dt::words("t", "q").unwrap();
        let store = Store::new(name, 0, tree.root, BackendKind::PackedQueue, Indexing::Insertion, StoreExtra::Capacity(2)).unwrap();
        let id = tree.initialize(RecordType::Normal, name, None, Some(store)).unwrap();
        tree.add(tree.root, AddContext::Append, id).unwrap()
    }

    fn leaf(tree: &mut RecordTree, parent: RecordId, tag: &str) -> RecordId {
        let name = Dt::words("t", tag).unwrap();
        let id = tree.initialize(RecordType::Normal, name, None, None).unwrap();
        tree.add(parent, AddContext::Append, id).unwrap()
    }

    #[test]
    fn append_and_prepend_preserve_order_across_chunks() {
        let mut tree = RecordTree::new();
        let q = queue(&mut tree);
        let a = leaf(&mut tree, q, "a");
        let b = leaf(&mut tree, q, "b");
        let c = leaf(&mut tree, q, "c");
        assert_eq!(Store::order(&tree, q).unwrap(), vec![a, b, c]);
        assert_eq!(Store::first(&tree, q).unwrap(), Some(a));
        assert_eq!(Store::last(&tree, q).unwrap(), Some(c));
    }

    #[test]
    fn removing_a_middle_element_is_rejected() {
        let mut tree = RecordTree::new();
        let q = queue(&mut tree);
        leaf(&mut tree, q, "a");
        let b = leaf(&mut tree, q, "b");
        leaf(&mut tree, q, "c");
        assert_eq!(tree.remove(b, Some(())), Err(CdpError::WrongIndexing));
    }

    #[test]
    fn take_and_pop_remove_from_the_correct_ends() {
        let mut tree = RecordTree::new();
        let q = queue(&mut tree);
        let a = leaf(&mut tree, q, "a");
        leaf(&mut tree, q, "b");
        let c = leaf(&mut tree, q, "c");
        assert_eq!(tree.take(q).unwrap(), c);
        assert_eq!(tree.pop(q).unwrap(), a);
    }
}
