//! Intrusive doubly-linked list backend (spec.md §4.4.1).
//!
//! Head/tail live in [`LinkedListBackend`]; the `prev`/`next` pointers
//! themselves live on each record's [`crate::record::BackendLinks`], since
//! they travel with the record rather than with the store.

use std::cmp::Ordering;

use crate::error::{CdpError, CdpResult};
use crate::record::{RecordId, Tree};
use crate::store::{take_backend, put_backend, AddContext, Backend};

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkedListBackend {
    pub head: Option<RecordId>,
    pub tail: Option<RecordId>,
}

impl LinkedListBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn order(&self, tree: &Tree) -> Vec<RecordId> {
        let mut out = Vec::new();
        let mut cursor = self.head;
        while let Some(cur) = cursor {
            out.push(cur);
            cursor = tree.links(cur).ok().and_then(|l| l.list_next);
        }
        out
    }

    pub fn clear(&mut self) {
        self.head = None;
        self.tail = None;
    }
}

fn as_linked_list(backend: &mut Backend) -> CdpResult<&mut LinkedListBackend> {
    match backend {
        Backend::LinkedList(b) => Ok(b),
        _ => Err(CdpError::WrongBackend),
    }
}

fn append(b: &mut LinkedListBackend, tree: &mut Tree, child: RecordId) -> CdpResult<()> {
    let old_tail = b.tail;
    tree.links_mut(child)?.list_prev = old_tail;
    tree.links_mut(child)?.list_next = None;
    match old_tail {
        Some(t) => tree.links_mut(t)?.list_next = Some(child),
        None => b.head = Some(child),
    }
    b.tail = Some(child);
    Ok(())
}

fn prepend(b: &mut LinkedListBackend, tree: &mut Tree, child: RecordId) -> CdpResult<()> {
    let old_head = b.head;
    tree.links_mut(child)?.list_next = old_head;
    tree.links_mut(child)?.list_prev = None;
    match old_head {
        Some(h) => tree.links_mut(h)?.list_prev = Some(child),
        None => b.tail = Some(child),
    }
    b.head = Some(child);
    Ok(())
}

/// Attaches `child` per `context`. `Index(n)` walks `n` nodes in from the
/// head and inserts before whatever it lands on, appending if `n` runs past
/// the end.
pub fn insert_at(tree: &mut Tree, owner: RecordId, context: AddContext, child: RecordId) -> CdpResult<()> {
    let mut backend = take_backend(tree, owner)?;
    let result = (|| {
        let b = as_linked_list(&mut backend)?;
        match context {
            AddContext::Append => append(b, tree, child),
            AddContext::Prepend => prepend(b, tree, child),
            AddContext::Index(idx) => {
                let mut cursor = b.head;
                for _ in 0..idx {
                    match cursor {
                        Some(cur) => cursor = tree.links(cur)?.list_next,
                        None => break,
                    }
                }
                match cursor {
                    Some(at) => {
                        let prev = tree.links(at)?.list_prev;
                        tree.links_mut(child)?.list_prev = prev;
                        tree.links_mut(child)?.list_next = Some(at);
                        tree.links_mut(at)?.list_prev = Some(child);
                        match prev {
                            Some(p) => tree.links_mut(p)?.list_next = Some(child),
                            None => b.head = Some(child),
                        }
                        Ok(())
                    }
                    None => append(b, tree, child),
                }
            }
        }
    })();
    put_backend(tree, owner, backend)?;
    result
}

/// Inserts `child` in `cmp` order. `unique` rejects a tie with
/// `DuplicateKey` (spec.md §3: required for `ByName`, never for a
/// `ByFunction` catalog); when ties are allowed, `child` lands after the
/// run of equal keys, preserving insertion order among them.
pub fn sorted_insert(
    tree: &mut Tree,
    owner: RecordId,
    child: RecordId,
    cmp: &dyn Fn(&Tree, RecordId, RecordId) -> Ordering,
    unique: bool,
) -> CdpResult<()> {
    let mut backend = take_backend(tree, owner)?;
    let result = (|| {
        let b = as_linked_list(&mut backend)?;
        let mut cursor = b.head;
        let mut prev = None;
        while let Some(cur) = cursor {
            match cmp(tree, child, cur) {
                Ordering::Equal if unique => return Err(CdpError::DuplicateKey),
                Ordering::Less => break,
                Ordering::Equal | Ordering::Greater => {
                    prev = Some(cur);
                    cursor = tree.links(cur)?.list_next;
                }
            }
        }
        tree.links_mut(child)?.list_prev = prev;
        tree.links_mut(child)?.list_next = cursor;
        match prev {
            Some(p) => tree.links_mut(p)?.list_next = Some(child),
            None => b.head = Some(child),
        }
        match cursor {
            Some(c) => tree.links_mut(c)?.list_prev = Some(child),
            None => b.tail = Some(child),
        }
        Ok(())
    })();
    put_backend(tree, owner, backend)?;
    result
}

pub fn remove(tree: &mut Tree, owner: RecordId, child: RecordId) -> CdpResult<()> {
    let mut backend = take_backend(tree, owner)?;
    let result = (|| {
        let b = as_linked_list(&mut backend)?;
        let links = *tree.links(child)?;
        match links.list_prev {
            Some(p) => tree.links_mut(p)?.list_next = links.list_next,
            None => b.head = links.list_next,
        }
        match links.list_next {
            Some(n) => tree.links_mut(n)?.list_prev = links.list_prev,
            None => b.tail = links.list_prev,
        }
        tree.links_mut(child)?.list_prev = None;
        tree.links_mut(child)?.list_next = None;
        Ok(())
    })();
    put_backend(tree, owner, backend)?;
    result
}

/// Re-threads the whole list to match `order`, used by `Store::sort`.
pub fn relink(tree: &mut Tree, owner: RecordId, order: &[RecordId]) -> CdpResult<()> {
    let mut backend = take_backend(tree, owner)?;
    let result = (|| {
        let b = as_linked_list(&mut backend)?;
        b.head = order.first().copied();
        b.tail = order.last().copied();
        for (i, &id) in order.iter().enumerate() {
            let prev = if i == 0 { None } else { Some(order[i - 1]) };
            let next = order.get(i + 1).copied();
            let links = tree.links_mut(id)?;
            links.list_prev = prev;
            links.list_next = next;
        }
        Ok(())
    })();
    put_backend(tree, owner, backend)?;
    result
}
