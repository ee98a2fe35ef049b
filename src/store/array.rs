//! Dynamic array backend (spec.md §4.4.2): children held in a plain `Vec`,
//! sorted inserts done by binary search. No intrusive per-record links are
//! needed since neighbors are adjacent `Vec` slots, not a threaded chain.

use std::cmp::Ordering;

use crate::error::{CdpError, CdpResult};
use crate::record::{RecordId, Tree};
use crate::store::{put_backend, take_backend, AddContext, Backend};

#[derive(Debug, Clone, Default)]
pub struct ArrayBackend {
    pub items: Vec<RecordId>,
}

impl ArrayBackend {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn neighbor(&self, id: RecordId, delta: isize) -> Option<RecordId> {
        let pos = self.items.iter().position(|&x| x == id)? as isize;
        let target = pos + delta;
        if target < 0 {
            return None;
        }
        self.items.get(target as usize).copied()
    }
}

fn as_array(backend: &mut Backend) -> CdpResult<&mut ArrayBackend> {
    match backend {
        Backend::Array(b) => Ok(b),
        _ => Err(CdpError::WrongBackend),
    }
}

pub fn insert_at(tree: &mut Tree, owner: RecordId, context: AddContext, child: RecordId) -> CdpResult<()> {
    let mut backend = take_backend(tree, owner)?;
    let result = (|| {
        let b = as_array(&mut backend)?;
        match context {
            AddContext::Append => b.items.push(child),
            AddContext::Prepend => b.items.insert(0, child),
            AddContext::Index(idx) => {
                let idx = idx.min(b.items.len());
                b.items.insert(idx, child);
            }
        }
        Ok(())
    })();
    put_backend(tree, owner, backend)?;
    result
}

/// Inserts `child` in `cmp` order via binary search. `unique` rejects a tie
/// with `DuplicateKey` (spec.md §3: required for `ByName`, never for a
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
        let b = as_array(&mut backend)?;
        if unique {
            let pos = b.items.binary_search_by(|&existing| cmp(tree, existing, child));
            return match pos {
                Ok(_) => Err(CdpError::DuplicateKey),
                Err(idx) => {
                    b.items.insert(idx, child);
                    Ok(())
                }
            };
        }
        let idx = b.items.partition_point(|&existing| cmp(tree, existing, child) != Ordering::Greater);
        b.items.insert(idx, child);
        Ok(())
    })();
    put_backend(tree, owner, backend)?;
    result
}

pub fn remove(tree: &mut Tree, owner: RecordId, child: RecordId) -> CdpResult<()> {
    let mut backend = take_backend(tree, owner)?;
    let result = (|| {
        let b = as_array(&mut backend)?;
        let pos = b.items.iter().position(|&x| x == child).ok_or(CdpError::NotFound)?;
        b.items.remove(pos);
        Ok(())
    })();
    put_backend(tree, owner, backend)?;
    result
}
