//! Traversal over a record's children (spec.md §4.5 `traverse`) and over a
//! whole subtree (`deep_traverse`), both iterative rather than recursive —
//! the same "explicit stack over recursion" choice the teacher makes for
//! block nesting in `bitstream`, kept here so a pathologically deep tree
//! can't blow the call stack.

use crate::error::CdpResult;
use crate::record::{RecordId, Tree};
use crate::store::Store;

/// One step of a traversal: the record visited, its position among its
/// siblings, its neighbors, and (for `deep_traverse`) its depth from the
/// record the walk started at.
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    pub parent: RecordId,
    pub record: RecordId,
    pub prev: Option<RecordId>,
    pub next: Option<RecordId>,
    pub position: usize,
    pub depth: usize,
}

fn entry_at(parent: RecordId, siblings: &[RecordId], position: usize, depth: usize) -> Entry {
    Entry {
        parent,
        record: siblings[position],
        prev: position.checked_sub(1).map(|i| siblings[i]),
        next: siblings.get(position + 1).copied(),
        position,
        depth,
    }
}

/// Visits `record`'s direct children in store order, stopping as soon as
/// `visit` returns `false`. Returns whether every child was visited.
pub fn traverse(tree: &Tree, record: RecordId, visit: &mut dyn FnMut(&Tree, &Entry) -> bool) -> CdpResult<bool> {
    let order = Store::order(tree, record)?;
    for position in 0..order.len() {
        let entry = entry_at(record, &order, position, 0);
        if !visit(tree, &entry) {
            return Ok(false);
        }
    }
    Ok(true)
}

enum Step {
    Descend(Entry),
    Ascend(Entry),
}

fn push_children(parent: RecordId, children: &[RecordId], depth: usize, stack: &mut Vec<Step>) {
    // Push in reverse so the first child is the one popped (and thus
    // visited) next, keeping sibling order left-to-right.
    for position in (0..children.len()).rev() {
        stack.push(Step::Descend(entry_at(parent, children, position, depth)));
    }
}

/// Depth-first walk of the subtree rooted at `record`'s children: `descend`
/// fires on the way down into each record, `ascend` on the way back out of
/// it, so a caller can e.g. push/pop its own scope stack symmetrically.
/// Either callback returning `false` stops the whole walk immediately.
///
/// Implemented with an explicit `Step` stack rather than recursion (spec.md
/// §4.5): an `Ascend` entry is pushed right before its children, so it only
/// surfaces once every descendant underneath has been fully visited — the
/// same trick as a recursive post-order call, without the call stack.
pub fn deep_traverse(
    tree: &Tree,
    record: RecordId,
    descend: &mut dyn FnMut(&Tree, &Entry) -> bool,
    ascend: &mut dyn FnMut(&Tree, &Entry) -> bool,
) -> CdpResult<bool> {
    let mut stack: Vec<Step> = Vec::with_capacity(16);
    let root_children = Store::order(tree, record)?;
    push_children(record, &root_children, 0, &mut stack);

    while let Some(step) = stack.pop() {
        match step {
            Step::Descend(entry) => {
                if !descend(tree, &entry) {
                    return Ok(false);
                }
                stack.push(Step::Ascend(entry));
                let children = Store::order(tree, entry.record)?;
                push_children(entry.record, &children, entry.depth + 1, &mut stack);
            }
            Step::Ascend(entry) => {
                if !ascend(tree, &entry) {
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::Dt;
    use crate::record::RecordType;
    use crate::store::{AddContext, BackendKind, Indexing, StoreExtra};

    fn folder(tree: &mut Tree, parent: RecordId, tag: &str) -> RecordId {
        let name = Dt::words("t", tag).unwrap();
        let store = Store::new(name, 0, parent, BackendKind::LinkedList, Indexing::Insertion, StoreExtra::None).unwrap();
        let id = tree.initialize(RecordType::Normal, name, None, Some(store)).unwrap();
        tree.add(parent, AddContext::Append, id).unwrap()
    }

    fn leaf(tree: &mut Tree, parent: RecordId, tag: &str) -> RecordId {
        let name = Dt::words("t", tag).unwrap();
        let id = tree.initialize(RecordType::Normal, name, None, None).unwrap();
        tree.add(parent, AddContext::Append, id).unwrap()
    }

    #[test]
    fn traverse_visits_direct_children_in_order() {
        let mut tree = Tree::new();
        let top = folder(&mut tree, tree.root, "top");
        leaf(&mut tree, top, "a");
        leaf(&mut tree, top, "b");

        let mut seen = Vec::new();
        traverse(&tree, top, &mut |_tree, entry| {
            seen.push(entry.record);
            true
        })
        .unwrap();
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn deep_traverse_descends_and_ascends_symmetrically() {
        let mut tree = Tree::new();
        let top = folder(&mut tree, tree.root, "top");
        let mid = folder(&mut tree, top, "mid");
        leaf(&mut tree, mid, "leaf");

        let mut descended = Vec::new();
        let mut ascended = Vec::new();
        deep_traverse(
            &tree,
            top,
            &mut |_tree, entry| {
                descended.push(entry.record);
                true
            },
            &mut |_tree, entry| {
                ascended.push(entry.record);
                true
            },
        )
        .unwrap();

        assert_eq!(descended, vec![mid, tree.find_by_name(mid, Dt::words("t", "leaf").unwrap()).unwrap().unwrap()]);
        // Ascend order is the reverse of descend: the leaf finishes before mid.
        assert_eq!(ascended, vec![descended[1], descended[0]]);
    }

    #[test]
    fn stops_early_when_visit_returns_false() {
        let mut tree = Tree::new();
        let top = folder(&mut tree, tree.root, "top");
        leaf(&mut tree, top, "a");
        leaf(&mut tree, top, "b");
        leaf(&mut tree, top, "c");

        let mut count = 0;
        let finished = traverse(&tree, top, &mut |_tree, _entry| {
            count += 1;
            count < 2
        })
        .unwrap();
        assert!(!finished);
        assert_eq!(count, 2);
    }
}
