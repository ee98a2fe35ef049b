//! Red-Black tree backend (spec.md §4.4.4), ported from the CLRS-style
//! algorithm in the original `cdp_storage_red_black_tree` implementation:
//! rotations, insert-fixup, and delete-fixup, expressed over `RecordId`
//! links instead of raw node pointers (no sentinel `nil` node — `None`
//! stands in for it, with "is this red" treating `None` as black).

use std::cmp::Ordering;

use crate::error::{CdpError, CdpResult};
use crate::record::{RecordId, Tree};
use crate::store::{put_backend, take_backend, Backend};

#[derive(Debug, Clone, Copy, Default)]
pub struct RedBlackBackend {
    pub root: Option<RecordId>,
}

impl RedBlackBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn leftmost(&self, tree: &Tree) -> Option<RecordId> {
        let mut cur = self.root?;
        while let Some(l) = tree.links(cur).ok()?.rb_left {
            cur = l;
        }
        Some(cur)
    }

    #[must_use]
    pub fn rightmost(&self, tree: &Tree) -> Option<RecordId> {
        let mut cur = self.root?;
        while let Some(r) = tree.links(cur).ok()?.rb_right {
            cur = r;
        }
        Some(cur)
    }

    /// Iterative in-order walk with an explicit stack (spec.md §4.5's
    /// preference for iterative traversal over recursion).
    #[must_use]
    pub fn order(&self, tree: &Tree) -> Vec<RecordId> {
        let mut out = Vec::new();
        let mut stack = Vec::new();
        let mut cur = self.root;
        loop {
            while let Some(id) = cur {
                stack.push(id);
                cur = tree.links(id).ok().and_then(|l| l.rb_left);
            }
            match stack.pop() {
                Some(id) => {
                    out.push(id);
                    cur = tree.links(id).ok().and_then(|l| l.rb_right);
                }
                None => break,
            }
        }
        out
    }
}

fn as_red_black(backend: &mut Backend) -> CdpResult<&mut RedBlackBackend> {
    match backend {
        Backend::RedBlack(b) => Ok(b),
        _ => Err(CdpError::WrongBackend),
    }
}

fn is_red(tree: &Tree, id: Option<RecordId>) -> bool {
    match id {
        Some(id) => tree.links(id).map(|l| l.rb_red).unwrap_or(false),
        None => false,
    }
}

pub fn predecessor(tree: &Tree, id: RecordId) -> Option<RecordId> {
    if let Some(mut cur) = tree.links(id).ok()?.rb_left {
        while let Some(r) = tree.links(cur).ok()?.rb_right {
            cur = r;
        }
        return Some(cur);
    }
    let mut cur = id;
    let mut parent = tree.links(cur).ok()?.rb_parent;
    while let Some(p) = parent {
        if tree.links(p).ok()?.rb_left == Some(cur) {
            cur = p;
            parent = tree.links(p).ok()?.rb_parent;
        } else {
            return Some(p);
        }
    }
    None
}

pub fn successor(tree: &Tree, id: RecordId) -> Option<RecordId> {
    if let Some(mut cur) = tree.links(id).ok()?.rb_right {
        while let Some(l) = tree.links(cur).ok()?.rb_left {
            cur = l;
        }
        return Some(cur);
    }
    let mut cur = id;
    let mut parent = tree.links(cur).ok()?.rb_parent;
    while let Some(p) = parent {
        if tree.links(p).ok()?.rb_right == Some(cur) {
            cur = p;
            parent = tree.links(p).ok()?.rb_parent;
        } else {
            return Some(p);
        }
    }
    None
}

fn rotate_left(tree: &mut Tree, root: &mut Option<RecordId>, x: RecordId) -> CdpResult<()> {
    let y = tree.links(x)?.rb_right.ok_or(CdpError::NotFound)?;
    let y_left = tree.links(y)?.rb_left;
    tree.links_mut(x)?.rb_right = y_left;
    if let Some(yl) = y_left {
        tree.links_mut(yl)?.rb_parent = Some(x);
    }
    let x_parent = tree.links(x)?.rb_parent;
    tree.links_mut(y)?.rb_parent = x_parent;
    match x_parent {
        None => *root = Some(y),
        Some(p) => {
            if tree.links(p)?.rb_left == Some(x) {
                tree.links_mut(p)?.rb_left = Some(y);
            } else {
                tree.links_mut(p)?.rb_right = Some(y);
            }
        }
    }
    tree.links_mut(y)?.rb_left = Some(x);
    tree.links_mut(x)?.rb_parent = Some(y);
    Ok(())
}

fn rotate_right(tree: &mut Tree, root: &mut Option<RecordId>, x: RecordId) -> CdpResult<()> {
    let y = tree.links(x)?.rb_left.ok_or(CdpError::NotFound)?;
    let y_right = tree.links(y)?.rb_right;
    tree.links_mut(x)?.rb_left = y_right;
    if let Some(yr) = y_right {
        tree.links_mut(yr)?.rb_parent = Some(x);
    }
    let x_parent = tree.links(x)?.rb_parent;
    tree.links_mut(y)?.rb_parent = x_parent;
    match x_parent {
        None => *root = Some(y),
        Some(p) => {
            if tree.links(p)?.rb_right == Some(x) {
                tree.links_mut(p)?.rb_right = Some(y);
            } else {
                tree.links_mut(p)?.rb_left = Some(y);
            }
        }
    }
    tree.links_mut(y)?.rb_right = Some(x);
    tree.links_mut(x)?.rb_parent = Some(y);
    Ok(())
}

fn fix_insert(tree: &mut Tree, root: &mut Option<RecordId>, mut z: RecordId) -> CdpResult<()> {
    loop {
        let zp = match tree.links(z)?.rb_parent {
            Some(p) if is_red(tree, Some(p)) => p,
            _ => break,
        };
        let zpp = tree.links(zp)?.rb_parent.ok_or(CdpError::NotFound)?;
        if Some(zp) == tree.links(zpp)?.rb_left {
            let y = tree.links(zpp)?.rb_right;
            if is_red(tree, y) {
                tree.links_mut(zp)?.rb_red = false;
                tree.links_mut(y.unwrap())?.rb_red = false;
                tree.links_mut(zpp)?.rb_red = true;
                z = zpp;
            } else {
                let mut z2 = z;
                let mut zp2 = zp;
                if Some(z2) == tree.links(zp2)?.rb_right {
                    z2 = zp2;
                    rotate_left(tree, root, z2)?;
                    zp2 = tree.links(z2)?.rb_parent.ok_or(CdpError::NotFound)?;
                }
                let zpp2 = tree.links(zp2)?.rb_parent.ok_or(CdpError::NotFound)?;
                tree.links_mut(zp2)?.rb_red = false;
                tree.links_mut(zpp2)?.rb_red = true;
                rotate_right(tree, root, zpp2)?;
                z = z2;
            }
        } else {
            let y = tree.links(zpp)?.rb_left;
            if is_red(tree, y) {
                tree.links_mut(zp)?.rb_red = false;
                tree.links_mut(y.unwrap())?.rb_red = false;
                tree.links_mut(zpp)?.rb_red = true;
                z = zpp;
            } else {
                let mut z2 = z;
                let mut zp2 = zp;
                if Some(z2) == tree.links(zp2)?.rb_left {
                    z2 = zp2;
                    rotate_right(tree, root, z2)?;
                    zp2 = tree.links(z2)?.rb_parent.ok_or(CdpError::NotFound)?;
                }
                let zpp2 = tree.links(zp2)?.rb_parent.ok_or(CdpError::NotFound)?;
                tree.links_mut(zp2)?.rb_red = false;
                tree.links_mut(zpp2)?.rb_red = true;
                rotate_left(tree, root, zpp2)?;
                z = z2;
            }
        }
    }
    if let Some(r) = *root {
        tree.links_mut(r)?.rb_red = false;
    }
    Ok(())
}

/// Inserts `child` in BST order per `cmp`, rejecting exact key matches
/// (spec.md §4.4.4 "name already present is rejected").
pub fn sorted_insert(
    tree: &mut Tree,
    owner: RecordId,
    child: RecordId,
    cmp: &dyn Fn(&Tree, RecordId, RecordId) -> Ordering,
) -> CdpResult<()> {
    let mut backend = take_backend(tree, owner)?;
    let result = (|| {
        let b = as_red_black(&mut backend)?;
        let mut root = b.root;
        let mut y = None;
        let mut x = root;
        let mut went_left = false;
        while let Some(cur) = x {
            y = Some(cur);
            match cmp(tree, child, cur) {
                Ordering::Equal => return Err(CdpError::DuplicateKey),
                Ordering::Less => {
                    went_left = true;
                    x = tree.links(cur)?.rb_left;
                }
                Ordering::Greater => {
                    went_left = false;
                    x = tree.links(cur)?.rb_right;
                }
            }
        }
        {
            let links = tree.links_mut(child)?;
            links.rb_left = None;
            links.rb_right = None;
            links.rb_parent = y;
            links.rb_red = true;
        }
        match y {
            None => root = Some(child),
            Some(p) => {
                if went_left {
                    tree.links_mut(p)?.rb_left = Some(child);
                } else {
                    tree.links_mut(p)?.rb_right = Some(child);
                }
            }
        }
        fix_insert(tree, &mut root, child)?;
        b.root = root;
        Ok(())
    })();
    put_backend(tree, owner, backend)?;
    result
}

fn transplant(tree: &mut Tree, root: &mut Option<RecordId>, u: RecordId, v: Option<RecordId>) -> CdpResult<()> {
    let u_parent = tree.links(u)?.rb_parent;
    match u_parent {
        None => *root = v,
        Some(p) => {
            if tree.links(p)?.rb_left == Some(u) {
                tree.links_mut(p)?.rb_left = v;
            } else {
                tree.links_mut(p)?.rb_right = v;
            }
        }
    }
    if let Some(v) = v {
        tree.links_mut(v)?.rb_parent = u_parent;
    }
    Ok(())
}

fn delete_fixup(
    tree: &mut Tree,
    root: &mut Option<RecordId>,
    mut x: Option<RecordId>,
    mut x_parent: Option<RecordId>,
) -> CdpResult<()> {
    while x != *root && !is_red(tree, x) {
        let parent = match x_parent {
            Some(p) => p,
            None => break,
        };
        if x == tree.links(parent)?.rb_left {
            let mut w = tree.links(parent)?.rb_right.ok_or(CdpError::NotFound)?;
            if is_red(tree, Some(w)) {
                tree.links_mut(w)?.rb_red = false;
                tree.links_mut(parent)?.rb_red = true;
                rotate_left(tree, root, parent)?;
                w = tree.links(parent)?.rb_right.ok_or(CdpError::NotFound)?;
            }
            let w_left_red = is_red(tree, tree.links(w)?.rb_left);
            let w_right_red = is_red(tree, tree.links(w)?.rb_right);
            if !w_left_red && !w_right_red {
                tree.links_mut(w)?.rb_red = true;
                x = Some(parent);
                x_parent = tree.links(parent)?.rb_parent;
            } else {
                if !w_right_red {
                    if let Some(wl) = tree.links(w)?.rb_left {
                        tree.links_mut(wl)?.rb_red = false;
                    }
                    tree.links_mut(w)?.rb_red = true;
                    rotate_right(tree, root, w)?;
                    w = tree.links(parent)?.rb_right.ok_or(CdpError::NotFound)?;
                }
                let parent_red = is_red(tree, Some(parent));
                tree.links_mut(w)?.rb_red = parent_red;
                tree.links_mut(parent)?.rb_red = false;
                if let Some(wr) = tree.links(w)?.rb_right {
                    tree.links_mut(wr)?.rb_red = false;
                }
                rotate_left(tree, root, parent)?;
                x = *root;
                x_parent = None;
            }
        } else {
            let mut w = tree.links(parent)?.rb_left.ok_or(CdpError::NotFound)?;
            if is_red(tree, Some(w)) {
                tree.links_mut(w)?.rb_red = false;
                tree.links_mut(parent)?.rb_red = true;
                rotate_right(tree, root, parent)?;
                w = tree.links(parent)?.rb_left.ok_or(CdpError::NotFound)?;
            }
            let w_right_red = is_red(tree, tree.links(w)?.rb_right);
            let w_left_red = is_red(tree, tree.links(w)?.rb_left);
            if !w_right_red && !w_left_red {
                tree.links_mut(w)?.rb_red = true;
                x = Some(parent);
                x_parent = tree.links(parent)?.rb_parent;
            } else {
                if !w_left_red {
                    if let Some(wr) = tree.links(w)?.rb_right {
                        tree.links_mut(wr)?.rb_red = false;
                    }
                    tree.links_mut(w)?.rb_red = true;
                    rotate_left(tree, root, w)?;
                    w = tree.links(parent)?.rb_left.ok_or(CdpError::NotFound)?;
                }
                let parent_red = is_red(tree, Some(parent));
                tree.links_mut(w)?.rb_red = parent_red;
                tree.links_mut(parent)?.rb_red = false;
                if let Some(wl) = tree.links(w)?.rb_left {
                    tree.links_mut(wl)?.rb_red = false;
                }
                rotate_right(tree, root, parent)?;
                x = *root;
                x_parent = None;
            }
        }
    }
    if let Some(x) = x {
        tree.links_mut(x)?.rb_red = false;
    }
    Ok(())
}

fn delete_node(tree: &mut Tree, root: &mut Option<RecordId>, z: RecordId) -> CdpResult<()> {
    let mut y = z;
    let mut y_original_red = is_red(tree, Some(y));
    let x: Option<RecordId>;
    let x_parent: Option<RecordId>;

    let z_left = tree.links(z)?.rb_left;
    let z_right = tree.links(z)?.rb_right;

    if z_left.is_none() {
        x = z_right;
        x_parent = tree.links(z)?.rb_parent;
        transplant(tree, root, z, z_right)?;
    } else if z_right.is_none() {
        x = z_left;
        x_parent = tree.links(z)?.rb_parent;
        transplant(tree, root, z, z_left)?;
    } else {
        let mut cur = z_right.unwrap();
        while let Some(l) = tree.links(cur)?.rb_left {
            cur = l;
        }
        y = cur;
        y_original_red = is_red(tree, Some(y));
        let y_right = tree.links(y)?.rb_right;
        if tree.links(y)?.rb_parent == Some(z) {
            x = y_right;
            x_parent = Some(y);
        } else {
            x = y_right;
            x_parent = tree.links(y)?.rb_parent;
            transplant(tree, root, y, y_right)?;
            let z_right2 = tree.links(z)?.rb_right.unwrap();
            tree.links_mut(y)?.rb_right = Some(z_right2);
            tree.links_mut(z_right2)?.rb_parent = Some(y);
        }
        transplant(tree, root, z, Some(y))?;
        let z_left2 = tree.links(z)?.rb_left.unwrap();
        tree.links_mut(y)?.rb_left = Some(z_left2);
        tree.links_mut(z_left2)?.rb_parent = Some(y);
        let z_red = is_red(tree, Some(z));
        tree.links_mut(y)?.rb_red = z_red;
    }

    if !y_original_red {
        delete_fixup(tree, root, x, x_parent)?;
    }
    let links = tree.links_mut(z)?;
    links.rb_left = None;
    links.rb_right = None;
    links.rb_parent = None;
    links.rb_red = false;
    Ok(())
}

pub fn remove(tree: &mut Tree, owner: RecordId, child: RecordId) -> CdpResult<()> {
    let mut backend = take_backend(tree, owner)?;
    let result = (|| {
        let b = as_red_black(&mut backend)?;
        let mut root = b.root;
        let res = delete_node(tree, &mut root, child);
        b.root = root;
        res
    })();
    put_backend(tree, owner, backend)?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::Dt;
    use crate::record::{RecordType, Tree as RecordTree};
    use crate::store::{BackendKind, Indexing, Store, StoreExtra};
    use std::rc::Rc;

    fn name_cmp() -> crate::store::CompareFn {
        Rc::new(|tree: &RecordTree, a: RecordId, b: RecordId| tree.get(a).unwrap().name.cmp(&tree.get(b).unwrap().name))
    }

    #[test]
    fn inserts_stay_in_sorted_order() {
        let mut tree = RecordTree::new();
        let store = Store::new(
            Dt::words("t", "rb").unwrap(),
            0,
            tree.root,
            BackendKind::RedBlack,
            Indexing::ByFunction,
            StoreExtra::Compare(name_cmp()),
        )
        .unwrap();
        let owner = tree
            .initialize(RecordType::Normal, Dt::words("t", "rb").unwrap(), None, Some(store))
            .unwrap();
        let owner = tree.add(tree.root, crate::store::AddContext::Append, owner).unwrap();

        for tag in ["m", "c", "z", "a", "q", "b"] {
            let child = tree
                .initialize(RecordType::Normal, Dt::words("t", tag).unwrap(), None, None)
                .unwrap();
            tree.add(owner, crate::store::AddContext::Append, child).unwrap();
        }

        let order = Store::order(&tree, owner).unwrap();
        let names: Vec<String> = order
            .iter()
            .map(|&id| tree.get(id).unwrap().name.tag.decode_word().unwrap())
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        tree.debug_check_invariants(owner).unwrap();
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut tree = RecordTree::new();
        let store = Store::new(
            Dt::words("t", "rb").unwrap(),
            0,
            tree.root,
            BackendKind::RedBlack,
            Indexing::ByFunction,
            StoreExtra::Compare(name_cmp()),
        )
        .unwrap();
        let owner = tree
            .initialize(RecordType::Normal, Dt::words("t", "rb").unwrap(), None, Some(store))
            .unwrap();
        let owner = tree.add(tree.root, crate::store::AddContext::Append, owner).unwrap();

        let a = tree.initialize(RecordType::Normal, Dt::words("t", "a").unwrap(), None, None).unwrap();
        tree.add(owner, crate::store::AddContext::Append, a).unwrap();
        let a2 = tree.initialize(RecordType::Normal, Dt::words("t", "a").unwrap(), None, None).unwrap();
        assert_eq!(tree.add(owner, crate::store::AddContext::Append, a2), Err(CdpError::DuplicateKey));
    }

    #[test]
    fn remove_keeps_remaining_order() {
        let mut tree = RecordTree::new();
        let store = Store::new(
            Dt::words("t", "rb").unwrap(),
            0,
            tree.root,
            BackendKind::RedBlack,
            Indexing::ByFunction,
            StoreExtra::Compare(name_cmp()),
        )
        .unwrap();
        let owner = tree
            .initialize(RecordType::Normal, Dt::words("t", "rb").unwrap(), None, Some(store))
            .unwrap();
        let owner = tree.add(tree.root, crate::store::AddContext::Append, owner).unwrap();

        let mut ids = Vec::new();
        for tag in ["m", "c", "z", "a", "q", "b", "x", "d"] {
            let child = tree
                .initialize(RecordType::Normal, Dt::words("t", tag).unwrap(), None, None)
                .unwrap();
            ids.push(tree.add(owner, crate::store::AddContext::Append, child).unwrap());
        }
        for &id in &ids[..4] {
            tree.remove(id, Some(())).unwrap();
        }
        tree.debug_check_invariants(owner).unwrap();
        let order = Store::order(&tree, owner).unwrap();
        assert_eq!(order.len(), 4);
        let names: Vec<String> = order
            .iter()
            .map(|&id| tree.get(id).unwrap().name.tag.decode_word().unwrap())
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
