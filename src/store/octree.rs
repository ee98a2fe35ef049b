//! Octree backend (spec.md §4.4.5): an 8-ary spatial index.
//!
//! The node arena is private to the backend (not the shared record arena) —
//! nodes aren't records, they're pure spatial buckets, so there's nothing to
//! gain from threading them through `RecordId`. Each node holds a
//! "straddling list" of records that don't fit entirely inside any one of
//! its eight octants; `fit` decides that per octant, and subdivision stops
//! once an octant's half-size drops below the node's `epsilon`.
//!
//! (The `original_source` octree header turned out to be a stale copy of the
//! red-black tree file with spatial-looking fields bolted on and never used
//! — see DESIGN.md. This module follows the spec's textual description
//! instead of that file.)

use std::rc::Rc;

use crate::error::{CdpError, CdpResult};
use crate::record::{RecordId, Tree};
use crate::store::{put_backend, take_backend, Backend, Store};

/// An axis-aligned cube: center plus half the side length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OctreeBound {
    pub center: [f64; 3],
    pub half_size: f64,
}

/// Tests whether `record` fits entirely within `bound`. Supplied by the
/// caller at store-construction time, since only they know how to read a
/// record's spatial extent out of its `Data`.
pub type FitFn = Rc<dyn Fn(&Tree, RecordId, &OctreeBound) -> bool>;

#[derive(Debug, Clone)]
struct OctNode {
    bound: OctreeBound,
    children: [Option<usize>; 8],
    records: Vec<RecordId>,
}

pub struct OctreeBackend {
    nodes: Vec<OctNode>,
    fit: FitFn,
    epsilon: f64,
}

impl std::fmt::Debug for OctreeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctreeBackend").field("nodes", &self.nodes.len()).finish()
    }
}

impl OctreeBackend {
    #[must_use]
    pub fn new(bound: OctreeBound, fit: FitFn) -> Self {
        let epsilon = bound.half_size / 1_048_576.0;
        Self {
            nodes: vec![OctNode {
                bound,
                children: [None; 8],
                records: Vec::new(),
            }],
            fit,
            epsilon,
        }
    }

    pub fn clear(&mut self) {
        let bound = self.nodes[0].bound;
        self.nodes.clear();
        self.nodes.push(OctNode {
            bound,
            children: [None; 8],
            records: Vec::new(),
        });
    }

    fn collect(&self, idx: usize, out: &mut Vec<RecordId>) {
        let node = &self.nodes[idx];
        out.extend(node.records.iter().copied());
        for child in node.children.iter().flatten() {
            self.collect(*child, out);
        }
    }
}

fn child_bound(parent: &OctreeBound, octant: usize) -> OctreeBound {
    let h = parent.half_size / 2.0;
    let dx = if octant & 1 != 0 { h } else { -h };
    let dy = if octant & 2 != 0 { h } else { -h };
    let dz = if octant & 4 != 0 { h } else { -h };
    OctreeBound {
        center: [parent.center[0] + dx, parent.center[1] + dy, parent.center[2] + dz],
        half_size: h,
    }
}

fn as_octree(backend: &mut Backend) -> CdpResult<&mut OctreeBackend> {
    match backend {
        Backend::Octree(b) => Ok(b),
        _ => Err(CdpError::WrongBackend),
    }
}

/// Pre-order enumeration: a node's own straddling records, then each
/// occupied octant in turn (spec.md §4.4.5 "stable enough for `traverse`,
/// not meant to be spatially sorted").
pub fn order(tree: &Tree, owner: RecordId) -> CdpResult<Vec<RecordId>> {
    let store = Store::store_of(tree, owner)?;
    let b = match &store.backend {
        Backend::Octree(b) => b,
        _ => return Err(CdpError::WrongBackend),
    };
    let mut out = Vec::new();
    b.collect(0, &mut out);
    Ok(out)
}

/// Descends octant-by-octant, subdividing lazily, until `child` straddles
/// every octant at the current node or the node has hit `epsilon`. Rejects
/// duplicate names regardless of indexing (spec.md §4.4.5).
pub fn insert(tree: &mut Tree, owner: RecordId, child: RecordId) -> CdpResult<()> {
    let child_name = tree.get(child)?.name;
    for id in order(tree, owner)? {
        if tree.get(id)?.name == child_name {
            return Err(CdpError::DuplicateKey);
        }
    }

    let mut backend = take_backend(tree, owner)?;
    let result = (|| {
        let b = as_octree(&mut backend)?;
        let fit = b.fit.clone();
        let epsilon = b.epsilon;
        let mut idx = 0usize;
        loop {
            let bound = b.nodes[idx].bound;
            if bound.half_size / 2.0 < epsilon {
                b.nodes[idx].records.push(child);
                break;
            }
            let mut descended = false;
            for octant in 0..8 {
                let candidate = child_bound(&bound, octant);
                if (*fit)(tree, child, &candidate) {
                    let next = match b.nodes[idx].children[octant] {
                        Some(n) => n,
                        None => {
                            b.nodes.push(OctNode {
                                bound: candidate,
                                children: [None; 8],
                                records: Vec::new(),
                            });
                            let n = b.nodes.len() - 1;
                            b.nodes[idx].children[octant] = Some(n);
                            n
                        }
                    };
                    idx = next;
                    descended = true;
                    break;
                }
            }
            if !descended {
                b.nodes[idx].records.push(child);
                break;
            }
        }
        Ok(())
    })();
    put_backend(tree, owner, backend)?;
    result
}

pub fn remove(tree: &mut Tree, owner: RecordId, child: RecordId) -> CdpResult<()> {
    let mut backend = take_backend(tree, owner)?;
    let result = (|| {
        let b = as_octree(&mut backend)?;
        for node in &mut b.nodes {
            if let Some(pos) = node.records.iter().position(|&x| x == child) {
                node.records.remove(pos);
                return Ok(());
            }
        }
        Err(CdpError::NotFound)
    })();
    put_backend(tree, owner, backend)?;
    result
}
