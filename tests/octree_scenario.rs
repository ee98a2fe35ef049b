//! End-to-end: an Octree store's insert/traverse/remove cycle over a handful
//! of spatial points.

use std::rc::Rc;

use cascadedp::store::AddContext;
use cascadedp::{BackendKind, CdpError, Data, Dt, Indexing, OctreeBound, RecordType, Store, StoreExtra, Tree};

fn point_fit(tree: &Tree, record: cascadedp::RecordId, bound: &OctreeBound) -> bool {
    let bytes = tree.get(record).unwrap().data.as_ref().unwrap().bytes().unwrap();
    let x = f64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let y = f64::from_le_bytes(bytes[8..16].try_into().unwrap());
    let z = f64::from_le_bytes(bytes[16..24].try_into().unwrap());
    (x - bound.center[0]).abs() <= bound.half_size
        && (y - bound.center[1]).abs() <= bound.half_size
        && (z - bound.center[2]).abs() <= bound.half_size
}

fn point(tree: &mut Tree, tag: &str, at: [f64; 3]) -> cascadedp::RecordId {
    let name = Dt::words("t", tag).unwrap();
    let mut bytes = [0u8; 24];
    bytes[0..8].copy_from_slice(&at[0].to_le_bytes());
    bytes[8..16].copy_from_slice(&at[1].to_le_bytes());
    bytes[16..24].copy_from_slice(&at[2].to_le_bytes());
    let data = Data::new_value(name, name, 0, &bytes).unwrap();
    tree.initialize(RecordType::Normal, name, Some(data), None).unwrap()
}

fn space(tree: &mut Tree) -> cascadedp::RecordId {
    let name = Dt::words("t", "space").unwrap();
    let bound = OctreeBound {
        center: [0.0, 0.0, 0.0],
        half_size: 1000.0,
    };
    let store = Store::new(
        name,
        0,
        tree.root,
        BackendKind::Octree,
        Indexing::ByFunction,
        StoreExtra::Octree {
            bound,
            fit: Rc::new(point_fit),
        },
    )
    .unwrap();
    let id = tree.initialize(RecordType::Normal, name, None, Some(store)).unwrap();
    tree.add(tree.root, AddContext::Append, id).unwrap()
}

#[test]
fn points_can_be_inserted_traversed_and_removed() {
    let mut tree = Tree::new();
    let space = space(&mut tree);

    let origin = point(&mut tree, "origin", [1.0, 1.0, 1.0]);
    let far = point(&mut tree, "far", [-900.0, 500.0, -300.0]);
    let mid = point(&mut tree, "mid", [100.0, -100.0, 50.0]);

    let origin = tree.add(space, AddContext::Append, origin).unwrap();
    let far = tree.add(space, AddContext::Append, far).unwrap();
    let mid = tree.add(space, AddContext::Append, mid).unwrap();

    let mut visited = Vec::new();
    cascadedp::traverse::traverse(&tree, space, &mut |_tree, entry| {
        visited.push(entry.record);
        true
    })
    .unwrap();
    visited.sort_by_key(|r| r.0);
    let mut expected = vec![origin, far, mid];
    expected.sort_by_key(|r| r.0);
    assert_eq!(visited, expected);

    tree.remove(far, Some(())).unwrap();
    let remaining = Store::order(&tree, space).unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.contains(&origin));
    assert!(remaining.contains(&mid));

    // Re-inserting a record with the name of one still in the tree is rejected.
    let dup = point(&mut tree, "origin", [-1.0, -1.0, -1.0]);
    assert_eq!(tree.add(space, AddContext::Append, dup), Err(CdpError::DuplicateKey));
}
