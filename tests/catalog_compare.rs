//! End-to-end: a Catalog — `ByFunction` indexing driven by a comparator that
//! reads each candidate's own embedded child, not just its name.

use std::rc::Rc;

use cascadedp::store::AddContext;
use cascadedp::{BackendKind, Data, Dt, Indexing, RecordType, Store, StoreExtra, Tree};

fn priority_of(tree: &Tree, record: cascadedp::RecordId) -> u64 {
    let priority_name = Dt::words("t", "priority").unwrap();
    let child = Store::find_by_name(tree, record, priority_name).unwrap().unwrap();
    tree.get(child).unwrap().data.as_ref().unwrap().as_u64().unwrap()
}

fn catalog(tree: &mut Tree) -> cascadedp::RecordId {
    let name = Dt::words("t", "catalog").unwrap();
    let compare: cascadedp::CompareFn = Rc::new(|tree, a, b| priority_of(tree, a).cmp(&priority_of(tree, b)));
    let store = Store::new(
        name,
        0,
        tree.root,
        BackendKind::LinkedList,
        Indexing::ByFunction,
        StoreExtra::Compare(compare),
    )
    .unwrap();
    let id = tree.initialize(RecordType::Normal, name, None, Some(store)).unwrap();
    tree.add(tree.root, AddContext::Append, id).unwrap()
}

fn ticket(tree: &mut Tree, tag: &str, priority: u64) -> cascadedp::RecordId {
    let name = Dt::words("t", tag).unwrap();
    let store = Store::new(name, 0, tree.root, BackendKind::LinkedList, Indexing::Insertion, StoreExtra::None).unwrap();
    let rec = tree.initialize(RecordType::Normal, name, None, Some(store)).unwrap();

    let priority_name = Dt::words("t", "priority").unwrap();
    let data = Data::new_value(priority_name, priority_name, 0, &priority.to_le_bytes()).unwrap();
    let priority_rec = tree.initialize(RecordType::Normal, priority_name, Some(data), None).unwrap();
    tree.add(rec, AddContext::Append, priority_rec).unwrap();
    rec
}

#[test]
fn catalog_orders_entries_by_their_embedded_priority_child() {
    let mut tree = Tree::new();
    let cat = catalog(&mut tree);

    let low = ticket(&mut tree, "low", 5);
    let high = ticket(&mut tree, "high", 90);
    let mid = ticket(&mut tree, "mid", 42);

    let low = tree.add(cat, AddContext::Append, low).unwrap();
    let high = tree.add(cat, AddContext::Append, high).unwrap();
    let mid = tree.add(cat, AddContext::Append, mid).unwrap();

    assert_eq!(Store::order(&tree, cat).unwrap(), vec![low, mid, high]);
}

#[test]
fn catalog_accepts_two_entries_with_the_same_priority() {
    let mut tree = Tree::new();
    let cat = catalog(&mut tree);

    let first = ticket(&mut tree, "first", 10);
    let second = ticket(&mut tree, "second", 10);

    let first = tree.add(cat, AddContext::Append, first).unwrap();
    let second = tree.add(cat, AddContext::Append, second).unwrap();

    assert_eq!(Store::order(&tree, cat).unwrap(), vec![first, second]);
}
