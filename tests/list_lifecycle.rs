//! End-to-end: a Linked List store's full append/find/traverse/remove cycle.

use cascadedp::store::AddContext;
use cascadedp::{BackendKind, Dt, Indexing, RecordType, Store, StoreExtra, Tree};

fn list_store(tree: &mut Tree) -> cascadedp::RecordId {
    let name = Dt::words("t", "inbox").unwrap();
    let store = Store::new(name, 0, tree.root, BackendKind::LinkedList, Indexing::Insertion, StoreExtra::None).unwrap();
    let id = tree.initialize(RecordType::Normal, name, None, Some(store)).unwrap();
    tree.add(tree.root, AddContext::Append, id).unwrap()
}

fn numbered(tree: &mut Tree, n: u64) -> cascadedp::RecordId {
    let name = Dt::new(Dt::words("t", "item").unwrap().domain, cascadedp::Id::numeric(n).unwrap());
    tree.initialize(RecordType::Normal, name, None, None).unwrap()
}

#[test]
fn appends_one_through_nine_and_reads_them_back_in_order() {
    let mut tree = Tree::new();
    let inbox = list_store(&mut tree);

    let mut ids = Vec::new();
    for n in 1..=9 {
        let rec = numbered(&mut tree, n);
        ids.push(tree.add(inbox, AddContext::Append, rec).unwrap());
    }

    assert_eq!(Store::order(&tree, inbox).unwrap(), ids);
    assert_eq!(Store::first(&tree, inbox).unwrap(), Some(ids[0]));
    assert_eq!(Store::last(&tree, inbox).unwrap(), Some(ids[8]));

    let five = Dt::new(Dt::words("t", "item").unwrap().domain, cascadedp::Id::numeric(5).unwrap());
    let found = tree.find_by_name(inbox, five).unwrap().unwrap();
    assert_eq!(found, ids[4]);

    let mut seen = Vec::new();
    cascadedp::traverse::traverse(&tree, inbox, &mut |_tree, entry| {
        seen.push(entry.record);
        true
    })
    .unwrap();
    assert_eq!(seen, ids);

    // Removing the third element keeps the rest threaded correctly.
    tree.remove(ids[2], Some(())).unwrap();
    let mut remaining = ids.clone();
    remaining.remove(2);
    assert_eq!(Store::order(&tree, inbox).unwrap(), remaining);

    // take()/pop() consume from either end.
    let last = tree.take(inbox).unwrap();
    assert_eq!(last, *remaining.last().unwrap());
    let first = tree.pop(inbox).unwrap();
    assert_eq!(first, remaining[0]);
}
