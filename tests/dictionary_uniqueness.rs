//! End-to-end: a Red-Black (`ByName`) store rejects duplicate names and
//! keeps its children reachable in name order.

use cascadedp::store::AddContext;
use cascadedp::{BackendKind, CdpError, Dt, Indexing, RecordType, Store, StoreExtra, Tree};

fn dictionary(tree: &mut Tree) -> cascadedp::RecordId {
    let name = Dt::words("t", "dict").unwrap();
    let store = Store::new(name, 0, tree.root, BackendKind::RedBlack, Indexing::ByName, StoreExtra::None).unwrap();
    let id = tree.initialize(RecordType::Normal, name, None, Some(store)).unwrap();
    tree.add(tree.root, AddContext::Append, id).unwrap()
}

fn entry(tree: &mut Tree, tag: &str) -> cascadedp::RecordId {
    let name = Dt::words("t", tag).unwrap();
    tree.initialize(RecordType::Normal, name, None, None).unwrap()
}

#[test]
fn reinserting_a_live_name_is_rejected_and_the_dictionary_stays_sorted() {
    let mut tree = Tree::new();
    let dict = dictionary(&mut tree);

    let names = ["mango", "apple", "cherry", "banana"];
    let mut inserted = Vec::new();
    for tag in names {
        let rec = entry(&mut tree, tag);
        inserted.push(tree.add(dict, AddContext::Append, rec).unwrap());
    }

    let order = Store::order(&tree, dict).unwrap();
    let sorted_names: Vec<_> = order.iter().map(|&id| tree.get(id).unwrap().name).collect();
    let mut expected: Vec<_> = sorted_names.clone();
    expected.sort();
    assert_eq!(sorted_names, expected, "red-black order must follow name order");

    let dup = entry(&mut tree, "apple");
    assert_eq!(tree.add(dict, AddContext::Append, dup), Err(CdpError::DuplicateKey));

    // Removing one entry, the rest stay reachable and still sorted.
    tree.remove(inserted[1], Some(())).unwrap();
    let after = Store::order(&tree, dict).unwrap();
    let after_names: Vec<_> = after.iter().map(|&id| tree.get(id).unwrap().name).collect();
    let mut expected_after = after_names.clone();
    expected_after.sort();
    assert_eq!(after_names, expected_after);
    assert_eq!(after.len(), 3);
}
