//! # Copy-on-Write B+Tree
//!
//! The tree rewrites every node on the path from root to the touched leaf
//! on each mutation, publishes the new pages through the store, retires the
//! superseded ones, and commits exactly once per public operation. No page
//! reachable from the committed root is ever mutated; crash safety reduces
//! to the store's atomic root swap.
//!
//! ## Insert
//!
//! ```text
//! 1. Empty tree: build a leaf [sentinel, (key, val)] and make it root
//! 2. Recurse to the leaf via lookup_le, rebuilding each node into a 2x
//!    work buffer on the way back up
//! 3. split3 the rebuilt child; the parent splices the 1-3 replacement
//!    slots in with replace_children
//! 4. At the top: if the root split, grow a new internal root over the
//!    parts (height + 1)
//! ```
//!
//! ## Delete
//!
//! ```text
//! 1. Recurse to the leaf; absence short-circuits with no mutation
//! 2. A shrunken child at or below PAGE_SIZE/4 used bytes merges into its
//!    left sibling if the result fits a page, else its right sibling
//! 3. At the top: an internal root with one child is replaced by that
//!    child (height - 1); a root with no entries, or a leaf root holding
//!    only the sentinel, empties the tree (root = 0)
//! ```
//!
//! ## Sentinel
//!
//! The first leaf ever created carries a leading (empty key, empty value)
//! entry, so `lookup_le` always finds a covering slot on descent. The
//! sentinel is encoded exactly like a real entry: inserting the empty key
//! overwrites it, and it is observable as the empty key's entry.
//!
//! ## Ordering within one operation
//!
//! build pages -> alloc (any order) -> root_set -> commit. Frees may be
//! issued at any point; the store defers reclamation past the commit.

use eyre::{ensure, Result, WrapErr};
use smallvec::SmallVec;

use crate::config::{MAX_KEY_SIZE, MAX_VALUE_SIZE, MERGE_THRESHOLD, NODE_HEADER_SIZE, PAGE_SIZE};
use crate::error::ErrorKind;
use crate::store::{PageBuf, PageStore, NO_PAGE};

use super::node::{Node, NodeKind, NodeMut};
use super::ops;

/// Single-writer handle over a page store. Reads go through [`search`];
/// mutations rebuild the root-to-leaf path copy-on-write.
#[derive(Debug)]
pub struct BTree<'a, S: PageStore> {
    store: &'a mut S,
}

impl<'a, S: PageStore> BTree<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        Self { store }
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        search(&*self.store, key)
    }

    pub fn insert(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        if key.len() > MAX_KEY_SIZE {
            return Err(ErrorKind::KeyTooLarge { len: key.len() }.into());
        }
        if val.len() > MAX_VALUE_SIZE {
            return Err(ErrorKind::ValueTooLarge { len: val.len() }.into());
        }

        let root = self.store.root_get();
        if root == NO_PAGE {
            let ptr = self.store.alloc(first_leaf(key, val))?;
            self.store.root_set(ptr);
            return self.store.commit();
        }

        let page = fetch(self.store, root)?;
        let work = tree_insert(self.store, &page, key, val)?;
        let parts = ops::split3(work);
        self.store.free(root);

        let kids = alloc_parts(self.store, parts)?;
        let new_root = if kids.len() == 1 {
            kids[0].0
        } else {
            // root split: the tree grows one level
            let mut page = PageBuf::zeroed();
            let mut node = NodeMut::new(&mut page);
            node.set_header(NodeKind::Internal, kids.len());
            for (i, (ptr, first_key)) in kids.iter().enumerate() {
                ops::append_entry(&mut node, i, *ptr, first_key, &[]);
            }
            self.store.alloc(page)?
        };
        self.store.root_set(new_root);
        self.store.commit()
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        let root = self.store.root_get();
        if root == NO_PAGE {
            return Ok(false);
        }

        let page = fetch(self.store, root)?;
        let Some(updated) = tree_delete(self.store, &page, key)? else {
            return Ok(false);
        };
        self.store.free(root);

        match root_action(&updated) {
            RootAction::Promote(child) => self.store.root_set(child),
            RootAction::Clear => self.store.root_set(NO_PAGE),
            RootAction::Publish => {
                let ptr = publish(self.store, updated)?;
                self.store.root_set(ptr);
            }
        }
        self.store.commit()?;
        Ok(true)
    }
}

/// Point lookup against the committed tree. Descends internal nodes via
/// the child-pointer slot picked by `lookup_le` and compares the leaf key
/// exactly.
pub fn search<S: PageStore>(store: &S, key: &[u8]) -> Result<Option<Vec<u8>>> {
    let mut ptr = store.root_get();
    if ptr == NO_PAGE {
        return Ok(None);
    }
    loop {
        let page = fetch(store, ptr)?;
        let node = Node::new(&page);
        let idx = node.lookup_le(key);
        match node.kind() {
            NodeKind::Leaf => {
                if node.key(idx) == key {
                    return Ok(Some(node.value(idx).to_vec()));
                }
                return Ok(None);
            }
            NodeKind::Internal => ptr = node.child(idx),
        }
    }
}

enum RootAction {
    Promote(u64),
    Clear,
    Publish,
}

fn root_action(updated: &PageBuf) -> RootAction {
    let node = Node::new(updated);
    if node.kind() == NodeKind::Internal && node.count() == 1 {
        return RootAction::Promote(node.child(0));
    }
    if node.count() == 0 {
        return RootAction::Clear;
    }
    if node.is_leaf() && node.count() == 1 && node.key(0).is_empty() && node.value(0).is_empty() {
        // only the sentinel remains
        return RootAction::Clear;
    }
    RootAction::Publish
}

/// The initial root: a leaf whose first entry is the (empty, empty)
/// sentinel. Inserting the empty key itself IS the sentinel slot.
fn first_leaf(key: &[u8], val: &[u8]) -> PageBuf {
    let mut page = PageBuf::zeroed();
    let mut node = NodeMut::new(&mut page);
    if key.is_empty() {
        node.set_header(NodeKind::Leaf, 1);
        ops::append_entry(&mut node, 0, 0, key, val);
    } else {
        node.set_header(NodeKind::Leaf, 2);
        ops::append_entry(&mut node, 0, 0, b"", b"");
        ops::append_entry(&mut node, 1, 0, key, val);
    }
    page
}

fn fetch<S: PageStore>(store: &S, ptr: u64) -> Result<PageBuf> {
    let page = store
        .get(ptr)
        .wrap_err_with(|| format!("reading page {ptr}"))?;
    Node::from_page(&page).wrap_err_with(|| format!("page {ptr} failed validation"))?;
    Ok(page)
}

/// Publishes a rebuilt node, trimming its work buffer down to a page.
fn publish<S: PageStore>(store: &mut S, buf: PageBuf) -> Result<u64> {
    let used = Node::new(&buf).used_bytes();
    ensure!(
        used <= PAGE_SIZE,
        "rebuilt node spans {used} bytes, larger than a page"
    );
    store.alloc(buf.into_page())
}

fn alloc_parts<S: PageStore>(
    store: &mut S,
    parts: ops::SplitParts,
) -> Result<SmallVec<[(u64, Vec<u8>); 3]>> {
    let mut kids = SmallVec::new();
    for part in parts {
        let first_key = Node::new(&part).first_key().to_vec();
        let ptr = store.alloc(part)?;
        kids.push((ptr, first_key));
    }
    Ok(kids)
}

/// Rebuilds the subtree under `page` with (key, val) applied, returning a
/// possibly-oversized work node for the caller to split.
fn tree_insert<S: PageStore>(
    store: &mut S,
    page: &PageBuf,
    key: &[u8],
    val: &[u8],
) -> Result<PageBuf> {
    let node = Node::new(page);
    let idx = node.lookup_le(key);
    let mut work = PageBuf::zeroed_work();

    match node.kind() {
        NodeKind::Leaf => {
            let mut new = NodeMut::new(&mut work);
            if node.key(idx) == key {
                ops::leaf_update(&mut new, &node, idx, key, val);
            } else {
                ops::leaf_insert(&mut new, &node, idx + 1, key, val);
            }
        }
        NodeKind::Internal => {
            let child_ptr = node.child(idx);
            let child_page = fetch(store, child_ptr)?;
            let rebuilt = tree_insert(store, &child_page, key, val)?;
            let parts = ops::split3(rebuilt);
            store.free(child_ptr);

            let kids = alloc_parts(store, parts)?;
            let kid_slots: SmallVec<[(u64, &[u8]); 3]> = kids
                .iter()
                .map(|(ptr, first_key)| (*ptr, first_key.as_slice()))
                .collect();
            let mut new = NodeMut::new(&mut work);
            ops::replace_children(&mut new, &node, idx, &kid_slots);
        }
    }

    Ok(work)
}

/// Rebuilds the subtree under `page` with `key` removed. `None` means the
/// key was absent and nothing was touched.
fn tree_delete<S: PageStore>(store: &mut S, page: &PageBuf, key: &[u8]) -> Result<Option<PageBuf>> {
    let node = Node::new(page);
    let idx = node.lookup_le(key);

    if node.is_leaf() {
        if node.key(idx) != key {
            return Ok(None);
        }
        let mut out = PageBuf::zeroed();
        ops::leaf_delete(&mut NodeMut::new(&mut out), &node, idx);
        return Ok(Some(out));
    }

    let child_ptr = node.child(idx);
    let child_page = fetch(store, child_ptr)?;
    let Some(updated) = tree_delete(store, &child_page, key)? else {
        return Ok(None);
    };
    store.free(child_ptr);

    let updated_used = Node::new(&updated).used_bytes();
    let mut out = PageBuf::zeroed_work();

    if updated_used <= MERGE_THRESHOLD {
        if idx > 0 {
            let left_ptr = node.child(idx - 1);
            let left_page = fetch(store, left_ptr)?;
            let left = Node::new(&left_page);
            if left.used_bytes() + updated_used - NODE_HEADER_SIZE <= PAGE_SIZE {
                let mut merged = PageBuf::zeroed();
                ops::merge(&mut NodeMut::new(&mut merged), &left, &Node::new(&updated));
                store.free(left_ptr);
                let merged_key = Node::new(&merged).first_key().to_vec();
                let merged_ptr = store.alloc(merged)?;
                ops::replace_2kids(
                    &mut NodeMut::new(&mut out),
                    &node,
                    idx - 1,
                    merged_ptr,
                    &merged_key,
                );
                return Ok(Some(out));
            }
        }
        if idx + 1 < node.count() {
            let right_ptr = node.child(idx + 1);
            let right_page = fetch(store, right_ptr)?;
            let right = Node::new(&right_page);
            if right.used_bytes() + updated_used - NODE_HEADER_SIZE <= PAGE_SIZE {
                let mut merged = PageBuf::zeroed();
                ops::merge(&mut NodeMut::new(&mut merged), &Node::new(&updated), &right);
                store.free(right_ptr);
                let merged_key = Node::new(&merged).first_key().to_vec();
                let merged_ptr = store.alloc(merged)?;
                ops::replace_2kids(
                    &mut NodeMut::new(&mut out),
                    &node,
                    idx,
                    merged_ptr,
                    &merged_key,
                );
                return Ok(Some(out));
            }
        }
    }

    if Node::new(&updated).count() == 0 {
        // only reachable for a single-child parent; the empty internal
        // node propagates up to the root-collapse rule
        debug_assert!(node.count() == 1 && idx == 0);
        NodeMut::new(&mut out).set_header(NodeKind::Internal, 0);
        return Ok(Some(out));
    }

    // no merge: publish the shrunken child and re-derive its separator
    // from its new first key
    let first_key = Node::new(&updated).first_key().to_vec();
    let ptr = publish(store, updated)?;
    ops::replace_children(
        &mut NodeMut::new(&mut out),
        &node,
        idx,
        &[(ptr, first_key.as_slice())],
    );
    Ok(Some(out))
}
