//! # Node Build Operations
//!
//! Every function here produces a fresh node as a transformation of one or
//! more input nodes. Inputs are never mutated; the tree is copy-on-write
//! and a published page is immutable for the rest of its life.
//!
//! Destinations are either page-sized buffers (when the result provably
//! fits: deletes, merges) or 2x work buffers (inserts and child-slot
//! replacement, which may transiently overflow one page). Work buffers are
//! only ever inputs to [`split3`], never published.
//!
//! ## Split
//!
//! `split2` picks the split index by accumulating per-entry byte costs
//! (4 bytes of length prefix + key + value) until the running total would
//! pass half of the source's used bytes, clamps to [1, N-1], then advances
//! the index until the right half fits a single page. The left half may
//! still be oversized; `split3` handles that by splitting it once more,
//! which is sufficient: a work node holds one prior page's worth of entries
//! plus a single insert, at most two entries of the maximal 4018 bytes.

use smallvec::{smallvec, SmallVec};

use crate::config::{ENTRY_META_SIZE, NODE_HEADER_SIZE, PAGE_SIZE};
use crate::store::PageBuf;

use super::node::{Node, NodeKind, NodeMut, SLOT_SIZE};

/// Split output: one, two, or three page-sized nodes in key order.
pub type SplitParts = SmallVec<[PageBuf; 3]>;

/// Writes one entry at `idx` and keeps `offset[idx + 1]` cumulative.
pub fn append_entry(dst: &mut NodeMut, idx: usize, ptr: u64, key: &[u8], val: &[u8]) {
    dst.set_child(idx, ptr);
    let pos = dst.as_node().entry_pos(idx);
    dst.write_entry(pos, key, val);
    let end = dst.as_node().offset(idx) + ENTRY_META_SIZE + key.len() + val.len();
    dst.set_offset(idx + 1, end);
}

/// Copies `n` consecutive entries from `src` into `dst` starting at
/// `dst_start`. Child pointers are preserved for internal sources and
/// zeroed for leaves.
pub fn append_range(dst: &mut NodeMut, src: &Node, dst_start: usize, src_start: usize, n: usize) {
    for i in 0..n {
        let ptr = match src.kind() {
            NodeKind::Internal => src.child(src_start + i),
            NodeKind::Leaf => 0,
        };
        append_entry(dst, dst_start + i, ptr, src.key(src_start + i), src.value(src_start + i));
    }
}

/// new = old[0..idx) ++ (key, val) ++ old[idx..N)
pub fn leaf_insert(new: &mut NodeMut, old: &Node, idx: usize, key: &[u8], val: &[u8]) {
    new.set_header(NodeKind::Leaf, old.count() + 1);
    append_range(new, old, 0, 0, idx);
    append_entry(new, idx, 0, key, val);
    append_range(new, old, idx + 1, idx, old.count() - idx);
}

/// new = old[0..idx) ++ (key, val) ++ old[idx+1..N)
pub fn leaf_update(new: &mut NodeMut, old: &Node, idx: usize, key: &[u8], val: &[u8]) {
    new.set_header(NodeKind::Leaf, old.count());
    append_range(new, old, 0, 0, idx);
    append_entry(new, idx, 0, key, val);
    append_range(new, old, idx + 1, idx + 1, old.count() - (idx + 1));
}

/// new = old[0..idx) ++ old[idx+1..N)
pub fn leaf_delete(new: &mut NodeMut, old: &Node, idx: usize) {
    new.set_header(NodeKind::Leaf, old.count() - 1);
    append_range(new, old, 0, 0, idx);
    append_range(new, old, idx, idx + 1, old.count() - (idx + 1));
}

/// Replaces child slot `idx` with `kids` slots, each a (page id, separator
/// key) pair for an already-published child.
pub fn replace_children(new: &mut NodeMut, old: &Node, idx: usize, kids: &[(u64, &[u8])]) {
    new.set_header(NodeKind::Internal, old.count() - 1 + kids.len());
    append_range(new, old, 0, 0, idx);
    for (i, (ptr, first_key)) in kids.iter().enumerate() {
        append_entry(new, idx + i, *ptr, first_key, &[]);
    }
    append_range(new, old, idx + kids.len(), idx + 1, old.count() - (idx + 1));
}

/// Collapses child slots `idx` and `idx + 1` into a single slot for the
/// merged page.
pub fn replace_2kids(new: &mut NodeMut, old: &Node, idx: usize, merged_ptr: u64, merged_key: &[u8]) {
    new.set_header(NodeKind::Internal, old.count() - 1);
    append_range(new, old, 0, 0, idx);
    append_entry(new, idx, merged_ptr, merged_key, &[]);
    append_range(new, old, idx + 1, idx + 2, old.count() - (idx + 2));
}

/// new = left ++ right. Both inputs must share a kind; the merge decision
/// in the delete path only ever pairs siblings of the same height.
pub fn merge(new: &mut NodeMut, left: &Node, right: &Node) {
    debug_assert_eq!(left.kind(), right.kind());
    new.set_header(left.kind(), left.count() + right.count());
    append_range(new, left, 0, 0, left.count());
    append_range(new, right, left.count(), 0, right.count());
}

fn right_half_bytes(src: &Node, split: usize) -> usize {
    let n = src.count();
    NODE_HEADER_SIZE + SLOT_SIZE * (n - split) + (src.offset(n) - src.offset(split))
}

/// Splits `src` at an index chosen so the right half fits one page; the
/// left half holds the remainder and may still be oversized.
pub fn split2(left: &mut NodeMut, right: &mut NodeMut, src: &Node) {
    let n = src.count();
    debug_assert!(n >= 2, "cannot split a {n}-entry node");

    let target = src.used_bytes() / 2;
    let mut split = 0;
    let mut acc = 0;
    for i in 0..n {
        let cost = ENTRY_META_SIZE + src.key(i).len() + src.value(i).len();
        if acc + cost > target && i > 0 {
            split = i;
            break;
        }
        acc += cost;
    }
    if split == 0 {
        split = n / 2;
    }
    split = split.clamp(1, n - 1);
    while split < n - 1 && right_half_bytes(src, split) > PAGE_SIZE {
        split += 1;
    }

    left.set_header(src.kind(), split);
    append_range(left, src, 0, 0, split);
    right.set_header(src.kind(), n - split);
    append_range(right, src, 0, split, n - split);
}

/// Cuts a possibly-oversized work node into 1, 2, or 3 page-sized nodes.
///
/// Every returned node fits a page, holds at least one entry, and the
/// concatenation of the returned sequence preserves the source's entries
/// in order.
pub fn split3(work: PageBuf) -> SplitParts {
    if Node::new(&work).used_bytes() <= PAGE_SIZE {
        return smallvec![work.into_page()];
    }

    let mut left_work = PageBuf::zeroed_work();
    let mut right = PageBuf::zeroed();
    {
        let mut left_view = NodeMut::new(&mut left_work);
        let mut right_view = NodeMut::new(&mut right);
        split2(&mut left_view, &mut right_view, &Node::new(&work));
    }
    debug_assert!(Node::new(&right).used_bytes() <= PAGE_SIZE);

    if Node::new(&left_work).used_bytes() <= PAGE_SIZE {
        return smallvec![left_work.into_page(), right];
    }

    let mut left = PageBuf::zeroed();
    let mut middle = PageBuf::zeroed();
    {
        let mut left_view = NodeMut::new(&mut left);
        let mut middle_view = NodeMut::new(&mut middle);
        split2(&mut left_view, &mut middle_view, &Node::new(&left_work));
    }
    debug_assert!(Node::new(&left).used_bytes() <= PAGE_SIZE);
    debug_assert!(Node::new(&middle).used_bytes() <= PAGE_SIZE);

    smallvec![left, middle, right]
}
