//! # Copy-on-Write B+Tree Index
//!
//! This module implements the ordered key/value engine at the heart of
//! shadowkv: a B+tree whose nodes are immutable once published. Mutations
//! rebuild the root-to-leaf path into fresh pages and swap a single root
//! pointer, which is what makes multi-page updates atomic under the
//! shadow-paging store.
//!
//! ## Node Layout
//!
//! Every node is one 4096-byte page:
//!
//! ```text
//! +----------------------+
//! | kind | count         |  4-byte header (two LE u16s)
//! +----------------------+
//! | child pointers       |  count x LE u64 (zero in leaves)
//! +----------------------+
//! | offset array         |  count x LE u16, cumulative entry ends
//! +----------------------+
//! | packed entries       |  klen | vlen | key | value, back to back
//! +----------------------+
//! ```
//!
//! Leaves hold the data; internal nodes hold (separator key, child id)
//! slots where the separator is the smallest key in the child's subtree.
//! The offset array makes entry access O(1) despite variable-length keys
//! and values, and its cumulative form makes append-based construction a
//! single running total.
//!
//! ## Layers
//!
//! - [`node`]: pure codec over one page buffer, no I/O, no allocation
//! - [`ops`]: build-a-new-page transformations (insert/update/delete at an
//!   index, merge, two-or-three-way split)
//! - [`tree`]: recursive insert and delete, root growth and collapse,
//!   store publication and retirement
//!
//! ## The Sentinel
//!
//! The first leaf ever created starts with an (empty key, empty value)
//! entry, so `lookup_le` always has a floor and descent never needs a
//! left-boundary special case. It is an ordinary entry in every other
//! respect: splits and merges carry it along, and inserting the empty key
//! overwrites it.
//!
//! ## What This Module Does Not Do
//!
//! Range scans, cursors, and secondary indexes are out of scope; the
//! engine exposes point get/insert/delete only. Concurrency control is the
//! caller's: one writer, expressed through `&mut` on the store.

mod node;
mod ops;
mod tree;

pub use node::{validate_node, Node, NodeKind, NodeMut, SLOT_SIZE};
pub use ops::{
    append_entry, append_range, leaf_delete, leaf_insert, leaf_update, merge, replace_2kids,
    replace_children, split2, split3, SplitParts,
};
pub use tree::{search, BTree};
