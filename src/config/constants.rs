//! # Page Geometry Constants
//!
//! All sizes that define the node layout and the limits on entry sizes.
//! Constants here are interdependent; the dependency chain is:
//!
//! ```text
//! PAGE_SIZE (4096 bytes)
//!       │
//!       ├─> WORK_BUF_SIZE (2 * PAGE_SIZE)
//!       │     Build buffer for nodes that transiently overflow a page
//!       │     before split3 cuts them back down. An insert can add at most
//!       │     one maximal entry (leaf) or two extra child slots (internal),
//!       │     both of which fit the 2x budget.
//!       │
//!       ├─> MERGE_THRESHOLD (PAGE_SIZE / 4)
//!       │     A non-root node at or below this many used bytes after a
//!       │     delete is a candidate for merging with a sibling.
//!       │
//!       └─> MAX_KEY_SIZE / MAX_VALUE_SIZE
//!             Bounded so that one maximal entry plus its framing fits a
//!             single page (checked at compile time below).
//! ```
//!
//! ## Node layout recap
//!
//! ```text
//! offset  size  field
//! 0       2     kind   (LE u16: 1 = internal, 2 = leaf)
//! 2       2     count  (LE u16)
//! 4       8N    child pointers (LE u64 each; zero in leaves)
//! 4+8N    2N    offset array   (LE u16 each; offset[0] is implicit 0)
//! 4+10N   ...   packed entries: klen u16 | vlen u16 | key | value
//! ```

/// Size of every node page, on disk and in memory.
pub const PAGE_SIZE: usize = 4096;

/// Node header: kind (2 bytes) + entry count (2 bytes).
pub const NODE_HEADER_SIZE: usize = 4;

/// Per-entry child pointer slot.
pub const PTR_SIZE: usize = 8;

/// Per-entry offset-array cell.
pub const OFFSET_SIZE: usize = 2;

/// Length prefix on every packed entry: klen (2 bytes) + vlen (2 bytes).
pub const ENTRY_META_SIZE: usize = 4;

/// Largest accepted key, in bytes.
pub const MAX_KEY_SIZE: usize = 1000;

/// Largest accepted value, in bytes.
pub const MAX_VALUE_SIZE: usize = 3000;

/// Build-buffer size for nodes that may transiently exceed one page.
pub const WORK_BUF_SIZE: usize = 2 * PAGE_SIZE;

/// Used-byte floor below which a non-root node tries to merge with a
/// sibling after a delete.
pub const MERGE_THRESHOLD: usize = PAGE_SIZE / 4;

// One maximal entry plus minimal framing must fit a single page, or a
// legal insert could produce an unsplittable node.
const _: () = assert!(
    NODE_HEADER_SIZE + PTR_SIZE + OFFSET_SIZE + ENTRY_META_SIZE + MAX_KEY_SIZE + MAX_VALUE_SIZE
        <= PAGE_SIZE
);
