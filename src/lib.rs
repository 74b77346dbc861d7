//! # shadowkv - Embedded Copy-on-Write Key/Value Store
//!
//! shadowkv is an embedded, single-writer, persistent ordered key/value
//! store. Keys and values are arbitrary byte strings (keys up to 1000
//! bytes, values up to 3000); keys compare lexicographically. The store
//! supports point lookup, insert, overwrite, and delete, each durable when
//! it returns.
//!
//! ## Quick Start
//!
//! ```ignore
//! use shadowkv::Kv;
//!
//! let mut db = Kv::open("./data.skv")?;
//! db.set(b"user:1", b"alice")?;
//! assert_eq!(db.get(b"user:1")?, Some(b"alice".to_vec()));
//! assert!(db.del(b"user:1")?);
//! db.close()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-------------------------------------+
//! |          Kv (database handle)        |
//! +-------------------------------------+
//! |   B+tree: search / insert / delete   |
//! |   copy-on-write, 2-or-3-way splits,  |
//! |   sibling merges, root grow/shrink   |
//! +-------------------------------------+
//! |   Node codec over 4KB pages          |
//! +-------------------------------------+
//! |   PageStore: get / alloc / free /    |
//! |   root pointer / commit barrier      |
//! +------------------+------------------+
//! |  FileStore       |  MemStore        |
//! |  mmap + shadow   |  test double     |
//! |  paging          |                  |
//! +------------------+------------------+
//! ```
//!
//! ## Crash Safety
//!
//! The tree never mutates a page reachable from the committed root. Each
//! operation writes its new pages, flushes, swaps the single root pointer
//! in the file header, and flushes again. A crash between the two flushes
//! leaves the old root authoritative; the half-written pages are garbage
//! that the next open reclaims by a reachability sweep.
//!
//! ## Concurrency Model
//!
//! One writer, no internal parallelism. Exclusivity is expressed through
//! `&mut` on the store handle; there are no locks to take and nothing to
//! configure.
//!
//! ## Module Overview
//!
//! - [`btree`]: node codec, copy-on-write node operations, tree algorithms
//! - [`store`]: the page-store contract, in-memory and file-backed stores
//! - [`db`]: the `Kv` handle tying a tree to a file store
//! - [`config`]: page geometry constants
//! - [`error`]: the typed failure kinds carried inside `eyre` reports

pub mod btree;
pub mod config;
pub mod db;
pub mod error;
pub mod store;

pub use btree::BTree;
pub use db::Kv;
pub use error::ErrorKind;
pub use store::{FileStore, MemStore, PageBuf, PageStore};
