//! # Database Handle
//!
//! [`Kv`] is the embedded-database front door: it owns the file store and
//! runs the B+tree over it. Every `set`/`del` is one tree operation
//! followed by one durable commit; a crash at any point leaves the last
//! committed state intact.
//!
//! ```ignore
//! use shadowkv::Kv;
//!
//! let mut db = Kv::open("./data.skv")?;
//! db.set(b"greeting", b"hello")?;
//! assert_eq!(db.get(b"greeting")?, Some(b"hello".to_vec()));
//! db.close()?;
//! ```

use std::path::Path;

use eyre::Result;
use tracing::{debug, info};

use crate::btree::{search, BTree};
use crate::store::FileStore;

pub struct Kv {
    store: FileStore,
}

impl Kv {
    /// Opens the database at `path`, creating it if it does not exist.
    /// Opening an existing file validates the header and reclaims any
    /// pages left unreachable by a crash.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let store = if path.exists() {
            FileStore::open(path)?
        } else {
            FileStore::create(path)?
        };
        info!(
            path = %path.display(),
            pages = store.page_count(),
            free = store.free_page_count(),
            "opened database"
        );
        Ok(Self { store })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        search(&self.store, key)
    }

    /// Inserts or overwrites `key`. Durable when it returns.
    pub fn set(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        BTree::new(&mut self.store).insert(key, val)?;
        debug!(key_len = key.len(), val_len = val.len(), "set");
        Ok(())
    }

    /// Removes `key`, reporting whether it was present. Durable when it
    /// returns.
    pub fn del(&mut self, key: &[u8]) -> Result<bool> {
        let deleted = BTree::new(&mut self.store).delete(key)?;
        debug!(key_len = key.len(), deleted, "del");
        Ok(deleted)
    }

    /// Flushes and drops the handle. Committed operations are already
    /// durable; this exists for explicit, fastidious shutdown.
    pub fn close(self) -> Result<()> {
        self.store.sync()?;
        debug!("closed database");
        Ok(())
    }
}
