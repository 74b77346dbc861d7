//! In-memory page store, the test double for the engine. Mirrors the
//! durability contract of the file store without any I/O: frees are
//! deferred until `commit`, so a test can observe that a failed operation
//! never perturbs the committed tree.

use eyre::{ensure, Result};
use hashbrown::HashMap;

use crate::error::ErrorKind;

use super::{PageBuf, PageStore, NO_PAGE};

#[derive(Debug)]
pub struct MemStore {
    pages: HashMap<u64, PageBuf>,
    next_id: u64,
    root: u64,
    pending_free: Vec<u64>,
    capacity: Option<usize>,
    commits: u64,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            next_id: 1,
            root: NO_PAGE,
            pending_free: Vec::new(),
            capacity: None,
            commits: 0,
        }
    }

    /// A store that fails allocation with `OutOfSpace` once `max_pages`
    /// pages are resident.
    pub fn with_capacity(max_pages: usize) -> Self {
        Self {
            capacity: Some(max_pages),
            ..Self::new()
        }
    }

    pub fn live_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn commit_count(&self) -> u64 {
        self.commits
    }

    pub fn page_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.pages.keys().copied()
    }

    #[cfg(test)]
    pub fn corrupt_page_for_test(&mut self, id: u64, f: impl FnOnce(&mut PageBuf)) {
        f(self.pages.get_mut(&id).expect("corrupting a dead page"))
    }
}

impl PageStore for MemStore {
    fn get(&self, id: u64) -> Result<PageBuf> {
        match self.pages.get(&id) {
            Some(page) => Ok(page.clone()),
            None => eyre::bail!("page {id} is not allocated"),
        }
    }

    fn alloc(&mut self, page: PageBuf) -> Result<u64> {
        ensure!(page.is_page_sized(), "alloc of a non-page-sized buffer");
        if let Some(cap) = self.capacity {
            if self.pages.len() >= cap {
                return Err(ErrorKind::OutOfSpace.into());
            }
        }
        let id = self.next_id;
        self.next_id += 1;
        self.pages.insert(id, page);
        Ok(id)
    }

    fn free(&mut self, id: u64) {
        debug_assert!(self.pages.contains_key(&id), "freeing a dead page {id}");
        self.pending_free.push(id);
    }

    fn root_get(&self) -> u64 {
        self.root
    }

    fn root_set(&mut self, id: u64) {
        debug_assert!(id == NO_PAGE || self.pages.contains_key(&id));
        self.root = id;
    }

    fn commit(&mut self) -> Result<()> {
        for id in self.pending_free.drain(..) {
            self.pages.remove(&id);
        }
        self.commits += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_assigns_fresh_nonzero_ids() {
        let mut store = MemStore::new();

        let a = store.alloc(PageBuf::zeroed()).unwrap();
        let b = store.alloc(PageBuf::zeroed()).unwrap();

        assert_ne!(a, NO_PAGE);
        assert_ne!(b, NO_PAGE);
        assert_ne!(a, b);
    }

    #[test]
    fn get_returns_published_bytes() {
        let mut store = MemStore::new();
        let mut page = PageBuf::zeroed();
        page[100] = 0x42;

        let id = store.alloc(page).unwrap();

        assert_eq!(store.get(id).unwrap()[100], 0x42);
    }

    #[test]
    fn free_is_deferred_until_commit() {
        let mut store = MemStore::new();
        let id = store.alloc(PageBuf::zeroed()).unwrap();

        store.free(id);
        assert!(store.get(id).is_ok(), "page reclaimed before commit");

        store.commit().unwrap();
        assert!(store.get(id).is_err());
        assert_eq!(store.live_pages(), 0);
    }

    #[test]
    fn alloc_rejects_work_buffers() {
        let mut store = MemStore::new();
        assert!(store.alloc(PageBuf::zeroed_work()).is_err());
    }

    #[test]
    fn capacity_cap_yields_out_of_space() {
        let mut store = MemStore::with_capacity(1);
        store.alloc(PageBuf::zeroed()).unwrap();

        let err = store.alloc(PageBuf::zeroed()).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ErrorKind>(),
            Some(ErrorKind::OutOfSpace)
        ));
    }
}
