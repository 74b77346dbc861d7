//! # File-Backed Page Store
//!
//! Single-file persistence for the tree with shadow-paging durability.
//!
//! ## File Format
//!
//! ```text
//! Offset 0:     Page 0: 64-byte file header, rest unused
//! Offset 4096:  Page 1
//! Offset 8192:  Page 2
//! ...
//! ```
//!
//! The page id is the page index; id 0 is the header page and doubles as
//! the "no page" sentinel, so tree pages start at 1. The file may be
//! longer than `page_count` pages (growth happens in chunks); pages past
//! the header's count are not allocated.
//!
//! ## Header Layout (64 bytes)
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  ------------------------------------------
//! 0       16    magic
//! 16      4     version
//! 20      4     page_size
//! 24      8     root         page id of the tree root (0 = empty)
//! 32      8     page_count   allocated pages, header page included
//! 40      8     checksum     CRC64/ECMA over the fields above
//! 48      16    reserved
//! ```
//!
//! ## Durability
//!
//! `commit` is the only durability point and performs the classic shadow
//! paging two-phase flush:
//!
//! ```text
//! 1. flush the mmap           -> every page written this operation is stable
//! 2. rewrite the header       -> new root, new page count, new checksum
//! 3. flush the header page    -> the new tree becomes the tree
//! ```
//!
//! A crash before step 3 leaves the old header intact: the old root still
//! describes a complete, untouched tree, and the pages written since the
//! last commit are unreachable garbage.
//!
//! ## Free Space
//!
//! There is no on-disk freelist. Freed ids collect in `pending_free` and
//! join the reusable pool only after the commit that unlinks them
//! succeeds. On open, the pool is rebuilt by a reachability sweep from the
//! persisted root: every page below `page_count` that the tree does not
//! reference is free. Crash garbage is reclaimed by the same sweep.
//!
//! ## Growth
//!
//! The mmap becomes invalid when the file is extended and remapped, so
//! `grow` takes `&mut self`; the borrow checker guarantees no page
//! reference survives a remap, with no runtime guards.

use std::fs::{File, OpenOptions};
use std::path::Path;

use crc::{Crc, CRC_64_ECMA_182};
use eyre::{ensure, Result, WrapErr};
use hashbrown::HashSet;
use memmap2::MmapMut;
use tracing::debug;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::btree::{Node, NodeKind};
use crate::config::PAGE_SIZE;
use crate::error::ErrorKind;

use super::{PageBuf, PageStore, NO_PAGE};

pub const FILE_MAGIC: &[u8; 16] = b"shadowkv v1\0\0\0\0\0";
pub const CURRENT_VERSION: u32 = 1;

const FILE_HEADER_SIZE: usize = 64;

/// Pages added per file extension; amortizes the flush + remap cost of
/// growing across several allocations.
const GROW_CHUNK: u64 = 8;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct FileHeader {
    magic: [u8; 16],
    version: U32,
    page_size: U32,
    root: U64,
    page_count: U64,
    checksum: U64,
    reserved: [u8; 16],
}

const _: () = assert!(std::mem::size_of::<FileHeader>() == FILE_HEADER_SIZE);

impl FileHeader {
    fn new(root: u64, page_count: u64) -> Self {
        let mut header = Self {
            magic: *FILE_MAGIC,
            version: U32::new(CURRENT_VERSION),
            page_size: U32::new(PAGE_SIZE as u32),
            root: U64::new(root),
            page_count: U64::new(page_count),
            checksum: U64::new(0),
            reserved: [0u8; 16],
        };
        header.checksum = U64::new(header.compute_checksum());
        header
    }

    fn compute_checksum(&self) -> u64 {
        let mut digest = CRC64.digest();
        digest.update(&self.magic);
        digest.update(self.version.as_bytes());
        digest.update(self.page_size.as_bytes());
        digest.update(self.root.as_bytes());
        digest.update(self.page_count.as_bytes());
        digest.finalize()
    }

    fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= FILE_HEADER_SIZE,
            "buffer too small for FileHeader: {} < {}",
            bytes.len(),
            FILE_HEADER_SIZE
        );
        Self::ref_from_bytes(&bytes[..FILE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse FileHeader: {:?}", e))
    }

    fn validate(&self) -> Result<()> {
        let corrupt = |reason: String| -> eyre::Report {
            ErrorKind::CorruptPage { reason }.into()
        };
        if self.magic != *FILE_MAGIC {
            return Err(corrupt("bad magic bytes in file header".into()));
        }
        if self.version.get() != CURRENT_VERSION {
            return Err(corrupt(format!(
                "unsupported version {} (expected {})",
                self.version.get(),
                CURRENT_VERSION
            )));
        }
        if self.page_size.get() != PAGE_SIZE as u32 {
            return Err(corrupt(format!(
                "file uses {}-byte pages, this build uses {}",
                self.page_size.get(),
                PAGE_SIZE
            )));
        }
        if self.checksum.get() != self.compute_checksum() {
            return Err(corrupt("file header checksum mismatch".into()));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct FileStore {
    file: File,
    mmap: MmapMut,
    /// Pages the mmap currently covers (file length / PAGE_SIZE).
    mapped_pages: u64,
    /// Allocated pages, header page included; the durable high-water mark.
    page_count: u64,
    root: u64,
    free_pages: Vec<u64>,
    pending_free: Vec<u64>,
    max_pages: Option<u64>,
}

impl FileStore {
    /// Creates a fresh, empty store, truncating anything at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create database file '{}'", path.display()))?;
        file.set_len(PAGE_SIZE as u64)
            .wrap_err("failed to size the header page")?;

        // SAFETY: MmapMut::map_mut is unsafe because externally modified
        // mappings are undefined behavior. This is safe because:
        // 1. The file was just created with read+write access and truncated
        // 2. Database files are not modified by other processes
        // 3. The mmap's lifetime is tied to FileStore, preventing
        //    use-after-unmap
        // 4. All access goes through bounds-checked page accessors
        let mut mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        let header = FileHeader::new(NO_PAGE, 1);
        mmap[..FILE_HEADER_SIZE].copy_from_slice(header.as_bytes());
        mmap.flush().wrap_err("failed to flush the initial header")?;

        Ok(Self {
            file,
            mmap,
            mapped_pages: 1,
            page_count: 1,
            root: NO_PAGE,
            free_pages: Vec::new(),
            pending_free: Vec::new(),
            max_pages: None,
        })
    }

    /// Opens an existing store, validating the header and rebuilding the
    /// free-page pool by a reachability sweep from the persisted root.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open database file '{}'", path.display()))?;

        let file_size = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", path.display()))?
            .len();
        ensure!(
            file_size >= PAGE_SIZE as u64,
            "database file '{}' is shorter than one page",
            path.display()
        );
        ensure!(
            file_size % PAGE_SIZE as u64 == 0,
            "database file '{}' size {} is not a multiple of the page size",
            path.display(),
            file_size
        );

        // SAFETY: as in create(); the file is opened read+write, owned by
        // this process, and every access is bounds checked.
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        let mapped_pages = file_size / PAGE_SIZE as u64;
        let (root, page_count) = {
            let header = FileHeader::from_bytes(&mmap)?;
            header.validate()?;
            (header.root.get(), header.page_count.get())
        };
        ensure!(
            page_count >= 1 && page_count <= mapped_pages,
            "header claims {page_count} pages in a {mapped_pages}-page file"
        );
        ensure!(
            root < page_count,
            "header root {root} is outside the allocated {page_count} pages"
        );

        let mut store = Self {
            file,
            mmap,
            mapped_pages,
            page_count,
            root,
            free_pages: Vec::new(),
            pending_free: Vec::new(),
            max_pages: None,
        };
        store.recover_free_pages()?;
        Ok(store)
    }

    /// Caps the file at `max` allocated pages; allocation past the cap
    /// fails with `OutOfSpace`.
    pub fn set_page_limit(&mut self, max: Option<u64>) {
        self.max_pages = max;
    }

    pub fn page_count(&self) -> u64 {
        self.page_count
    }

    pub fn free_page_count(&self) -> usize {
        self.free_pages.len()
    }

    /// Flushes everything outstanding; committed state is already durable,
    /// so this only matters for fastidious shutdown.
    pub fn sync(&self) -> Result<()> {
        self.mmap.flush().wrap_err("failed to sync mmap to disk")
    }

    fn page_bytes(&self, id: u64) -> &[u8] {
        let offset = id as usize * PAGE_SIZE;
        &self.mmap[offset..offset + PAGE_SIZE]
    }

    fn page_bytes_mut(&mut self, id: u64) -> &mut [u8] {
        let offset = id as usize * PAGE_SIZE;
        &mut self.mmap[offset..offset + PAGE_SIZE]
    }

    fn grow(&mut self, new_mapped: u64) -> Result<()> {
        if new_mapped <= self.mapped_pages {
            return Ok(());
        }
        self.mmap
            .flush()
            .wrap_err("failed to flush mmap before grow")?;
        let new_size = new_mapped * PAGE_SIZE as u64;
        self.file
            .set_len(new_size)
            .wrap_err_with(|| format!("failed to extend file to {new_size} bytes"))?;

        // SAFETY: the old mmap becomes invalid here. This is safe because:
        // 1. grow takes &mut self, so no page reference can exist
        // 2. The old mmap was flushed above
        // 3. The file was extended to new_size before remapping
        // 4. The old mmap is dropped on assignment
        self.mmap = unsafe {
            MmapMut::map_mut(&self.file).wrap_err("failed to remap file after grow")?
        };
        self.mapped_pages = new_mapped;
        debug!(pages = new_mapped, "grew database file");
        Ok(())
    }

    fn recover_free_pages(&mut self) -> Result<()> {
        let mut live = HashSet::new();
        live.insert(NO_PAGE);
        if self.root != NO_PAGE {
            self.mark_live(self.root, &mut live)
                .wrap_err("walking the tree during free-page recovery")?;
        }
        for id in 1..self.page_count {
            if !live.contains(&id) {
                self.free_pages.push(id);
            }
        }
        debug!(
            free = self.free_pages.len(),
            allocated = self.page_count,
            "recovered free pages"
        );
        Ok(())
    }

    fn mark_live(&self, id: u64, live: &mut HashSet<u64>) -> Result<()> {
        if id < 1 || id >= self.page_count {
            return Err(ErrorKind::CorruptPage {
                reason: format!("tree references page {id} outside the allocated range"),
            }
            .into());
        }
        if !live.insert(id) {
            return Err(ErrorKind::CorruptPage {
                reason: format!("page {id} is referenced twice"),
            }
            .into());
        }
        let page = self.page_bytes(id);
        let node = Node::from_page(page).wrap_err_with(|| format!("page {id}"))?;
        if node.kind() == NodeKind::Internal {
            for i in 0..node.count() {
                self.mark_live(node.child(i), live)?;
            }
        }
        Ok(())
    }
}

impl PageStore for FileStore {
    fn get(&self, id: u64) -> Result<PageBuf> {
        ensure!(
            id >= 1 && id < self.page_count,
            "page {id} out of bounds (page_count={})",
            self.page_count
        );
        Ok(PageBuf::copy_of(self.page_bytes(id)))
    }

    fn alloc(&mut self, page: PageBuf) -> Result<u64> {
        ensure!(page.is_page_sized(), "alloc of a non-page-sized buffer");
        let id = match self.free_pages.pop() {
            Some(id) => id,
            None => {
                if let Some(max) = self.max_pages {
                    if self.page_count >= max {
                        return Err(ErrorKind::OutOfSpace.into());
                    }
                }
                if self.page_count == self.mapped_pages {
                    self.grow(self.mapped_pages + GROW_CHUNK)?;
                }
                let id = self.page_count;
                self.page_count += 1;
                id
            }
        };
        self.page_bytes_mut(id).copy_from_slice(&page);
        Ok(id)
    }

    fn free(&mut self, id: u64) {
        debug_assert!(id >= 1 && id < self.page_count, "freeing a dead page {id}");
        self.pending_free.push(id);
    }

    fn root_get(&self) -> u64 {
        self.root
    }

    fn root_set(&mut self, id: u64) {
        debug_assert!(id < self.page_count);
        self.root = id;
    }

    fn commit(&mut self) -> Result<()> {
        // barrier 1: every page written this operation is on disk before
        // the root that references it
        self.mmap.flush().wrap_err("failed to flush data pages")?;

        let header = FileHeader::new(self.root, self.page_count);
        self.mmap[..FILE_HEADER_SIZE].copy_from_slice(header.as_bytes());

        // barrier 2: the root swap itself
        self.mmap
            .flush_range(0, PAGE_SIZE)
            .wrap_err("failed to flush the file header")?;

        // the unlinked pages are now unreachable from durable state
        self.free_pages.append(&mut self.pending_free);
        Ok(())
    }
}
