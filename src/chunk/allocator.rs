//! Chunk allocator (spec §4.B).
//!
//! Two size classes of fixed, aligned blocks are carved out of large pages
//! drawn from the system allocator. Each page threads its free slots onto
//! a per-page free list (`Vec<u16>` of free slot indices, mirroring the
//! teacher crate's direct use of `NonNull<u8>` + `Layout` for chunk
//! storage in `archetype::alloc_chunk`, generalized into a pooled
//! allocator as the spec requires).

use std::{
    alloc::{alloc, dealloc, handle_alloc_error, Layout},
    ptr::NonNull,
};

use crate::error::fatal;

/// Two size classes; row counts always fit a 16-bit counter (§4.B).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkSizeClass {
    Small,
    Big,
}

impl ChunkSizeClass {
    pub(crate) fn bytes(self, config: &ChunkAllocatorConfig) -> usize {
        match self {
            ChunkSizeClass::Small => config.small_bytes,
            ChunkSizeClass::Big => config.big_bytes,
        }
    }
}

/// Tunable knobs, read once at `ChunkAllocator::new`, the same way the
/// teacher reads `ALEX_CHUNK_UPPER_LIMIT`/`ALEX_CHUNK_LOWER_LIMIT` via
/// `option_env!`.
#[derive(Clone, Copy, Debug)]
pub struct ChunkAllocatorConfig {
    pub small_bytes: usize,
    pub big_bytes: usize,
    pub page_bytes: usize,
}

impl Default for ChunkAllocatorConfig {
    fn default() -> Self {
        ChunkAllocatorConfig {
            small_bytes: env_usize(option_env!("ECS_CHUNK_SMALL_BYTES")).unwrap_or(8 * 1024),
            big_bytes: env_usize(option_env!("ECS_CHUNK_BIG_BYTES")).unwrap_or(16 * 1024),
            page_bytes: env_usize(option_env!("ECS_CHUNK_PAGE_BYTES")).unwrap_or(1024 * 1024),
        }
    }
}

fn env_usize(value: Option<&'static str>) -> Option<usize> {
    value?.parse().ok()
}

struct Page {
    ptr: NonNull<u8>,
    layout: Layout,
    slot_bytes: usize,
    slot_count: u32,
    free_slots: Vec<u32>,
}

impl Page {
    fn new(slot_bytes: usize, page_bytes: usize) -> Self {
        let slot_count = (page_bytes / slot_bytes).max(1) as u32;
        let total_bytes = slot_bytes * slot_count as usize;
        let layout = Layout::from_size_align(total_bytes, slot_bytes)
            .unwrap_or_else(|_| fatal("page layout overflow"));
        let ptr = unsafe { alloc(layout) };
        let ptr = match NonNull::new(ptr) {
            Some(p) => p,
            None => handle_alloc_error(layout),
        };
        Page {
            ptr,
            layout,
            slot_bytes,
            slot_count,
            free_slots: (0..slot_count).rev().collect(),
        }
    }

    fn is_fully_free(&self) -> bool {
        self.free_slots.len() as u32 == self.slot_count
    }

    unsafe fn slot_ptr(&self, slot: u32) -> NonNull<u8> {
        NonNull::new_unchecked(self.ptr.as_ptr().add(slot as usize * self.slot_bytes))
    }

    fn owns(&self, ptr: NonNull<u8>) -> bool {
        let start = self.ptr.as_ptr() as usize;
        let end = start + self.layout.size();
        let addr = ptr.as_ptr() as usize;
        addr >= start && addr < end
    }

    fn slot_of(&self, ptr: NonNull<u8>) -> u32 {
        let start = self.ptr.as_ptr() as usize;
        let addr = ptr.as_ptr() as usize;
        ((addr - start) / self.slot_bytes) as u32
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

struct Pool {
    slot_bytes: usize,
    page_bytes: usize,
    pages: Vec<Page>,
}

impl Pool {
    fn new(slot_bytes: usize, page_bytes: usize) -> Self {
        Pool {
            slot_bytes,
            page_bytes,
            pages: Vec::new(),
        }
    }

    fn alloc(&mut self) -> NonNull<u8> {
        for page in &mut self.pages {
            if let Some(slot) = page.free_slots.pop() {
                return unsafe { page.slot_ptr(slot) };
            }
        }
        let mut page = Page::new(self.slot_bytes, self.page_bytes);
        let slot = page.free_slots.pop().unwrap();
        let ptr = unsafe { page.slot_ptr(slot) };
        self.pages.push(page);
        ptr
    }

    fn free(&mut self, ptr: NonNull<u8>) {
        let page_index = self
            .pages
            .iter()
            .position(|p| p.owns(ptr))
            .unwrap_or_else(|| fatal("chunk freed into a pool that never allocated it"));
        let slot = self.pages[page_index].slot_of(ptr);
        self.pages[page_index].free_slots.push(slot);
    }

    /// Releases pages that are entirely free, keeping at least one page
    /// around so the next allocation doesn't immediately grow again
    /// (§4.B: "the page may be released on GC").
    fn release_empty_pages(&mut self) {
        if self.pages.len() <= 1 {
            return;
        }
        let mut kept_one_empty = false;
        self.pages.retain(|page| {
            if page.is_fully_free() {
                if !kept_one_empty {
                    kept_one_empty = true;
                    true
                } else {
                    false
                }
            } else {
                true
            }
        });
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Owns both size-class pools for one store (Design Notes §9: no
/// process-wide singleton, the allocator is a `World` member).
pub struct ChunkAllocator {
    config: ChunkAllocatorConfig,
    small: Pool,
    big: Pool,
}

impl ChunkAllocator {
    pub fn new(config: ChunkAllocatorConfig) -> Self {
        ChunkAllocator {
            small: Pool::new(config.small_bytes, config.page_bytes),
            big: Pool::new(config.big_bytes, config.page_bytes),
            config,
        }
    }

    pub fn config(&self) -> &ChunkAllocatorConfig {
        &self.config
    }

    pub fn alloc(&mut self, class: ChunkSizeClass) -> NonNull<u8> {
        let ptr = match class {
            ChunkSizeClass::Small => self.small.alloc(),
            ChunkSizeClass::Big => self.big.alloc(),
        };
        log::trace!("chunk allocator: allocated {:?} chunk", class);
        ptr
    }

    pub fn free(&mut self, class: ChunkSizeClass, ptr: NonNull<u8>) {
        match class {
            ChunkSizeClass::Small => self.small.free(ptr),
            ChunkSizeClass::Big => self.big.free(ptr),
        }
        log::trace!("chunk allocator: freed {:?} chunk", class);
    }

    /// Releases unused pages (§4.B). Called from `World::update`'s GC pass.
    pub fn gc(&mut self) {
        self.small.release_empty_pages();
        self.big.release_empty_pages();
    }

    pub fn page_count(&self, class: ChunkSizeClass) -> usize {
        match class {
            ChunkSizeClass::Small => self.small.page_count(),
            ChunkSizeClass::Big => self.big.page_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_free_round_trip() {
        let mut alloc = ChunkAllocator::new(ChunkAllocatorConfig {
            small_bytes: 1024,
            big_bytes: 2048,
            page_bytes: 4096,
        });
        let a = alloc.alloc(ChunkSizeClass::Small);
        let b = alloc.alloc(ChunkSizeClass::Small);
        assert_ne!(a, b);
        alloc.free(ChunkSizeClass::Small, a);
        alloc.free(ChunkSizeClass::Small, b);
        assert_eq!(alloc.page_count(ChunkSizeClass::Small), 1);
    }

    #[test]
    fn page_grows_when_exhausted() {
        let mut alloc = ChunkAllocator::new(ChunkAllocatorConfig {
            small_bytes: 1024,
            big_bytes: 2048,
            page_bytes: 2048, // exactly 2 slots per page
        });
        let _a = alloc.alloc(ChunkSizeClass::Small);
        let _b = alloc.alloc(ChunkSizeClass::Small);
        assert_eq!(alloc.page_count(ChunkSizeClass::Small), 1);
        let _c = alloc.alloc(ChunkSizeClass::Small);
        assert_eq!(alloc.page_count(ChunkSizeClass::Small), 2);
    }

    #[test]
    fn gc_keeps_one_empty_page() {
        let mut alloc = ChunkAllocator::new(ChunkAllocatorConfig {
            small_bytes: 1024,
            big_bytes: 2048,
            page_bytes: 2048,
        });
        let a = alloc.alloc(ChunkSizeClass::Small);
        let b = alloc.alloc(ChunkSizeClass::Small);
        let c = alloc.alloc(ChunkSizeClass::Small);
        alloc.free(ChunkSizeClass::Small, a);
        alloc.free(ChunkSizeClass::Small, b);
        alloc.free(ChunkSizeClass::Small, c);
        assert_eq!(alloc.page_count(ChunkSizeClass::Small), 2);
        alloc.gc();
        assert_eq!(alloc.page_count(ChunkSizeClass::Small), 1);
    }
}
