use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("out of memory (requested {size} bytes)")]
pub struct AllocError {
    pub size: usize,
}

/// Memory capability handed to a font.
///
/// Every glyph bitmap and every line buffer the parser creates is obtained
/// through `allocate` and handed back through `free` exactly once, either when
/// the line turns out to be disposable or when the owning font is released.
pub trait Allocator {
    /// Returns a zeroed block of exactly `size` bytes.
    fn allocate(&self, size: usize) -> Result<Box<[u8]>, AllocError>;

    fn free(&self, block: Box<[u8]>);
}

/// The global heap, with allocation failure reported instead of aborting.
#[derive(Debug, Clone, Copy, Default)]
pub struct Heap;

impl Allocator for Heap {
    fn allocate(&self, size: usize) -> Result<Box<[u8]>, AllocError> {
        let mut block = Vec::new();
        block.try_reserve_exact(size).map_err(|_| AllocError { size })?;
        block.resize(size, 0);
        Ok(block.into_boxed_slice())
    }

    fn free(&self, block: Box<[u8]>) {
        drop(block);
    }
}

#[derive(Debug, Default)]
struct Counters {
    outstanding_blocks: AtomicUsize,
    outstanding_bytes: AtomicUsize,
    total_allocations: AtomicUsize,
}

/// Heap allocator that keeps track of what is currently handed out.
///
/// Clones share their counters, so a test can keep one handle while the font
/// owns another. An optional byte limit makes allocations fail once the
/// outstanding total would exceed it.
#[derive(Debug, Clone, Default)]
pub struct CountingAllocator {
    counters: Arc<Counters>,
    limit: Option<usize>,
}

impl CountingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            counters: Arc::default(),
            limit: Some(limit),
        }
    }

    pub fn outstanding_blocks(&self) -> usize {
        self.counters.outstanding_blocks.load(Ordering::SeqCst)
    }

    pub fn outstanding_bytes(&self) -> usize {
        self.counters.outstanding_bytes.load(Ordering::SeqCst)
    }

    pub fn total_allocations(&self) -> usize {
        self.counters.total_allocations.load(Ordering::SeqCst)
    }
}

impl Allocator for CountingAllocator {
    fn allocate(&self, size: usize) -> Result<Box<[u8]>, AllocError> {
        if let Some(limit) = self.limit {
            if self.outstanding_bytes() + size > limit {
                return Err(AllocError { size });
            }
        }
        let block = Heap.allocate(size)?;
        self.counters.outstanding_blocks.fetch_add(1, Ordering::SeqCst);
        self.counters.outstanding_bytes.fetch_add(size, Ordering::SeqCst);
        self.counters.total_allocations.fetch_add(1, Ordering::SeqCst);
        Ok(block)
    }

    fn free(&self, block: Box<[u8]>) {
        self.counters.outstanding_blocks.fetch_sub(1, Ordering::SeqCst);
        self.counters
            .outstanding_bytes
            .fetch_sub(block.len(), Ordering::SeqCst);
    }
}

/// A line of source text living in an allocator block.
///
/// Built by copying the caller's text, so the caller's buffer can be reused
/// as soon as the copy returns.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct LineBuf {
    text: String,
}

impl LineBuf {
    pub(crate) fn copy_from<A: Allocator>(allocator: &A, line: &str) -> Result<Self, AllocError> {
        let mut block = allocator.allocate(line.len())?;
        block.copy_from_slice(line.as_bytes());
        match String::from_utf8(block.into_vec()) {
            Ok(text) => Ok(Self { text }),
            // Unreachable for bytes copied out of a `&str`; hand the block back regardless.
            Err(err) => {
                allocator.free(err.into_bytes().into_boxed_slice());
                Err(AllocError { size: line.len() })
            }
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.text
    }

    pub(crate) fn release<A: Allocator>(self, allocator: &A) {
        allocator.free(self.text.into_bytes().into_boxed_slice());
    }
}
