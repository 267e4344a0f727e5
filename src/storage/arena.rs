//! Block-Based Bump Allocator
//!
//! Keys and string/binary payloads are not stored as individually owned
//! allocations. Instead the hash table copies them into an arena: a list of
//! large blocks served by a bump pointer. Callers get back a small copyable
//! [`Span`] handle and resolve it through the arena when they need the bytes.
//!
//! ## Memory Layout
//!
//! ```text
//! Block 0: [key0][val0][key1][val1]........[free]
//! Block 1: [key2][val2]...................[free]
//! Block 2: [one oversize payload                ]
//!           ^
//!           Span { block: 2, offset: 0, len: n }
//! ```
//!
//! There is deliberately no per-span free. Deleting or overwriting an entry
//! strands its old bytes until the whole arena is reset, which is a bulk
//! O(blocks) operation. This trades steady-state memory for allocation speed
//! and trivially correct ownership.

/// Payload capacity of a standard arena block (64 KiB).
pub const ARENA_BLOCK_SIZE: usize = 64 * 1024;

/// All allocations are rounded up to this alignment.
const ARENA_ALIGNMENT: usize = 8;

/// Handle to a byte range inside an [`Arena`].
///
/// Spans are plain indices, so they stay valid across arena growth. A span
/// taken before a `reset` must not be resolved afterwards; the hash table
/// discards all spans when it clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    block: u32,
    offset: u32,
    len: u32,
}

impl Span {
    /// Length in bytes of the spanned range.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns true for a zero-length span.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A single fixed-capacity block. `data.len()` is the bump pointer.
#[derive(Debug)]
struct Block {
    data: Vec<u8>,
}

impl Block {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.data.capacity() - self.data.len()
    }
}

/// Bump allocator over a list of blocks.
#[derive(Debug, Default)]
pub struct Arena {
    blocks: Vec<Block>,
    /// Index of the block currently serving allocations.
    current: usize,
    total_used: usize,
}

impl Arena {
    /// Creates an empty arena. No block is allocated until the first copy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies `bytes` into the arena and returns a handle to the copy.
    ///
    /// Served from the current block when it fits; otherwise a new block of
    /// `max(ARENA_BLOCK_SIZE, len)` bytes is opened and becomes current.
    /// Earlier blocks are never revisited.
    pub fn alloc(&mut self, bytes: &[u8]) -> Span {
        let aligned = align_up(bytes.len().max(1));

        if self.blocks.is_empty() || self.blocks[self.current].remaining() < aligned {
            let capacity = ARENA_BLOCK_SIZE.max(aligned);
            self.blocks.push(Block::with_capacity(capacity));
            self.current = self.blocks.len() - 1;
        }

        let block = &mut self.blocks[self.current];
        let offset = block.data.len();
        block.data.extend_from_slice(bytes);
        // Pad to keep the next offset aligned.
        block.data.resize(offset + aligned, 0);
        self.total_used += aligned;

        Span {
            block: self.current as u32,
            offset: offset as u32,
            len: bytes.len() as u32,
        }
    }

    /// Resolves a span to its bytes.
    ///
    /// # Panics
    ///
    /// Panics if the span does not belong to this arena or predates the last
    /// [`reset`](Self::reset).
    #[inline]
    pub fn get(&self, span: Span) -> &[u8] {
        let start = span.offset as usize;
        &self.blocks[span.block as usize].data[start..start + span.len as usize]
    }

    /// Marks every block empty without releasing capacity.
    ///
    /// All outstanding spans become invalid. Allocation restarts at block 0.
    pub fn reset(&mut self) {
        for block in &mut self.blocks {
            block.data.clear();
        }
        self.current = 0;
        self.total_used = 0;
    }

    /// Total capacity across all blocks, in bytes.
    pub fn total_allocated(&self) -> usize {
        self.blocks.iter().map(|b| b.data.capacity()).sum()
    }

    /// Bytes handed out since creation or the last reset (alignment included).
    pub fn total_used(&self) -> usize {
        self.total_used
    }
}

#[inline]
fn align_up(n: usize) -> usize {
    (n + ARENA_ALIGNMENT - 1) & !(ARENA_ALIGNMENT - 1)
}
