use std::{mem, ptr::NonNull};

use crate::{header::Header, list::LinkedList};

/// Machine word size in bytes. The collector reads block contents in strides
/// of this many bytes, and every region handed out by a
/// [`crate::grow::HeapGrower`] is a multiple of it so headers stay aligned.
pub const POINTER_SIZE: usize = mem::size_of::<usize>();

/// Smallest data capacity a block can have. One word, so that any block can
/// hold at least one reference to another block.
pub const MIN_BLOCK_SIZE: usize = POINTER_SIZE;

/// Block header size in bytes. See [`Header<T>`] and [`Block`].
pub const BLOCK_HEADER_SIZE: usize = mem::size_of::<Header<Block>>();

/// Free list and occupied list both link the same kind of header.
pub(crate) type BlockList = LinkedList<Block>;

/// Memory block specific data. The complete block header is
/// [`crate::list::Node<Block>`], also known as [`Header<Block>`]:
///
/// ```text
/// +----------------------------+          <----------------------+
/// | pointer to next block      |   <------ Pointer<Node<Block>>  |
/// +----------------------------+                                 |
/// | used size                  |   <------+                      |
/// +----------------------------+          |                      | Header<Block>
/// | max size                   |          | Block                |
/// +----------------------------+          |                      |
/// | mark flag + padding        |   <------+                      |
/// +----------------------------+          <----------------------+
/// |       Block content        |   <------+
/// |            ...             |          | max size bytes
/// |            ...             |   <------+
/// +----------------------------+
/// ```
///
/// Field order is up to the compiler, nothing here depends on it.
pub(crate) struct Block {
    /// Bytes the client asked for the last time this block was handed out.
    /// Always 0 while the block sits in the free list.
    pub used_size: usize,
    /// Capacity of the content, excluding [`BLOCK_HEADER_SIZE`]. Never changes
    /// once the block exists.
    pub max_size: usize,
    /// Only meaningful during a collection. `true` means "nobody references
    /// this block yet, reclaim it at the end".
    pub mark: bool,
}

impl Header<Block> {
    /// Bytes currently in use by the client.
    #[inline]
    pub fn used_size(&self) -> usize {
        self.data.used_size
    }

    /// Block size excluding [`BLOCK_HEADER_SIZE`].
    #[inline]
    pub fn max_size(&self) -> usize {
        self.data.max_size
    }

    #[inline]
    pub fn is_marked(&self) -> bool {
        self.data.mark
    }

    /// Content address of `block` as an integer, which is what the collector
    /// compares candidate words against.
    #[inline]
    pub unsafe fn content_addr_of(block: NonNull<Self>) -> usize {
        Self::content_address_of(block).as_ptr() as usize
    }
}

/// Content capacity of a brand new block that must hold `size` bytes.
///
/// Sizes below [`MIN_BLOCK_SIZE`] get the minimum and exact multiples are kept
/// as they are. Anything else gets exactly one extra [`MIN_BLOCK_SIZE`] added,
/// which is not the same as rounding up to the next multiple: with 8 byte
/// words 9 becomes 17, not 16.
#[inline]
pub(crate) const fn block_capacity_for(size: usize) -> Option<usize> {
    if size < MIN_BLOCK_SIZE {
        Some(MIN_BLOCK_SIZE)
    } else if size % MIN_BLOCK_SIZE == 0 {
        Some(size)
    } else {
        size.checked_add(MIN_BLOCK_SIZE)
    }
}
