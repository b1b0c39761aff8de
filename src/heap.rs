use std::ptr::NonNull;

use log::{trace, warn};

use crate::{
    block::{block_capacity_for, Block, BlockList, BLOCK_HEADER_SIZE},
    error::HeapError,
    grow::{Arena, HeapGrower},
    header::Header,
    list::LinkedList,
    Pointer,
};

/// This is the memory master: the heads of the free list and the occupied
/// list plus the [`HeapGrower`] that supplies storage for new blocks.
///
/// ```text
///                    +-------+    +-------+
/// free_blocks     -> | Free  | -> | Free  |
///                    +-------+    +-------+
///
///                    +-------+    +-------+    +-------+
/// occupied_blocks -> | Block | -> | Block | -> | Block |
///                    +-------+    +-------+    +-------+
/// ```
///
/// Every block is linked into exactly one of the two lists. Blocks are never
/// split, merged or given back to the grower. Once a block exists it just
/// moves back and forth between the lists, keeping the capacity it was created
/// with. Allocation order is preserved in the occupied list and release order
/// in the free list.
///
/// The heap is not thread safe and needs mutable borrows to operate. See
/// [`crate::SharedHeap`] for a locked wrapper.
pub struct Heap<G: HeapGrower = Arena> {
    /// Blocks available for reuse, in the order they were released.
    pub(crate) free_blocks: BlockList,
    /// Blocks handed out to the client, in the order they were handed out.
    pub(crate) occupied_blocks: BlockList,
    /// Where new blocks come from.
    grower: G,
}

// All the blocks live in memory owned by the grower and are only reachable
// through this struct, so moving the heap to another thread moves everything.
unsafe impl<G: HeapGrower + Send> Send for Heap<G> {}

/// Snapshot of both lists. See [`Heap::stats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Number of blocks in the free list.
    pub free_blocks: usize,
    /// Sum of the capacity of all free blocks.
    pub free_bytes: usize,
    /// Number of blocks in the occupied list.
    pub occupied_blocks: usize,
    /// Sum of `used_size` over occupied blocks.
    pub used_bytes: usize,
    /// Sum of the capacity of all occupied blocks.
    pub occupied_bytes: usize,
}

impl Heap<Arena> {
    /// Creates an empty heap backed by an [`Arena`] of
    /// [`crate::DEFAULT_ARENA_CAPACITY`] bytes.
    pub fn new() -> Result<Self, HeapError> {
        Ok(Self::with_grower(Arena::new()?))
    }

    /// Creates an empty heap that can grow up to `capacity` bytes (rounded up
    /// to whole pages), headers included.
    pub fn with_capacity(capacity: usize) -> Result<Self, HeapError> {
        Ok(Self::with_grower(Arena::with_capacity(capacity)?))
    }
}

impl<G: HeapGrower> Heap<G> {
    /// Creates an empty heap that obtains memory from `grower`. Nothing is
    /// requested until the first allocation misses the free list.
    pub const fn with_grower(grower: G) -> Self {
        Self {
            free_blocks: LinkedList::new(),
            occupied_blocks: LinkedList::new(),
            grower,
        }
    }

    /// The growth primitive backing this heap.
    pub fn grower(&self) -> &G {
        &self.grower
    }

    /// Returns an address where `size` bytes can be written, aligned to
    /// [`crate::POINTER_SIZE`].
    ///
    /// The free list is searched in order and the first block that can hold
    /// `size` bytes is reused, even if it's much bigger than needed. If no free
    /// block fits, a new one is carved out of fresh memory from the grower. The
    /// only way this fails is the grower running out of memory.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, HeapError> {
        unsafe {
            if let Some(mut block) = self.find_free_block(size) {
                block.as_mut().data.used_size = size;
                self.free_blocks.remove(block);
                self.occupied_blocks.append(block);

                let address = Header::content_address_of(block);
                trace!(
                    "allocate({size}) -> {address:p} reused (max size {})",
                    block.as_ref().max_size()
                );

                return Ok(address);
            }

            let block = self.create_block(size)?;
            self.occupied_blocks.append(block);

            let address = Header::content_address_of(block);
            trace!(
                "allocate({size}) -> {address:p} new (max size {})",
                block.as_ref().max_size()
            );

            Ok(address)
        }
    }

    /// Gives the block at `address` back to the heap. The block goes to the
    /// end of the free list as it is, adjacent free blocks are not merged.
    ///
    /// # Safety
    ///
    /// `address` must have been returned by [`Heap::allocate`] on this same
    /// heap, and must not have been deallocated or collected since. Anything
    /// else is undefined behaviour.
    pub unsafe fn deallocate(&mut self, address: NonNull<u8>) {
        let block = Header::<Block>::from_content_address(address);

        if !self.occupied_blocks.remove(block) {
            warn!("deallocate({address:p}) ignored, block is not occupied");
            return;
        }

        trace!(
            "deallocate({address:p}) -> {} bytes released",
            block.as_ref().used_size()
        );

        self.release(block);
    }

    /// Snapshot of the block that owns `address`.
    ///
    /// # Safety
    ///
    /// Same contract as [`Heap::deallocate`].
    pub unsafe fn block_info(&self, address: NonNull<u8>) -> crate::BlockInfo {
        crate::BlockInfo::of(Header::<Block>::from_content_address(address))
    }

    /// Counts blocks and bytes in both lists.
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            free_blocks: self.free_blocks.len(),
            free_bytes: self.free_blocks().map(|block| block.max_size).sum(),
            occupied_blocks: self.occupied_blocks.len(),
            ..Default::default()
        };

        for block in self.occupied_blocks() {
            stats.used_bytes += block.used_size;
            stats.occupied_bytes += block.max_size;
        }

        stats
    }

    /// Links an unlinked block into the free list. Used by both
    /// [`Heap::deallocate`] and the collector.
    ///
    /// # Safety
    ///
    /// `block` must be valid and not linked into any list.
    pub(crate) unsafe fn release(&mut self, mut block: NonNull<Header<Block>>) {
        block.as_mut().data.used_size = 0;
        block.as_mut().data.mark = false;
        self.free_blocks.append(block);
    }

    /// Returns the first block in the free list that can hold `size` bytes or
    /// `None` if we didn't find any. First fit, not best fit.
    unsafe fn find_free_block(&self, size: usize) -> Pointer<Header<Block>> {
        self.free_blocks
            .iter()
            .find(|block| unsafe { block.as_ref().max_size() } >= size)
    }

    /// Requests `BLOCK_HEADER_SIZE + capacity` bytes from the grower and writes
    /// an unlinked header at the beginning:
    ///
    /// ```text
    /// +-------------+  <- Address returned by the grower.
    /// |   Header    |
    /// +-------------+  <- Address returned to the client.
    /// |   Content   |  <- block_capacity_for(size) bytes.
    /// +-------------+
    /// ```
    unsafe fn create_block(&mut self, size: usize) -> Result<NonNull<Header<Block>>, HeapError> {
        let Some(capacity) = block_capacity_for(size) else {
            warn!("allocate({size}) -> capacity overflow");
            return Err(HeapError::Exhausted { requested: size });
        };

        let Some(requested) = capacity.checked_add(BLOCK_HEADER_SIZE) else {
            warn!("allocate({size}) -> capacity overflow");
            return Err(HeapError::Exhausted { requested: size });
        };

        let Some(address) = self.grower.grow(requested) else {
            warn!("allocate({size}) -> heap exhausted, could not grow by {requested} bytes");
            return Err(HeapError::Exhausted { requested });
        };

        let block = Block {
            used_size: size,
            max_size: capacity,
            mark: false,
        };

        Ok(LinkedList::write(block, address))
    }
}

impl<G: HeapGrower> std::fmt::Debug for Heap<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap").field("stats", &self.stats()).finish()
    }
}
