//! Conservative mark and sweep.
//!
//! The collector doesn't know anything about the types stored in the blocks.
//! It treats every word inside every occupied block as a potential pointer: if
//! the value of a word is exactly the content address of an occupied block,
//! that block is considered referenced. Integers that happen to look like
//! addresses keep blocks alive too, that's what conservative means.
//!
//! The root set is the contents of the occupied blocks themselves. The stack,
//! registers and statics of the program are never looked at, so a block that
//! is only referenced from a local variable is garbage as far as
//! [`Heap::collect`] is concerned.

use std::ptr::NonNull;

use log::{debug, trace};

use crate::{
    block::{Block, POINTER_SIZE},
    grow::HeapGrower,
    header::Header,
    heap::Heap,
};

/// Outcome of one collection. See [`Heap::collect_with_stats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    /// Sum of `used_size` of every reclaimed block.
    pub bytes_freed: usize,
    /// Number of blocks moved to the free list.
    pub blocks_freed: usize,
    /// Number of blocks that stayed in the occupied list.
    pub blocks_survived: usize,
}

impl<G: HeapGrower> Heap<G> {
    /// Reclaims every occupied block that no other occupied block references
    /// and returns the number of bytes freed (the sum of their `used_size`).
    ///
    /// Reclaimed blocks are moved to the free list exactly as if they had
    /// been passed to [`Heap::deallocate`], so any address pointing into them
    /// must not be used anymore.
    pub fn collect(&mut self) -> usize {
        self.collect_with_stats().bytes_freed
    }

    /// Same as [`Heap::collect`] but reports block counts as well.
    ///
    /// Block states during a collection:
    ///
    /// ```text
    ///                    mark_all_garbage         scan            sweep
    /// LIVE (occupied) -------------------> PRESUMED ---+---> CONFIRMED LIVE (occupied)
    ///                                      GARBAGE     |
    ///                                                  +---> RECLAIMED (free)
    /// ```
    pub fn collect_with_stats(&mut self) -> CollectStats {
        unsafe {
            self.mark_all_garbage();
            self.scan();
            let stats = self.sweep();

            debug!(
                "collect -> {} bytes in {} blocks freed, {} blocks survived",
                stats.bytes_freed, stats.blocks_freed, stats.blocks_survived
            );

            stats
        }
    }

    /// Pessimistic start: every occupied block is garbage until some other
    /// block proves otherwise.
    unsafe fn mark_all_garbage(&mut self) {
        for mut block in self.occupied_blocks.iter() {
            block.as_mut().data.mark = true;
        }
    }

    /// Scans every occupied block, marked or not. Since nobody waits for a
    /// block to be proven live before scanning it, chains like A -> B -> C
    /// are resolved in one pass regardless of list order.
    unsafe fn scan(&mut self) {
        for block in self.occupied_blocks.iter() {
            for candidate in scan_window(block) {
                if let Some(mut target) = self.occupied_block_at(candidate) {
                    trace!(
                        "{:p} references {:p}",
                        Header::content_address_of(block),
                        Header::content_address_of(target)
                    );
                    target.as_mut().data.mark = false;
                }
            }
        }
    }

    /// Moves every block that is still marked to the free list. The list is
    /// unlinked while walking it, so the next node is read before touching the
    /// current one.
    unsafe fn sweep(&mut self) -> CollectStats {
        let mut stats = CollectStats::default();
        let mut current = self.occupied_blocks.first();

        while let Some(block) = current {
            current = block.as_ref().next;

            if !block.as_ref().is_marked() {
                stats.blocks_survived += 1;
                continue;
            }

            stats.bytes_freed += block.as_ref().used_size();
            stats.blocks_freed += 1;

            trace!(
                "{:p} reclaimed ({} bytes)",
                Header::content_address_of(block),
                block.as_ref().used_size()
            );

            self.occupied_blocks.remove(block);
            self.release(block);
        }

        stats
    }

    /// Returns the occupied block whose content starts exactly at `address`.
    /// Addresses pointing into the middle of a block don't count.
    unsafe fn occupied_block_at(&self, address: usize) -> Option<NonNull<Header<Block>>> {
        self.occupied_blocks
            .iter()
            .find(|block| unsafe { Header::<Block>::content_addr_of(*block) } == address)
    }
}

/// Words of `block` that the collector interprets as candidate addresses.
///
/// Blocks using less than one word are not scanned at all. Otherwise a word
/// is read at every multiple of [`POINTER_SIZE`] below `used_size`, as long as
/// the whole word fits in the block capacity. With `used_size = 10` and
/// `max_size = 18` on 64 bit that's the words at offsets 0 and 8, the second
/// one spilling past the used bytes but not past the block.
unsafe fn scan_window(block: NonNull<Header<Block>>) -> impl Iterator<Item = usize> {
    let header = block.as_ref();
    let (used_size, max_size) = (header.used_size(), header.max_size());
    let content = Header::content_address_of(block).cast::<usize>();

    let words = if used_size < POINTER_SIZE {
        0
    } else {
        let reachable = (used_size + POINTER_SIZE - 1) / POINTER_SIZE;
        reachable.min(max_size / POINTER_SIZE)
    };

    (0..words).map(move |i| unsafe { content.as_ptr().add(i).read() })
}
