//! Read-only views of the heap for diagnostics. Nothing in here mutates a
//! block or a list.

use std::{fmt, ptr::NonNull};

use crate::{
    block::Block,
    grow::HeapGrower,
    header::Header,
    heap::Heap,
    list::{Iter, LinkedList},
};

/// Copy of the header of one block, taken at the moment the block was
/// visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Address of the header.
    pub header: NonNull<u8>,
    /// Address handed out to the client, right after the header.
    pub content: NonNull<u8>,
    /// Capacity of the block.
    pub max_size: usize,
    /// Bytes in use, 0 for free blocks.
    pub used_size: usize,
}

impl BlockInfo {
    /// # Safety
    ///
    /// `block` must point to a valid header.
    pub(crate) unsafe fn of(block: NonNull<Header<Block>>) -> Self {
        Self {
            header: block.cast(),
            content: Header::content_address_of(block),
            max_size: block.as_ref().max_size(),
            used_size: block.as_ref().used_size(),
        }
    }
}

/// Iterator over the blocks of either list, in list order.
pub struct Blocks<'a> {
    nodes: Iter<'a, Block>,
}

impl<'a> Blocks<'a> {
    fn new(list: &'a LinkedList<Block>) -> Self {
        // SAFETY: the heap keeps every linked header valid and the shared
        // borrow prevents mutation while iterating.
        Self {
            nodes: unsafe { list.iter() },
        }
    }
}

impl Iterator for Blocks<'_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<Self::Item> {
        self.nodes.next().map(|block| unsafe { BlockInfo::of(block) })
    }
}

impl<G: HeapGrower> Heap<G> {
    /// Free blocks in the order they will be considered by
    /// [`Heap::allocate`].
    pub fn free_blocks(&self) -> Blocks<'_> {
        Blocks::new(&self.free_blocks)
    }

    /// Occupied blocks in the order they were handed out.
    pub fn occupied_blocks(&self) -> Blocks<'_> {
        Blocks::new(&self.occupied_blocks)
    }

    /// Printable report of both lists:
    ///
    /// ```text
    /// FREE LIST:
    ///     Block #0 at address: 0x7f...
    ///     ==> max size: 8, used size: 0
    ///     ==> starting address: 0x7f...
    ///
    /// OCCUPIED LIST:
    ///     ...
    /// ```
    pub fn dump(&self) -> HeapDump<'_, G> {
        HeapDump { heap: self }
    }
}

/// See [`Heap::dump`].
pub struct HeapDump<'a, G: HeapGrower> {
    heap: &'a Heap<G>,
}

fn write_list(f: &mut fmt::Formatter<'_>, blocks: Blocks<'_>) -> fmt::Result {
    for (i, block) in blocks.enumerate() {
        writeln!(f, "\tBlock #{i} at address: {:p}", block.header)?;
        writeln!(
            f,
            "\t==> max size: {}, used size: {}",
            block.max_size, block.used_size
        )?;
        writeln!(f, "\t==> starting address: {:p}\n", block.content)?;
    }

    Ok(())
}

impl<G: HeapGrower> fmt::Display for HeapDump<'_, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FREE LIST:")?;
        write_list(f, self.heap.free_blocks())?;
        writeln!(f, "OCCUPIED LIST:")?;
        write_list(f, self.heap.occupied_blocks())
    }
}
