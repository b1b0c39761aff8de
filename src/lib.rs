//! First-fit heap manager with a conservative mark and sweep collector.
//!
//! Every block handed out by [`Heap::allocate`] is prefixed by a header that
//! links it into one of two singly linked lists: the free list or the occupied
//! list. [`Heap::collect`] presumes every occupied block is garbage, scans the
//! contents of all occupied blocks word by word looking for values equal to
//! the address of another occupied block, and moves whatever wasn't referenced
//! to the free list. Memory comes from a [`HeapGrower`], which only ever
//! extends the heap.
//!
//! ```rust
//! use markheap::Heap;
//!
//! let mut heap = Heap::new().unwrap();
//!
//! let first = heap.allocate(std::mem::size_of::<usize>()).unwrap();
//! let second = heap.allocate(10 * std::mem::size_of::<i32>()).unwrap();
//!
//! // The first block references the second one, nothing references the first.
//! unsafe { *first.cast::<usize>().as_ptr() = second.as_ptr() as usize };
//!
//! assert_eq!(heap.collect(), std::mem::size_of::<usize>());
//! assert_eq!(heap.stats().occupied_blocks, 1);
//! ```

mod block;
mod collect;
mod dump;
mod error;
mod grow;
mod header;
mod heap;
mod list;
mod platform;
mod shared;

use std::ptr::NonNull;

/// Non-null pointer to `T`. We use this in most cases instead of `*mut T`
/// because the compiler will yell at us if we don't write code for the `None`
/// case.
pub(crate) type Pointer<T> = Option<NonNull<T>>;

pub use block::{BLOCK_HEADER_SIZE, MIN_BLOCK_SIZE, POINTER_SIZE};
pub use collect::CollectStats;
pub use dump::{BlockInfo, Blocks, HeapDump};
pub use error::HeapError;
#[cfg(all(unix, not(miri)))]
pub use grow::Sbrk;
pub use grow::{Arena, HeapGrower, DEFAULT_ARENA_CAPACITY};
pub use heap::{Heap, HeapStats};
pub use shared::SharedHeap;
