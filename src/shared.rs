use std::{ptr::NonNull, sync::Mutex};

use crate::{
    collect::CollectStats,
    error::HeapError,
    grow::{Arena, HeapGrower},
    heap::{Heap, HeapStats},
};

/// [`Heap`] behind a [`Mutex`] so it can be shared between threads. Every
/// operation holds the lock until it completes, which gives the single actor
/// access the heap assumes. Nothing is ever done concurrently, contention is
/// resolved by waiting.
///
/// # Examples
///
/// ```rust
/// use std::thread;
///
/// use markheap::SharedHeap;
///
/// let heap = SharedHeap::new().unwrap();
///
/// thread::scope(|scope| {
///     for _ in 0..4 {
///         scope.spawn(|| {
///             let address = heap.allocate(64).unwrap();
///             unsafe { heap.deallocate(address) };
///         });
///     }
/// });
///
/// assert_eq!(heap.stats().unwrap().occupied_blocks, 0);
/// ```
pub struct SharedHeap<G: HeapGrower = Arena> {
    heap: Mutex<Heap<G>>,
}

impl SharedHeap {
    /// Shared heap backed by an [`Arena`] of [`crate::DEFAULT_ARENA_CAPACITY`]
    /// bytes.
    pub fn new() -> Result<Self, HeapError> {
        Ok(Self::from(Heap::new()?))
    }

    /// Shared heap backed by an [`Arena`] of at least `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Result<Self, HeapError> {
        Ok(Self::from(Heap::with_capacity(capacity)?))
    }
}

impl<G: HeapGrower> From<Heap<G>> for SharedHeap<G> {
    fn from(heap: Heap<G>) -> Self {
        Self {
            heap: Mutex::new(heap),
        }
    }
}

impl<G: HeapGrower> SharedHeap<G> {
    /// Runs `f` with exclusive access to the heap. Useful for batching several
    /// operations under one lock or for [`Heap::dump`].
    pub fn with_heap<T>(&self, f: impl FnOnce(&mut Heap<G>) -> T) -> Result<T, HeapError> {
        match self.heap.lock() {
            Ok(mut heap) => Ok(f(&mut heap)),
            Err(_) => Err(HeapError::Poisoned),
        }
    }

    /// See [`Heap::allocate`].
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, HeapError> {
        self.with_heap(|heap| heap.allocate(size))?
    }

    /// See [`Heap::deallocate`]. Does nothing if the lock is poisoned.
    ///
    /// # Safety
    ///
    /// Same contract as [`Heap::deallocate`]: `address` must come from
    /// [`SharedHeap::allocate`] on this heap and must still be occupied.
    pub unsafe fn deallocate(&self, address: NonNull<u8>) {
        if let Ok(mut heap) = self.heap.lock() {
            heap.deallocate(address)
        }
    }

    /// See [`Heap::collect`].
    pub fn collect(&self) -> Result<usize, HeapError> {
        self.with_heap(|heap| heap.collect())
    }

    /// See [`Heap::collect_with_stats`].
    pub fn collect_with_stats(&self) -> Result<CollectStats, HeapError> {
        self.with_heap(|heap| heap.collect_with_stats())
    }

    /// See [`Heap::stats`].
    pub fn stats(&self) -> Result<HeapStats, HeapError> {
        self.with_heap(|heap| heap.stats())
    }

    /// Gives back the inner heap.
    pub fn into_inner(self) -> Result<Heap<G>, HeapError> {
        self.heap.into_inner().or(Err(HeapError::Poisoned))
    }
}

#[cfg(test)]
mod tests {
    use std::{sync, thread};

    use test_env_log::test;

    use super::*;

    /// Addresses are handed out as integers because [`NonNull`] can't cross
    /// threads.
    fn allocate_all(heap: &SharedHeap, count: usize, size: usize) -> Vec<usize> {
        (0..count)
            .map(|_| heap.allocate(size).unwrap().as_ptr() as usize)
            .collect()
    }

    #[test]
    fn multiple_threads_synchronized_allocs_and_deallocs() {
        let heap = SharedHeap::with_capacity(1 << 20).unwrap();
        let num_threads = 8;
        let barrier = sync::Barrier::new(num_threads);

        thread::scope(|scope| {
            for n in 0..num_threads {
                let (heap, barrier) = (&heap, &barrier);
                scope.spawn(move || unsafe {
                    let addresses = allocate_all(heap, 32, 64);

                    for address in &addresses {
                        (*address as *mut u8).write_bytes(n as u8, 64);
                    }

                    barrier.wait();

                    // Check memory corruption.
                    for address in &addresses {
                        let bytes = std::slice::from_raw_parts(*address as *const u8, 64);
                        assert!(bytes.iter().all(|byte| *byte == n as u8));
                    }

                    for address in addresses {
                        heap.deallocate(NonNull::new_unchecked(address as *mut u8));
                    }
                });
            }
        });

        let stats = heap.stats().unwrap();
        assert_eq!(stats.occupied_blocks, 0);
        assert_eq!(stats.free_blocks, num_threads * 32);
    }

    #[test]
    fn collect_under_the_lock() {
        let heap = SharedHeap::with_capacity(4096).unwrap();

        let kept = heap.allocate(8).unwrap();
        heap.allocate(16).unwrap();
        unsafe { *kept.cast::<usize>().as_ptr() = kept.as_ptr() as usize };

        let stats = heap.collect_with_stats().unwrap();
        assert_eq!(stats.bytes_freed, 16);
        assert_eq!(stats.blocks_survived, 1);
        assert_eq!(heap.collect().unwrap(), 0);

        let dump = heap.with_heap(|heap| heap.dump().to_string()).unwrap();
        assert!(dump.contains("used size: 8"));

        let inner = heap.into_inner().unwrap();
        assert_eq!(inner.stats().occupied_blocks, 1);
    }

    #[test]
    fn poisoned_lock() {
        let heap = SharedHeap::with_capacity(4096).unwrap();

        let result = thread::scope(|scope| {
            scope
                .spawn(|| heap.with_heap(|_| panic!("poison")))
                .join()
        });
        assert!(result.is_err());

        assert_eq!(heap.allocate(8), Err(HeapError::Poisoned));
        assert_eq!(heap.collect(), Err(HeapError::Poisoned));
        assert_eq!(heap.stats(), Err(HeapError::Poisoned));
    }
}
