//! Heap growth primitives. A [`crate::Heap`] never gives memory back while it
//! is alive, it only asks for more, so the only operation needed here is
//! "extend by N bytes and tell me where the new bytes start".

use std::ptr::NonNull;

use crate::{block::POINTER_SIZE, error::HeapError, platform, Pointer};

/// Default amount of bytes reserved by [`Arena::new`]: 1 MiB.
pub const DEFAULT_ARENA_CAPACITY: usize = 1 << 20;

/// Source of raw storage for new blocks.
///
/// # Safety
///
/// Implementors must guarantee that every region returned by
/// [`HeapGrower::grow`]:
///
/// - Is valid for reads and writes of at least `length` bytes and stays valid
/// for as long as the grower is alive.
/// - Starts at an address aligned to [`POINTER_SIZE`].
/// - Never overlaps any region returned before (growth is monotonic).
pub unsafe trait HeapGrower {
    /// Extends the heap by at least `length` bytes and returns the address
    /// where the new region starts, or `None` if there's no more memory.
    fn grow(&mut self, length: usize) -> Pointer<u8>;
}

/// Rounds `length` up to the next multiple of [`POINTER_SIZE`]. Block
/// capacities don't have to be word multiples (see
/// [`crate::block::block_capacity_for`]) but the header that comes after them
/// must be aligned, so grants are padded.
#[inline]
pub(crate) const fn word_align(length: usize) -> Option<usize> {
    match length.checked_add(POINTER_SIZE - 1) {
        Some(padded) => Some(padded & !(POINTER_SIZE - 1)),
        None => None,
    }
}

/// Explicitly owned heap: a region of pages reserved once from the kernel
/// with a bump cursor that only moves forward.
///
/// ```text
/// start                       cursor                                  end
///   |                           |                                      |
///   v                           v                                      v
///   +--------+--------+---------+--------------------------------------+
///   | grant  | grant  |  grant  |            not granted yet           |
///   +--------+--------+---------+--------------------------------------+
/// ```
///
/// Growing fails once the cursor can't move `length` bytes without passing the
/// end of the reservation. The whole region goes back to the kernel when the
/// arena is dropped, which is the only moment heap memory is ever released.
pub struct Arena {
    /// First byte of the reservation.
    start: NonNull<u8>,
    /// Length of the reservation, a multiple of the page size.
    length: usize,
    /// Offset of the first byte that hasn't been granted yet.
    cursor: usize,
}

// The arena owns its reservation exclusively.
unsafe impl Send for Arena {}

impl Arena {
    /// Reserves [`DEFAULT_ARENA_CAPACITY`] bytes.
    pub fn new() -> Result<Self, HeapError> {
        Self::with_capacity(DEFAULT_ARENA_CAPACITY)
    }

    /// Reserves at least `capacity` bytes, rounded up to whole pages.
    pub fn with_capacity(capacity: usize) -> Result<Self, HeapError> {
        let length = platform::page_align(capacity).ok_or(HeapError::Reserve { length: capacity })?;

        let Some(start) = (unsafe { platform::request_memory(length) }) else {
            log::warn!("could not reserve {length} bytes for arena");
            return Err(HeapError::Reserve { length });
        };

        log::trace!("arena reserved {length} bytes at {start:p}");

        Ok(Self {
            start,
            length,
            cursor: 0,
        })
    }

    /// Total bytes reserved.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.length
    }

    /// Bytes granted so far.
    #[inline]
    pub fn used(&self) -> usize {
        self.cursor
    }

    /// Bytes that can still be granted.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.length - self.cursor
    }

    /// Whether `address` falls inside the granted part of the arena.
    pub fn contains(&self, address: *const u8) -> bool {
        let start = self.start.as_ptr() as usize;
        (start..start + self.cursor).contains(&(address as usize))
    }
}

unsafe impl HeapGrower for Arena {
    fn grow(&mut self, length: usize) -> Pointer<u8> {
        let length = word_align(length)?;

        if length > self.remaining() {
            return None;
        }

        // SAFETY: cursor + length <= self.length, still inside the reservation.
        let address = unsafe { NonNull::new_unchecked(self.start.as_ptr().add(self.cursor)) };
        self.cursor += length;

        Some(address)
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        log::trace!("arena released {} bytes at {:p}", self.length, self.start);
        unsafe { platform::return_memory(self.start, self.length) }
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("start", &self.start)
            .field("capacity", &self.length)
            .field("used", &self.cursor)
            .finish()
    }
}

/// Grows the process heap by moving the program break with `sbrk`. Memory
/// obtained this way is never returned, not even when the grower is dropped.
///
/// Not reentrant: `sbrk` is process global, so at most one heap should use it
/// and nothing else in the process should expect the break to stay put.
#[cfg(all(unix, not(miri)))]
#[derive(Debug, Default, Clone, Copy)]
pub struct Sbrk;

#[cfg(all(unix, not(miri)))]
unsafe impl HeapGrower for Sbrk {
    fn grow(&mut self, length: usize) -> Pointer<u8> {
        let length = word_align(length)?;

        unsafe {
            // The initial break doesn't have to be word aligned.
            let current = libc::sbrk(0) as usize;
            let padding = current.wrapping_neg() & (POINTER_SIZE - 1);
            let increment = libc::intptr_t::try_from(length.checked_add(padding)?).ok()?;

            let address = libc::sbrk(increment);
            if address as usize == usize::MAX {
                return None;
            }

            NonNull::new(address.cast::<u8>().add(padding))
        }
    }
}

#[cfg(test)]
mod tests {
    use test_env_log::test;

    use super::*;

    #[test]
    fn word_alignment() {
        assert_eq!(word_align(0), Some(0));
        assert_eq!(word_align(1), Some(POINTER_SIZE));
        assert_eq!(word_align(POINTER_SIZE), Some(POINTER_SIZE));
        assert_eq!(word_align(POINTER_SIZE + 1), Some(2 * POINTER_SIZE));
        assert_eq!(word_align(usize::MAX), None);
    }

    #[test]
    fn arena_grants_are_monotonic_and_aligned() {
        let mut arena = Arena::with_capacity(4096).unwrap();
        assert_eq!(arena.capacity() % platform::page_size(), 0);

        let first = arena.grow(10).unwrap();
        let second = arena.grow(3).unwrap();
        let third = arena.grow(64).unwrap();

        assert_eq!(first.as_ptr() as usize % POINTER_SIZE, 0);
        assert_eq!(second.as_ptr() as usize - first.as_ptr() as usize, 16);
        assert_eq!(third.as_ptr() as usize - second.as_ptr() as usize, POINTER_SIZE);
        assert_eq!(arena.used(), 16 + POINTER_SIZE + 64);

        assert!(arena.contains(first.as_ptr()));
        assert!(arena.contains(unsafe { third.as_ptr().add(63) }));
        assert!(!arena.contains(unsafe { third.as_ptr().add(64) }));
    }

    #[test]
    fn arena_exhaustion() {
        let mut arena = Arena::with_capacity(1).unwrap();
        let capacity = arena.capacity();

        assert!(arena.grow(capacity + 1).is_none());
        // Failed growth doesn't consume anything.
        assert_eq!(arena.used(), 0);

        let whole = arena.grow(capacity).unwrap();
        unsafe { std::slice::from_raw_parts_mut(whole.as_ptr(), capacity).fill(1) };

        assert_eq!(arena.remaining(), 0);
        assert!(arena.grow(1).is_none());
        assert!(arena.grow(usize::MAX).is_none());
    }

    #[test]
    fn arena_reservation_overflow() {
        assert_eq!(
            Arena::with_capacity(usize::MAX).unwrap_err(),
            HeapError::Reserve { length: usize::MAX }
        );
    }

    #[cfg(all(unix, not(miri)))]
    #[test]
    fn sbrk_moves_the_break_forward() {
        let mut sbrk = Sbrk;

        let first = sbrk.grow(24).unwrap();
        let second = sbrk.grow(8).unwrap();

        assert_eq!(first.as_ptr() as usize % POINTER_SIZE, 0);
        assert_eq!(second.as_ptr() as usize % POINTER_SIZE, 0);
        assert!(second.as_ptr() as usize >= first.as_ptr() as usize + 24);

        unsafe {
            *first.cast::<u64>().as_ptr() = 1;
            *second.cast::<u64>().as_ptr() = 2;
            assert_eq!(*first.cast::<u64>().as_ptr(), 1);
        }
    }
}
