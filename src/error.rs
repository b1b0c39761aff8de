use thiserror::Error;

/// Everything that can go wrong without the caller breaking a safety
/// contract. Misuse of [`crate::Heap::deallocate`] is undefined behaviour and
/// is not reported here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeapError {
    /// The heap couldn't grow by `requested` bytes (header included).
    #[error("heap exhausted: cannot grow by {requested} bytes")]
    Exhausted { requested: usize },

    /// The platform refused to reserve the backing region.
    #[error("failed to reserve {length} bytes for the heap")]
    Reserve { length: usize },

    /// A thread panicked while holding the lock of a [`crate::SharedHeap`].
    #[error("heap lock poisoned")]
    Poisoned,
}
