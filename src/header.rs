use std::ptr::NonNull;

use crate::list::Node;

/// Every block header is also the node that links the block into the free
/// list or the occupied list, so a header is just a [`Node<T>`] seen from the
/// point of view of the memory layout rather than the list.
pub(crate) type Header<T> = Node<T>;

impl<T> Header<T> {
    /// Recovers the header from an address handed out to the client, which is
    /// always the first byte after the header:
    ///
    /// ```text
    /// header ->  +-------------+
    ///            |  Header<T>  |
    /// address -> +-------------+
    ///            |   Content   |
    ///            +-------------+
    /// ```
    ///
    /// # Safety
    ///
    /// `address` must be exactly one of the content addresses produced by
    /// [`Header::content_address_of`]. The subtraction is blind, any other
    /// address yields a pointer to garbage.
    #[inline]
    pub unsafe fn from_content_address(address: NonNull<u8>) -> NonNull<Self> {
        NonNull::new_unchecked(address.as_ptr().cast::<Self>().offset(-1))
    }

    /// First byte after `header`, the address handed out to the client.
    ///
    /// # Safety
    ///
    /// `header` must point to a valid header followed by its content. Taking
    /// the header by pointer instead of `&self` avoids creating a reference
    /// that covers the header while the content is being written through the
    /// returned pointer.
    #[inline]
    pub unsafe fn content_address_of(header: NonNull<Self>) -> NonNull<u8> {
        NonNull::new_unchecked(header.as_ptr().offset(1)).cast()
    }
}
