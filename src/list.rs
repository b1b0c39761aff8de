use std::{marker::PhantomData, ptr::NonNull};

use crate::Pointer;

/// Singly linked list node. See also [`crate::header::Header<T>`].
pub struct Node<T> {
    pub next: Pointer<Self>,
    pub data: T,
}

/// Intrusive singly linked list shared by the free list and the occupied list.
/// Nodes live inside the heap itself, the list only knows about the first one.
/// There's no tail pointer: appending walks the whole list and removal
/// searches by address, so both operations are O(n).
///
/// The list doesn't know anything about membership. Moving a node from one
/// list to another requires calling [`LinkedList::remove`] on the old list
/// before [`LinkedList::append`] on the new one, otherwise both lists end up
/// sharing nodes.
pub struct LinkedList<T> {
    head: Pointer<Node<T>>,
    len: usize,
    marker: PhantomData<T>,
}

impl<T> LinkedList<T> {
    /// Creates an empty linked list. No allocations happen because, well, we
    /// are the allocator.
    pub const fn new() -> Self {
        Self {
            head: None,
            len: 0,
            marker: PhantomData,
        }
    }

    /// First node of the list or `None` if it's empty.
    #[inline]
    pub fn first(&self) -> Pointer<Node<T>> {
        self.head
    }

    /// Number of nodes currently linked.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Writes a new unlinked node holding `data` at `address`.
    ///
    /// # Safety
    ///
    /// `address` must be valid for writes of [`Node<T>`] and properly aligned.
    pub unsafe fn write(data: T, address: NonNull<u8>) -> NonNull<Node<T>> {
        let node = address.cast::<Node<T>>();
        node.as_ptr().write(Node { next: None, data });

        node
    }

    /// Links `node` after the last node of the list. If the list is empty
    /// `node` becomes the head. Whatever `node` pointed to before is
    /// forgotten.
    ///
    /// # Safety
    ///
    /// `node` must be valid and must not be linked into any list.
    pub unsafe fn append(&mut self, mut node: NonNull<Node<T>>) {
        node.as_mut().next = None;

        match self.last() {
            Some(mut last) => last.as_mut().next = Some(node),
            None => self.head = Some(node),
        }

        self.len += 1;
    }

    /// Unlinks `node` from the list. Nodes are compared by address, never by
    /// content. Returns `false` and leaves the list untouched if `node` is not
    /// linked here.
    ///
    /// # Safety
    ///
    /// All the nodes in the list and `node` itself must be valid.
    pub unsafe fn remove(&mut self, mut node: NonNull<Node<T>>) -> bool {
        let mut link: *mut Pointer<Node<T>> = &mut self.head;

        while let Some(current) = *link {
            if current == node {
                *link = node.as_ref().next;
                node.as_mut().next = None;
                self.len -= 1;
                return true;
            }

            link = &mut (*current.as_ptr()).next;
        }

        false
    }

    /// Whether `node` is linked into this list. Only needed by tests.
    ///
    /// # Safety
    ///
    /// All the nodes in the list must be valid.
    #[cfg(test)]
    pub unsafe fn contains(&self, node: NonNull<Node<T>>) -> bool {
        self.iter().any(|current| current == node)
    }

    /// Iterates over the nodes in list order.
    ///
    /// # Safety
    ///
    /// All the nodes in the list must be valid while the iterator is in use.
    /// The iterator reads the link of a node before yielding it, so the
    /// yielded node may be moved to another list.
    pub unsafe fn iter(&self) -> Iter<'_, T> {
        Iter {
            current: self.head,
            marker: PhantomData,
        }
    }

    /// Walks all the way to the tail.
    unsafe fn last(&self) -> Pointer<Node<T>> {
        self.iter().last()
    }
}

/// Iterator over the nodes of a [`LinkedList<T>`].
pub struct Iter<'a, T> {
    current: Pointer<Node<T>>,
    marker: PhantomData<&'a Node<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = NonNull<Node<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;
        self.current = unsafe { node.as_ref().next };

        Some(node)
    }
}
