use std::{
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::Pointer;

/// Abstraction for platform specific memory handling. The heap only needs to
/// reserve one region of pages up front and give it back when it's dropped,
/// but it doesn't care about the APIs offered by the underlying kernel or
/// libraries.
trait PlatformSpecificMemory {
    /// Requests a zeroed memory region from the kernel where `length` bytes
    /// can be written safely.
    unsafe fn request_memory(length: usize) -> Pointer<u8>;

    /// Returns `length` bytes starting from `address` to the underlying
    /// kernel. `address` and `length` must be exactly what was obtained from
    /// [`PlatformSpecificMemory::request_memory`].
    unsafe fn return_memory(address: NonNull<u8>, length: usize);

    /// Virtual memory page size in bytes.
    unsafe fn page_size() -> usize;
}

/// Zero sized type that implements [`PlatformSpecificMemory`] for each OS.
pub(crate) struct Platform;

/// Virtual memory page size. 4096 bytes on most computers. We only know it at
/// runtime, so it's cached here after the first query.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

#[inline]
pub(crate) fn page_size() -> usize {
    match PAGE_SIZE.load(Ordering::Relaxed) {
        0 => {
            let size = unsafe { Platform::page_size() };
            PAGE_SIZE.store(size, Ordering::Relaxed);
            size
        }
        size => size,
    }
}

/// Rounds `length` up to a whole number of pages. `None` on overflow.
#[inline]
pub(crate) fn page_align(length: usize) -> Option<usize> {
    let page = page_size();
    let pages = length.checked_add(page - 1)? / page;

    pages.max(1).checked_mul(page)
}

/// Convenience wrapper for [`PlatformSpecificMemory::request_memory`].
#[inline]
pub(crate) unsafe fn request_memory(length: usize) -> Pointer<u8> {
    Platform::request_memory(length)
}

/// Convenience wrapper for [`PlatformSpecificMemory::return_memory`].
#[inline]
pub(crate) unsafe fn return_memory(address: NonNull<u8>, length: usize) {
    Platform::return_memory(address, length)
}

#[cfg(unix)]
#[cfg(not(miri))]
mod unix {
    use std::ptr::{self, NonNull};

    use super::{Platform, PlatformSpecificMemory};
    use crate::Pointer;

    impl PlatformSpecificMemory for Platform {
        unsafe fn request_memory(length: usize) -> Pointer<u8> {
            // Memory protection. Read-Write only.
            let protection = libc::PROT_READ | libc::PROT_WRITE;

            // Memory should be private to our process and not mapped to any
            // file. Anonymous mappings are zero filled.
            let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

            match libc::mmap(ptr::null_mut(), length, protection, flags, -1, 0) {
                libc::MAP_FAILED => None,
                address => Some(NonNull::new_unchecked(address).cast()),
            }
        }

        unsafe fn return_memory(address: NonNull<u8>, length: usize) {
            if libc::munmap(address.cast().as_ptr(), length) != 0 {
                log::warn!("munmap({:p}, {}) failed, region leaked", address, length);
            }
        }

        unsafe fn page_size() -> usize {
            libc::sysconf(libc::_SC_PAGE_SIZE) as usize
        }
    }
}

#[cfg(windows)]
#[cfg(not(miri))]
mod windows {
    use std::{mem::MaybeUninit, ptr::NonNull};

    use windows::Win32::System::{Memory, SystemInformation};

    use super::{Platform, PlatformSpecificMemory};
    use crate::Pointer;

    impl PlatformSpecificMemory for Platform {
        unsafe fn request_memory(length: usize) -> Pointer<u8> {
            // Similar to mmap on Linux, Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            // Memory has to be reserved first and then committed in order to
            // become usable. We can do both at the same time with one single
            // call. Committed pages are zero filled.
            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            let address = Memory::VirtualAlloc(None, length, flags, protection);

            NonNull::new(address.cast())
        }

        unsafe fn return_memory(address: NonNull<u8>, length: usize) {
            // Releasing requires length 0, the whole reservation goes away.
            if !Memory::VirtualFree(address.cast().as_ptr(), 0, Memory::MEM_RELEASE).as_bool() {
                log::warn!("VirtualFree({:p}, {}) failed, region leaked", address, length);
            }
        }

        unsafe fn page_size() -> usize {
            let mut system_info = MaybeUninit::uninit();
            SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

            system_info.assume_init().dwPageSize as usize
        }
    }
}

#[cfg(miri)]
mod miri {
    //! When using Miri, we can't rely on system calls such as `mmap` because
    //! there's no FFI support, so instead we'll use the global allocator to
    //! mock low level memory management.

    use std::{alloc, ptr::NonNull};

    use super::{page_size, Platform, PlatformSpecificMemory};
    use crate::Pointer;

    fn to_layout(length: usize) -> Option<alloc::Layout> {
        alloc::Layout::from_size_align(length, page_size()).ok()
    }

    impl PlatformSpecificMemory for Platform {
        unsafe fn request_memory(length: usize) -> Pointer<u8> {
            NonNull::new(alloc::alloc_zeroed(to_layout(length)?))
        }

        unsafe fn return_memory(address: NonNull<u8>, length: usize) {
            if let Some(layout) = to_layout(length) {
                alloc::dealloc(address.as_ptr(), layout);
            }
        }

        unsafe fn page_size() -> usize {
            4096
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_alignment() {
        let page = page_size();
        assert!(page.is_power_of_two());

        assert_eq!(page_align(0), Some(page));
        assert_eq!(page_align(1), Some(page));
        assert_eq!(page_align(page), Some(page));
        assert_eq!(page_align(page + 1), Some(2 * page));
        assert_eq!(page_align(usize::MAX), None);
    }

    #[test]
    fn request_and_return() {
        let length = page_size() * 2;

        unsafe {
            let address = request_memory(length).unwrap();
            let bytes = std::slice::from_raw_parts_mut(address.as_ptr(), length);

            assert!(bytes.iter().all(|byte| *byte == 0));
            bytes.fill(69);
            assert!(bytes.iter().all(|byte| *byte == 69));

            return_memory(address, length);
        }
    }
}
