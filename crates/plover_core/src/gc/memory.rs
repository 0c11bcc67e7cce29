//! Raw virtual-memory mappings and the semispace region type.
//!
//! The collector needs more from its regions than the system allocator
//! offers: page protection flips to catch stale from-space references in
//! debug builds, and stable page-aligned address ranges the tag scheme can
//! rely on.  Mappings therefore come straight from `mmap`.

use core::ptr;

use crate::error::{HeapError, HeapResult};
use crate::objects::{NEW_OBJECT_ALIGNMENT_OFFSET, OBJECT_ALIGNMENT};

/// Size of an OS page.
pub const OS_PAGE_SIZE: usize = 4096;

/// Byte pattern for memory no object has ever occupied (debug builds).
pub const UNALLOCATED_BYTE: u8 = 0xab;
/// Byte pattern for freshly allocated, not yet initialised memory (debug
/// builds).
pub const UNINITIALIZED_BYTE: u8 = 0xcb;

/// Access mode of a mapping.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Protection {
    /// Any access faults.
    NoAccess,
    /// Plain readable/writable memory.
    ReadWrite,
}

impl Protection {
    fn as_prot(self) -> libc::c_int {
        match self {
            Protection::NoAccess => libc::PROT_NONE,
            Protection::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
        }
    }
}

/// An owned anonymous mapping.  Unmapped on drop.
#[derive(Debug)]
pub struct VirtualMemory {
    base: *mut u8,
    size: usize,
}

// SAFETY: the mapping is exclusively owned and never aliased; raw pointers
// are handed out only through the heap, which is itself single-threaded.
unsafe impl Send for VirtualMemory {}

impl VirtualMemory {
    /// Map `size` bytes of zeroed read-write memory.
    ///
    /// `size` must be a multiple of the page size.  The `label` names the
    /// mapping in diagnostics.
    pub fn allocate(size: usize, label: &str) -> HeapResult<Self> {
        assert!(size > 0 && size % OS_PAGE_SIZE == 0, "mapping size must be page-granular");
        // SAFETY: anonymous private mapping with no fixed address; all
        // arguments are valid by construction.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            tracing::error!(target: "heap", label, size, "virtual memory allocation failed");
            return Err(HeapError::OutOfMemory { requested: size });
        }
        debug_assert_eq!(base as usize % OBJECT_ALIGNMENT, 0);
        Ok(VirtualMemory { base: base as *mut u8, size })
    }

    /// First address of the mapping.
    #[inline]
    pub fn base(&self) -> usize {
        self.base as usize
    }

    /// One past the last address of the mapping.
    #[inline]
    pub fn limit(&self) -> usize {
        self.base as usize + self.size
    }

    /// Mapping size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Change the access mode of the whole mapping.
    pub fn protect(&self, protection: Protection) {
        // SAFETY: base/size describe a mapping this object owns.
        let rc = unsafe { libc::mprotect(self.base as *mut libc::c_void, self.size, protection.as_prot()) };
        assert_eq!(rc, 0, "mprotect failed");
    }
}

impl Drop for VirtualMemory {
    fn drop(&mut self) {
        // SAFETY: base/size describe a mapping this object owns; nothing
        // else unmaps it.
        unsafe { libc::munmap(self.base as *mut libc::c_void, self.size) };
    }
}

/// One half of the copying collector's address range.
///
/// Objects begin at [`object_start`][Semispace::object_start], which sits at
/// the new-object alignment offset so that every object address in the
/// space is ≡ 8 (mod 16).
#[derive(Debug)]
pub struct Semispace {
    memory: VirtualMemory,
}

impl Semispace {
    /// Map a semispace of `size` bytes.
    pub fn new(size: usize) -> HeapResult<Self> {
        let memory = VirtualMemory::allocate(size, "plover-heap")?;
        let space = Semispace { memory };
        #[cfg(debug_assertions)]
        space.mark_unallocated();
        Ok(space)
    }

    /// First address of the space.
    #[inline]
    pub fn base(&self) -> usize {
        self.memory.base()
    }

    /// One past the last address of the space.
    #[inline]
    pub fn limit(&self) -> usize {
        self.memory.limit()
    }

    /// Space size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.memory.size()
    }

    /// Address of the first object slot in the space.
    #[inline]
    pub fn object_start(&self) -> usize {
        self.memory.base() + NEW_OBJECT_ALIGNMENT_OFFSET
    }

    /// Returns `true` if `addr` falls inside this space.
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.memory.base() && addr < self.memory.limit()
    }

    /// Make the space readable and writable.
    #[cfg(debug_assertions)]
    pub fn read_write(&self) {
        self.memory.protect(Protection::ReadWrite);
    }

    /// Make any access to the space fault.
    #[cfg(debug_assertions)]
    pub fn no_access(&self) {
        self.memory.protect(Protection::NoAccess);
    }

    /// Fill the space with the unallocated poison pattern.
    #[cfg(debug_assertions)]
    pub fn mark_unallocated(&self) {
        // SAFETY: the whole mapping belongs to this space and is writable.
        unsafe { ptr::write_bytes(self.memory.base() as *mut u8, UNALLOCATED_BYTE, self.memory.size()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_is_page_aligned_and_sized() {
        let vm = VirtualMemory::allocate(4 * OS_PAGE_SIZE, "test").expect("mapping");
        assert_eq!(vm.base() % OS_PAGE_SIZE, 0);
        assert_eq!(vm.size(), 4 * OS_PAGE_SIZE);
        assert_eq!(vm.limit() - vm.base(), vm.size());
    }

    #[test]
    fn mapping_is_writable_and_readable() {
        let vm = VirtualMemory::allocate(OS_PAGE_SIZE, "test").expect("mapping");
        // SAFETY: the mapping is fresh, read-write, and at least one page.
        unsafe {
            core::ptr::write(vm.base() as *mut u64, 0xfeed_face_dead_beef);
            assert_eq!(core::ptr::read(vm.base() as *const u64), 0xfeed_face_dead_beef);
        }
    }

    #[test]
    fn protection_round_trip_restores_access() {
        let vm = VirtualMemory::allocate(OS_PAGE_SIZE, "test").expect("mapping");
        vm.protect(Protection::NoAccess);
        vm.protect(Protection::ReadWrite);
        // SAFETY: protection was restored to read-write above.
        unsafe {
            core::ptr::write(vm.base() as *mut u8, 7);
            assert_eq!(core::ptr::read(vm.base() as *const u8), 7);
        }
    }

    #[test]
    fn object_start_has_new_object_offset() {
        let space = Semispace::new(4 * OS_PAGE_SIZE).expect("semispace");
        assert_eq!(space.object_start() % OBJECT_ALIGNMENT, NEW_OBJECT_ALIGNMENT_OFFSET);
        assert!(space.contains(space.object_start()));
        assert!(!space.contains(space.limit()));
    }
}
