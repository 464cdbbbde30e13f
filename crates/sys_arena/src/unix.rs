use std::io::{self, Error};
use std::ptr;
use std::sync::OnceLock;

/// Returns the system page size. Queried from the OS once, then cached.
pub fn page_size() -> usize {
    static CACHED: OnceLock<usize> = OnceLock::new();
    *CACHED.get_or_init(|| unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize })
}

/// Returns the base-address granularity of anonymous mappings. `mmap`
/// places mappings at page boundaries, so this is just the page size.
pub fn allocation_granularity() -> usize {
    page_size()
}

pub struct MmapInner {
    ptr: *mut libc::c_void,
    len: usize,
}

impl MmapInner {
    /// Creates a new anonymous read-write mapping of `len` bytes.
    ///
    /// # Safety
    ///
    /// This function is unsafe because it calls `mmap`.
    pub unsafe fn map_anon(len: usize) -> io::Result<MmapInner> {
        let flags = libc::MAP_PRIVATE | libc::MAP_ANON;
        let prot = libc::PROT_READ | libc::PROT_WRITE;

        let ptr = unsafe { libc::mmap(ptr::null_mut(), len, prot, flags, -1, 0) };
        if ptr == libc::MAP_FAILED {
            return Err(Error::last_os_error());
        }

        Ok(MmapInner { ptr, len })
    }

    /// Creates an anonymous mapping whose start address is aligned to `align`.
    ///
    /// Over-maps by `align` bytes, then unmaps the misaligned head and the
    /// unused tail so only the aligned `len`-byte window stays resident.
    ///
    /// # Safety
    ///
    /// `align` must be a power of two and a multiple of the system page size.
    pub unsafe fn map_aligned(len: usize, align: usize) -> io::Result<MmapInner> {
        let total = len + align;
        let raw = unsafe { MmapInner::map_anon(total)? };

        let start = raw.ptr as usize;
        let aligned = (start + align - 1) & !(align - 1);
        let head = aligned - start;
        let tail = total - head - len;

        // The raw mapping is dismantled by hand; forget it so its Drop does
        // not unmap the window we are keeping.
        std::mem::forget(raw);

        unsafe {
            if head > 0 {
                libc::munmap(start as *mut libc::c_void, head);
            }
            if tail > 0 {
                libc::munmap((aligned + len) as *mut libc::c_void, tail);
            }
        }

        Ok(MmapInner {
            ptr: aligned as *mut libc::c_void,
            len,
        })
    }

    pub fn ptr(&self) -> *mut u8 {
        self.ptr.cast::<u8>()
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl Drop for MmapInner {
    fn drop(&mut self) {
        if self.len > 0 {
            unsafe {
                libc::munmap(self.ptr, self.len);
            }
        }
    }
}
