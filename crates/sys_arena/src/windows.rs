use std::io::{self, Error};
use std::mem;
use std::ptr;

use windows_sys::Win32::System::Memory::{
    VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE,
};
use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

fn system_info() -> SYSTEM_INFO {
    unsafe {
        let mut info: SYSTEM_INFO = mem::zeroed();
        GetSystemInfo(&mut info);
        info
    }
}

/// Returns the system page size. Queried from the OS once, then cached.
/// Falls back to 4 KiB if `GetSystemInfo` reports nothing.
pub fn page_size() -> usize {
    static CACHED: std::sync::OnceLock<usize> = std::sync::OnceLock::new();
    *CACHED.get_or_init(|| match system_info().dwPageSize as usize {
        0 => 4096,
        size => size,
    })
}

/// Returns the base-address granularity of `VirtualAlloc` reservations,
/// typically 64 KiB and larger than the page size. Queried once, then
/// cached; falls back to 64 KiB if `GetSystemInfo` reports nothing.
pub fn allocation_granularity() -> usize {
    static CACHED: std::sync::OnceLock<usize> = std::sync::OnceLock::new();
    *CACHED.get_or_init(|| match system_info().dwAllocationGranularity as usize {
        0 => 65536,
        granularity => granularity,
    })
}

pub struct MmapInner {
    /// Base of the reservation handed back to `VirtualFree`.
    base: *mut std::ffi::c_void,
    /// Start of the usable (possibly alignment-adjusted) window.
    ptr: *mut std::ffi::c_void,
    len: usize,
}

impl MmapInner {
    /// Creates a new anonymous read-write mapping of `len` bytes.
    ///
    /// # Safety
    ///
    /// This function is unsafe because it calls `VirtualAlloc`.
    pub unsafe fn map_anon(len: usize) -> io::Result<MmapInner> {
        let ptr = unsafe { VirtualAlloc(ptr::null(), len, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE) };
        if ptr.is_null() {
            return Err(Error::last_os_error());
        }

        Ok(MmapInner {
            base: ptr,
            ptr,
            len,
        })
    }

    /// Creates an anonymous mapping whose start address is aligned to `align`.
    ///
    /// `VirtualFree` cannot release a partial reservation, so the whole
    /// over-sized reservation is retained and only the aligned window is
    /// exposed. The extra `align` bytes of address space are the cost of
    /// alignment on this platform.
    ///
    /// # Safety
    ///
    /// `align` must be a power of two and a multiple of the allocation
    /// granularity.
    pub unsafe fn map_aligned(len: usize, align: usize) -> io::Result<MmapInner> {
        let total = len + align;
        let base =
            unsafe { VirtualAlloc(ptr::null(), total, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE) };
        if base.is_null() {
            return Err(Error::last_os_error());
        }

        let aligned = (base as usize + align - 1) & !(align - 1);

        Ok(MmapInner {
            base,
            ptr: aligned as *mut std::ffi::c_void,
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
                // MEM_RELEASE requires dwSize to be 0
                VirtualFree(self.base, 0, MEM_RELEASE);
            }
        }
    }
}
