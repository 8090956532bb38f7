//! Device scratch memory for hipBLASLt.

use crate::call_site;
use crate::ffi::{ComputeLibrary, DevicePtr};
use crate::guard::{check, BackendCallFailure};

/// A fixed-size block of device memory the library uses as temporary storage
/// while executing whichever algorithm variant it selects.
///
/// Owned by [`ComputeContext`](crate::ComputeContext), which frees it through
/// the same library that allocated it. Never resized.
#[derive(Debug)]
pub struct Workspace {
    ptr: DevicePtr,
    nbytes: usize,
}

// HIP device pointers are safe to send across threads.
unsafe impl Send for Workspace {}
unsafe impl Sync for Workspace {}

impl Workspace {
    /// `hipMalloc` `nbytes` on the current device.
    pub(crate) fn allocate<L: ComputeLibrary>(lib: &L, nbytes: usize) -> Result<Self, BackendCallFailure> {
        let mut ptr: DevicePtr = std::ptr::null_mut();
        check(
            lib.malloc(&mut ptr, nbytes),
            &format!("hipMalloc({} bytes)", nbytes),
            call_site!(),
        )?;
        Ok(Self { ptr, nbytes })
    }

    /// `hipFree` the allocation. The owner guarantees this runs once.
    pub(crate) fn free<L: ComputeLibrary>(&self, lib: &L) -> Result<(), BackendCallFailure> {
        check(lib.free(self.ptr), "hipFree(workspace)", call_site!())
    }

    /// Raw device pointer passed to `hipblasLtMatmul`.
    pub fn as_device_ptr(&self) -> DevicePtr {
        self.ptr
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.nbytes
    }

    pub fn is_empty(&self) -> bool {
        self.nbytes == 0
    }
}
