//! Runtime-loaded HIP and hipBLASLt entry points via dlopen.
//!
//! Nothing links against ROCm at build time: `libamdhip64.so` and
//! `libhipblaslt.so` are opened on first use, so the crate builds and its
//! host-side tests run on machines without a GPU.

use std::ffi::{c_int, c_void};
use std::fmt;
use std::sync::{Arc, OnceLock};

use libloading::Library;
use serde::{Deserialize, Serialize};

use crate::call_site;
use crate::guard::BackendCallFailure;

// ---------------------------------------------------------------------------
// Status codes
// ---------------------------------------------------------------------------

/// Status returned by a hipBLAS / hipBLASLt call (`hipblasStatus_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct HipblasStatus(pub i32);

impl HipblasStatus {
    pub const SUCCESS: Self = Self(0);
    pub const NOT_INITIALIZED: Self = Self(1);
    pub const ALLOC_FAILED: Self = Self(2);
    pub const INVALID_VALUE: Self = Self(3);
    pub const MAPPING_ERROR: Self = Self(4);
    pub const EXECUTION_FAILED: Self = Self(5);
    pub const INTERNAL_ERROR: Self = Self(6);
    pub const NOT_SUPPORTED: Self = Self(7);
    pub const ARCH_MISMATCH: Self = Self(8);
    pub const HANDLE_IS_NULLPTR: Self = Self(9);
    pub const INVALID_ENUM: Self = Self(10);
    pub const UNKNOWN: Self = Self(11);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Numeric code as reported by the library.
    pub fn code(self) -> i32 {
        self.0
    }

    /// Symbolic name, if the code is part of the hipBLAS enum.
    pub fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            0 => "HIPBLAS_STATUS_SUCCESS",
            1 => "HIPBLAS_STATUS_NOT_INITIALIZED",
            2 => "HIPBLAS_STATUS_ALLOC_FAILED",
            3 => "HIPBLAS_STATUS_INVALID_VALUE",
            4 => "HIPBLAS_STATUS_MAPPING_ERROR",
            5 => "HIPBLAS_STATUS_EXECUTION_FAILED",
            6 => "HIPBLAS_STATUS_INTERNAL_ERROR",
            7 => "HIPBLAS_STATUS_NOT_SUPPORTED",
            8 => "HIPBLAS_STATUS_ARCH_MISMATCH",
            9 => "HIPBLAS_STATUS_HANDLE_IS_NULLPTR",
            10 => "HIPBLAS_STATUS_INVALID_ENUM",
            11 => "HIPBLAS_STATUS_UNKNOWN",
            _ => return None,
        };
        Some(name)
    }
}

impl From<c_int> for HipblasStatus {
    fn from(code: c_int) -> Self {
        Self(code)
    }
}

/// Status returned by a HIP runtime call (`hipError_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct HipError(pub i32);

impl HipError {
    pub const SUCCESS: Self = Self(0);
    pub const INVALID_VALUE: Self = Self(1);
    pub const OUT_OF_MEMORY: Self = Self(2);
    pub const NOT_INITIALIZED: Self = Self(3);
    pub const DEINITIALIZED: Self = Self(4);
    pub const NO_DEVICE: Self = Self(100);
    pub const INVALID_DEVICE: Self = Self(101);
    pub const INVALID_HANDLE: Self = Self(400);
    pub const ILLEGAL_ADDRESS: Self = Self(700);
    pub const UNKNOWN: Self = Self(999);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    pub fn code(self) -> i32 {
        self.0
    }

    /// Symbolic name, if the code is one this crate knows.
    pub fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            0 => "hipSuccess",
            1 => "hipErrorInvalidValue",
            2 => "hipErrorOutOfMemory",
            3 => "hipErrorNotInitialized",
            4 => "hipErrorDeinitialized",
            100 => "hipErrorNoDevice",
            101 => "hipErrorInvalidDevice",
            400 => "hipErrorInvalidHandle",
            700 => "hipErrorIllegalAddress",
            999 => "hipErrorUnknown",
            _ => return None,
        };
        Some(name)
    }
}

impl From<c_int> for HipError {
    fn from(code: c_int) -> Self {
        Self(code)
    }
}

/// Outcome of one call into the compute stack, tagged with the API whose
/// code table it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// HIP runtime (`hipSetDevice`, `hipMalloc`, `hipFree`).
    Runtime(HipError),
    /// hipBLAS / hipBLASLt.
    Blas(HipblasStatus),
}

impl Status {
    pub fn is_success(self) -> bool {
        match self {
            Status::Runtime(e) => e.is_success(),
            Status::Blas(s) => s.is_success(),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Status::Runtime(e) => e.code(),
            Status::Blas(s) => s.code(),
        }
    }

    /// Symbolic name from the originating API's table.
    pub fn name(self) -> Option<&'static str> {
        match self {
            Status::Runtime(e) => e.name(),
            Status::Blas(s) => s.name(),
        }
    }

    /// `": NAME"` when the name is known, empty otherwise.
    pub(crate) fn name_suffix(self) -> String {
        self.name().map(|n| format!(": {}", n)).unwrap_or_default()
    }
}

impl From<HipblasStatus> for Status {
    fn from(status: HipblasStatus) -> Self {
        Status::Blas(status)
    }
}

impl From<HipError> for Status {
    fn from(error: HipError) -> Self {
        Status::Runtime(error)
    }
}

impl PartialEq<HipblasStatus> for Status {
    fn eq(&self, other: &HipblasStatus) -> bool {
        *self == Status::Blas(*other)
    }
}

impl PartialEq<HipError> for Status {
    fn eq(&self, other: &HipError) -> bool {
        *self == Status::Runtime(*other)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Convert a device index to the `int` ordinal `hipSetDevice` takes.
pub fn device_ordinal(device_idx: usize) -> Result<c_int, HipError> {
    c_int::try_from(device_idx).map_err(|_| HipError::INVALID_DEVICE)
}

// ---------------------------------------------------------------------------
// Type tags
// ---------------------------------------------------------------------------

/// Element type tag passed to every matmul call (`hipDataType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct HipDataType(pub i32);

impl HipDataType {
    pub const R_32F: Self = Self(0);
    pub const R_16F: Self = Self(2);
    pub const R_16BF: Self = Self(14);
}

/// Accumulation type used inside the library (`hipblasComputeType_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct HipblasComputeType(pub i32);

impl HipblasComputeType {
    pub const COMPUTE_16F: Self = Self(0);
    pub const COMPUTE_32F: Self = Self(2);
    pub const COMPUTE_64F: Self = Self(7);
}

// Opaque handles
pub type DevicePtr = *mut c_void;
pub type RawLtHandle = *mut c_void;

// ---------------------------------------------------------------------------
// Library seam
// ---------------------------------------------------------------------------

/// The subset of the HIP / hipBLASLt calling convention the compute context
/// needs. Every method mirrors one C entry point and returns its raw status;
/// checking is the caller's job (see [`crate::guard`]).
pub trait ComputeLibrary: Send + Sync {
    /// `hipSetDevice`
    fn set_device(&self, device_idx: usize) -> HipError;

    /// `hipMalloc`
    fn malloc(&self, ptr: &mut DevicePtr, nbytes: usize) -> HipError;

    /// `hipFree`
    fn free(&self, ptr: DevicePtr) -> HipError;

    /// `hipblasLtCreate`
    fn create_handle(&self, handle: &mut RawLtHandle) -> HipblasStatus;

    /// `hipblasLtDestroy`
    fn destroy_handle(&self, handle: RawLtHandle) -> HipblasStatus;
}

impl<L: ComputeLibrary + ?Sized> ComputeLibrary for &L {
    fn set_device(&self, device_idx: usize) -> HipError {
        (**self).set_device(device_idx)
    }
    fn malloc(&self, ptr: &mut DevicePtr, nbytes: usize) -> HipError {
        (**self).malloc(ptr, nbytes)
    }
    fn free(&self, ptr: DevicePtr) -> HipError {
        (**self).free(ptr)
    }
    fn create_handle(&self, handle: &mut RawLtHandle) -> HipblasStatus {
        (**self).create_handle(handle)
    }
    fn destroy_handle(&self, handle: RawLtHandle) -> HipblasStatus {
        (**self).destroy_handle(handle)
    }
}

impl<L: ComputeLibrary + ?Sized> ComputeLibrary for Arc<L> {
    fn set_device(&self, device_idx: usize) -> HipError {
        (**self).set_device(device_idx)
    }
    fn malloc(&self, ptr: &mut DevicePtr, nbytes: usize) -> HipError {
        (**self).malloc(ptr, nbytes)
    }
    fn free(&self, ptr: DevicePtr) -> HipError {
        (**self).free(ptr)
    }
    fn create_handle(&self, handle: &mut RawLtHandle) -> HipblasStatus {
        (**self).create_handle(handle)
    }
    fn destroy_handle(&self, handle: RawLtHandle) -> HipblasStatus {
        (**self).destroy_handle(handle)
    }
}

// ---------------------------------------------------------------------------
// C function signatures
// ---------------------------------------------------------------------------

type FnHipSetDevice = unsafe extern "C" fn(c_int) -> c_int;
type FnHipMalloc = unsafe extern "C" fn(*mut DevicePtr, usize) -> c_int;
type FnHipFree = unsafe extern "C" fn(DevicePtr) -> c_int;
type FnHipblasLtCreate = unsafe extern "C" fn(*mut RawLtHandle) -> c_int;
type FnHipblasLtDestroy = unsafe extern "C" fn(RawLtHandle) -> c_int;

// ---------------------------------------------------------------------------
// Loaded API
// ---------------------------------------------------------------------------

const HIP_LIBRARY: &str = "libamdhip64.so";
const HIPBLASLT_LIBRARIES: [&str; 2] = ["libhipblaslt.so", "libhipblaslt.so.0"];

pub struct HipBlasLtApi {
    _hip: Library,
    _blaslt: Library,
    hip_set_device: FnHipSetDevice,
    hip_malloc: FnHipMalloc,
    hip_free: FnHipFree,
    hipblaslt_create: FnHipblasLtCreate,
    hipblaslt_destroy: FnHipblasLtDestroy,
}

// Safety: the function pointers are process-global; the HIP runtime is
// internally synchronized and hipBLASLt handles may be shared across threads
// once created.
unsafe impl Send for HipBlasLtApi {}
unsafe impl Sync for HipBlasLtApi {}

static HIPBLASLT_API: OnceLock<Option<HipBlasLtApi>> = OnceLock::new();

fn open(name: &str) -> Option<Library> {
    match unsafe { Library::new(name) } {
        Ok(lib) => Some(lib),
        Err(e) => {
            tracing::debug!("dlopen {} failed: {}", name, e);
            None
        }
    }
}

impl HipBlasLtApi {
    fn try_load() -> Option<Self> {
        let hip = open(HIP_LIBRARY)?;
        let blaslt = HIPBLASLT_LIBRARIES.iter().find_map(|name| open(name))?;
        unsafe {
            let api = HipBlasLtApi {
                hip_set_device: *hip.get::<FnHipSetDevice>(b"hipSetDevice\0").ok()?,
                hip_malloc: *hip.get::<FnHipMalloc>(b"hipMalloc\0").ok()?,
                hip_free: *hip.get::<FnHipFree>(b"hipFree\0").ok()?,
                hipblaslt_create: *blaslt.get::<FnHipblasLtCreate>(b"hipblasLtCreate\0").ok()?,
                hipblaslt_destroy: *blaslt.get::<FnHipblasLtDestroy>(b"hipblasLtDestroy\0").ok()?,
                _hip: hip,
                _blaslt: blaslt,
            };
            tracing::debug!("loaded {} and hipBLASLt", HIP_LIBRARY);
            Some(api)
        }
    }

    /// The process-wide runtime-loaded API.
    ///
    /// A missing or incomplete ROCm install is reported like a failed
    /// handle acquisition: `HIPBLAS_STATUS_NOT_INITIALIZED`.
    pub fn load() -> Result<&'static HipBlasLtApi, BackendCallFailure> {
        HIPBLASLT_API
            .get_or_init(Self::try_load)
            .as_ref()
            .ok_or_else(|| BackendCallFailure {
                status: HipblasStatus::NOT_INITIALIZED.into(),
                call: "dlopen(libhipblaslt.so)".to_string(),
                site: call_site!(),
            })
    }

    /// Whether both libraries could be loaded.
    pub fn is_available() -> bool {
        Self::load().is_ok()
    }
}

impl ComputeLibrary for HipBlasLtApi {
    fn set_device(&self, device_idx: usize) -> HipError {
        match device_ordinal(device_idx) {
            Ok(ordinal) => unsafe { (self.hip_set_device)(ordinal) }.into(),
            Err(e) => e,
        }
    }

    fn malloc(&self, ptr: &mut DevicePtr, nbytes: usize) -> HipError {
        unsafe { (self.hip_malloc)(ptr, nbytes) }.into()
    }

    fn free(&self, ptr: DevicePtr) -> HipError {
        unsafe { (self.hip_free)(ptr) }.into()
    }

    fn create_handle(&self, handle: &mut RawLtHandle) -> HipblasStatus {
        unsafe { (self.hipblaslt_create)(handle) }.into()
    }

    fn destroy_handle(&self, handle: RawLtHandle) -> HipblasStatus {
        unsafe { (self.hipblaslt_destroy)(handle) }.into()
    }
}
