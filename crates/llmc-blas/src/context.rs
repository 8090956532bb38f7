//! hipBLASLt compute context.
//!
//! One [`ComputeContext`] per process: a library handle, a fixed-size scratch
//! workspace and the accumulation type, created during single-threaded engine
//! startup and passed explicitly to every matmul call site.
//!
//! # Preconditions
//!
//! - [`ComputeContext::initialize`] must complete before any worker thread
//!   issues a matmul call. Share the context afterwards as `&ComputeContext`
//!   or `Arc<ComputeContext>`.
//! - Initializing a second context without shutting down the first is a
//!   caller error; it is not detected here.
//! - The workspace is written by the library during every call. Matmul calls
//!   sharing one context must be serialized; use one context per stream if
//!   calls run concurrently.

use crate::call_site;
use crate::config::BlasConfig;
use crate::ffi::{
    ComputeLibrary, DevicePtr, HipBlasLtApi, HipDataType, HipblasComputeType, HipblasStatus,
    RawLtHandle,
};
use crate::guard::{check, BackendCallFailure};
use crate::precision::{self, PrecisionMode};
use crate::workspace::Workspace;

/// Opaque hipBLASLt handle. Neither `Clone` nor `Copy`.
#[derive(Debug)]
pub struct LtHandle(RawLtHandle);

// hipBLASLt handles may be used from any thread once created.
unsafe impl Send for LtHandle {}
unsafe impl Sync for LtHandle {}

impl LtHandle {
    /// Raw handle for passing to hipBLASLt entry points.
    pub fn as_raw(&self) -> RawLtHandle {
        self.0
    }
}

/// Everything a single `hipblasLtMatmul` call needs from the context.
#[derive(Debug, Clone, Copy)]
pub struct MatmulParams {
    pub handle: RawLtHandle,
    pub workspace: DevicePtr,
    pub workspace_size: usize,
    pub element_type: HipDataType,
    pub compute_type: HipblasComputeType,
    /// Type of alpha/beta.
    pub scale_type: HipDataType,
}

/// Context backed by the runtime-loaded ROCm libraries.
pub type HipComputeContext = ComputeContext<&'static HipBlasLtApi>;

/// The library handle, its workspace and the accumulation type for one run.
pub struct ComputeContext<L: ComputeLibrary = &'static HipBlasLtApi> {
    lib: L,
    handle: LtHandle,
    workspace: Workspace,
    precision: PrecisionMode,
    compute_type: HipblasComputeType,
    device_idx: usize,
    live: bool,
}

impl HipComputeContext {
    /// Load `libamdhip64.so` / `libhipblaslt.so` and initialize against them.
    pub fn initialize_hip(config: &BlasConfig) -> Result<Self, BackendCallFailure> {
        Self::initialize(HipBlasLtApi::load()?, config)
    }
}

impl<L: ComputeLibrary> ComputeContext<L> {
    /// Select the device, allocate the workspace and acquire one handle.
    ///
    /// The requested precision is installed through
    /// [`precision::select`]; if another mode was already active, the context
    /// uses that one, so its tags always match [`precision::active`].
    ///
    /// On failure everything acquired so far is released before returning,
    /// so a partially initialized context never reaches the caller.
    pub fn initialize(lib: L, config: &BlasConfig) -> Result<Self, BackendCallFailure> {
        let config = config.clone().validated();

        // The process-wide mode wins over a conflicting request.
        let mode = precision::select(config.precision);

        check(
            lib.set_device(config.device_idx),
            &format!("hipSetDevice({})", config.device_idx),
            call_site!(),
        )?;

        let workspace = Workspace::allocate(&lib, config.workspace_size)?;

        let mut raw: RawLtHandle = std::ptr::null_mut();
        let created = check(lib.create_handle(&mut raw), "hipblasLtCreate", call_site!()).and_then(|()| {
            if raw.is_null() {
                check(HipblasStatus::HANDLE_IS_NULLPTR, "hipblasLtCreate", call_site!())
            } else {
                Ok(())
            }
        });
        if let Err(failure) = created {
            if let Err(e) = workspace.free(&lib) {
                tracing::warn!("releasing workspace after failed init: {}", e);
            }
            return Err(failure);
        }

        tracing::info!(
            "hipBLASLt context ready on device {}: precision={}, workspace={} MiB",
            config.device_idx,
            mode,
            workspace.len() / (1024 * 1024)
        );

        Ok(Self {
            lib,
            handle: LtHandle(raw),
            workspace,
            precision: mode,
            compute_type: mode.compute_type(),
            device_idx: config.device_idx,
            live: true,
        })
    }

    pub fn handle(&self) -> &LtHandle {
        &self.handle
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Accumulation type used for every matmul issued through this context.
    pub fn accumulation_type(&self) -> HipblasComputeType {
        self.compute_type
    }

    pub fn precision(&self) -> PrecisionMode {
        self.precision
    }

    /// Element type tag of matmul operands.
    pub fn element_type(&self) -> HipDataType {
        self.precision.element_type()
    }

    pub fn device_idx(&self) -> usize {
        self.device_idx
    }

    /// The library this context was created with. Direct calls into it must
    /// still go through [`check`] / [`blas_check!`](crate::blas_check).
    pub fn library(&self) -> &L {
        &self.lib
    }

    pub fn call_params(&self) -> MatmulParams {
        MatmulParams {
            handle: self.handle.as_raw(),
            workspace: self.workspace.as_device_ptr(),
            workspace_size: self.workspace.len(),
            element_type: self.element_type(),
            compute_type: self.compute_type,
            scale_type: HipDataType::R_32F,
        }
    }

    /// Destroy the handle and free the workspace.
    pub fn shutdown(mut self) -> Result<(), BackendCallFailure> {
        let result = self.release();
        tracing::info!("hipBLASLt context on device {} shut down", self.device_idx);
        result
    }

    // Attempts both releases; reports the first failure.
    fn release(&mut self) -> Result<(), BackendCallFailure> {
        if !self.live {
            return Ok(());
        }
        self.live = false;
        let destroyed = check(
            self.lib.destroy_handle(self.handle.as_raw()),
            "hipblasLtDestroy",
            call_site!(),
        );
        let freed = self.workspace.free(&self.lib);
        destroyed.and(freed)
    }
}

impl<L: ComputeLibrary> Drop for ComputeContext<L> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!("releasing hipBLASLt context on drop: {}", e);
        }
    }
}

impl<L: ComputeLibrary> std::fmt::Debug for ComputeContext<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeContext")
            .field("handle", &self.handle)
            .field("workspace", &self.workspace)
            .field("precision", &self.precision)
            .field("compute_type", &self.compute_type)
            .field("device_idx", &self.device_idx)
            .finish()
    }
}
