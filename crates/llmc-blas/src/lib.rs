//! # llmc-blas
//!
//! hipBLASLt configuration layer for GPU training.
//!
//! Provides:
//! - Precision mode selection (fp32 / fp16 / bf16, bf16 by default)
//! - A compute context owning the hipBLASLt handle and its scratch workspace
//! - Fail-fast checking of every compute-library status
//! - Runtime-loaded HIP/hipBLASLt entry points (no build-time ROCm dependency)

pub mod guard;
pub mod ffi;
pub mod precision;
pub mod config;
pub mod workspace;
pub mod context;

pub use config::{BlasConfig, DEFAULT_WORKSPACE_SIZE, MIN_WORKSPACE_SIZE};
pub use context::{ComputeContext, HipComputeContext, LtHandle, MatmulParams};
pub use ffi::{
    ComputeLibrary, HipBlasLtApi, HipDataType, HipError, HipblasComputeType, HipblasStatus, Status,
};
pub use guard::{BackendCallFailure, CallSite, OrAbort};
pub use precision::{Floatx, PrecisionMode};
pub use workspace::Workspace;
