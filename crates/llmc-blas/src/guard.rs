//! Fail-fast checking of compute-library status codes.
//!
//! Every call into HIP or hipBLASLt goes through [`check`] (usually via
//! [`blas_check!`](crate::blas_check)). A non-success status becomes a
//! [`BackendCallFailure`] carrying the code and the originating call site.
//! There is no recoverable tier: callers propagate the failure with `?` up to
//! the training loop, which terminates via [`OrAbort::or_abort`] or
//! [`abort`].

use std::fmt;
use std::io::{self, Write};

use crate::ffi::Status;

/// Source location of a library call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
}

impl CallSite {
    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.file, self.line)
    }
}

/// The [`CallSite`] of the macro invocation.
#[macro_export]
macro_rules! call_site {
    () => {
        $crate::guard::CallSite::new(file!(), line!())
    };
}

/// Check a library status at the current call site.
///
/// Expands to `Result<(), BackendCallFailure>`; the stringified expression is
/// recorded as the failing call.
#[macro_export]
macro_rules! blas_check {
    ($status:expr) => {
        $crate::guard::check(
            ::std::convert::Into::<$crate::ffi::Status>::into($status),
            stringify!($status),
            $crate::call_site!(),
        )
    };
}

/// Check a library status and terminate the process on failure.
#[macro_export]
macro_rules! blas_check_fatal {
    ($status:expr) => {
        $crate::guard::OrAbort::or_abort($crate::blas_check!($status))
    };
}

/// A compute-library call returned something other than success.
///
/// Workspace allocation and handle acquisition failures are reported as this
/// same kind. The symbolic status name comes from the table of the API that
/// produced the code and is left out when unknown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[hipBLASLt ERROR]: {status} {site} ({call}{})", .status.name_suffix())]
pub struct BackendCallFailure {
    pub status: Status,
    pub call: String,
    pub site: CallSite,
}

/// Turn a raw status into a `Result`. No side effects on success.
pub fn check(
    status: impl Into<Status>,
    call: &str,
    site: CallSite,
) -> Result<(), BackendCallFailure> {
    let status = status.into();
    if status.is_success() {
        Ok(())
    } else {
        Err(BackendCallFailure {
            status,
            call: call.to_string(),
            site,
        })
    }
}

/// Write the one-line diagnostic for `failure`.
pub fn write_diagnostic<W: Write>(out: &mut W, failure: &BackendCallFailure) -> io::Result<()> {
    writeln!(out, "{}", failure)?;
    out.flush()
}

/// Report `failure` on stderr and exit with a non-zero status.
pub fn abort(failure: &BackendCallFailure) -> ! {
    tracing::error!(
        code = failure.status.code(),
        file = failure.site.file,
        line = failure.site.line,
        call = %failure.call,
        "compute library call failed"
    );
    let _ = write_diagnostic(&mut io::stderr().lock(), failure);
    std::process::exit(1)
}

/// Termination policy for the top of the training loop.
pub trait OrAbort<T> {
    /// Unwrap the value or [`abort`] the process.
    fn or_abort(self) -> T;
}

impl<T> OrAbort<T> for Result<T, BackendCallFailure> {
    fn or_abort(self) -> T {
        match self {
            Ok(value) => value,
            Err(failure) => abort(&failure),
        }
    }
}
