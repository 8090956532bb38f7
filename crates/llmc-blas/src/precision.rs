//! Numeric precision of matmul operands.
//!
//! One [`PrecisionMode`] is active per process. It is fixed at build time by
//! the `fp32` / `fp16` cargo features, or once at startup via [`select`], and
//! read everywhere else through [`active`]. Anything missing or ambiguous
//! resolves to bf16.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::ffi::{HipDataType, HipblasComputeType};

/// Element type of matmul operands for a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecisionMode {
    /// 32-bit IEEE 754 single-precision float
    Fp32,
    /// 16-bit IEEE 754 half-precision float
    Fp16,
    /// 16-bit Brain Float (same exponent range as F32, reduced mantissa)
    #[default]
    Bf16,
}

/// Host-side element type matching the build-time precision.
#[cfg(all(feature = "fp32", not(feature = "fp16")))]
pub type Floatx = f32;
#[cfg(all(feature = "fp16", not(feature = "fp32")))]
pub type Floatx = half::f16;
#[cfg(not(any(
    all(feature = "fp32", not(feature = "fp16")),
    all(feature = "fp16", not(feature = "fp32"))
)))]
pub type Floatx = half::bf16;

static ACTIVE: OnceLock<PrecisionMode> = OnceLock::new();

impl PrecisionMode {
    /// The mode chosen by cargo features. Neither or both features give bf16.
    pub const fn from_build() -> Self {
        match (cfg!(feature = "fp32"), cfg!(feature = "fp16")) {
            (true, false) => PrecisionMode::Fp32,
            (false, true) => PrecisionMode::Fp16,
            _ => PrecisionMode::Bf16,
        }
    }

    /// Parse a startup flag value. Case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fp32" | "f32" | "float32" => Some(PrecisionMode::Fp32),
            "fp16" | "f16" | "half" | "float16" => Some(PrecisionMode::Fp16),
            "bf16" | "bfloat16" => Some(PrecisionMode::Bf16),
            _ => None,
        }
    }

    /// Resolve an optional startup flag, defaulting to bf16.
    pub fn resolve(flag: Option<&str>) -> Self {
        match flag {
            None => PrecisionMode::default(),
            Some(s) => Self::parse(s).unwrap_or_else(|| {
                tracing::warn!("unrecognized precision {:?}, using bf16", s);
                PrecisionMode::default()
            }),
        }
    }

    /// Tag passed as the A/B/C/D type of every matmul call.
    pub fn element_type(&self) -> HipDataType {
        match self {
            PrecisionMode::Fp32 => HipDataType::R_32F,
            PrecisionMode::Fp16 => HipDataType::R_16F,
            PrecisionMode::Bf16 => HipDataType::R_16BF,
        }
    }

    /// Accumulation type. fp32 for every mode.
    pub fn compute_type(&self) -> HipblasComputeType {
        HipblasComputeType::COMPUTE_32F
    }

    /// Size in bytes of a single element.
    pub fn element_size(&self) -> usize {
        match self {
            PrecisionMode::Fp32 => 4,
            PrecisionMode::Fp16 | PrecisionMode::Bf16 => 2,
        }
    }
}

impl fmt::Display for PrecisionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrecisionMode::Fp32 => write!(f, "fp32"),
            PrecisionMode::Fp16 => write!(f, "fp16"),
            PrecisionMode::Bf16 => write!(f, "bf16"),
        }
    }
}

/// Install the process-wide mode. First call wins; later calls return the
/// installed mode unchanged.
pub fn select(mode: PrecisionMode) -> PrecisionMode {
    let installed = *ACTIVE.get_or_init(|| mode);
    if installed != mode {
        tracing::warn!(
            "precision already resolved to {}, ignoring request for {}",
            installed,
            mode
        );
    }
    installed
}

/// The process-wide mode, installing the build-time default if nothing was
/// selected yet.
pub fn active() -> PrecisionMode {
    *ACTIVE.get_or_init(PrecisionMode::from_build)
}
