//! Startup configuration for the compute context.

use serde::{Deserialize, Serialize};

use crate::precision::{self, PrecisionMode};

const MIB: usize = 1024 * 1024;

/// Scratch workspace handed to hipBLASLt.
///
/// Sized for the largest algorithm variant the library may pick on Hopper-class
/// GPUs (32 MiB); earlier generations need 4 MiB. Independent of matrix shape
/// and precision mode.
pub const DEFAULT_WORKSPACE_SIZE: usize = 32 * MIB;

/// Smallest workspace accepted from configuration.
pub const MIN_WORKSPACE_SIZE: usize = 4 * MIB;

pub const ENV_PRECISION: &str = "LLMC_PRECISION";
pub const ENV_WORKSPACE_MIB: &str = "LLMC_BLASLT_WORKSPACE_MIB";
pub const ENV_DEVICE: &str = "LLMC_DEVICE";

/// Configuration consumed by [`ComputeContext::initialize`](crate::ComputeContext::initialize).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlasConfig {
    /// Element type of matmul operands.
    pub precision: PrecisionMode,

    /// Workspace size in bytes. Fixed for the lifetime of the context.
    pub workspace_size: usize,

    /// HIP device index the handle and workspace live on.
    pub device_idx: usize,
}

impl Default for BlasConfig {
    fn default() -> Self {
        Self {
            precision: precision::active(),
            workspace_size: DEFAULT_WORKSPACE_SIZE,
            device_idx: 0,
        }
    }
}

impl BlasConfig {
    /// Config for an explicit precision with default sizing.
    pub fn with_precision(precision: PrecisionMode) -> Self {
        Self {
            precision,
            workspace_size: DEFAULT_WORKSPACE_SIZE,
            device_idx: 0,
        }
    }

    /// Read `LLMC_PRECISION`, `LLMC_BLASLT_WORKSPACE_MIB` and `LLMC_DEVICE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Invalid values keep their defaults.
    ///
    /// A precision flag is installed as the process-wide mode; the returned
    /// config always carries [`precision::active`].
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(ENV_PRECISION) {
            Some(flag) => Self::with_precision(precision::select(PrecisionMode::resolve(Some(&flag)))),
            None => Self::default(),
        };

        if let Some(raw) = lookup(ENV_WORKSPACE_MIB) {
            match raw.trim().parse::<usize>() {
                Ok(mib) => config.workspace_size = mib.saturating_mul(MIB),
                Err(_) => tracing::warn!("{}={:?} is not a size in MiB, ignoring", ENV_WORKSPACE_MIB, raw),
            }
        }

        if let Some(raw) = lookup(ENV_DEVICE) {
            match raw.trim().parse::<usize>() {
                Ok(idx) => config.device_idx = idx,
                Err(_) => tracing::warn!("{}={:?} is not a device index, ignoring", ENV_DEVICE, raw),
            }
        }

        config.validated()
    }

    /// Raise an undersized workspace to [`MIN_WORKSPACE_SIZE`].
    pub fn validated(mut self) -> Self {
        if self.workspace_size < MIN_WORKSPACE_SIZE {
            tracing::warn!(
                "workspace of {} bytes is below the library minimum, using {}",
                self.workspace_size,
                MIN_WORKSPACE_SIZE
            );
            self.workspace_size = MIN_WORKSPACE_SIZE;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_workspace_is_32_mib() {
        assert_eq!(DEFAULT_WORKSPACE_SIZE, 33_554_432);
        let config = BlasConfig::with_precision(PrecisionMode::Fp16);
        assert_eq!(config.workspace_size, DEFAULT_WORKSPACE_SIZE);
        assert_eq!(config.device_idx, 0);
    }

    // Flag-to-mode installation is covered in tests/startup.rs, which owns its
    // process; here the precision only has to agree with the active mode.
    #[test]
    fn test_from_lookup() {
        let config = BlasConfig::from_lookup(lookup(&[
            (ENV_WORKSPACE_MIB, "8"),
            (ENV_DEVICE, "3"),
        ]));
        assert_eq!(config.precision, precision::active());
        assert_eq!(config.workspace_size, 8 * MIB);
        assert_eq!(config.device_idx, 3);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = BlasConfig::from_lookup(lookup(&[
            (ENV_PRECISION, "int8"),
            (ENV_WORKSPACE_MIB, "lots"),
            (ENV_DEVICE, "-1"),
        ]));
        assert_eq!(config.precision, precision::active());
        assert_eq!(config.workspace_size, DEFAULT_WORKSPACE_SIZE);
        assert_eq!(config.device_idx, 0);
    }

    #[test]
    fn test_undersized_workspace_is_raised() {
        let config = BlasConfig::from_lookup(lookup(&[
            (ENV_WORKSPACE_MIB, "1"),
        ]));
        assert_eq!(config.workspace_size, MIN_WORKSPACE_SIZE);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: BlasConfig =
            serde_json::from_str(r#"{"precision": "fp16", "workspace_size": 8388608, "device_idx": 1}"#).unwrap();
        assert_eq!(config, BlasConfig { device_idx: 1, workspace_size: 8 * MIB, ..BlasConfig::with_precision(PrecisionMode::Fp16) });

        let json = serde_json::to_string(&BlasConfig::with_precision(PrecisionMode::Bf16)).unwrap();
        assert!(json.contains(r#""precision":"bf16""#));
    }
}
