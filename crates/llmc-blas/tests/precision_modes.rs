//! Per-mode context setup.
//!
//! The precision slot is process-wide, so each mode is exercised in its own
//! child process (selected by `CHILD_ENV`). The child reports what it built on
//! stdout and the parent checks it.

mod common;

use std::env;
use std::process::{Command, Output};
use std::sync::Arc;

use common::MockLibrary;
use llmc_blas::precision;
use llmc_blas::{BlasConfig, ComputeContext, HipDataType, PrecisionMode, DEFAULT_WORKSPACE_SIZE};

const CHILD_ENV: &str = "LLMC_BLAS_PRECISION_CHILD";

fn run_child(test_name: &str, arg: &str) -> Output {
    Command::new(env::current_exe().expect("test binary path"))
        .args([test_name, "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_ENV, arg)
        .output()
        .expect("failed to spawn child test process")
}

fn reported(stdout: &str, key: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.split_once(key))
        .map(|(_, v)| v.trim().to_string())
}

#[test]
fn workspace_size_is_independent_of_precision() {
    if let Ok(flag) = env::var(CHILD_ENV) {
        let mode = precision::select(PrecisionMode::resolve(Some(&flag)));
        let lib = Arc::new(MockLibrary::new());
        let ctx = ComputeContext::initialize(lib, &BlasConfig::with_precision(mode)).unwrap();
        assert_eq!(ctx.precision(), precision::active());
        println!("mode={}", ctx.precision());
        println!("workspace={}", ctx.workspace().len());
        println!("element_type={}", ctx.element_type().0);
        return;
    }

    let cases = [
        ("fp32", HipDataType::R_32F),
        ("fp16", HipDataType::R_16F),
        ("bf16", HipDataType::R_16BF),
    ];
    for (flag, element_type) in cases {
        let out = run_child("workspace_size_is_independent_of_precision", flag);
        let stdout = String::from_utf8_lossy(&out.stdout);
        let stderr = String::from_utf8_lossy(&out.stderr);
        assert!(out.status.success(), "{flag}: stderr={stderr}");
        assert_eq!(reported(&stdout, "mode=").as_deref(), Some(flag), "{stdout}");
        assert_eq!(
            reported(&stdout, "workspace="),
            Some(DEFAULT_WORKSPACE_SIZE.to_string()),
            "{flag}: {stdout}"
        );
        assert_eq!(
            reported(&stdout, "element_type="),
            Some(element_type.0.to_string()),
            "{flag}: {stdout}"
        );
    }
}
