//! In-memory stand-in for the HIP / hipBLASLt calling convention.

#![allow(dead_code)]

use std::ffi::c_void;

use llmc_blas::ffi::{ComputeLibrary, DevicePtr, RawLtHandle};
use llmc_blas::{HipError, HipblasStatus, Status};
use parking_lot::Mutex;

/// Library entry point a [`MockLibrary`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    SetDevice,
    Malloc,
    Free,
    Create,
    Destroy,
    /// `hipblasLtCreate` reports success but leaves the handle null.
    CreateNull,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub devices: Vec<usize>,
    pub allocations: Vec<(usize, usize)>,
    pub freed: Vec<usize>,
    pub created: Vec<usize>,
    pub destroyed: Vec<usize>,
    next_addr: usize,
}

#[derive(Debug, Default)]
pub struct MockLibrary {
    failure: Option<(Step, i32)>,
    pub state: Mutex<MockState>,
}

impl MockLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `step` with `status`. Runtime steps report the code as a
    /// `hipError_t`, handle steps as a `hipblasStatus_t`.
    pub fn failing(step: Step, status: impl Into<Status>) -> Self {
        Self {
            failure: Some((step, status.into().code())),
            state: Mutex::new(MockState::default()),
        }
    }

    fn fails(&self, step: Step) -> Option<i32> {
        match self.failure {
            Some((s, code)) if s == step => Some(code),
            _ => None,
        }
    }

    fn next_addr(state: &mut MockState, base: usize) -> usize {
        state.next_addr += 0x100;
        base + state.next_addr
    }

    pub fn live_allocations(&self) -> usize {
        let state = self.state.lock();
        state.allocations.len() - state.freed.len()
    }

    pub fn live_handles(&self) -> usize {
        let state = self.state.lock();
        state.created.len() - state.destroyed.len()
    }
}

impl ComputeLibrary for MockLibrary {
    fn set_device(&self, device_idx: usize) -> HipError {
        if let Some(code) = self.fails(Step::SetDevice) {
            return HipError(code);
        }
        self.state.lock().devices.push(device_idx);
        HipError::SUCCESS
    }

    fn malloc(&self, ptr: &mut DevicePtr, nbytes: usize) -> HipError {
        if let Some(code) = self.fails(Step::Malloc) {
            return HipError(code);
        }
        let mut state = self.state.lock();
        let addr = Self::next_addr(&mut state, 0x7f00_0000);
        state.allocations.push((addr, nbytes));
        *ptr = addr as *mut c_void;
        HipError::SUCCESS
    }

    fn free(&self, ptr: DevicePtr) -> HipError {
        self.state.lock().freed.push(ptr as usize);
        self.fails(Step::Free).map(HipError).unwrap_or(HipError::SUCCESS)
    }

    fn create_handle(&self, handle: &mut RawLtHandle) -> HipblasStatus {
        if let Some(code) = self.fails(Step::Create) {
            return HipblasStatus(code);
        }
        if self.fails(Step::CreateNull).is_some() {
            return HipblasStatus::SUCCESS;
        }
        let mut state = self.state.lock();
        let addr = Self::next_addr(&mut state, 0x5e00_0000);
        state.created.push(addr);
        *handle = addr as *mut c_void;
        HipblasStatus::SUCCESS
    }

    fn destroy_handle(&self, handle: RawLtHandle) -> HipblasStatus {
        self.state.lock().destroyed.push(handle as usize);
        self.fails(Step::Destroy).map(HipblasStatus).unwrap_or(HipblasStatus::SUCCESS)
    }
}
