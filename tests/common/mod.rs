#![allow(dead_code)]

pub use hetsched_test_utils::builders;
pub use hetsched_test_utils::fake_backend;
pub use hetsched_test_utils::{init_tracing, recording_runtime, recording_runtime_with, with_timeout};

use hetsched::types::DeviceId;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub fn host(index: usize) -> DeviceId {
    DeviceId::host(index)
}
