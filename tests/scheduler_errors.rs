// tests/scheduler_errors.rs

mod common;
use crate::common::builders::{region_1d, KernelNodeBuilder, RequirementBuilder};
use crate::common::{host, init_tracing, recording_runtime, TestResult};

use hetsched::dag::NodeState;
use hetsched::engine::ErrorKind;
use hetsched::types::{AccessMode, BackendId, DeviceId};

#[test]
fn unbound_node_is_cancelled_with_usage_error() -> TestResult {
    init_tracing();
    let (runtime, backend) = recording_runtime(1);

    let node = KernelNodeBuilder::new("unbound").build();
    runtime.submit(&node);

    assert_eq!(node.state(), NodeState::Cancelled);
    assert!(backend.submitted().is_empty());
    assert!(!runtime.is_submitted(&node));

    let errors = runtime.errors().errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::Usage);
    assert!(errors[0].location.file().ends_with("scheduler.rs"));
    Ok(())
}

#[test]
fn unsubmitted_kernel_predecessor_is_rejected() -> TestResult {
    init_tracing();
    let (runtime, backend) = recording_runtime(1);

    let first = KernelNodeBuilder::new("first").on(host(0)).build();
    let second = KernelNodeBuilder::new("second")
        .on(host(0))
        .after(&first)
        .build();
    runtime.submit(&second);

    assert!(runtime.errors().contains_kind(ErrorKind::Usage));
    assert!(second.is_cancelled());
    assert!(first.is_cancelled());
    assert!(backend.kernels().is_empty());
    Ok(())
}

#[test]
fn submitted_kernel_predecessor_is_accepted() -> TestResult {
    init_tracing();
    let (runtime, backend) = recording_runtime(1);

    let first = KernelNodeBuilder::new("first").on(host(0)).build();
    let second = KernelNodeBuilder::new("second")
        .on(host(0))
        .after(&first)
        .build();
    runtime.submit(&first);
    runtime.submit(&second);

    assert!(runtime.errors().is_empty());
    assert_eq!(backend.kernels(), vec!["first", "second"]);
    assert_eq!(backend.ops_for(second.id())[0].predecessors, vec![first.id()]);
    Ok(())
}

#[test]
fn missing_data_source_cancels_without_copies() -> TestResult {
    init_tracing();
    let (runtime, backend) = recording_runtime(2);
    let region = region_1d(32, 4);

    let read = RequirementBuilder::new(&region)
        .mode(AccessMode::Read)
        .build();
    let kernel = KernelNodeBuilder::new("reader")
        .on(host(1))
        .access(&read)
        .build();
    runtime.submit(&kernel);

    let errors = runtime.errors().errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::DataSource);
    assert_eq!(read.state(), NodeState::Cancelled);
    assert_eq!(kernel.state(), NodeState::Cancelled);
    assert!(backend.submitted().is_empty());
    assert!(!region.tracker().is_valid(host(1), &region.whole()));
    Ok(())
}

#[test]
fn allocation_failure_cancels_submission() -> TestResult {
    init_tracing();
    let (runtime, backend) = recording_runtime(1);
    backend.fail_allocations(true);
    let region = region_1d(8, 4);

    let req = RequirementBuilder::new(&region)
        .mode(AccessMode::DiscardWrite)
        .build();
    let kernel = KernelNodeBuilder::new("writer")
        .on(host(0))
        .access(&req)
        .build();
    runtime.submit(&kernel);

    assert!(runtime.errors().contains_kind(ErrorKind::MemoryAllocation));
    assert!(req.is_cancelled());
    assert!(kernel.is_cancelled());
    assert!(!region.has_allocation(host(0)));
    assert!(backend.kernels().is_empty());
    Ok(())
}

#[test]
fn unknown_backend_is_not_supported() -> TestResult {
    init_tracing();
    let (runtime, backend) = recording_runtime(1);

    let node = KernelNodeBuilder::new("gpu")
        .on(DeviceId::new(BackendId::Cuda, 0))
        .build();
    runtime.submit(&node);

    assert!(runtime.errors().contains_kind(ErrorKind::FeatureNotSupported));
    assert!(node.is_cancelled());
    assert!(backend.submitted().is_empty());
    Ok(())
}

#[test]
fn preferred_backend_without_executor_is_not_supported() -> TestResult {
    init_tracing();
    let (runtime, _backend) = recording_runtime(1);

    let node = KernelNodeBuilder::new("picky")
        .on(host(0))
        .prefer(BackendId::Hip)
        .build();
    runtime.submit(&node);

    assert!(runtime.errors().contains_kind(ErrorKind::FeatureNotSupported));
    assert!(node.is_cancelled());
    Ok(())
}

#[test]
fn device_index_out_of_range_is_not_supported() -> TestResult {
    init_tracing();
    let (runtime, _backend) = recording_runtime(2);

    let node = KernelNodeBuilder::new("far").on(host(5)).build();
    runtime.submit(&node);

    assert!(runtime.errors().contains_kind(ErrorKind::FeatureNotSupported));
    Ok(())
}

#[test]
fn resubmitting_a_cancelled_node_is_a_no_op() -> TestResult {
    init_tracing();
    let (runtime, backend) = recording_runtime(1);

    let node = KernelNodeBuilder::new("late").build();
    runtime.submit(&node);
    assert!(node.is_cancelled());
    assert_eq!(runtime.errors().take_errors().len(), 1);

    runtime.submit(&node);
    assert!(runtime.errors().is_empty(), "{:?}", runtime.errors().errors());
    assert_eq!(node.state(), NodeState::Cancelled);
    assert!(!runtime.is_submitted(&node));
    assert!(backend.submitted().is_empty());
    Ok(())
}

#[test]
fn resubmitting_a_submitted_node_is_a_no_op() -> TestResult {
    init_tracing();
    let (runtime, backend) = recording_runtime(1);

    let node = KernelNodeBuilder::new("once").on(host(0)).build();
    runtime.submit(&node);
    runtime.submit(&node);

    assert!(runtime.errors().is_empty());
    assert_eq!(backend.kernels(), vec!["once"]);
    Ok(())
}

#[test]
fn failure_does_not_roll_back_issued_copies() -> TestResult {
    init_tracing();
    let (runtime, backend) = recording_runtime(2);
    let present = region_1d(4, 4);
    runtime.allocate(&present, host(0))?;
    present.mark_range_current(host(0), &present.whole());
    let missing = region_1d(4, 4);

    let ok = RequirementBuilder::new(&present)
        .mode(AccessMode::Read)
        .build();
    let bad = RequirementBuilder::new(&missing)
        .mode(AccessMode::Read)
        .build();
    let kernel = KernelNodeBuilder::new("both")
        .on(host(1))
        .access(&ok)
        .access(&bad)
        .build();
    runtime.submit(&kernel);

    assert!(runtime.errors().contains_kind(ErrorKind::DataSource));
    assert_eq!(backend.copies().len(), 1);
    assert_eq!(ok.state(), NodeState::Submitted);
    assert!(bad.is_cancelled());
    assert!(kernel.is_cancelled());
    assert!(backend.kernels().is_empty());
    Ok(())
}
