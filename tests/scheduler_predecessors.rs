// tests/scheduler_predecessors.rs

mod common;
use crate::common::builders::{region_1d, KernelNodeBuilder, RequirementBuilder};
use crate::common::fake_backend::RecordingBackend;
use crate::common::{host, init_tracing, recording_runtime, recording_runtime_with, TestResult};

use hetsched::types::AccessMode;

#[test]
fn shared_predecessor_is_listed_once() -> TestResult {
    init_tracing();
    let (runtime, backend) = recording_runtime(1);
    let a = region_1d(8, 4);
    let b = region_1d(8, 4);

    let root = KernelNodeBuilder::new("root").on(host(0)).build();
    runtime.submit(&root);

    let ra = RequirementBuilder::new(&a)
        .mode(AccessMode::DiscardWrite)
        .after(&root)
        .build();
    let rb = RequirementBuilder::new(&b)
        .mode(AccessMode::DiscardWrite)
        .after(&root)
        .build();
    let kernel = KernelNodeBuilder::new("both")
        .on(host(0))
        .access(&ra)
        .access(&rb)
        .after(&root)
        .build();
    runtime.submit(&kernel);

    assert!(runtime.errors().is_empty());
    assert!(ra.is_virtual() && rb.is_virtual());
    assert_eq!(backend.ops_for(kernel.id())[0].predecessors, vec![root.id()]);
    Ok(())
}

#[test]
fn requirement_listed_twice_is_resolved_and_waited_on_once() -> TestResult {
    init_tracing();
    let (runtime, backend) = recording_runtime(2);
    let region = region_1d(8, 4);
    runtime.allocate(&region, host(0))?;
    region.mark_range_current(host(0), &region.whole());

    let read = RequirementBuilder::new(&region)
        .mode(AccessMode::Read)
        .build();
    let kernel = KernelNodeBuilder::new("twice")
        .on(host(1))
        .access(&read)
        .access(&read)
        .build();
    runtime.submit(&kernel);

    assert!(runtime.errors().is_empty(), "{:?}", runtime.errors().errors());
    assert_eq!(backend.copies().len(), 1);
    assert_eq!(backend.ops_for(kernel.id())[0].predecessors, vec![read.id()]);
    Ok(())
}

#[test]
fn completed_predecessors_are_dropped() -> TestResult {
    init_tracing();
    let (runtime, backend) = recording_runtime(1);

    let root = KernelNodeBuilder::new("root").on(host(0)).build();
    runtime.submit(&root);
    backend.complete(root.id());
    assert!(root.is_complete());

    let next = KernelNodeBuilder::new("next")
        .on(host(0))
        .after(&root)
        .build();
    runtime.submit(&next);

    assert!(backend.ops_for(next.id())[0].predecessors.is_empty());
    Ok(())
}

#[test]
fn virtual_requirements_expand_recursively() -> TestResult {
    init_tracing();
    let (runtime, backend) = recording_runtime(1);
    let region = region_1d(4, 4);

    let root = KernelNodeBuilder::new("root").on(host(0)).build();
    runtime.submit(&root);

    let inner = RequirementBuilder::new(&region)
        .mode(AccessMode::DiscardWrite)
        .after(&root)
        .bind(host(0))
        .build();
    runtime.submit(&inner);
    assert!(inner.is_virtual());

    let outer = RequirementBuilder::new(&region)
        .mode(AccessMode::ReadWrite)
        .after(&inner)
        .build();
    let kernel = KernelNodeBuilder::new("leaf")
        .on(host(0))
        .access(&outer)
        .build();
    runtime.submit(&kernel);

    assert!(runtime.errors().is_empty(), "{:?}", runtime.errors().errors());
    // Data is already on host:0, so the outer requirement is virtual too.
    assert!(outer.is_virtual());
    assert_eq!(backend.ops_for(kernel.id())[0].predecessors, vec![root.id()]);
    Ok(())
}

#[test]
fn copies_wait_on_the_previous_user_and_kernels_on_their_copies() -> TestResult {
    init_tracing();
    let (runtime, backend) = recording_runtime_with(RecordingBackend::new(2));
    let region = region_1d(10, 4);

    let w = RequirementBuilder::new(&region)
        .mode(AccessMode::DiscardWrite)
        .build();
    let writer = KernelNodeBuilder::new("writer").on(host(0)).access(&w).build();
    runtime.submit(&writer);

    let r1 = RequirementBuilder::new(&region)
        .mode(AccessMode::Read)
        .after(&writer)
        .span(0, 5)
        .build();
    let r2 = RequirementBuilder::new(&region)
        .mode(AccessMode::Read)
        .after(&writer)
        .span(5, 10)
        .build();
    let reader = KernelNodeBuilder::new("reader")
        .on(host(1))
        .access(&r1)
        .access(&r2)
        .build();
    runtime.submit(&reader);

    assert!(runtime.errors().is_empty(), "{:?}", runtime.errors().errors());
    for req in [&r1, &r2] {
        let ops = backend.ops_for(req.id());
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].predecessors, vec![writer.id()]);
    }

    let mut expected = vec![r1.id(), r2.id()];
    expected.sort();
    assert_eq!(backend.ops_for(reader.id())[0].predecessors, expected);
    Ok(())
}

#[test]
fn auto_completed_work_leaves_nothing_to_wait_for() -> TestResult {
    init_tracing();
    let (runtime, backend) = recording_runtime_with(RecordingBackend::new(1).auto_complete());

    let first = KernelNodeBuilder::new("first").on(host(0)).build();
    runtime.submit(&first);
    let second = KernelNodeBuilder::new("second").on(host(0)).after(&first).build();
    runtime.submit(&second);

    assert!(first.is_complete());
    assert!(backend.ops_for(second.id())[0].predecessors.is_empty());
    assert!(runtime.registry().pending().is_empty());
    Ok(())
}
