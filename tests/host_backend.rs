// tests/host_backend.rs

mod common;
use crate::common::builders::{noop_kernel, region_1d, KernelNodeBuilder, RequirementBuilder};
use crate::common::{host, init_tracing, with_timeout, TestResult};

use std::sync::Arc;

use hetsched::engine::{ErrorKind, ErrorSink, Runtime};
use hetsched::exec::{Backend, BackendRegistry, HardwareManager, HostBackend, HostBackendConfig};
use hetsched::region::{DataRegion, Rect};
use hetsched::types::AccessMode;
use hetsched::workload::{decode_element, kernels};

fn host_runtime(devices: usize, memory_limit: Option<usize>) -> anyhow::Result<(Runtime, Arc<HostBackend>)> {
    let errors = ErrorSink::new();
    let backend = Arc::new(HostBackend::new(
        HostBackendConfig {
            devices,
            memory_limit,
        },
        errors.clone(),
    )?);
    let dyn_backend: Arc<dyn Backend> = Arc::clone(&backend) as Arc<dyn Backend>;
    let runtime = Runtime::new(BackendRegistry::new().with_backend(dyn_backend), errors);
    Ok((runtime, backend))
}

#[tokio::test]
async fn fill_then_increment_across_devices() -> TestResult {
    init_tracing();
    let (runtime, backend) = host_runtime(2, None)?;
    let region = region_1d(16, 4);

    let out = RequirementBuilder::new(&region)
        .mode(AccessMode::DiscardWrite)
        .build();
    let fill = KernelNodeBuilder::with_kernel(kernels::fill())
        .on(host(0))
        .scalar(7)
        .access(&out)
        .build();
    runtime.submit(&fill);

    let inout = RequirementBuilder::new(&region)
        .mode(AccessMode::ReadWrite)
        .after(&fill)
        .build();
    let bump = KernelNodeBuilder::with_kernel(kernels::increment())
        .on(host(1))
        .scalar(3)
        .access(&inout)
        .build();
    runtime.submit(&bump);

    with_timeout(runtime.wait()).await;
    assert!(runtime.errors().is_empty(), "{:?}", runtime.errors().errors());
    assert!(bump.is_complete());

    let bytes = backend.memory().read(region.get_memory(host(1))?)?;
    assert_eq!(bytes.len(), 64);
    assert!(bytes.chunks_exact(4).all(|e| decode_element(e) == 10));

    // host:0 still holds the filled values but is no longer valid.
    let stale = backend.memory().read(region.get_memory(host(0))?)?;
    assert!(stale.chunks_exact(4).all(|e| decode_element(e) == 7));
    assert!(region.valid_regions(host(0)).is_empty());
    assert_eq!(region.valid_regions(host(1)), vec![region.whole()]);
    Ok(())
}

#[tokio::test]
async fn strided_box_copy_moves_only_the_box() -> TestResult {
    init_tracing();
    let (runtime, backend) = host_runtime(2, None)?;
    let region = Arc::new(DataRegion::new([4, 4, 1], 1));

    let src = runtime.allocate(&region, host(0))?;
    let init: Vec<u8> = (0..16).collect();
    backend.memory().write(src, &init)?;
    region.mark_range_current(host(0), &region.whole());

    let inner = Rect::new([1, 1, 0], [2, 2, 1]);
    let read = RequirementBuilder::new(&region)
        .mode(AccessMode::Read)
        .rect(inner)
        .build();
    let kernel = KernelNodeBuilder::with_kernel(noop_kernel("look"))
        .on(host(1))
        .access(&read)
        .build();
    runtime.submit(&kernel);
    with_timeout(runtime.wait()).await;

    assert!(runtime.errors().is_empty(), "{:?}", runtime.errors().errors());
    let dst = backend.memory().read(region.get_memory(host(1))?)?;
    let mut expected = vec![0u8; 16];
    for index in [5, 6, 9, 10] {
        expected[index] = index as u8;
    }
    assert_eq!(dst, expected);
    assert_eq!(region.valid_regions(host(1)), vec![inner]);
    Ok(())
}

#[tokio::test]
async fn failing_kernel_reports_and_still_completes() -> TestResult {
    init_tracing();
    let (runtime, _backend) = host_runtime(1, None)?;
    let region = region_1d(4, 4);

    let req = RequirementBuilder::new(&region)
        .mode(AccessMode::DiscardWrite)
        .build();
    let bump = KernelNodeBuilder::with_kernel(kernels::increment())
        .on(host(0))
        .scalar(1)
        .access(&req)
        .build();
    runtime.submit(&bump);
    with_timeout(runtime.wait()).await;

    assert!(bump.is_complete());
    let errors = runtime.errors().errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::Kernel);
    assert!(errors[0].message.contains("increment"));
    Ok(())
}

#[tokio::test]
async fn memory_limit_rejects_oversized_replicas() -> TestResult {
    init_tracing();
    let (runtime, backend) = host_runtime(1, Some(16))?;
    let region = region_1d(8, 4);

    let req = RequirementBuilder::new(&region)
        .mode(AccessMode::DiscardWrite)
        .build();
    let kernel = KernelNodeBuilder::with_kernel(kernels::fill())
        .on(host(0))
        .scalar(0)
        .access(&req)
        .build();
    runtime.submit(&kernel);

    assert!(runtime.errors().contains_kind(ErrorKind::MemoryAllocation));
    assert!(kernel.is_cancelled());
    assert_eq!(backend.memory().usage(host(0)), 0);
    Ok(())
}

#[tokio::test]
async fn release_region_frees_every_replica() -> TestResult {
    init_tracing();
    let (runtime, backend) = host_runtime(2, None)?;
    let region = region_1d(8, 8);
    runtime.allocate(&region, host(0))?;
    runtime.allocate(&region, host(1))?;
    assert_eq!(backend.memory().usage(host(0)), 64);

    assert_eq!(runtime.release_region(&region), 2);
    assert_eq!(backend.memory().usage(host(0)), 0);
    assert_eq!(backend.memory().usage(host(1)), 0);
    assert!(!region.has_allocation(host(0)));
    assert!(runtime.errors().is_empty());
    Ok(())
}

#[tokio::test]
async fn host_backend_describes_its_devices() -> TestResult {
    let (_runtime, backend) = host_runtime(3, Some(1024))?;
    let hw = backend.hardware_manager();
    assert_eq!(hw.device_count(), 3);
    let props = hw.device(2).ok_or("missing device 2")?;
    assert_eq!(props.global_mem_size, Some(1024));
    assert!(hw.device(3).is_none());
    assert!(backend.executor(host(3)).is_none());
    Ok(())
}

#[test]
fn host_backend_needs_a_tokio_runtime() {
    let result = HostBackend::new(HostBackendConfig::default(), ErrorSink::new());
    assert!(result.is_err());
}
