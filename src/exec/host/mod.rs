// src/exec/host/mod.rs

//! Host backend: simulated devices backed by host memory.
//!
//! Each device gets an in-order queue ([`queue::HostQueue`]) drained by a
//! Tokio task and an allocator carving blocks out of a shared
//! [`memory::HostMemory`] pool, optionally capped per device.

pub mod kernel;
pub mod memory;
pub mod queue;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tracing::info;

use crate::engine::{ErrorSink, RtResult};
use crate::exec::backend::{
    Backend, BackendAllocator, BackendExecutor, DeviceKind, DeviceProperties, HardwareManager,
};
use crate::types::{BackendId, DeviceId, DevicePtr};

pub use kernel::{BufferView, KernelContext, ResolvedArg};
pub use memory::HostMemory;
pub use queue::HostQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostBackendConfig {
    pub devices: usize,
    /// Per-device memory cap in bytes.
    pub memory_limit: Option<usize>,
}

impl Default for HostBackendConfig {
    fn default() -> Self {
        Self {
            devices: 2,
            memory_limit: None,
        }
    }
}

/// Allocator for one host device.
#[derive(Debug)]
pub struct HostAllocator {
    device: DeviceId,
    memory: Arc<HostMemory>,
    limit: Option<usize>,
}

impl BackendAllocator for HostAllocator {
    fn allocate(&self, alignment: usize, bytes: usize) -> RtResult<DevicePtr> {
        self.memory
            .allocate(self.device, alignment, bytes, self.limit)
    }

    fn free(&self, ptr: DevicePtr) -> RtResult<()> {
        self.memory.free(ptr)
    }
}

#[derive(Debug)]
pub struct HostHardwareManager {
    config: HostBackendConfig,
    compute_units: usize,
}

impl HardwareManager for HostHardwareManager {
    fn device_count(&self) -> usize {
        self.config.devices
    }

    fn device(&self, index: usize) -> Option<DeviceProperties> {
        (index < self.config.devices).then(|| DeviceProperties {
            name: format!("host simulated device {index}"),
            vendor: "hetsched".to_string(),
            kind: DeviceKind::Cpu,
            max_compute_units: self.compute_units,
            global_mem_size: self.config.memory_limit,
            // One in-order queue per device.
            max_kernel_concurrency: 1,
            max_memcpy_concurrency: 1,
        })
    }
}

struct HostDevice {
    queue: Arc<HostQueue>,
    allocator: Arc<HostAllocator>,
}

pub struct HostBackend {
    devices: Vec<HostDevice>,
    memory: Arc<HostMemory>,
    hardware: HostHardwareManager,
}

impl std::fmt::Debug for HostBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBackend")
            .field("hardware", &self.hardware)
            .finish_non_exhaustive()
    }
}

impl HostBackend {
    /// Create the backend and spawn one queue task per device.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: HostBackendConfig, errors: ErrorSink) -> Result<Self> {
        let handle = Handle::try_current()
            .context("the host backend must be created inside a Tokio runtime")?;
        let memory = Arc::new(HostMemory::new());

        let devices = (0..config.devices)
            .map(|index| {
                let device = DeviceId::host(index);
                HostDevice {
                    queue: Arc::new(HostQueue::spawn(
                        device,
                        Arc::clone(&memory),
                        errors.clone(),
                        &handle,
                    )),
                    allocator: Arc::new(HostAllocator {
                        device,
                        memory: Arc::clone(&memory),
                        limit: config.memory_limit,
                    }),
                }
            })
            .collect();

        let compute_units = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        info!(
            devices = config.devices,
            memory_limit = ?config.memory_limit,
            "host backend initialised"
        );

        Ok(Self {
            devices,
            memory,
            hardware: HostHardwareManager {
                config,
                compute_units,
            },
        })
    }

    /// Direct access to the memory pool (initial data, inspection).
    pub fn memory(&self) -> &Arc<HostMemory> {
        &self.memory
    }

    fn device(&self, device: DeviceId) -> Option<&HostDevice> {
        if device.backend != BackendId::Host {
            return None;
        }
        self.devices.get(device.index)
    }
}

impl Backend for HostBackend {
    fn id(&self) -> BackendId {
        BackendId::Host
    }

    fn name(&self) -> &str {
        "Host"
    }

    fn hardware_manager(&self) -> &dyn HardwareManager {
        &self.hardware
    }

    fn executor(&self, device: DeviceId) -> Option<Arc<dyn BackendExecutor>> {
        self.device(device)
            .map(|d| Arc::clone(&d.queue) as Arc<dyn BackendExecutor>)
    }

    fn allocator(&self, device: DeviceId) -> Option<Arc<dyn BackendAllocator>> {
        self.device(device)
            .map(|d| Arc::clone(&d.allocator) as Arc<dyn BackendAllocator>)
    }
}
