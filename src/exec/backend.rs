// src/exec/backend.rs

//! Pluggable backend abstraction.
//!
//! The scheduler never talks to hardware directly. It looks up a
//! [`Backend`] in the [`BackendRegistry`] by [`BackendId`] and asks it for the
//! allocator and executor of a device:
//!
//! - [`BackendAllocator`] hands out device memory for lazily created
//!   replicas.
//! - [`BackendExecutor`] enqueues operations on a device queue, honouring an
//!   explicit list of predecessor nodes.
//!
//! A backend that has no executor or allocator for a device (not
//! initialised, unsupported platform) returns `None`; the scheduler turns
//! that into a "feature not supported" error instead of failing hard.
//!
//! [`crate::exec::host::HostBackend`] is the implementation shipped with the
//! crate; tests plug in recording fakes.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::dag::{DagNodePtr, Operation};
use crate::engine::{ErrorInfo, RtResult};
use crate::types::{BackendId, DeviceId, DevicePtr};

/// Device memory allocator for one device.
pub trait BackendAllocator: Send + Sync {
    fn allocate(&self, alignment: usize, bytes: usize) -> RtResult<DevicePtr>;

    fn free(&self, ptr: DevicePtr) -> RtResult<()>;
}

/// Dispatch target for one device.
pub trait BackendExecutor: Send + Sync {
    /// Enqueue `operation` on behalf of `node`.
    ///
    /// The operation must not start before every node in `predecessors` has
    /// completed. Implementations attach a completion event to `node` (via
    /// [`DagNode::mark_submitted`](crate::dag::DagNode::mark_submitted))
    /// before returning, and must not block waiting for the work itself.
    fn submit_directly(
        &self,
        node: &DagNodePtr,
        operation: &Operation,
        predecessors: &[DagNodePtr],
    ) -> RtResult<()>;
}

/// Kind of compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cpu => f.write_str("cpu"),
            DeviceKind::Gpu => f.write_str("gpu"),
        }
    }
}

/// Static properties of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProperties {
    pub name: String,
    pub vendor: String,
    pub kind: DeviceKind,
    pub max_compute_units: usize,
    /// Bytes of device memory, `None` if unbounded.
    pub global_mem_size: Option<usize>,
    pub max_kernel_concurrency: usize,
    pub max_memcpy_concurrency: usize,
}

/// Device enumeration for one backend.
pub trait HardwareManager: Send + Sync {
    fn device_count(&self) -> usize;

    fn device(&self, index: usize) -> Option<DeviceProperties>;
}

pub trait Backend: Send + Sync {
    fn id(&self) -> BackendId;

    fn name(&self) -> &str;

    fn hardware_manager(&self) -> &dyn HardwareManager;

    fn executor(&self, device: DeviceId) -> Option<Arc<dyn BackendExecutor>>;

    fn allocator(&self, device: DeviceId) -> Option<Arc<dyn BackendAllocator>>;
}

/// All backends available to a runtime, in registration order.
#[derive(Default)]
pub struct BackendRegistry {
    backends: Vec<Arc<dyn Backend>>,
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.backends.iter().map(|b| b.id()))
            .finish()
    }
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend, replacing any previously registered backend with the
    /// same id.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        info!(
            backend = %backend.id(),
            name = backend.name(),
            devices = backend.hardware_manager().device_count(),
            "registering backend"
        );
        self.backends.retain(|b| b.id() != backend.id());
        self.backends.push(backend);
    }

    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.register(backend);
        self
    }

    pub fn get(&self, id: BackendId) -> Option<&Arc<dyn Backend>> {
        self.backends.iter().find(|b| b.id() == id)
    }

    pub fn backends(&self) -> impl Iterator<Item = &Arc<dyn Backend>> {
        self.backends.iter()
    }

    /// All devices of all backends.
    pub fn devices(&self) -> Vec<DeviceId> {
        self.backends
            .iter()
            .flat_map(|b| {
                let id = b.id();
                (0..b.hardware_manager().device_count()).map(move |i| DeviceId::new(id, i))
            })
            .collect()
    }

    pub fn get_backend(&self, id: BackendId) -> RtResult<&Arc<dyn Backend>> {
        self.get(id)
            .ok_or_else(|| ErrorInfo::unsupported(format!("backend '{id}' is not available")))
    }

    pub fn get_executor(
        &self,
        backend: BackendId,
        device: DeviceId,
    ) -> RtResult<Arc<dyn BackendExecutor>> {
        self.get_backend(backend)?.executor(device).ok_or_else(|| {
            ErrorInfo::unsupported(format!(
                "backend '{backend}' has no executor for device {device}"
            ))
        })
    }

    pub fn get_allocator(&self, device: DeviceId) -> RtResult<Arc<dyn BackendAllocator>> {
        self.get_backend(device.backend)?
            .allocator(device)
            .ok_or_else(|| {
                ErrorInfo::unsupported(format!(
                    "backend '{}' has no allocator for device {device}",
                    device.backend
                ))
            })
    }
}
