// src/dag/operation.rs

//! The closed set of things a DAG node can do.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::dag::node::DagNodePtr;
use crate::exec::host::KernelContext;
use crate::region::{DataRegionPtr, Id3, Range3, Rect};
use crate::types::{AccessMode, BackendId, DeviceId, DevicePtr};

pub type KernelFn = dyn Fn(&mut KernelContext<'_>) -> anyhow::Result<()> + Send + Sync;

/// Compiled kernel handle.
#[derive(Clone)]
pub struct Kernel {
    name: String,
    func: Arc<KernelFn>,
}

impl Kernel {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut KernelContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, ctx: &mut KernelContext<'_>) -> anyhow::Result<()> {
        (self.func)(ctx)
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone)]
pub enum KernelArg {
    Scalar(u64),
    /// A requirement node; the kernel sees the replica bound to it.
    Accessor(DagNodePtr),
}

#[derive(Debug, Clone)]
pub struct KernelLaunch {
    pub kernel: Kernel,
    pub args: Vec<KernelArg>,
    pub preferred_backend: Option<BackendId>,
}

impl KernelLaunch {
    pub fn new(kernel: Kernel, args: Vec<KernelArg>) -> Self {
        Self {
            kernel,
            args,
            preferred_backend: None,
        }
    }

    pub fn with_preferred_backend(mut self, backend: BackendId) -> Self {
        self.preferred_backend = Some(backend);
        self
    }
}

/// A box inside one device allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLocation {
    pub device: DeviceId,
    pub ptr: DevicePtr,
    /// Offset of the box in elements.
    pub offset: Id3,
    /// Extent of the whole allocation in elements.
    pub extent: Range3,
    pub element_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOperation {
    pub source: MemoryLocation,
    pub dest: MemoryLocation,
    /// Size of the copied box in elements.
    pub range: Range3,
}

impl CopyOperation {
    pub fn num_bytes(&self) -> usize {
        crate::region::rect::element_count(&self.range) * self.source.element_size
    }
}

impl fmt::Display for CopyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "copy {} {:?} -> {} {:?} range {:?}",
            self.source.device, self.source.offset, self.dest.device, self.dest.offset, self.range
        )
    }
}

/// Declared access to (part of) a data region.
#[derive(Debug)]
pub struct MemoryRequirement {
    region: DataRegionPtr,
    mode: AccessMode,
    rect: Rect,
    /// Replica pointer, bound when the requirement is resolved.
    device_data: Mutex<Option<DevicePtr>>,
}

impl MemoryRequirement {
    pub fn new(region: DataRegionPtr, mode: AccessMode, rect: Rect) -> Self {
        Self {
            region,
            mode,
            rect,
            device_data: Mutex::new(None),
        }
    }

    /// Access to the whole region.
    pub fn whole(region: DataRegionPtr, mode: AccessMode) -> Self {
        let rect = region.whole();
        Self::new(region, mode, rect)
    }

    pub fn region(&self) -> &DataRegionPtr {
        &self.region
    }

    pub fn access_mode(&self) -> AccessMode {
        self.mode
    }

    pub fn access_rect(&self) -> Rect {
        self.rect
    }

    pub fn bind_device_data(&self, ptr: DevicePtr) {
        *self
            .device_data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(ptr);
    }

    pub fn device_data(&self) -> Option<DevicePtr> {
        *self
            .device_data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug)]
pub enum Operation {
    Kernel(KernelLaunch),
    Copy(CopyOperation),
    Requirement(MemoryRequirement),
}

impl Operation {
    pub fn is_requirement(&self) -> bool {
        matches!(self, Operation::Requirement(_))
    }

    pub fn is_data_transfer(&self) -> bool {
        matches!(self, Operation::Copy(_))
    }

    pub fn as_requirement(&self) -> Option<&MemoryRequirement> {
        match self {
            Operation::Requirement(req) => Some(req),
            _ => None,
        }
    }

    pub fn preferred_backend(&self) -> Option<BackendId> {
        match self {
            Operation::Kernel(launch) => launch.preferred_backend,
            Operation::Copy(_) | Operation::Requirement(_) => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Operation::Kernel(launch) => format!("kernel '{}'", launch.kernel.name()),
            Operation::Copy(copy) => copy.to_string(),
            Operation::Requirement(req) => format!(
                "{} access to {} over {}",
                req.mode,
                req.region.id(),
                req.rect
            ),
        }
    }
}

impl From<KernelLaunch> for Operation {
    fn from(launch: KernelLaunch) -> Self {
        Operation::Kernel(launch)
    }
}

impl From<CopyOperation> for Operation {
    fn from(copy: CopyOperation) -> Self {
        Operation::Copy(copy)
    }
}

impl From<MemoryRequirement> for Operation {
    fn from(req: MemoryRequirement) -> Self {
        Operation::Requirement(req)
    }
}
