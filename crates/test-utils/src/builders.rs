#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use hetsched::config::{
    AccessConfig, BufferConfig, HostSection, RawWorkload, RuntimeSection, TaskConfig,
};
use hetsched::dag::{
    DagNode, DagNodePtr, ExecutionHints, Kernel, KernelArg, KernelLaunch, MemoryRequirement,
};
use hetsched::region::{DataRegion, DataRegionPtr, Rect};
use hetsched::types::{AccessMode, BackendId, DeviceId};

/// One-dimensional region of `len` elements.
pub fn region_1d(len: usize, element_size: usize) -> DataRegionPtr {
    Arc::new(DataRegion::new([len, 1, 1], element_size))
}

/// A kernel that does nothing.
pub fn noop_kernel(name: &str) -> Kernel {
    Kernel::new(name, |_ctx| Ok(()))
}

/// Builder for requirement nodes.
pub struct RequirementBuilder {
    region: DataRegionPtr,
    mode: AccessMode,
    rect: Option<Rect>,
    after: Vec<DagNodePtr>,
    bind: Option<DeviceId>,
}

impl RequirementBuilder {
    pub fn new(region: &DataRegionPtr) -> Self {
        Self {
            region: Arc::clone(region),
            mode: AccessMode::ReadWrite,
            rect: None,
            after: Vec::new(),
            bind: None,
        }
    }

    pub fn mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    /// One-dimensional `[begin, end)`.
    pub fn span(mut self, begin: usize, end: usize) -> Self {
        self.rect = Some(Rect::span(begin, end));
        self
    }

    pub fn rect(mut self, rect: Rect) -> Self {
        self.rect = Some(rect);
        self
    }

    pub fn after(mut self, node: &DagNodePtr) -> Self {
        self.after.push(Arc::clone(node));
        self
    }

    pub fn bind(mut self, device: DeviceId) -> Self {
        self.bind = Some(device);
        self
    }

    pub fn build(self) -> DagNodePtr {
        let rect = self.rect.unwrap_or_else(|| self.region.whole());
        DagNode::new(
            MemoryRequirement::new(self.region, self.mode, rect),
            self.after,
            ExecutionHints {
                bind_to_device: self.bind,
            },
        )
    }
}

/// Builder for kernel nodes. Requirement nodes added with
/// [`access`](Self::access) become both edges and accessor arguments.
pub struct KernelNodeBuilder {
    kernel: Kernel,
    args: Vec<KernelArg>,
    requirements: Vec<DagNodePtr>,
    bind: Option<DeviceId>,
    preferred_backend: Option<BackendId>,
}

impl KernelNodeBuilder {
    pub fn new(name: &str) -> Self {
        Self::with_kernel(noop_kernel(name))
    }

    pub fn with_kernel(kernel: Kernel) -> Self {
        Self {
            kernel,
            args: Vec::new(),
            requirements: Vec::new(),
            bind: None,
            preferred_backend: None,
        }
    }

    pub fn on(mut self, device: DeviceId) -> Self {
        self.bind = Some(device);
        self
    }

    pub fn scalar(mut self, value: u64) -> Self {
        self.args.push(KernelArg::Scalar(value));
        self
    }

    pub fn access(mut self, requirement: &DagNodePtr) -> Self {
        self.args.push(KernelArg::Accessor(Arc::clone(requirement)));
        self.requirements.push(Arc::clone(requirement));
        self
    }

    /// Plain edge without an accessor argument.
    pub fn after(mut self, node: &DagNodePtr) -> Self {
        self.requirements.push(Arc::clone(node));
        self
    }

    pub fn prefer(mut self, backend: BackendId) -> Self {
        self.preferred_backend = Some(backend);
        self
    }

    pub fn build(self) -> DagNodePtr {
        let mut launch = KernelLaunch::new(self.kernel, self.args);
        launch.preferred_backend = self.preferred_backend;
        DagNode::new(
            launch,
            self.requirements,
            ExecutionHints {
                bind_to_device: self.bind,
            },
        )
    }
}

/// Builder for raw workload files.
pub struct WorkloadBuilder {
    raw: RawWorkload,
}

impl WorkloadBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawWorkload {
                runtime: RuntimeSection::default(),
                host: HostSection::default(),
                buffer: BTreeMap::new(),
                task: Vec::new(),
            },
        }
    }

    pub fn devices(mut self, devices: usize) -> Self {
        self.raw.host.devices = devices;
        self
    }

    pub fn memory_limit(mut self, bytes: usize) -> Self {
        self.raw.host.memory_limit = Some(bytes);
        self
    }

    pub fn buffer(mut self, name: &str, element_size: usize, extent: &[usize]) -> Self {
        self.raw.buffer.insert(
            name.to_string(),
            BufferConfig {
                element_size,
                extent: extent.to_vec(),
                init_device: None,
                init_value: 0,
            },
        );
        self
    }

    pub fn initialised_buffer(
        mut self,
        name: &str,
        element_size: usize,
        extent: &[usize],
        device: &str,
        value: u64,
    ) -> Self {
        self.raw.buffer.insert(
            name.to_string(),
            BufferConfig {
                element_size,
                extent: extent.to_vec(),
                init_device: Some(device.to_string()),
                init_value: value,
            },
        );
        self
    }

    pub fn task(mut self, task: TaskConfig) -> Self {
        self.raw.task.push(task);
        self
    }

    pub fn build(self) -> RawWorkload {
        self.raw
    }
}

impl Default for WorkloadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `[[task]]` entries.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(name: &str, device: &str, kernel: &str) -> Self {
        Self {
            task: TaskConfig {
                name: name.to_string(),
                device: device.to_string(),
                kernel: kernel.to_string(),
                value: 0,
                after: Vec::new(),
                access: Vec::new(),
            },
        }
    }

    pub fn value(mut self, value: u64) -> Self {
        self.task.value = value;
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    /// Access to the whole buffer.
    pub fn access(mut self, buffer: &str, mode: AccessMode) -> Self {
        self.task.access.push(AccessConfig {
            buffer: buffer.to_string(),
            mode,
            offset: None,
            range: None,
        });
        self
    }

    pub fn access_range(
        mut self,
        buffer: &str,
        mode: AccessMode,
        offset: &[usize],
        range: &[usize],
    ) -> Self {
        self.task.access.push(AccessConfig {
            buffer: buffer.to_string(),
            mode,
            offset: Some(offset.to_vec()),
            range: Some(range.to_vec()),
        });
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
