use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use hetsched::dag::{Completion, CopyOperation, DagNodePtr, Event, NodeId, Operation};
use hetsched::engine::{ErrorInfo, ErrorKind, RtResult};
use hetsched::exec::{
    Backend, BackendAllocator, BackendExecutor, DeviceKind, DeviceProperties, HardwareManager,
};
use hetsched::types::{BackendId, DeviceId, DevicePtr};

/// What a recorded submission carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    Kernel(String),
    Copy(CopyOperation),
}

/// One call to `submit_directly`.
#[derive(Debug, Clone)]
pub struct SubmittedOp {
    pub device: DeviceId,
    pub node: NodeId,
    pub kind: OpKind,
    pub predecessors: Vec<NodeId>,
    pub completion: Arc<Completion>,
}

impl SubmittedOp {
    pub fn copy(&self) -> Option<&CopyOperation> {
        match &self.kind {
            OpKind::Copy(c) => Some(c),
            OpKind::Kernel(_) => None,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    log: Mutex<Vec<SubmittedOp>>,
    allocations: Mutex<Vec<(DeviceId, DevicePtr, usize)>>,
    freed: Mutex<Vec<DevicePtr>>,
    next_ptr: AtomicU64,
    fail_allocations: AtomicBool,
    auto_complete: AtomicBool,
}

/// A backend that performs no work.
///
/// Every submission is recorded together with its predecessor list and a
/// completion event that stays pending until the test completes it (or
/// immediately, in auto-complete mode). Allocations hand out fake pointers
/// and can be switched to fail.
#[derive(Debug)]
pub struct RecordingBackend {
    id: BackendId,
    hardware: RecordingHardware,
    shared: Arc<Shared>,
}

impl RecordingBackend {
    pub fn new(devices: usize) -> Self {
        Self::with_id(BackendId::Host, devices)
    }

    pub fn with_id(id: BackendId, devices: usize) -> Self {
        let shared = Shared {
            next_ptr: AtomicU64::new(0x10_000),
            ..Shared::default()
        };
        Self {
            id,
            hardware: RecordingHardware { devices },
            shared: Arc::new(shared),
        }
    }

    /// Complete every event as soon as it is submitted.
    pub fn auto_complete(self) -> Self {
        self.shared.auto_complete.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_allocations(&self, fail: bool) {
        self.shared.fail_allocations.store(fail, Ordering::SeqCst);
    }

    pub fn device(&self, index: usize) -> DeviceId {
        DeviceId::new(self.id, index)
    }

    pub fn submitted(&self) -> Vec<SubmittedOp> {
        self.shared.log.lock().unwrap().clone()
    }

    pub fn copies(&self) -> Vec<CopyOperation> {
        self.submitted()
            .iter()
            .filter_map(|op| op.copy().copied())
            .collect()
    }

    pub fn kernels(&self) -> Vec<String> {
        self.submitted()
            .into_iter()
            .filter_map(|op| match op.kind {
                OpKind::Kernel(name) => Some(name),
                OpKind::Copy(_) => None,
            })
            .collect()
    }

    /// Submissions made on behalf of `node`.
    pub fn ops_for(&self, node: NodeId) -> Vec<SubmittedOp> {
        self.submitted()
            .into_iter()
            .filter(|op| op.node == node)
            .collect()
    }

    pub fn complete_all(&self) {
        for op in self.shared.log.lock().unwrap().iter() {
            op.completion.complete();
        }
    }

    pub fn complete(&self, node: NodeId) {
        for op in self.shared.log.lock().unwrap().iter() {
            if op.node == node {
                op.completion.complete();
            }
        }
    }

    pub fn allocations(&self) -> Vec<(DeviceId, DevicePtr, usize)> {
        self.shared.allocations.lock().unwrap().clone()
    }

    pub fn freed(&self) -> Vec<DevicePtr> {
        self.shared.freed.lock().unwrap().clone()
    }

    fn has_device(&self, device: DeviceId) -> bool {
        device.backend == self.id && device.index < self.hardware.devices
    }
}

impl Backend for RecordingBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    fn name(&self) -> &str {
        "recording"
    }

    fn hardware_manager(&self) -> &dyn HardwareManager {
        &self.hardware
    }

    fn executor(&self, device: DeviceId) -> Option<Arc<dyn BackendExecutor>> {
        self.has_device(device).then(|| {
            Arc::new(RecordingExecutor {
                device,
                shared: Arc::clone(&self.shared),
            }) as Arc<dyn BackendExecutor>
        })
    }

    fn allocator(&self, device: DeviceId) -> Option<Arc<dyn BackendAllocator>> {
        self.has_device(device).then(|| {
            Arc::new(RecordingAllocator {
                device,
                shared: Arc::clone(&self.shared),
            }) as Arc<dyn BackendAllocator>
        })
    }
}

#[derive(Debug)]
struct RecordingHardware {
    devices: usize,
}

impl HardwareManager for RecordingHardware {
    fn device_count(&self) -> usize {
        self.devices
    }

    fn device(&self, index: usize) -> Option<DeviceProperties> {
        (index < self.devices).then(|| DeviceProperties {
            name: format!("recording device {index}"),
            vendor: "test".to_string(),
            kind: DeviceKind::Gpu,
            max_compute_units: 1,
            global_mem_size: None,
            max_kernel_concurrency: 1,
            max_memcpy_concurrency: 1,
        })
    }
}

struct RecordingExecutor {
    device: DeviceId,
    shared: Arc<Shared>,
}

impl BackendExecutor for RecordingExecutor {
    fn submit_directly(
        &self,
        node: &DagNodePtr,
        operation: &Operation,
        predecessors: &[DagNodePtr],
    ) -> RtResult<()> {
        let kind = match operation {
            Operation::Kernel(launch) => OpKind::Kernel(launch.kernel.name().to_string()),
            Operation::Copy(copy) => OpKind::Copy(*copy),
            Operation::Requirement(_) => {
                return Err(ErrorInfo::unsupported("requirements cannot be executed"));
            }
        };

        let completion = Completion::new();
        if self.shared.auto_complete.load(Ordering::SeqCst) {
            completion.complete();
        }
        self.shared.log.lock().unwrap().push(SubmittedOp {
            device: self.device,
            node: node.id(),
            kind,
            predecessors: predecessors.iter().map(|p| p.id()).collect(),
            completion: Arc::clone(&completion),
        });
        node.mark_submitted(Event::Pending(completion));
        Ok(())
    }
}

struct RecordingAllocator {
    device: DeviceId,
    shared: Arc<Shared>,
}

impl BackendAllocator for RecordingAllocator {
    fn allocate(&self, alignment: usize, bytes: usize) -> RtResult<DevicePtr> {
        if self.shared.fail_allocations.load(Ordering::SeqCst) {
            return Err(ErrorInfo::new(
                ErrorKind::MemoryAllocation,
                format!("out of memory on {}", self.device),
            ));
        }
        let step = (bytes.max(1) as u64).div_ceil(alignment.max(1) as u64) * alignment.max(1) as u64;
        let ptr = DevicePtr(self.shared.next_ptr.fetch_add(step, Ordering::SeqCst));
        self.shared
            .allocations
            .lock()
            .unwrap()
            .push((self.device, ptr, bytes));
        Ok(ptr)
    }

    fn free(&self, ptr: DevicePtr) -> RtResult<()> {
        self.shared.freed.lock().unwrap().push(ptr);
        Ok(())
    }
}
