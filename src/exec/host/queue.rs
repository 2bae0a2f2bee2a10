// src/exec/host/queue.rs

//! In-order device queue for the host backend.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::dag::{
    Completion, CopyOperation, DagNodePtr, Event, Kernel, KernelArg, NodeId, Operation,
};
use crate::engine::{ErrorInfo, ErrorKind, ErrorSink, RtResult};
use crate::exec::backend::BackendExecutor;
use crate::exec::host::kernel::{BufferView, KernelContext, ResolvedArg};
use crate::exec::host::memory::HostMemory;
use crate::types::DeviceId;

enum Work {
    Copy(CopyOperation),
    Kernel { kernel: Kernel, args: Vec<ResolvedArg> },
}

/// One enqueued operation.
struct QueueItem {
    node: NodeId,
    work: Work,
    waits: Vec<Event>,
    completion: Arc<Completion>,
}

/// Executor for one simulated device.
///
/// Items are drained in submission order by a single Tokio task. Before an
/// item runs, the task awaits the events of all of its predecessors, which
/// may live on other devices' queues.
#[derive(Debug)]
pub struct HostQueue {
    device: DeviceId,
    tx: mpsc::UnboundedSender<QueueItem>,
}

impl HostQueue {
    /// Spawn the queue loop on `handle`.
    pub fn spawn(
        device: DeviceId,
        memory: Arc<HostMemory>,
        errors: ErrorSink,
        handle: &Handle,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueueItem>();

        handle.spawn(async move {
            info!(%device, "device queue started");

            while let Some(item) = rx.recv().await {
                for event in &item.waits {
                    event.wait().await;
                }
                run_item(device, &item, &memory, &errors);
                item.completion.complete();
            }

            info!(%device, "device queue finished (channel closed)");
        });

        Self { device, tx }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }
}

impl BackendExecutor for HostQueue {
    fn submit_directly(
        &self,
        node: &DagNodePtr,
        operation: &Operation,
        predecessors: &[DagNodePtr],
    ) -> RtResult<()> {
        let work = match operation {
            Operation::Copy(copy) => Work::Copy(*copy),
            Operation::Kernel(launch) => Work::Kernel {
                kernel: launch.kernel.clone(),
                args: resolve_args(&launch.args)?,
            },
            Operation::Requirement(_) => {
                return Err(ErrorInfo::unsupported(format!(
                    "device {}: requirements cannot be executed directly",
                    self.device
                )));
            }
        };

        let mut waits = Vec::with_capacity(predecessors.len());
        for pred in predecessors {
            match pred.event() {
                Some(event) => waits.push(event),
                None => warn!(
                    node = %node.id(),
                    predecessor = %pred.id(),
                    "predecessor has no completion event; not waiting for it"
                ),
            }
        }

        let completion = Completion::new();
        let item = QueueItem {
            node: node.id(),
            work,
            waits,
            completion: Arc::clone(&completion),
        };

        debug!(
            device = %self.device,
            node = %node.id(),
            op = %operation.describe(),
            predecessors = predecessors.len(),
            "enqueueing operation"
        );

        self.tx.send(item).map_err(|_| {
            ErrorInfo::unsupported(format!("device queue of {} is closed", self.device))
        })?;
        node.mark_submitted(Event::Pending(completion));
        Ok(())
    }
}

fn resolve_args(args: &[KernelArg]) -> RtResult<Vec<ResolvedArg>> {
    args.iter()
        .map(|arg| match arg {
            KernelArg::Scalar(v) => Ok(ResolvedArg::Scalar(*v)),
            KernelArg::Accessor(req_node) => {
                let req = req_node.operation().as_requirement().ok_or_else(|| {
                    ErrorInfo::new(
                        ErrorKind::Usage,
                        format!("accessor argument {} is not a requirement", req_node.id()),
                    )
                })?;
                let ptr = req.device_data().ok_or_else(|| {
                    ErrorInfo::internal(format!(
                        "accessor {} has no bound device pointer",
                        req_node.id()
                    ))
                })?;
                let region = req.region();
                Ok(ResolvedArg::Buffer(BufferView {
                    region: region.id(),
                    ptr,
                    element_size: region.get_element_size(),
                    extent: region.get_num_elements(),
                    rect: req.access_rect(),
                    mode: req.access_mode(),
                }))
            }
        })
        .collect()
}

fn run_item(device: DeviceId, item: &QueueItem, memory: &HostMemory, errors: &ErrorSink) {
    match &item.work {
        Work::Copy(copy) => {
            if let Err(err) = memory.copy(copy) {
                errors.register_error(err);
            }
        }
        Work::Kernel { kernel, args } => {
            trace!(%device, node = %item.node, kernel = kernel.name(), "running kernel");
            let mut ctx = KernelContext::new(device, args, memory);
            if let Err(err) = kernel.invoke(&mut ctx) {
                errors.register_error(ErrorInfo::new(
                    ErrorKind::Kernel,
                    format!(
                        "kernel '{}' ({}) failed on {device}: {err:#}",
                        kernel.name(),
                        item.node
                    ),
                ));
            }
        }
    }
}
