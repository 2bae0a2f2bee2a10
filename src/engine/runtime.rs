// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::dag::{DagNode, DagNodePtr, DirectScheduler, SubmissionRegistry};
use crate::engine::{ErrorInfo, ErrorSink, RtResult};
use crate::exec::BackendRegistry;
use crate::region::DataRegion;
use crate::types::{DeviceId, DevicePtr};

/// The object callers hold: backends, scheduler, submission registry and
/// error sink wired together.
///
/// `submit` is synchronous and never waits for device work; `wait` is the
/// only place that does.
pub struct Runtime {
    scheduler: DirectScheduler,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("backends", self.scheduler.backends())
            .field("submitted", &self.scheduler.registry().len())
            .field("errors", &self.scheduler.errors().len())
            .finish()
    }
}

impl Runtime {
    pub fn new(backends: BackendRegistry, errors: ErrorSink) -> Self {
        info!(devices = backends.devices().len(), "runtime created");
        Self {
            scheduler: DirectScheduler::new(
                Arc::new(backends),
                Arc::new(SubmissionRegistry::new()),
                errors,
            ),
        }
    }

    pub fn scheduler(&self) -> &DirectScheduler {
        &self.scheduler
    }

    pub fn backends(&self) -> &BackendRegistry {
        self.scheduler.backends()
    }

    pub fn registry(&self) -> &SubmissionRegistry {
        self.scheduler.registry()
    }

    pub fn errors(&self) -> &ErrorSink {
        self.scheduler.errors()
    }

    pub fn submit(&self, node: &DagNodePtr) {
        self.scheduler.submit(node);
    }

    /// Whether `node` went through a successful submission on this runtime.
    pub fn is_submitted(&self, node: &DagNode) -> bool {
        self.scheduler.registry().is_submitted(node.id())
    }

    /// Wait for every node submitted so far, then forget the completed ones.
    pub async fn wait(&self) {
        let registry = self.scheduler.registry();
        debug!(pending = registry.pending().len(), "waiting for submitted work");
        registry.wait_all().await;
        registry.purge_completed();
    }

    /// Allocate a replica of `region` on `device` if it has none yet.
    pub fn allocate(&self, region: &DataRegion, device: DeviceId) -> RtResult<DevicePtr> {
        self.scheduler.ensure_allocation_exists(region, device)
    }

    /// Free every replica of `region`.
    ///
    /// Work touching the region must have completed. Failures to free are
    /// reported to the error sink and do not stop the remaining frees.
    /// Returns how many replicas were released.
    pub fn release_region(&self, region: &DataRegion) -> usize {
        let mut released = 0;
        for (device, allocation) in region.allocations() {
            region.remove_allocation(device);
            let freed = self
                .backends()
                .get_allocator(device)
                .and_then(|allocator| allocator.free(allocation.ptr));
            match freed {
                Ok(()) => released += 1,
                Err(err) => self.errors().register_error(ErrorInfo::new(
                    err.kind,
                    format!("releasing {} on {device}: {}", region.id(), err.message),
                )),
            }
        }
        debug!(region = %region.id(), released, "region released");
        released
    }
}
