// src/dag/scheduler.rs

//! Direct scheduler.
//!
//! [`DirectScheduler::submit`] takes one node whose requirements have been
//! built, resolves its memory requirements on the bound device (allocating
//! replicas and issuing update copies as needed) and hands the node's own
//! operation to the executor of that device. It does not look ahead, does
//! not reorder and never blocks on device work.
//!
//! Failures are not returned to the caller. They are reported to the
//! [`ErrorSink`] and the node (plus any requirement that had not been
//! submitted yet) ends up [`Cancelled`](crate::dag::NodeState::Cancelled).

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::dag::node::DagNodePtr;
use crate::dag::operation::{CopyOperation, MemoryLocation, MemoryRequirement, Operation};
use crate::dag::registry::SubmissionRegistry;
use crate::engine::{ErrorInfo, ErrorKind, ErrorSink, RtResult};
use crate::exec::{BackendExecutor, BackendRegistry};
use crate::region::rect::difference;
use crate::region::{DataRegion, Rect};
use crate::types::{DeviceId, DevicePtr};

/// Alignment requested for every replica allocation, in bytes.
pub const ALLOCATION_ALIGNMENT: usize = 128;

#[derive(Debug, Clone)]
pub struct DirectScheduler {
    backends: Arc<BackendRegistry>,
    submitted: Arc<SubmissionRegistry>,
    errors: ErrorSink,
}

impl DirectScheduler {
    pub fn new(
        backends: Arc<BackendRegistry>,
        submitted: Arc<SubmissionRegistry>,
        errors: ErrorSink,
    ) -> Self {
        Self {
            backends,
            submitted,
            errors,
        }
    }

    pub fn backends(&self) -> &Arc<BackendRegistry> {
        &self.backends
    }

    pub fn registry(&self) -> &Arc<SubmissionRegistry> {
        &self.submitted
    }

    pub fn errors(&self) -> &ErrorSink {
        &self.errors
    }

    /// Schedule `node` and everything it needs.
    ///
    /// Submitting a node that is already submitted, complete or cancelled
    /// does nothing.
    pub fn submit(&self, node: &DagNodePtr) {
        if node.is_submitted() {
            debug!(node = %node.id(), "node already submitted; ignoring");
            return;
        }
        if node.is_cancelled() {
            debug!(node = %node.id(), "node already cancelled; ignoring");
            return;
        }

        info!(
            node = %node.id(),
            op = %node.operation().describe(),
            requirements = node.requirements().len(),
            "submitting node"
        );

        match self.try_submit(node) {
            Ok(()) => self.submitted.register_submitted_ops(node),
            Err(err) => {
                self.errors.register_error(err);
                self.abort_submission(node);
            }
        }
    }

    /// Make sure `region` has a replica on `device` and return its pointer.
    ///
    /// Allocation failures are reported as [`ErrorKind::MemoryAllocation`];
    /// a failed allocation is not retried.
    pub fn ensure_allocation_exists(
        &self,
        region: &DataRegion,
        device: DeviceId,
    ) -> RtResult<DevicePtr> {
        if region.has_allocation(device) {
            return region.get_memory(device);
        }

        let allocator = self.backends.get_allocator(device)?;
        let bytes = region.byte_size();
        let ptr = allocator
            .allocate(ALLOCATION_ALIGNMENT, bytes)
            .map_err(|err| {
                ErrorInfo::new(
                    ErrorKind::MemoryAllocation,
                    format!(
                        "could not allocate {bytes} bytes for {} on {device}: {}",
                        region.id(),
                        err.message
                    ),
                )
            })?;

        debug!(region = %region.id(), %device, %ptr, bytes, "allocated replica");
        region.add_empty_allocation(device, ptr, bytes);
        Ok(ptr)
    }

    fn try_submit(&self, node: &DagNodePtr) -> RtResult<()> {
        let device = node.hints().bind_to_device.ok_or_else(|| {
            ErrorInfo::usage(format!(
                "{} ({}) is not bound to a device",
                node.id(),
                node.operation().describe()
            ))
        })?;
        self.assign_devices_or_default(node, device);

        for req in node.requirements() {
            if req.is_submitted() {
                continue;
            }
            match req.operation() {
                Operation::Requirement(requirement) => self.submit_requirement(req, requirement)?,
                Operation::Kernel(_) | Operation::Copy(_) => {
                    return Err(ErrorInfo::usage(format!(
                        "{} depends on {} which has not been submitted; \
                         unsubmitted independent predecessors are not supported",
                        node.id(),
                        req.id()
                    )));
                }
            }
        }

        match node.operation() {
            Operation::Requirement(requirement) => self.submit_requirement(node, requirement),
            op => {
                let executor = self.select_executor(device, op)?;
                self.dispatch(node, op, executor)
            }
        }
    }

    /// Give `node` its bound device, and every pending requirement without a
    /// binding of its own the same one.
    fn assign_devices_or_default(&self, node: &DagNodePtr, device: DeviceId) {
        node.assign_to_device(device);
        for req in node.requirements() {
            if req.is_submitted() || !req.operation().is_requirement() {
                continue;
            }
            let target = req.hints().bind_to_device.unwrap_or(device);
            trace!(node = %node.id(), requirement = %req.id(), device = %target, "assigning requirement");
            req.assign_to_device(target);
        }
    }

    /// Make the data `requirement` describes available on the device of `req`.
    fn submit_requirement(
        &self,
        req: &DagNodePtr,
        requirement: &MemoryRequirement,
    ) -> RtResult<()> {
        if req.is_cancelled() {
            return Err(ErrorInfo::usage(format!(
                "requirement {} was cancelled by an earlier failed submission",
                req.id()
            )));
        }
        let device = req
            .assigned_device()
            .or(req.hints().bind_to_device)
            .ok_or_else(|| {
                ErrorInfo::usage(format!("requirement {} is not bound to a device", req.id()))
            })?;
        req.assign_to_device(device);

        if let Some(pred) = req.requirements().iter().find(|p| !p.is_submitted()) {
            return Err(ErrorInfo::usage(format!(
                "requirement {} depends on {} which has not been submitted",
                req.id(),
                pred.id()
            )));
        }

        let region = requirement.region();
        let rect = requirement.access_rect();
        let mode = requirement.access_mode();

        let ptr = self.ensure_allocation_exists(region, device)?;
        requirement.bind_device_data(ptr);

        let mut copies = 0usize;
        if !mode.is_discard() {
            let mut pending: VecDeque<Rect> = region.get_outdated_regions(device, &rect).into();
            while let Some(piece) = pending.pop_front() {
                let candidates = region.get_update_source_candidates(device, &piece);
                let Some(&(source, covered)) = candidates.first() else {
                    return Err(ErrorInfo::new(
                        ErrorKind::DataSource,
                        format!(
                            "no device holds valid data for {piece} of {} needed by {} on {device}",
                            region.id(),
                            req.id()
                        ),
                    ));
                };

                self.issue_copy(req, region, source, device, &covered)?;
                copies += 1;
                pending.extend(difference(&piece, &[covered]));
            }
        }

        if mode.is_read_only() {
            region.mark_range_valid(device, &rect);
        } else {
            region.mark_range_current(device, &rect);
        }

        if copies == 0 {
            req.mark_virtually_submitted();
        }
        self.submitted.register_submitted_ops(req);

        debug!(
            requirement = %req.id(),
            region = %region.id(),
            %device,
            %mode,
            %rect,
            copies,
            "requirement resolved"
        );
        Ok(())
    }

    /// Copy `rect` of `region` from `source` to `dest` on behalf of `req`.
    fn issue_copy(
        &self,
        req: &DagNodePtr,
        region: &DataRegion,
        source: DeviceId,
        dest: DeviceId,
        rect: &Rect,
    ) -> RtResult<()> {
        let location = |device: DeviceId| -> RtResult<MemoryLocation> {
            Ok(MemoryLocation {
                device,
                ptr: region.get_memory(device)?,
                offset: rect.offset,
                extent: region.get_num_elements(),
                element_size: region.get_element_size(),
            })
        };
        let op = Operation::Copy(CopyOperation {
            source: location(source)?,
            dest: location(dest)?,
            range: rect.range,
        });

        debug!(requirement = %req.id(), from = %source, to = %dest, %rect, "issuing update copy");
        let executor = self.select_executor(dest, &op)?;
        self.dispatch(req, &op, executor)
    }

    /// Preferred backend of the operation if it names one, else the backend
    /// of the device.
    fn select_executor(
        &self,
        device: DeviceId,
        op: &Operation,
    ) -> RtResult<Arc<dyn BackendExecutor>> {
        let backend = op.preferred_backend().unwrap_or(device.backend);
        self.backends.get_executor(backend, device)
    }

    fn dispatch(
        &self,
        node: &DagNodePtr,
        op: &Operation,
        executor: Arc<dyn BackendExecutor>,
    ) -> RtResult<()> {
        let mut predecessors: Vec<DagNodePtr> = Vec::new();
        node.for_each_nonvirtual_requirement(|req| {
            if !req.is_complete() {
                predecessors.push(DagNodePtr::clone(req));
            }
        });
        predecessors.sort_by_key(|p| p.id());
        predecessors.dedup_by_key(|p| p.id());

        trace!(
            node = %node.id(),
            predecessors = ?predecessors.iter().map(|p| p.id()).collect::<Vec<_>>(),
            "dispatching"
        );

        node.assign_to_executor(Arc::clone(&executor));
        executor.submit_directly(node, op, &predecessors)
    }

    fn abort_submission(&self, node: &DagNodePtr) {
        for req in node.requirements() {
            if !req.is_submitted() {
                req.cancel();
            }
        }
        node.cancel();
        info!(node = %node.id(), "submission aborted");
    }
}
