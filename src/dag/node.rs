// src/dag/node.rs

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::dag::event::Event;
use crate::dag::operation::Operation;
use crate::exec::BackendExecutor;
use crate::types::DeviceId;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique node identity; later nodes have larger ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Nodes are shared between the builder, the nodes that require them, the
/// submission registry and in-flight queue items.
pub type DagNodePtr = Arc<DagNode>;

/// Hints attached by the graph builder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionHints {
    pub bind_to_device: Option<DeviceId>,
}

impl ExecutionHints {
    pub fn bound_to(device: DeviceId) -> Self {
        Self {
            bind_to_device: Some(device),
        }
    }
}

/// Lifecycle of a node.
///
/// `Created -> Assigned -> Submitted -> Complete | Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Built, not yet looked at by the scheduler.
    Created,
    /// A device has been chosen.
    Assigned,
    /// Handed to an executor (or virtually submitted).
    Submitted,
    /// The completion event has fired.
    Complete,
    /// Never reached an executor because its submission was aborted.
    Cancelled,
}

struct NodeStatus {
    state: NodeState,
    device: Option<DeviceId>,
    executor: Option<Arc<dyn BackendExecutor>>,
    event: Option<Event>,
    is_virtual: bool,
}

/// One unit of work plus its incoming edges.
///
/// Edges are fixed at construction and may only point at nodes that already
/// exist, so a graph built through this API cannot contain cycles. The
/// scheduler relies on that and does not check for them.
pub struct DagNode {
    id: NodeId,
    operation: Operation,
    requirements: Vec<DagNodePtr>,
    hints: ExecutionHints,
    status: Mutex<NodeStatus>,
}

impl fmt::Debug for DagNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.lock();
        f.debug_struct("DagNode")
            .field("id", &self.id)
            .field("operation", &self.operation.describe())
            .field(
                "requirements",
                &self.requirements.iter().map(|r| r.id).collect::<Vec<_>>(),
            )
            .field("hints", &self.hints)
            .field("state", &status.state)
            .field("device", &status.device)
            .field("is_virtual", &status.is_virtual)
            .finish()
    }
}

impl DagNode {
    pub fn new(
        operation: impl Into<Operation>,
        requirements: Vec<DagNodePtr>,
        hints: ExecutionHints,
    ) -> DagNodePtr {
        Arc::new(Self {
            id: NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)),
            operation: operation.into(),
            requirements,
            hints,
            status: Mutex::new(NodeStatus {
                state: NodeState::Created,
                device: None,
                executor: None,
                event: None,
                is_virtual: false,
            }),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn requirements(&self) -> &[DagNodePtr] {
        &self.requirements
    }

    pub fn hints(&self) -> &ExecutionHints {
        &self.hints
    }

    /// Current state. A submitted node whose event has fired reports `Complete`.
    pub fn state(&self) -> NodeState {
        let mut status = self.lock();
        if status.state == NodeState::Submitted
            && status.event.as_ref().is_some_and(Event::is_complete)
        {
            status.state = NodeState::Complete;
        }
        status.state
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self.state(), NodeState::Submitted | NodeState::Complete)
    }

    pub fn is_complete(&self) -> bool {
        self.state() == NodeState::Complete
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == NodeState::Cancelled
    }

    /// Whether the node was submitted without any device work.
    pub fn is_virtual(&self) -> bool {
        self.lock().is_virtual
    }

    pub fn assigned_device(&self) -> Option<DeviceId> {
        self.lock().device
    }

    /// Record the device this node runs on.
    ///
    /// Ignored once the node has been submitted or cancelled.
    pub fn assign_to_device(&self, device: DeviceId) {
        let mut status = self.lock();
        match status.state {
            NodeState::Created | NodeState::Assigned => {
                status.device = Some(device);
                status.state = NodeState::Assigned;
            }
            NodeState::Submitted | NodeState::Complete | NodeState::Cancelled => {}
        }
    }

    pub fn assigned_executor(&self) -> Option<Arc<dyn BackendExecutor>> {
        self.lock().executor.clone()
    }

    pub fn assign_to_executor(&self, executor: Arc<dyn BackendExecutor>) {
        self.lock().executor = Some(executor);
    }

    pub fn event(&self) -> Option<Event> {
        self.lock().event.clone()
    }

    /// Attach the completion event of an operation issued on behalf of this
    /// node.
    ///
    /// A node may be issued several operations (a requirement needing more
    /// than one copy); it completes once all of them have. Has no effect on a
    /// cancelled node.
    pub fn mark_submitted(&self, event: Event) {
        let mut status = self.lock();
        if status.state == NodeState::Cancelled {
            return;
        }
        status.event = Some(match status.event.take() {
            Some(existing) => existing.and(event),
            None => event,
        });
        status.state = NodeState::Submitted;
    }

    /// Submit without issuing device work: the node is immediately complete.
    ///
    /// No-op if the node already carries an event or was cancelled.
    pub fn mark_virtually_submitted(&self) {
        let mut status = self.lock();
        if status.state == NodeState::Cancelled || status.event.is_some() {
            return;
        }
        status.event = Some(Event::Ready);
        status.is_virtual = true;
        status.state = NodeState::Submitted;
        debug!(node = %self.id, "virtually submitted");
    }

    /// Cancel a node that has not reached an executor.
    ///
    /// Returns `false` (and changes nothing) if the node was already
    /// submitted, complete or cancelled.
    pub fn cancel(&self) -> bool {
        let mut status = self.lock();
        match status.state {
            NodeState::Created | NodeState::Assigned => {
                status.state = NodeState::Cancelled;
                debug!(node = %self.id, "cancelled");
                true
            }
            NodeState::Submitted | NodeState::Complete | NodeState::Cancelled => false,
        }
    }

    /// Visit the requirements that carry real device work.
    ///
    /// A virtual requirement did nothing itself, so it stands in for its own
    /// requirements, which are visited instead (recursively).
    pub fn for_each_nonvirtual_requirement(&self, mut f: impl FnMut(&DagNodePtr)) {
        let mut seen = HashSet::new();
        let mut stack: Vec<&DagNodePtr> = self.requirements.iter().rev().collect();

        while let Some(req) = stack.pop() {
            if !seen.insert(req.id) {
                continue;
            }
            if req.is_virtual() {
                stack.extend(req.requirements.iter().rev());
            } else {
                f(req);
            }
        }
    }

    /// Wait for the node's event; returns immediately if it has none.
    pub async fn wait(&self) {
        let event = self.event();
        if let Some(event) = event {
            event.wait().await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, NodeStatus> {
        self.status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
