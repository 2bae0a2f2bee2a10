// src/dag/mod.rs

//! Execution DAG and its scheduling.
//!
//! - [`operation`] is the closed set of work a node can carry.
//! - [`node`] holds one operation, its requirement edges and lifecycle.
//! - [`event`] provides the completion events backends attach to nodes.
//! - [`scheduler`] resolves requirements and dispatches nodes to executors.
//! - [`registry`] remembers submitted nodes so callers can wait on them.

pub mod event;
pub mod node;
pub mod operation;
pub mod registry;
pub mod scheduler;

pub use event::{Completion, Event};
pub use node::{DagNode, DagNodePtr, ExecutionHints, NodeId, NodeState};
pub use operation::{
    CopyOperation, Kernel, KernelArg, KernelFn, KernelLaunch, MemoryLocation, MemoryRequirement,
    Operation,
};
pub use registry::SubmissionRegistry;
pub use scheduler::{DirectScheduler, ALLOCATION_ALIGNMENT};
