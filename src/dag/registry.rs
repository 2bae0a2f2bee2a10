// src/dag/registry.rs

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, trace};

use crate::dag::node::{DagNodePtr, NodeId};

/// Record of every node that went through a successful submission.
///
/// Used by blocking waits over "everything submitted so far". Inserts come
/// from the scheduler and may happen concurrently.
#[derive(Debug, Default)]
pub struct SubmissionRegistry {
    nodes: Mutex<HashMap<NodeId, DagNodePtr>>,
}

impl SubmissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_submitted_ops(&self, node: &DagNodePtr) {
        trace!(node = %node.id(), "registering submitted node");
        self.lock().insert(node.id(), DagNodePtr::clone(node));
    }

    /// Whether `node` has been registered (and not purged since).
    pub fn is_submitted(&self, node: NodeId) -> bool {
        self.lock().contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Registered nodes whose work has not completed yet.
    pub fn pending(&self) -> Vec<DagNodePtr> {
        let mut nodes: Vec<_> = self
            .lock()
            .values()
            .filter(|n| !n.is_complete())
            .cloned()
            .collect();
        nodes.sort_by_key(|n| n.id());
        nodes
    }

    /// Drop nodes that have completed. Returns how many were removed.
    pub fn purge_completed(&self) -> usize {
        let mut nodes = self.lock();
        let before = nodes.len();
        nodes.retain(|_, n| !n.is_complete());
        let removed = before - nodes.len();
        if removed > 0 {
            debug!(removed, remaining = nodes.len(), "purged completed nodes");
        }
        removed
    }

    /// Wait until every node registered so far (and any registered while
    /// waiting) has completed.
    pub async fn wait_all(&self) {
        loop {
            let pending = self.pending();
            if pending.is_empty() {
                return;
            }
            for node in pending {
                node.wait().await;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<NodeId, DagNodePtr>> {
        self.nodes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
