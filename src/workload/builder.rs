// src/workload/builder.rs

//! Turn a validated [`Workload`] into DAG nodes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::config::{TaskSpec, Workload};
use crate::dag::{
    DagNode, DagNodePtr, ExecutionHints, KernelArg, KernelLaunch, MemoryRequirement,
};
use crate::region::{DataRegion, DataRegionPtr};
use crate::workload::kernels::kernel_for;

/// Nodes built for one workload.
#[derive(Debug, Default)]
pub struct WorkloadGraph {
    /// Kernel nodes in the order they must be submitted.
    pub nodes: Vec<DagNodePtr>,
    /// Kernel node of each task.
    pub tasks: BTreeMap<String, DagNodePtr>,
    /// Requirement nodes of each task, in access order.
    pub requirements: BTreeMap<String, Vec<DagNodePtr>>,
}

impl WorkloadGraph {
    pub fn task(&self, name: &str) -> Option<&DagNodePtr> {
        self.tasks.get(name)
    }
}

/// One data region per declared buffer.
pub fn create_regions(workload: &Workload) -> BTreeMap<String, DataRegionPtr> {
    workload
        .buffers
        .values()
        .map(|b| {
            let region = Arc::new(DataRegion::named(&b.name, b.extent, b.element_size));
            debug!(buffer = %b.name, region = %region.id(), extent = ?b.extent, "created region");
            (b.name.clone(), region)
        })
        .collect()
}

/// Build one kernel node per task plus one requirement node per access.
///
/// A requirement depends on the kernel node that last touched the same
/// buffer, which orders conflicting accesses (and makes the copies issued
/// for it wait for that kernel). Explicit `after` edges are attached to the
/// task's first requirement, or to the kernel itself if it has no accesses.
pub fn build_graph(workload: &Workload, regions: &BTreeMap<String, DataRegionPtr>) -> WorkloadGraph {
    let mut graph = WorkloadGraph::default();
    let mut last_user: HashMap<&str, DagNodePtr> = HashMap::new();

    for task in &workload.tasks {
        let mut after: Vec<DagNodePtr> = task
            .after
            .iter()
            .filter_map(|name| graph.tasks.get(name).cloned())
            .collect();

        let mut requirements = Vec::with_capacity(task.accesses.len());
        for access in &task.accesses {
            let Some(region) = regions.get(&access.buffer) else {
                continue;
            };
            let mut edges: Vec<DagNodePtr> = std::mem::take(&mut after);
            if let Some(prev) = last_user.get(access.buffer.as_str()) {
                if !edges.iter().any(|e| e.id() == prev.id()) {
                    edges.push(DagNodePtr::clone(prev));
                }
            }
            let req = DagNode::new(
                MemoryRequirement::new(Arc::clone(region), access.mode, access.rect),
                edges,
                ExecutionHints::default(),
            );
            requirements.push(req);
        }

        let kernel = build_kernel_node(task, &requirements, after);
        for access in &task.accesses {
            last_user.insert(access.buffer.as_str(), DagNodePtr::clone(&kernel));
        }

        debug!(
            task = %task.name,
            node = %kernel.id(),
            device = %task.device,
            requirements = requirements.len(),
            "built task node"
        );
        graph.nodes.push(DagNodePtr::clone(&kernel));
        graph.tasks.insert(task.name.clone(), kernel);
        graph.requirements.insert(task.name.clone(), requirements);
    }

    graph
}

fn build_kernel_node(
    task: &TaskSpec,
    requirements: &[DagNodePtr],
    after: Vec<DagNodePtr>,
) -> DagNodePtr {
    let mut args = vec![KernelArg::Scalar(task.value)];
    args.extend(
        requirements
            .iter()
            .map(|r| KernelArg::Accessor(DagNodePtr::clone(r))),
    );

    let mut edges: Vec<DagNodePtr> = requirements.to_vec();
    edges.extend(after);

    DagNode::new(
        KernelLaunch::new(kernel_for(task.kernel), args),
        edges,
        ExecutionHints::bound_to(task.device),
    )
}
