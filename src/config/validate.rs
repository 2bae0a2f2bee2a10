// src/config/validate.rs

use std::collections::{BTreeMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::model::{
    AccessConfig, AccessSpec, BufferConfig, BufferInit, BufferSpec, KernelKind, RawWorkload,
    TaskConfig, TaskSpec, Workload,
};
use crate::errors::{HetschedError, Result};
use crate::region::rect::{id3, range3};
use crate::region::Rect;
use crate::types::{BackendId, DeviceId};

/// `backend` or `backend:index`.
const DEVICE_SELECTOR: &str = r"^(host|cpu|cuda|hip|ze|level_zero|levelzero)(?::(\d+))?$";

/// Largest element size the built-in kernels understand.
const MAX_ELEMENT_SIZE: usize = 8;

impl TryFrom<RawWorkload> for Workload {
    type Error = HetschedError;

    fn try_from(raw: RawWorkload) -> std::result::Result<Self, Self::Error> {
        validate_workload(raw)
    }
}

fn config_error(msg: impl Into<String>) -> HetschedError {
    HetschedError::ConfigError(msg.into())
}

fn validate_workload(raw: RawWorkload) -> Result<Workload> {
    ensure_has_tasks(&raw)?;
    validate_host(&raw)?;

    let selector = Regex::new(DEVICE_SELECTOR)
        .map_err(|e| config_error(format!("invalid device selector pattern: {e}")))?;

    let mut buffers = BTreeMap::new();
    for (name, buffer) in &raw.buffer {
        let spec = validate_buffer(name, buffer, &selector, raw.host.devices)?;
        buffers.insert(name.clone(), spec);
    }

    ensure_unique_task_names(&raw)?;
    validate_task_dependencies(&raw)?;
    let order = validate_dag(&raw)?;

    let mut tasks = Vec::with_capacity(raw.task.len());
    for index in order {
        let task = &raw.task[index];
        tasks.push(validate_task(task, &buffers, &selector, raw.host.devices)?);
    }

    Ok(Workload::new_unchecked(raw.runtime, raw.host, buffers, tasks))
}

fn ensure_has_tasks(raw: &RawWorkload) -> Result<()> {
    if raw.task.is_empty() {
        return Err(config_error(
            "workload must contain at least one [[task]] entry",
        ));
    }
    Ok(())
}

fn validate_host(raw: &RawWorkload) -> Result<()> {
    if raw.host.devices == 0 {
        return Err(config_error("[host].devices must be >= 1 (got 0)"));
    }
    if raw.runtime.max_errors == 0 {
        return Err(config_error("[runtime].max_errors must be >= 1 (got 0)"));
    }
    Ok(())
}

fn parse_device(selector: &Regex, text: &str, host_devices: usize, what: &str) -> Result<DeviceId> {
    let caps = selector.captures(text.trim()).ok_or_else(|| {
        config_error(format!(
            "{what}: invalid device selector '{text}' (expected e.g. \"host:0\")"
        ))
    })?;
    let backend: BackendId = caps[1]
        .parse()
        .map_err(|e: String| config_error(format!("{what}: {e}")))?;
    let index = match caps.get(2) {
        Some(m) => m
            .as_str()
            .parse::<usize>()
            .map_err(|_| config_error(format!("{what}: device index out of range in '{text}'")))?,
        None => 0,
    };

    if backend == BackendId::Host && index >= host_devices {
        return Err(config_error(format!(
            "{what}: device '{text}' does not exist ([host].devices = {host_devices})"
        )));
    }
    Ok(DeviceId::new(backend, index))
}

fn validate_buffer(
    name: &str,
    buffer: &BufferConfig,
    selector: &Regex,
    host_devices: usize,
) -> Result<BufferSpec> {
    if buffer.element_size == 0 || buffer.element_size > MAX_ELEMENT_SIZE {
        return Err(config_error(format!(
            "buffer '{name}': element_size must be between 1 and {MAX_ELEMENT_SIZE} (got {})",
            buffer.element_size
        )));
    }
    let extent = range3(&buffer.extent).ok_or_else(|| {
        config_error(format!(
            "buffer '{name}': extent must have 1 to 3 dimensions (got {})",
            buffer.extent.len()
        ))
    })?;
    if extent.contains(&0) {
        return Err(config_error(format!(
            "buffer '{name}': extent {:?} has a zero-sized dimension",
            buffer.extent
        )));
    }
    extent
        .iter()
        .try_fold(buffer.element_size, |bytes, &dim| bytes.checked_mul(dim))
        .ok_or_else(|| {
            config_error(format!(
                "buffer '{name}': extent {:?} of {}-byte elements overflows the addressable size",
                buffer.extent, buffer.element_size
            ))
        })?;

    let init = match &buffer.init_device {
        Some(text) => {
            let what = format!("buffer '{name}' init_device");
            let device = parse_device(selector, text, host_devices, &what)?;
            if device.backend != BackendId::Host {
                return Err(config_error(format!(
                    "{what}: only host devices can hold initial data (got '{text}')"
                )));
            }
            Some(BufferInit {
                device,
                value: buffer.init_value,
            })
        }
        None => None,
    };

    Ok(BufferSpec {
        name: name.to_string(),
        element_size: buffer.element_size,
        dims: buffer.extent.len(),
        extent,
        init,
    })
}

fn ensure_unique_task_names(raw: &RawWorkload) -> Result<()> {
    let mut seen = HashSet::new();
    for task in &raw.task {
        if !seen.insert(task.name.as_str()) {
            return Err(config_error(format!("task '{}' is defined twice", task.name)));
        }
    }
    Ok(())
}

fn validate_task_dependencies(raw: &RawWorkload) -> Result<()> {
    let names: HashSet<&str> = raw.task.iter().map(|t| t.name.as_str()).collect();
    for task in &raw.task {
        for dep in &task.after {
            if dep == &task.name {
                return Err(config_error(format!(
                    "task '{}' cannot depend on itself in `after`",
                    task.name
                )));
            }
            if !names.contains(dep.as_str()) {
                return Err(config_error(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    task.name, dep
                )));
            }
        }
    }
    Ok(())
}

/// Check `after` for cycles and return task indices in execution order.
///
/// Tasks not related through `after` keep their file order.
fn validate_dag(raw: &RawWorkload) -> Result<Vec<usize>> {
    // Edge direction: dependency -> dependent.
    let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
    let index_of: BTreeMap<&str, usize> = raw
        .task
        .iter()
        .enumerate()
        .map(|(i, t)| (t.name.as_str(), i))
        .collect();

    for i in 0..raw.task.len() {
        graph.add_node(i);
    }
    for (i, task) in raw.task.iter().enumerate() {
        for dep in &task.after {
            if let Some(&d) = index_of.get(dep.as_str()) {
                graph.add_edge(d, i, ());
            }
        }
    }

    toposort(&graph, None).map_err(|cycle| {
        HetschedError::DagCycle(format!(
            "cycle detected in task DAG involving task '{}'",
            raw.task[cycle.node_id()].name
        ))
    })?;

    // Stable order: repeatedly take the first task (in file order) whose
    // dependencies have all been placed.
    let mut placed = vec![false; raw.task.len()];
    let mut order = Vec::with_capacity(raw.task.len());
    while order.len() < raw.task.len() {
        let next = (0..raw.task.len()).find(|&i| {
            !placed[i]
                && graph
                    .neighbors_directed(i, petgraph::Direction::Incoming)
                    .all(|d| placed[d])
        });
        match next {
            Some(i) => {
                placed[i] = true;
                order.push(i);
            }
            None => {
                return Err(HetschedError::DagCycle(
                    "cycle detected in task DAG".to_string(),
                ));
            }
        }
    }
    Ok(order)
}

fn validate_task(
    task: &TaskConfig,
    buffers: &BTreeMap<String, BufferSpec>,
    selector: &Regex,
    host_devices: usize,
) -> Result<TaskSpec> {
    let what = format!("task '{}'", task.name);
    let device = parse_device(selector, &task.device, host_devices, &what)?;
    let kernel = KernelKind::parse(&task.kernel).ok_or_else(|| {
        config_error(format!(
            "{what}: unknown kernel '{}' (expected \"fill\" or \"increment\")",
            task.kernel
        ))
    })?;

    let accesses = task
        .access
        .iter()
        .map(|access| validate_access(&what, access, buffers))
        .collect::<Result<Vec<_>>>()?;

    Ok(TaskSpec {
        name: task.name.clone(),
        device,
        kernel,
        value: task.value,
        after: task.after.clone(),
        accesses,
    })
}

fn validate_access(
    what: &str,
    access: &AccessConfig,
    buffers: &BTreeMap<String, BufferSpec>,
) -> Result<AccessSpec> {
    let buffer = buffers.get(&access.buffer).ok_or_else(|| {
        config_error(format!("{what}: unknown buffer '{}'", access.buffer))
    })?;
    let dims = buffer.dims;

    let offset = match &access.offset {
        Some(offset) => {
            if offset.len() != dims {
                return Err(config_error(format!(
                    "{what}: offset {offset:?} for buffer '{}' must have {dims} dimension(s)",
                    access.buffer
                )));
            }
            id3(offset).ok_or_else(|| config_error(format!("{what}: invalid offset {offset:?}")))?
        }
        None => [0; 3],
    };

    let range = match &access.range {
        Some(range) => {
            if range.len() != dims {
                return Err(config_error(format!(
                    "{what}: range {range:?} for buffer '{}' must have {dims} dimension(s)",
                    access.buffer
                )));
            }
            range3(range).ok_or_else(|| config_error(format!("{what}: invalid range {range:?}")))?
        }
        None => {
            let mut rest = buffer.extent;
            for axis in 0..3 {
                rest[axis] = rest[axis].saturating_sub(offset[axis]);
            }
            rest
        }
    };

    let rect = Rect::new(offset, range);
    if !rect.fits_in(&buffer.extent) {
        return Err(config_error(format!(
            "{what}: access at offset {:?} with range {:?} lies outside buffer '{}' (extent {:?})",
            &offset[..dims],
            &range[..dims],
            access.buffer,
            &buffer.extent[..dims]
        )));
    }
    if rect.is_empty() {
        return Err(config_error(format!(
            "{what}: access to buffer '{}' is empty ({rect})",
            access.buffer
        )));
    }

    Ok(AccessSpec {
        buffer: access.buffer.clone(),
        mode: access.mode,
        rect,
    })
}
