// src/workload/mod.rs

//! Running a workload file end to end on the host backend.
//!
//! - [`builder`] creates data regions and DAG nodes from a [`Workload`].
//! - [`kernels`] holds the built-in host kernels.

pub mod builder;
pub mod kernels;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::{BufferSpec, Workload};
use crate::engine::{ErrorInfo, ErrorSink, Runtime};
use crate::exec::{Backend, BackendRegistry, HostBackend, HostBackendConfig};
use crate::region::DataRegionPtr;
use crate::types::DeviceId;

pub use builder::{build_graph, create_regions, WorkloadGraph};
pub use kernels::{decode_element, encode_element, kernel_for};

/// Digest of one valid replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaDigest {
    pub device: DeviceId,
    /// blake3 hex digest of the replica's bytes.
    pub digest: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferReport {
    pub name: String,
    /// Replicas holding valid data for the whole buffer, by device.
    pub replicas: Vec<ReplicaDigest>,
}

impl BufferReport {
    /// Whether every valid replica holds the same bytes.
    pub fn is_coherent(&self) -> bool {
        self.replicas.windows(2).all(|w| w[0].digest == w[1].digest)
    }
}

/// Outcome of [`run_workload`].
#[derive(Debug, Clone)]
pub struct WorkloadReport {
    pub buffers: Vec<BufferReport>,
    /// Tasks whose kernel node was cancelled.
    pub cancelled: Vec<String>,
    pub errors: Vec<ErrorInfo>,
}

impl WorkloadReport {
    pub fn buffer(&self, name: &str) -> Option<&BufferReport> {
        self.buffers.iter().find(|b| b.name == name)
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.cancelled.is_empty()
    }
}

impl fmt::Display for WorkloadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "buffers ({}):", self.buffers.len())?;
        for buffer in &self.buffers {
            writeln!(f, "  - {}", buffer.name)?;
            if buffer.replicas.is_empty() {
                writeln!(f, "      (no valid replica)")?;
            }
            for replica in &buffer.replicas {
                writeln!(f, "      {}: {}", replica.device, replica.digest)?;
            }
        }
        if !self.cancelled.is_empty() {
            writeln!(f, "cancelled tasks: {:?}", self.cancelled)?;
        }
        if !self.errors.is_empty() {
            writeln!(f, "errors ({}):", self.errors.len())?;
            for err in &self.errors {
                writeln!(f, "  - {err}")?;
            }
        }
        Ok(())
    }
}

/// Execute `workload` on a fresh host backend and report the final state of
/// every buffer.
///
/// Must be called from within a Tokio runtime.
pub async fn run_workload(workload: &Workload) -> Result<WorkloadReport> {
    let errors = ErrorSink::with_capacity(workload.runtime.max_errors);
    let host = Arc::new(HostBackend::new(
        HostBackendConfig {
            devices: workload.host.devices,
            memory_limit: workload.host.memory_limit,
        },
        errors.clone(),
    )?);
    let backend: Arc<dyn Backend> = Arc::clone(&host) as Arc<dyn Backend>;
    let runtime = Runtime::new(BackendRegistry::new().with_backend(backend), errors);

    let regions = create_regions(workload);
    for spec in workload.buffers.values() {
        if let Some(region) = regions.get(&spec.name) {
            initialise_buffer(&runtime, &host, spec, region)?;
        }
    }

    let graph = build_graph(workload, &regions);
    info!(tasks = graph.nodes.len(), buffers = regions.len(), "submitting workload");
    for node in &graph.nodes {
        runtime.submit(node);
    }
    runtime.wait().await;

    let cancelled = graph
        .tasks
        .iter()
        .filter(|(_, node)| node.is_cancelled())
        .map(|(name, _)| name.clone())
        .collect();

    let buffers = regions
        .iter()
        .map(|(name, region)| buffer_report(&host, name, region))
        .collect::<Result<Vec<_>>>()?;

    for region in regions.values() {
        runtime.release_region(region);
    }

    Ok(WorkloadReport {
        buffers,
        cancelled,
        errors: runtime.errors().take_errors(),
    })
}

fn initialise_buffer(
    runtime: &Runtime,
    host: &HostBackend,
    spec: &BufferSpec,
    region: &DataRegionPtr,
) -> Result<()> {
    let Some(init) = spec.init else {
        return Ok(());
    };
    let ptr = runtime
        .allocate(region, init.device)
        .with_context(|| format!("allocating initial replica of buffer '{}'", spec.name))?;

    let element = encode_element(init.value, spec.element_size);
    let bytes = element.repeat(region.byte_size() / spec.element_size.max(1));
    host.memory()
        .write(ptr, &bytes)
        .with_context(|| format!("writing initial contents of buffer '{}'", spec.name))?;
    region.mark_range_current(init.device, &region.whole());

    debug!(buffer = %spec.name, device = %init.device, value = init.value, "buffer initialised");
    Ok(())
}

fn buffer_report(host: &HostBackend, name: &str, region: &DataRegionPtr) -> Result<BufferReport> {
    let replicas = region
        .valid_devices(&region.whole())
        .into_iter()
        .map(|device| {
            let ptr = region.get_memory(device)?;
            let bytes = host.memory().read(ptr)?;
            Ok(ReplicaDigest {
                device,
                digest: blake3::hash(&bytes).to_hex().to_string(),
                bytes,
            })
        })
        .collect::<std::result::Result<Vec<_>, ErrorInfo>>()
        .with_context(|| format!("reading replicas of buffer '{name}'"))?;

    Ok(BufferReport {
        name: name.to_string(),
        replicas,
    })
}

/// Per-buffer summary used by `--dry-run`.
pub fn describe(workload: &Workload) -> BTreeMap<&str, String> {
    workload
        .buffers
        .values()
        .map(|b| {
            let init = match b.init {
                Some(init) => format!(", init {} on {}", init.value, init.device),
                None => String::new(),
            };
            (
                b.name.as_str(),
                format!("{} x {} bytes{init}", format_extent(&b.extent[..b.dims]), b.element_size),
            )
        })
        .collect()
}

fn format_extent(extent: &[usize]) -> String {
    extent
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("x")
}
