// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::engine::DEFAULT_MAX_ERRORS;
use crate::region::{Range3, Rect};
use crate::types::{AccessMode, DeviceId};

/// Workload file as read from TOML, before validation.
///
/// ```toml
/// [runtime]
/// max_errors = 256
///
/// [host]
/// devices = 2
/// memory_limit = 1048576
///
/// [buffer.a]
/// element_size = 4
/// extent = [100]
/// init_device = "host:0"
/// init_value = 1
///
/// [[task]]
/// name = "bump"
/// device = "host:1"
/// kernel = "increment"
/// value = 2
/// access = [{ buffer = "a", mode = "read_write", offset = [0], range = [50] }]
/// ```
///
/// Every section is optional except that validation requires at least one
/// task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawWorkload {
    #[serde(default)]
    pub runtime: RuntimeSection,

    #[serde(default)]
    pub host: HostSection,

    /// Buffers keyed by name.
    #[serde(default)]
    pub buffer: BTreeMap<String, BufferConfig>,

    /// Tasks in file order.
    #[serde(default)]
    pub task: Vec<TaskConfig>,
}

/// `[runtime]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSection {
    /// Errors kept by the error sink before the oldest are dropped.
    #[serde(default = "default_max_errors")]
    pub max_errors: usize,
}

fn default_max_errors() -> usize {
    DEFAULT_MAX_ERRORS
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            max_errors: default_max_errors(),
        }
    }
}

/// `[host]` section: the simulated host devices.
#[derive(Debug, Clone, Deserialize)]
pub struct HostSection {
    #[serde(default = "default_host_devices")]
    pub devices: usize,

    /// Bytes per device; unlimited when absent.
    #[serde(default)]
    pub memory_limit: Option<usize>,
}

fn default_host_devices() -> usize {
    2
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            devices: default_host_devices(),
            memory_limit: None,
        }
    }
}

/// `[buffer.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BufferConfig {
    /// Bytes per element, 1 to 8 (elements are little-endian integers).
    pub element_size: usize,

    /// One to three dimensions, outermost first.
    pub extent: Vec<usize>,

    /// Device holding the initial contents. Without it the buffer has no
    /// valid data until a task writes it.
    #[serde(default)]
    pub init_device: Option<String>,

    #[serde(default)]
    pub init_value: u64,
}

/// One `[[task]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub name: String,

    /// Device selector such as `"host:1"`.
    pub device: String,

    /// Name of a built-in kernel (`fill` or `increment`).
    pub kernel: String,

    /// Scalar argument handed to the kernel.
    #[serde(default)]
    pub value: u64,

    /// Tasks that must complete before this one starts, in addition to the
    /// ordering implied by shared buffers.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub access: Vec<AccessConfig>,
}

/// One buffer access of a task.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    pub buffer: String,

    #[serde(default)]
    pub mode: AccessMode,

    /// Defaults to the origin.
    #[serde(default)]
    pub offset: Option<Vec<usize>>,

    /// Defaults to the rest of the buffer from `offset`.
    #[serde(default)]
    pub range: Option<Vec<usize>>,
}

/// Built-in host kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelKind {
    /// Set every element of every writable access to `value`.
    Fill,
    /// Add `value` to every element of every writable access.
    Increment,
}

impl KernelKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "fill" => Some(KernelKind::Fill),
            "increment" => Some(KernelKind::Increment),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KernelKind::Fill => "fill",
            KernelKind::Increment => "increment",
        }
    }
}

/// A validated buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSpec {
    pub name: String,
    pub element_size: usize,
    /// Number of dimensions the buffer was declared with.
    pub dims: usize,
    pub extent: Range3,
    pub init: Option<BufferInit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInit {
    pub device: DeviceId,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessSpec {
    pub buffer: String,
    pub mode: AccessMode,
    pub rect: Rect,
}

/// A validated task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: String,
    pub device: DeviceId,
    pub kernel: KernelKind,
    pub value: u64,
    pub after: Vec<String>,
    pub accesses: Vec<AccessSpec>,
}

/// A validated workload.
///
/// Only constructed through `Workload::try_from(RawWorkload)`, so every
/// buffer reference resolves, every access lies inside its buffer and
/// `tasks` is ordered so that each task comes after everything it names in
/// `after`.
#[derive(Debug, Clone)]
pub struct Workload {
    pub runtime: RuntimeSection,
    pub host: HostSection,
    pub buffers: BTreeMap<String, BufferSpec>,
    pub tasks: Vec<TaskSpec>,
}

impl Workload {
    pub(crate) fn new_unchecked(
        runtime: RuntimeSection,
        host: HostSection,
        buffers: BTreeMap<String, BufferSpec>,
        tasks: Vec<TaskSpec>,
    ) -> Self {
        Self {
            runtime,
            host,
            buffers,
            tasks,
        }
    }

    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.name == name)
    }
}
