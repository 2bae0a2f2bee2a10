// src/exec/mod.rs

//! Device execution layer.
//!
//! - [`backend`] defines the traits the scheduler dispatches through
//!   (`Backend`, `BackendExecutor`, `BackendAllocator`, `HardwareManager`)
//!   and the `BackendRegistry` that maps backend ids to implementations.
//! - [`host`] is the backend shipped with the crate: simulated devices
//!   backed by host memory, one in-order queue task per device. Tests can
//!   register a recording fake instead.

pub mod backend;
pub mod host;

pub use backend::{
    Backend, BackendAllocator, BackendExecutor, BackendRegistry, DeviceKind, DeviceProperties,
    HardwareManager,
};
pub use host::{HostBackend, HostBackendConfig};
