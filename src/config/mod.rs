// src/config/mod.rs

//! Workload files.
//!
//! - `model.rs`: the TOML-backed raw model and the validated `Workload`.
//! - `loader.rs`: reading a workload from disk.
//! - `validate.rs`: `RawWorkload -> Workload`, including the cycle check on
//!   `after`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, parse_and_validate};
pub use model::{
    AccessConfig, AccessSpec, BufferConfig, BufferInit, BufferSpec, HostSection, KernelKind,
    RawWorkload, RuntimeSection, TaskConfig, TaskSpec, Workload,
};
