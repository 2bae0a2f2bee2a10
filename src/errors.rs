// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Scheduling failures never travel through these types: they are reported
//! to the [`ErrorSink`](crate::engine::ErrorSink) as
//! [`ErrorInfo`](crate::engine::ErrorInfo) values. `HetschedError` covers the
//! surrounding plumbing (workload files, CLI).

use thiserror::Error;

use crate::engine::ErrorInfo;

#[derive(Error, Debug)]
pub enum HetschedError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Runtime error: {0}")]
    Runtime(#[from] ErrorInfo),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, HetschedError>;
