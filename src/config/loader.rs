// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawWorkload, Workload};
use crate::errors::Result;

/// Read and deserialize a workload file without validating it.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkload> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let raw: RawWorkload = toml::from_str(&contents)?;
    debug!(path = %path.display(), tasks = raw.task.len(), buffers = raw.buffer.len(), "workload parsed");
    Ok(raw)
}

/// Parse a workload from a string and validate it.
pub fn parse_and_validate(contents: &str) -> Result<Workload> {
    let raw: RawWorkload = toml::from_str(contents)?;
    Workload::try_from(raw)
}

/// Load a workload file and validate it.
///
/// This is the entry point the binary uses. Validation checks buffer and
/// kernel references, access rectangles, device selectors, `after`
/// references and cycles among tasks.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Workload> {
    let raw = load_from_path(&path)?;
    Workload::try_from(raw)
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("Workload.toml")
}
