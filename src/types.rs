use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Hardware backend a device belongs to.
///
/// Only `Host` ships with a live executor in this crate; the others exist so
/// that devices of foreign platforms can be named, bound and rejected as
/// "not supported" instead of crashing the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendId {
    Host,
    Cuda,
    Hip,
    LevelZero,
}

impl BackendId {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::Host => "host",
            BackendId::Cuda => "cuda",
            BackendId::Hip => "hip",
            BackendId::LevelZero => "ze",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "host" | "cpu" => Ok(BackendId::Host),
            "cuda" => Ok(BackendId::Cuda),
            "hip" => Ok(BackendId::Hip),
            "ze" | "level_zero" | "levelzero" => Ok(BackendId::LevelZero),
            other => Err(format!(
                "invalid backend: {other} (expected \"host\", \"cuda\", \"hip\" or \"ze\")"
            )),
        }
    }
}

/// A device is identified by its backend plus an index within that backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId {
    pub backend: BackendId,
    pub index: usize,
}

impl DeviceId {
    pub const fn new(backend: BackendId, index: usize) -> Self {
        Self { backend, index }
    }

    pub const fn host(index: usize) -> Self {
        Self::new(BackendId::Host, index)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.backend, self.index)
    }
}

impl FromStr for DeviceId {
    type Err = String;

    /// Parses `"backend:index"`; a bare backend name means index 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (backend, index) = match s.split_once(':') {
            Some((b, i)) => {
                let index = i
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| format!("invalid device index in '{s}'"))?;
                (b, index)
            }
            None => (s, 0),
        };
        Ok(DeviceId::new(backend.parse()?, index))
    }
}

/// Opaque device pointer handed out by a backend allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevicePtr(pub u64);

impl fmt::Display for DevicePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// How a requirement accesses its data region.
///
/// - `Read`: needs up-to-date data, leaves other replicas valid.
/// - `Write` / `ReadWrite`: needs up-to-date data, becomes the only current
///   replica.
/// - `DiscardWrite` / `DiscardReadWrite`: previous contents are irrelevant, so
///   no copies are issued; still becomes the only current replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
    DiscardWrite,
    DiscardReadWrite,
}

impl AccessMode {
    pub fn is_discard(&self) -> bool {
        matches!(self, AccessMode::DiscardWrite | AccessMode::DiscardReadWrite)
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, AccessMode::Read)
    }
}

impl Default for AccessMode {
    fn default() -> Self {
        AccessMode::ReadWrite
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
            AccessMode::ReadWrite => "read_write",
            AccessMode::DiscardWrite => "discard_write",
            AccessMode::DiscardReadWrite => "discard_read_write",
        };
        f.write_str(s)
    }
}

impl FromStr for AccessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "read" => Ok(AccessMode::Read),
            "write" => Ok(AccessMode::Write),
            "read_write" => Ok(AccessMode::ReadWrite),
            "discard_write" => Ok(AccessMode::DiscardWrite),
            "discard_read_write" => Ok(AccessMode::DiscardReadWrite),
            other => Err(format!("invalid access mode: {other}")),
        }
    }
}
