// src/engine/error.rs

//! Error reporting for the scheduling path.
//!
//! `submit` never returns errors to its caller. Everything that goes wrong
//! while resolving or dispatching a node is recorded in an [`ErrorSink`],
//! which is handed to the scheduler (and to backends) explicitly, so each
//! runtime (and each test) gets its own accumulator.

use std::collections::VecDeque;
use std::fmt;
use std::panic::Location;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{error, warn};

/// Default number of errors kept before the oldest ones are dropped.
pub const DEFAULT_MAX_ERRORS: usize = 256;

/// Category of a runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller handed the scheduler something it cannot process
    /// (unbound node, unsubmitted independent predecessor, ...).
    Usage,
    /// A backend allocator could not provide memory.
    MemoryAllocation,
    /// No device holds a valid copy of data that must be read.
    DataSource,
    /// The requested backend/device/operation combination is not available.
    FeatureNotSupported,
    /// A kernel reported a failure while executing on a device queue.
    Kernel,
    /// Broken internal expectation (e.g. a device pointer that was never bound).
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Usage => "usage error",
            ErrorKind::MemoryAllocation => "memory allocation error",
            ErrorKind::DataSource => "data source error",
            ErrorKind::FeatureNotSupported => "feature not supported",
            ErrorKind::Kernel => "kernel error",
            ErrorKind::Internal => "internal error",
        };
        f.write_str(s)
    }
}

/// A single reported error together with the source location that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message} (at {location})")]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub location: &'static Location<'static>,
}

impl ErrorInfo {
    #[track_caller]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Usage, message)
    }

    #[track_caller]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FeatureNotSupported, message)
    }

    #[track_caller]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

pub type RtResult<T> = std::result::Result<T, ErrorInfo>;

/// Shared, bounded accumulator of [`ErrorInfo`]s.
///
/// Cloning the sink yields another handle to the same storage.
#[derive(Debug, Clone)]
pub struct ErrorSink {
    inner: Arc<Mutex<VecDeque<ErrorInfo>>>,
    capacity: usize,
}

impl Default for ErrorSink {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_ERRORS)
    }
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A capacity of 0 is treated as 1.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    /// Log and store an error.
    pub fn register_error(&self, info: ErrorInfo) {
        error!(
            kind = %info.kind,
            location = %info.location,
            "{}",
            info.message
        );

        let mut guard = self.lock();
        if guard.len() == self.capacity {
            if let Some(dropped) = guard.pop_front() {
                warn!(
                    capacity = self.capacity,
                    dropped = %dropped,
                    "error sink full; dropping oldest error"
                );
            }
        }
        guard.push_back(info);
    }

    /// Log an error without storing it.
    pub fn print_error(&self, info: &ErrorInfo) {
        error!(kind = %info.kind, location = %info.location, "{}", info.message);
    }

    /// Log a warning without storing it.
    pub fn print_warning(&self, info: &ErrorInfo) {
        warn!(kind = %info.kind, location = %info.location, "{}", info.message);
    }

    /// Snapshot of the stored errors, oldest first.
    pub fn errors(&self) -> Vec<ErrorInfo> {
        self.lock().iter().cloned().collect()
    }

    /// Remove and return all stored errors.
    pub fn take_errors(&self) -> Vec<ErrorInfo> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains_kind(&self, kind: ErrorKind) -> bool {
        self.lock().iter().any(|e| e.kind == kind)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ErrorInfo>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
