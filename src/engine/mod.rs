// src/engine/mod.rs

//! Runtime facade and error reporting.
//!
//! - [`error`] defines `ErrorInfo` and the `ErrorSink` every failure on the
//!   scheduling path is reported to.
//! - [`runtime`] ties backends, the direct scheduler and the submission
//!   registry together behind [`Runtime`].

pub mod error;
pub mod runtime;

pub use error::{DEFAULT_MAX_ERRORS, ErrorInfo, ErrorKind, ErrorSink, RtResult};
pub use runtime::Runtime;
