pub mod builders;
pub mod fake_backend;

use std::sync::{Arc, Once};

use hetsched::engine::{ErrorSink, Runtime};
use hetsched::exec::{Backend, BackendRegistry};
use tracing_subscriber::{fmt, EnvFilter};

use crate::fake_backend::RecordingBackend;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// A runtime over a single [`RecordingBackend`] with `devices` host devices.
pub fn recording_runtime(devices: usize) -> (Runtime, Arc<RecordingBackend>) {
    recording_runtime_with(RecordingBackend::new(devices))
}

pub fn recording_runtime_with(backend: RecordingBackend) -> (Runtime, Arc<RecordingBackend>) {
    let backend = Arc::new(backend);
    let dyn_backend: Arc<dyn Backend> = Arc::clone(&backend) as Arc<dyn Backend>;
    let runtime = Runtime::new(
        BackendRegistry::new().with_backend(dyn_backend),
        ErrorSink::new(),
    );
    (runtime, backend)
}
