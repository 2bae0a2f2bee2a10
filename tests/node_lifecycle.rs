// tests/node_lifecycle.rs

mod common;
use crate::common::builders::{region_1d, KernelNodeBuilder, RequirementBuilder};
use crate::common::{host, init_tracing, recording_runtime, with_timeout, TestResult};

use clap::Parser;
use tracing::Level;

use hetsched::cli::{CliArgs, LogLevel};
use hetsched::dag::{Completion, Event, NodeState, SubmissionRegistry};
use hetsched::engine::{ErrorInfo, ErrorKind, ErrorSink};
use hetsched::logging::{parse_level_str, resolve_level};
use hetsched::types::{AccessMode, BackendId, DeviceId};

#[tokio::test]
async fn combined_events_complete_when_all_members_do() {
    let a = Completion::new();
    let b = Completion::new();
    let both = Event::pending(&a).and(Event::Ready).and(Event::pending(&b));
    assert!(matches!(&both, Event::All(events) if events.len() == 2));
    assert!(!both.is_complete());

    a.complete();
    assert!(!both.is_complete());

    let waiter = tokio::spawn({
        let both = both.clone();
        async move { both.wait().await }
    });
    b.complete();
    with_timeout(waiter).await.expect("waiter panicked");
    assert!(both.is_complete());
    assert!(Event::Ready.and(Event::Ready).is_complete());
}

#[test]
fn node_moves_through_its_states() -> TestResult {
    init_tracing();
    let (runtime, backend) = recording_runtime(1);

    let node = KernelNodeBuilder::new("k").on(host(0)).build();
    assert_eq!(node.state(), NodeState::Created);
    assert!(node.assigned_device().is_none());

    runtime.submit(&node);
    assert_eq!(node.state(), NodeState::Submitted);
    assert_eq!(node.assigned_device(), Some(host(0)));
    assert!(node.assigned_executor().is_some());
    assert!(!node.cancel(), "submitted nodes cannot be cancelled");

    backend.complete_all();
    assert_eq!(node.state(), NodeState::Complete);
    assert!(!node.is_virtual());
    Ok(())
}

#[test]
fn cancel_only_applies_before_submission() {
    let region = region_1d(4, 4);
    let req = RequirementBuilder::new(&region).build();
    req.assign_to_device(host(1));
    assert_eq!(req.state(), NodeState::Assigned);

    assert!(req.cancel());
    assert!(!req.cancel());
    req.mark_virtually_submitted();
    req.assign_to_device(host(0));
    assert_eq!(req.state(), NodeState::Cancelled);
    assert_eq!(req.assigned_device(), Some(host(1)));
}

#[test]
fn virtual_submission_keeps_an_existing_event() {
    let region = region_1d(4, 4);
    let req = RequirementBuilder::new(&region)
        .mode(AccessMode::Read)
        .build();
    let completion = Completion::new();
    req.mark_submitted(Event::pending(&completion));
    req.mark_virtually_submitted();

    assert!(!req.is_virtual());
    assert_eq!(req.state(), NodeState::Submitted);
    completion.complete();
    assert!(req.is_complete());
}

#[tokio::test]
async fn registry_waits_for_everything_then_purges() -> TestResult {
    init_tracing();
    let (runtime, backend) = recording_runtime(2);

    let first = KernelNodeBuilder::new("first").on(host(0)).build();
    let second = KernelNodeBuilder::new("second").on(host(1)).build();
    runtime.submit(&first);
    runtime.submit(&second);
    assert_eq!(runtime.registry().pending().len(), 2);

    let finisher = {
        let backend = std::sync::Arc::clone(&backend);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            backend.complete_all();
        })
    };
    with_timeout(runtime.wait()).await;
    finisher.await?;

    assert!(first.is_complete() && second.is_complete());
    assert!(runtime.registry().is_empty());
    assert!(!runtime.is_submitted(&first));
    Ok(())
}

#[test]
fn registry_purge_keeps_pending_nodes() {
    let registry = SubmissionRegistry::new();
    let done = KernelNodeBuilder::new("done").build();
    done.mark_virtually_submitted();
    let busy = KernelNodeBuilder::new("busy").build();
    busy.mark_submitted(Event::pending(&Completion::new()));

    registry.register_submitted_ops(&done);
    registry.register_submitted_ops(&busy);
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.purge_completed(), 1);
    assert!(registry.is_submitted(busy.id()));
    assert!(!registry.is_submitted(done.id()));
}

#[test]
fn error_sink_drops_the_oldest_when_full() {
    let sink = ErrorSink::with_capacity(2);
    for i in 0..3 {
        sink.register_error(ErrorInfo::usage(format!("error {i}")));
    }
    let messages: Vec<String> = sink.errors().into_iter().map(|e| e.message).collect();
    assert_eq!(messages, vec!["error 1", "error 2"]);

    let handle = sink.clone();
    handle.register_error(ErrorInfo::internal("shared"));
    assert!(sink.contains_kind(ErrorKind::Internal));
    assert_eq!(sink.take_errors().len(), 2);
    assert!(handle.is_empty());
}

#[test]
fn error_info_records_the_caller() {
    let info = ErrorInfo::unsupported("nope");
    assert_eq!(info.kind, ErrorKind::FeatureNotSupported);
    assert!(info.location.file().ends_with("node_lifecycle.rs"));
}

#[test]
fn device_and_mode_names_parse() -> TestResult {
    assert_eq!("host:3".parse::<DeviceId>()?, host(3));
    assert_eq!("cpu".parse::<DeviceId>()?, host(0));
    assert_eq!(
        "level_zero:1".parse::<DeviceId>()?,
        DeviceId::new(BackendId::LevelZero, 1)
    );
    assert_eq!(DeviceId::new(BackendId::LevelZero, 1).to_string(), "ze:1");
    assert!("tpu:0".parse::<DeviceId>().is_err());
    assert!("host:x".parse::<DeviceId>().is_err());

    assert!(AccessMode::DiscardReadWrite.is_discard());
    assert!(AccessMode::Read.is_read_only());
    assert!(!AccessMode::Write.is_read_only());
    assert_eq!(AccessMode::default(), AccessMode::ReadWrite);
    Ok(())
}

#[test]
fn log_level_precedence() {
    assert_eq!(resolve_level(Some(LogLevel::Debug), Some("error")), Level::DEBUG);
    assert_eq!(resolve_level(None, Some("Warning")), Level::WARN);
    assert_eq!(resolve_level(None, Some("loud")), Level::INFO);
    assert_eq!(resolve_level(None, None), Level::INFO);
    assert_eq!(parse_level_str(" trace "), Some(Level::TRACE));
}

#[test]
fn cli_flags_parse() -> TestResult {
    let args = CliArgs::try_parse_from([
        "hetsched",
        "--config",
        "jobs/Workload.toml",
        "--log-level",
        "trace",
        "--dry-run",
    ])?;
    assert_eq!(args.config, "jobs/Workload.toml");
    assert!(matches!(args.log_level, Some(LogLevel::Trace)));
    assert!(args.dry_run);

    let defaults = CliArgs::try_parse_from(["hetsched"])?;
    assert_eq!(defaults.config, "Workload.toml");
    assert!(defaults.log_level.is_none());
    assert!(!defaults.dry_run);
    Ok(())
}
