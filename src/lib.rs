// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod region;
pub mod types;
pub mod workload;

use anyhow::{bail, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, Workload};
use crate::workload::run_workload;

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the workload, then either prints it (`--dry-run`) or
/// runs it on the host backend and prints the final buffer digests. Any
/// error reported during the run makes this return an error.
pub async fn run(args: CliArgs) -> Result<()> {
    let workload = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&workload);
        return Ok(());
    }

    let report = run_workload(&workload).await?;
    print!("{report}");

    if !report.is_success() {
        bail!(
            "workload finished with {} error(s) and {} cancelled task(s)",
            report.errors.len(),
            report.cancelled.len()
        );
    }
    info!("workload completed");
    Ok(())
}

/// Print devices, buffers and tasks in execution order.
fn print_dry_run(workload: &Workload) {
    println!("hetsched dry-run");
    println!("  host.devices = {}", workload.host.devices);
    match workload.host.memory_limit {
        Some(limit) => println!("  host.memory_limit = {limit}"),
        None => println!("  host.memory_limit = unlimited"),
    }
    println!("  runtime.max_errors = {}", workload.runtime.max_errors);
    println!();

    let buffers = crate::workload::describe(workload);
    println!("buffers ({}):", buffers.len());
    for (name, summary) in &buffers {
        println!("  - {name}: {summary}");
    }
    println!();

    println!("tasks ({}):", workload.tasks.len());
    for task in &workload.tasks {
        println!("  - {}", task.name);
        println!("      kernel: {} (value {})", task.kernel.as_str(), task.value);
        println!("      device: {}", task.device);
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        for access in &task.accesses {
            println!("      access: {} {} {}", access.buffer, access.mode, access.rect);
        }
    }

    debug!("dry-run complete (no execution)");
}
