/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::collections::HashMap;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use cadenza::analysis;
use cadenza::config::TaskSetConfig;
use cadenza::dispatch::{
    self, BackgroundTrigger, CycleBudget, DispatchOptions, ShutdownToken,
};
use cadenza::rt::{self, RtError};
use cadenza::sched;
use cadenza::task::{TaskId, TaskSpec};
use cadenza::trace::{DeviceTraceSink, LogTraceSink, TraceSink};
use cadenza::workload::{SpinWorkload, Workload};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Cadenza rate-monotonic task scheduler.
///
/// Example:
///   cadenza demos/taskset.yaml --cycles 100
///   RUST_LOG=debug cadenza demos/taskset.yaml --allow-degraded
#[derive(Debug, Parser)]
#[command(
    name = "cadenza",
    about = "Fixed-priority rate-monotonic scheduler with admission control",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML task-set file.
    taskset: PathBuf,

    /// Override the configured release-cycle count (0 = run until killed).
    #[arg(long)]
    cycles: Option<u64>,

    /// Override the configured CPU core to pin all task threads to.
    #[arg(long)]
    cpu: Option<u32>,

    /// Override the configured trace device path.
    #[arg(long)]
    trace_device: Option<PathBuf>,

    /// Continue without SCHED_FIFO when real-time privileges are missing.
    /// Deadline figures carry no RM guarantee in this mode.
    #[arg(long, default_value_t = false)]
    allow_degraded: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Initialise structured logging.
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    info!("Cadenza starting up...");

    // ── Configuration ─────────────────────────────────────────────────────────
    let mut config = TaskSetConfig::load(&cli.taskset)?;
    if let Some(cycles) = cli.cycles {
        config.cycles = cycles;
    }
    if let Some(cpu) = cli.cpu {
        config.cpu = cpu;
    }
    if let Some(path) = cli.trace_device {
        config.trace_device = Some(path);
    }

    // ── Privilege gate ────────────────────────────────────────────────────────
    // Probe SCHED_FIFO at the top of the band before building anything.  The
    // elevated main thread also makes the WCET samples below preemption-free.
    let band = rt::fifo_priority_range().context("querying SCHED_FIFO priority range")?;
    let elevate = match rt::set_fifo_priority(band.max) {
        Ok(()) => true,
        Err(e @ (RtError::PermissionDenied { .. } | RtError::Unsupported)) => {
            if cli.allow_degraded {
                warn!(
                    error = %e,
                    "running degraded: tasks keep normal scheduling, deadline \
                     figures carry no RM guarantee"
                );
                false
            } else {
                return Err(e).context(
                    "real-time privileges required (CAP_SYS_NICE or root); \
                     pass --allow-degraded to run without them",
                );
            }
        }
        Err(e) => return Err(e).context("entering SCHED_FIFO"),
    };

    // The admission bound is a single-core result; measurement and dispatch
    // all happen on this one core.
    if let Err(e) = rt::pin_to_cpu(config.cpu) {
        warn!(cpu = config.cpu, error = %e, "CPU pinning failed for the coordinator");
    }

    // ── Workload construction & WCET measurement ──────────────────────────────
    let mut specs: Vec<TaskSpec> = Vec::with_capacity(config.tasks.len());
    let mut workloads: HashMap<TaskId, Box<dyn Workload>> = HashMap::new();

    for (index, task) in config.tasks.iter().enumerate() {
        let id = TaskId(index as u32 + 1);
        let mut workload =
            SpinWorkload::new(task.spin, task.background_request_cycles.iter().copied());
        let wcet = analysis::measure_wcet(&mut workload, config.wcet_trials);
        info!(
            task = %task.name,
            period_ms = task.period.as_millis() as u64,
            wcet_us = wcet.as_micros() as u64,
            "WCET measured"
        );
        specs.push(TaskSpec {
            id,
            name: task.name.clone(),
            period: task.period,
            wcet,
        });
        workloads.insert(id, Box::new(workload));
    }

    let background_id = TaskId(config.tasks.len() as u32 + 1);
    let mut background_workload = SpinWorkload::new(config.background.spin, []);
    let background_wcet =
        analysis::measure_wcet(&mut background_workload, config.wcet_trials);
    let background_spec = TaskSpec {
        id: background_id,
        name: config.background.name.clone(),
        period: std::time::Duration::ZERO,
        wcet: background_wcet,
    };

    // ── Admission & priority assignment ───────────────────────────────────────
    // Fails before any dispatcher exists; nothing to unwind on rejection.
    let report = analysis::admit(&specs).context("admission test failed")?;
    info!(
        utilization = report.utilization,
        bound = report.bound,
        harmonic = report.harmonic,
        "task set admitted"
    );

    let schedule = sched::assign_priorities(specs, background_spec, band)
        .context("priority assignment failed")?;

    // ── Dispatch ──────────────────────────────────────────────────────────────
    let sink: Arc<dyn TraceSink> = match &config.trace_device {
        Some(path) => {
            info!(device = %path.display(), "tracing to device");
            Arc::new(DeviceTraceSink::new(path.clone()))
        }
        None => Arc::new(LogTraceSink),
    };

    let trigger = Arc::new(BackgroundTrigger::new());
    let token = ShutdownToken::new();
    let budget = config.budget();
    if matches!(budget, CycleBudget::Unbounded) {
        info!("cycle budget is unbounded — running until the process is killed");
    }

    let background_handle = dispatch::spawn_background(
        schedule.background.clone(),
        Box::new(background_workload),
        Arc::clone(&sink),
        Arc::clone(&trigger),
        DispatchOptions {
            budget: CycleBudget::Unbounded,
            pin_cpu: Some(config.cpu),
            elevate,
        },
    )?;

    let mut periodic_handles = Vec::with_capacity(schedule.periodic.len());
    for task in &schedule.periodic {
        let workload = workloads
            .remove(&task.spec.id)
            .with_context(|| format!("no workload built for task '{}'", task.spec.name))?;
        let handle = dispatch::spawn_periodic(
            task.clone(),
            workload,
            Arc::clone(&sink),
            Arc::clone(&trigger),
            token.clone(),
            DispatchOptions {
                budget,
                pin_cpu: Some(config.cpu),
                elevate,
            },
        )?;
        periodic_handles.push(handle);
    }

    // The coordinator must not compete with the task threads it just started.
    if elevate {
        if let Err(e) = rt::set_fifo_priority(band.min) {
            warn!(error = %e, "could not drop coordinator priority");
        }
    }

    // ── Join & summary ────────────────────────────────────────────────────────
    let mut total_misses: u64 = 0;
    for handle in periodic_handles {
        let report = handle.join()?;
        total_misses += report.missed_deadlines;
        if report.missed_deadlines > 0 {
            warn!(
                task = %report.name,
                cycles = report.cycles,
                missed_deadlines = report.missed_deadlines,
                "task missed deadlines"
            );
        } else {
            info!(
                task = %report.name,
                cycles = report.cycles,
                "task met every deadline"
            );
        }
    }

    // Wake the background dispatcher out of its wait; pending requests are
    // still served before it exits.
    token.cancel();
    trigger.shutdown();
    let background_report = background_handle.join()?;
    info!(
        task = %background_report.name,
        releases = background_report.releases,
        "background task summary"
    );

    if total_misses > 0 {
        warn!(total_misses = total_misses, "run finished with deadline misses");
    } else {
        info!("run finished — no deadline misses");
    }

    Ok(())
}
