/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Dispatcher threads: one per task, fixed-priority, single suspension point
//! each.
//!
//! A **periodic dispatcher** owns its task's [`ArrivalClock`] and deadline-miss
//! counter and runs the release cycle:
//!
//! ```text
//! INIT → WAIT_FOR_RELEASE → RUNNING → CHECK_DEADLINE → WAIT_FOR_RELEASE → …
//! ```
//!
//! Per cycle it suspends until the absolute release timestamp, runs the task
//! body bracketed by trace marks, compares the completion time against
//! release + period (strictly later = one miss), and advances the clock by
//! exactly one period.  It terminates when its [`CycleBudget`] is exhausted or
//! the [`ShutdownToken`] is observed at the top of the cycle.
//!
//! The **aperiodic dispatcher** parks on the guarded [`BackgroundTrigger`] and
//! runs the background body once per consumed request, until the trigger
//! reports shutdown.
//!
//! All per-task state is owned by the dispatcher thread and handed back in a
//! report on join — the coordinator reads counters only after the owning
//! thread has terminated, so no locking is needed around them.
//!
//! Failure policy: a failing trace sink is logged and ignored; it never
//! blocks and never changes a scheduling decision.

pub mod clock;
pub mod trigger;

pub use clock::ArrivalClock;
pub use trigger::{BackgroundTrigger, ShutdownToken, Wake};

use std::io;
use std::sync::Arc;
use std::thread;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::rt;
use crate::task::{RtTask, TaskId};
use crate::trace::{Phase, TraceSink};
use crate::workload::Workload;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failures creating or joining dispatcher threads.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to spawn dispatcher thread for task '{task}': {source}")]
    Spawn {
        task: String,
        #[source]
        source: io::Error,
    },

    /// The dispatcher thread panicked; its report is lost.
    #[error("dispatcher thread for task '{task}' panicked")]
    Panicked { task: String },
}

// ── Options & reports ─────────────────────────────────────────────────────────

/// How many release cycles a periodic dispatcher runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleBudget {
    /// Stop after exactly this many cycles.
    Bounded(u64),
    /// Run until the shutdown token cancels.
    Unbounded,
}

impl CycleBudget {
    fn exhausted(&self, completed: u64) -> bool {
        match *self {
            CycleBudget::Bounded(limit) => completed >= limit,
            CycleBudget::Unbounded => false,
        }
    }
}

/// Per-dispatcher startup options.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub budget: CycleBudget,

    /// Core to pin the dispatcher thread to.  All dispatchers of one run must
    /// share a single core — the admission bound holds only there.
    pub pin_cpu: Option<u32>,

    /// Enter `SCHED_FIFO` at the task's assigned priority.  `false` runs
    /// degraded (tests, or an explicit operator override); the report records
    /// which mode the thread actually ran in.
    pub elevate: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            budget: CycleBudget::Unbounded,
            pin_cpu: None,
            elevate: false,
        }
    }
}

/// Result of one periodic dispatcher, returned on join.
#[derive(Debug, Clone)]
pub struct PeriodicReport {
    pub id: TaskId,
    pub name: String,

    /// Release cycles actually completed.
    pub cycles: u64,

    /// Cycles whose completion was strictly later than release + period.
    /// Cumulative over the whole run.
    pub missed_deadlines: u64,

    /// The thread ran outside `SCHED_FIFO` (elevation skipped or failed) —
    /// deadline figures carry no RM guarantee.
    pub degraded: bool,
}

/// Result of the aperiodic dispatcher, returned on join.
#[derive(Debug, Clone)]
pub struct BackgroundReport {
    pub id: TaskId,
    pub name: String,

    /// Background releases served.
    pub releases: u64,

    pub degraded: bool,
}

// ── Handles ───────────────────────────────────────────────────────────────────

/// Join handle for a periodic dispatcher.
pub struct PeriodicHandle {
    name: String,
    inner: thread::JoinHandle<PeriodicReport>,
}

impl PeriodicHandle {
    /// Wait for the dispatcher to terminate and collect its report.
    pub fn join(self) -> Result<PeriodicReport, DispatchError> {
        self.inner.join().map_err(|_| DispatchError::Panicked {
            task: self.name,
        })
    }
}

/// Join handle for the aperiodic dispatcher.
pub struct BackgroundHandle {
    name: String,
    inner: thread::JoinHandle<BackgroundReport>,
}

impl BackgroundHandle {
    pub fn join(self) -> Result<BackgroundReport, DispatchError> {
        self.inner.join().map_err(|_| DispatchError::Panicked {
            task: self.name,
        })
    }
}

// ── Thread setup ──────────────────────────────────────────────────────────────

/// Pin and elevate the calling dispatcher thread.  Returns `true` if the
/// thread ends up outside the real-time class (degraded).
///
/// Elevation failure here is unexpected — the coordinator pre-flights the
/// privilege gate before spawning — so it is surfaced loudly and recorded in
/// the report rather than silently swallowed.
fn enter_rt_class(task: &RtTask, opts: &DispatchOptions) -> bool {
    if let Some(cpu) = opts.pin_cpu {
        if let Err(e) = rt::pin_to_cpu(cpu) {
            warn!(task = %task.spec.name, cpu = cpu, error = %e, "CPU pinning failed");
        }
    }

    if !opts.elevate {
        return true;
    }

    match rt::set_fifo_priority(task.priority) {
        Ok(()) => false,
        Err(e) => {
            warn!(
                task = %task.spec.name,
                priority = task.priority,
                error = %e,
                "SCHED_FIFO elevation failed — dispatcher running degraded"
            );
            true
        }
    }
}

// ── Periodic dispatcher ───────────────────────────────────────────────────────

/// Spawn the dispatcher thread for one periodic task.
///
/// `task.spec.period` must be non-zero (guaranteed by construction: `RtTask`s
/// only come out of the priority assigner, which validates the split).
pub fn spawn_periodic(
    task: RtTask,
    workload: Box<dyn Workload>,
    sink: Arc<dyn TraceSink>,
    trigger: Arc<BackgroundTrigger>,
    token: ShutdownToken,
    opts: DispatchOptions,
) -> Result<PeriodicHandle, DispatchError> {
    let name = task.spec.name.clone();
    let builder = thread::Builder::new().name(name.clone());
    let inner = builder
        .spawn(move || run_periodic(task, workload, sink, trigger, token, opts))
        .map_err(|source| DispatchError::Spawn {
            task: name.clone(),
            source,
        })?;
    Ok(PeriodicHandle { name, inner })
}

fn run_periodic(
    task: RtTask,
    mut workload: Box<dyn Workload>,
    sink: Arc<dyn TraceSink>,
    trigger: Arc<BackgroundTrigger>,
    token: ShutdownToken,
    opts: DispatchOptions,
) -> PeriodicReport {
    let degraded = enter_rt_class(&task, &opts);
    let id = task.spec.id;
    let name = task.spec.name;

    let mut arrivals = ArrivalClock::start(rt::now_ns(), task.spec.period);
    let mut cycles: u64 = 0;
    let mut missed_deadlines: u64 = 0;

    debug!(
        task = %name,
        priority = task.priority,
        period_us = task.spec.period.as_micros() as u64,
        degraded = degraded,
        "periodic dispatcher started"
    );

    loop {
        // Cancellation is observed once per cycle, before suspending
        if opts.budget.exhausted(cycles) || token.is_cancelled() {
            break;
        }

        let release = arrivals.next_release_ns();
        if let Err(e) = rt::sleep_until_ns(release) {
            warn!(task = %name, error = %e, "release wait failed — stopping dispatcher");
            break;
        }

        // Trace failures never alter scheduling
        if let Err(e) = sink.mark(id, Phase::Enter) {
            warn!(task = %name, error = %e, "trace mark (enter) failed");
        }

        let outcome = workload.run(cycles);
        if outcome.request_background {
            trigger.request();
        }

        if let Err(e) = sink.mark(id, Phase::Exit) {
            warn!(task = %name, error = %e, "trace mark (exit) failed");
        }

        let completion = rt::now_ns();
        // advance() yields release + period: the absolute deadline of the
        // cycle that just ran, and the next release — computed from the
        // previous absolute value, never from "now"
        let deadline = arrivals.advance();
        if completion > deadline {
            missed_deadlines += 1;
            warn!(
                task = %name,
                cycle = cycles,
                overrun_us = (completion - deadline) / 1_000,
                "deadline missed"
            );
        }

        cycles += 1;
    }

    info!(
        task = %name,
        cycles = cycles,
        missed_deadlines = missed_deadlines,
        "periodic dispatcher terminated"
    );

    PeriodicReport {
        id,
        name,
        cycles,
        missed_deadlines,
        degraded,
    }
}

// ── Aperiodic dispatcher ──────────────────────────────────────────────────────

/// Spawn the dispatcher thread for the background task.
///
/// The thread parks on `trigger` and terminates when the trigger reports
/// shutdown (after draining any still-pending requests); the coordinator
/// cancels it via [`BackgroundTrigger::shutdown`], which doubles as its
/// wakeup.
pub fn spawn_background(
    task: RtTask,
    workload: Box<dyn Workload>,
    sink: Arc<dyn TraceSink>,
    trigger: Arc<BackgroundTrigger>,
    opts: DispatchOptions,
) -> Result<BackgroundHandle, DispatchError> {
    let name = task.spec.name.clone();
    let builder = thread::Builder::new().name(name.clone());
    let inner = builder
        .spawn(move || run_background(task, workload, sink, trigger, opts))
        .map_err(|source| DispatchError::Spawn {
            task: name.clone(),
            source,
        })?;
    Ok(BackgroundHandle { name, inner })
}

fn run_background(
    task: RtTask,
    mut workload: Box<dyn Workload>,
    sink: Arc<dyn TraceSink>,
    trigger: Arc<BackgroundTrigger>,
    opts: DispatchOptions,
) -> BackgroundReport {
    let degraded = enter_rt_class(&task, &opts);
    let id = task.spec.id;
    let name = task.spec.name;
    let mut releases: u64 = 0;

    debug!(
        task = %name,
        priority = task.priority,
        degraded = degraded,
        "aperiodic dispatcher started"
    );

    loop {
        match trigger.wait() {
            Wake::Shutdown => break,
            Wake::Released => {
                if let Err(e) = sink.mark(id, Phase::Enter) {
                    warn!(task = %name, error = %e, "trace mark (enter) failed");
                }
                // A background body cannot re-trigger itself; the outcome is
                // deliberately ignored here.
                let _ = workload.run(releases);
                if let Err(e) = sink.mark(id, Phase::Exit) {
                    warn!(task = %name, error = %e, "trace mark (exit) failed");
                }
                releases += 1;
            }
        }
    }

    info!(task = %name, releases = releases, "aperiodic dispatcher terminated");

    BackgroundReport {
        id,
        name,
        releases,
        degraded,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
//
// Timing-sensitive tests use scaled-down periods and run unpinned and
// unprivileged: they exercise the per-cycle contract, not the OS scheduling
// class.

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskSpec;
    use crate::trace::NullTraceSink;
    use crate::workload::WorkloadOutcome;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    // ── Test doubles ──────────────────────────────────────────────────────────

    /// Busy-waits a default duration per cycle, with per-cycle overrides and
    /// scripted background requests.
    struct ScriptedBody {
        default_busy: Duration,
        overrides: BTreeMap<u64, Duration>,
        request_cycles: BTreeSet<u64>,
    }

    impl ScriptedBody {
        fn uniform(busy: Duration) -> Self {
            Self {
                default_busy: busy,
                overrides: BTreeMap::new(),
                request_cycles: BTreeSet::new(),
            }
        }

        fn with_override(mut self, cycle: u64, busy: Duration) -> Self {
            self.overrides.insert(cycle, busy);
            self
        }

        fn with_requests(mut self, cycles: impl IntoIterator<Item = u64>) -> Self {
            self.request_cycles = cycles.into_iter().collect();
            self
        }
    }

    impl Workload for ScriptedBody {
        fn run(&mut self, cycle: u64) -> WorkloadOutcome {
            let busy = *self.overrides.get(&cycle).unwrap_or(&self.default_busy);
            let start = Instant::now();
            while start.elapsed() < busy {
                std::hint::spin_loop();
            }
            WorkloadOutcome {
                request_background: self.request_cycles.contains(&cycle),
            }
        }
    }

    /// Records every mark.
    #[derive(Default)]
    struct CollectingSink {
        marks: Mutex<Vec<(TaskId, Phase)>>,
    }

    impl TraceSink for CollectingSink {
        fn mark(&self, task: TaskId, phase: Phase) -> io::Result<()> {
            self.marks.lock().unwrap().push((task, phase));
            Ok(())
        }
    }

    /// Fails every mark.
    struct FailingSink;

    impl TraceSink for FailingSink {
        fn mark(&self, _task: TaskId, _phase: Phase) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no trace device"))
        }
    }

    fn rt_task(id: u32, period: Duration) -> RtTask {
        RtTask {
            spec: TaskSpec {
                id: TaskId(id),
                name: format!("test-task-{id}"),
                period,
                wcet: Duration::from_millis(1),
            },
            priority: 50,
        }
    }

    fn opts(budget: CycleBudget) -> DispatchOptions {
        DispatchOptions {
            budget,
            pin_cpu: None,
            elevate: false,
        }
    }

    fn plumbing() -> (Arc<NullTraceSink>, Arc<BackgroundTrigger>, ShutdownToken) {
        (
            Arc::new(NullTraceSink),
            Arc::new(BackgroundTrigger::new()),
            ShutdownToken::new(),
        )
    }

    // ── Deadline accounting ───────────────────────────────────────────────────

    #[test]
    fn no_misses_when_every_cycle_fits_the_period() {
        let (sink, trigger, token) = plumbing();
        let handle = spawn_periodic(
            rt_task(1, Duration::from_millis(20)),
            Box::new(ScriptedBody::uniform(Duration::from_millis(2))),
            sink,
            trigger,
            token,
            opts(CycleBudget::Bounded(10)),
        )
        .unwrap();

        let report = handle.join().unwrap();
        assert_eq!(report.cycles, 10);
        assert_eq!(report.missed_deadlines, 0);
        assert!(report.degraded);
    }

    #[test]
    fn exactly_one_miss_when_exactly_one_cycle_overruns() {
        // Period 40 ms; cycle 4 busy-waits 60 ms — its completion lands past
        // release+period, but the recovery cycle still fits its own deadline.
        let (sink, trigger, token) = plumbing();
        let body = ScriptedBody::uniform(Duration::from_millis(2))
            .with_override(4, Duration::from_millis(60));
        let handle = spawn_periodic(
            rt_task(1, Duration::from_millis(40)),
            Box::new(body),
            sink,
            trigger,
            token,
            opts(CycleBudget::Bounded(10)),
        )
        .unwrap();

        let report = handle.join().unwrap();
        assert_eq!(report.cycles, 10);
        assert_eq!(report.missed_deadlines, 1);
    }

    // ── Background signalling (Scenario C) ────────────────────────────────────

    #[test]
    fn background_runs_exactly_once_per_scripted_request() {
        let sink: Arc<dyn TraceSink> = Arc::new(NullTraceSink);
        let trigger = Arc::new(BackgroundTrigger::new());
        let token = ShutdownToken::new();

        let background = spawn_background(
            rt_task(4, Duration::ZERO),
            Box::new(ScriptedBody::uniform(Duration::from_millis(1))),
            Arc::clone(&sink),
            Arc::clone(&trigger),
            opts(CycleBudget::Unbounded),
        )
        .unwrap();

        let body = ScriptedBody::uniform(Duration::from_millis(1))
            .with_requests([3, 7, 15]);
        let periodic = spawn_periodic(
            rt_task(1, Duration::from_millis(15)),
            Box::new(body),
            Arc::clone(&sink),
            Arc::clone(&trigger),
            token,
            opts(CycleBudget::Bounded(20)),
        )
        .unwrap();

        let report = periodic.join().unwrap();
        assert_eq!(report.cycles, 20);

        // Pending requests are drained before shutdown is reported, so the
        // count is exact even if the last request is still in flight.
        trigger.shutdown();
        let bg = background.join().unwrap();
        assert_eq!(bg.releases, 3);
    }

    #[test]
    fn background_with_no_requests_exits_cleanly_on_shutdown() {
        let trigger = Arc::new(BackgroundTrigger::new());
        let handle = spawn_background(
            rt_task(4, Duration::ZERO),
            Box::new(ScriptedBody::uniform(Duration::from_millis(1))),
            Arc::new(NullTraceSink),
            Arc::clone(&trigger),
            opts(CycleBudget::Unbounded),
        )
        .unwrap();

        trigger.shutdown();
        let report = handle.join().unwrap();
        assert_eq!(report.releases, 0);
    }

    // ── Cancellation ──────────────────────────────────────────────────────────

    #[test]
    fn unbounded_dispatcher_stops_on_cancellation() {
        let (sink, trigger, token) = plumbing();
        let handle = spawn_periodic(
            rt_task(1, Duration::from_millis(10)),
            Box::new(ScriptedBody::uniform(Duration::from_millis(1))),
            sink,
            trigger,
            token.clone(),
            opts(CycleBudget::Unbounded),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        token.cancel();

        let report = handle.join().unwrap();
        assert!(report.cycles > 0, "dispatcher never ran a cycle");
    }

    // ── Failure policy ────────────────────────────────────────────────────────

    #[test]
    fn failing_trace_sink_does_not_stop_the_dispatch_loop() {
        let trigger = Arc::new(BackgroundTrigger::new());
        let handle = spawn_periodic(
            rt_task(1, Duration::from_millis(10)),
            Box::new(ScriptedBody::uniform(Duration::from_millis(1))),
            Arc::new(FailingSink),
            trigger,
            ShutdownToken::new(),
            opts(CycleBudget::Bounded(5)),
        )
        .unwrap();

        let report = handle.join().unwrap();
        assert_eq!(report.cycles, 5);
        assert_eq!(report.missed_deadlines, 0);
    }

    // ── Trace bracketing ──────────────────────────────────────────────────────

    #[test]
    fn every_cycle_is_bracketed_by_enter_and_exit_marks() {
        let sink = Arc::new(CollectingSink::default());
        let trigger = Arc::new(BackgroundTrigger::new());
        let handle = spawn_periodic(
            rt_task(7, Duration::from_millis(10)),
            Box::new(ScriptedBody::uniform(Duration::from_millis(1))),
            Arc::clone(&sink) as Arc<dyn TraceSink>,
            trigger,
            ShutdownToken::new(),
            opts(CycleBudget::Bounded(3)),
        )
        .unwrap();

        handle.join().unwrap();

        let marks = sink.marks.lock().unwrap();
        assert_eq!(marks.len(), 6);
        for pair in marks.chunks(2) {
            assert_eq!(pair[0], (TaskId(7), Phase::Enter));
            assert_eq!(pair[1], (TaskId(7), Phase::Exit));
        }
    }
}
