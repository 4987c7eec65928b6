/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core task data structures for the Cadenza runtime.
//!
//! Two distinct types model the two sides of the admission pipeline:
//!
//! ```text
//! config ──(measure WCET)──► TaskSpec ──(admission + RM assignment)──► RtTask
//!                              ↑ input, immutable after admission       ↑ output, priority filled
//! ```
//!
//! # Ownership model
//! A `TaskSpec` is built once at startup from the configuration and the WCET
//! measurement, and is never mutated after the analyzer has accepted the task
//! set.  The priority assigner consumes `Vec<TaskSpec>` and produces a
//! [`Schedule`]; each dispatcher then receives its own `RtTask` by value, so
//! there is no shared mutable per-task state anywhere in the runtime.

use std::time::Duration;

// ── Task identity ─────────────────────────────────────────────────────────────

/// Task identifier, unique within one run.
///
/// Periodic tasks are numbered 1..=N in configuration order; the background
/// task takes N+1.  The numeric value doubles as the marker id written to the
/// trace sink (`"[3"` / `"3]"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u32);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── TaskSpec (input / admission unit) ─────────────────────────────────────────

/// Static description of one task: identity, period and measured worst-case
/// execution time.
///
/// A zero `period` is the sentinel for "aperiodic" — the single background
/// task.  Everything else is periodic with deadline equal to the period.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub id: TaskId,

    /// Human-readable name from the configuration (also the thread name).
    pub name: String,

    /// Release period.  `Duration::ZERO` marks the background task.
    pub period: Duration,

    /// Worst-case execution time, the maximum observed over the measurement
    /// trials run at startup.
    pub wcet: Duration,
}

impl TaskSpec {
    /// `false` for the background task (zero-period sentinel).
    pub fn is_periodic(&self) -> bool {
        !self.period.is_zero()
    }

    /// CPU utilisation fraction `wcet / period`.
    ///
    /// The background task contributes `0.0` by definition.
    pub fn utilization(&self) -> f64 {
        if self.period.is_zero() {
            0.0
        } else {
            self.wcet.as_secs_f64() / self.period.as_secs_f64()
        }
    }
}

// ── RtTask (output / dispatch unit) ───────────────────────────────────────────

/// A task spec plus its assigned `SCHED_FIFO` priority — the unit handed to a
/// dispatcher.
///
/// Produced only by the priority assigner, so holding an `RtTask` implies the
/// task set already passed admission.
#[derive(Debug, Clone)]
pub struct RtTask {
    pub spec: TaskSpec,

    /// `SCHED_FIFO` priority level.  Strictly decreasing in period among
    /// periodic tasks; the background task carries the OS minimum.
    pub priority: i32,
}

// ── Schedule ──────────────────────────────────────────────────────────────────

/// The accepted, priority-assigned task set.
///
/// Invariants (upheld by `sched::assign_priorities`):
/// * `periodic` is sorted by ascending period — under RM this ordering *is*
///   the priority ordering;
/// * priorities are pairwise distinct and strictly decreasing in period;
/// * `background.priority` is strictly below every periodic priority.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub periodic: Vec<RtTask>,
    pub background: RtTask,
}

impl Schedule {
    /// Total utilisation of the periodic tasks (the background task does not
    /// count against the bound).
    pub fn utilization(&self) -> f64 {
        self.periodic.iter().map(|t| t.spec.utilization()).sum()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
