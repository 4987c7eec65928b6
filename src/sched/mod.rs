/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Rate-Monotonic priority assignment.
//!
//! RM is the optimal static-priority policy for periodic tasks whose deadline
//! equals their period: shorter period → strictly higher priority.  Each
//! periodic task receives its own distinct `SCHED_FIFO` level counting down
//! from the OS maximum, so no time-slicing is ever needed; the background
//! task sits at the OS minimum, below every periodic task, realising a plain
//! background-service policy with no latency bound.
//!
//! Equal periods are not ordered by RM theory.  We break ties by lower
//! [`TaskId`] — configuration order — which is arbitrary but deterministic;
//! any strict order preserves the RM guarantee.

pub mod error;

pub use error::ScheduleError;

use tracing::{debug, info};

use crate::rt::PriorityBand;
use crate::task::{RtTask, Schedule, TaskSpec};

/// Assign RM priorities to `periodic` and the minimum level to `background`.
///
/// On success the returned [`Schedule`] holds the periodic tasks sorted by
/// ascending period (highest priority first) with pairwise-distinct levels
/// counting down from `band.max`.
///
/// # Errors
/// * [`ScheduleError::EmptyTaskSet`] — no periodic tasks.
/// * [`ScheduleError::BackgroundInPeriodicSet`] /
///   [`ScheduleError::PeriodicInBackgroundSlot`] — zero-period sentinel on
///   the wrong side.
/// * [`ScheduleError::PriorityRangeExhausted`] — more tasks than distinct
///   levels strictly above `band.min`.
pub fn assign_priorities(
    periodic: Vec<TaskSpec>,
    background: TaskSpec,
    band: PriorityBand,
) -> Result<Schedule, ScheduleError> {
    if periodic.is_empty() {
        return Err(ScheduleError::EmptyTaskSet);
    }
    if let Some(stray) = periodic.iter().find(|s| !s.is_periodic()) {
        return Err(ScheduleError::BackgroundInPeriodicSet {
            task: stray.name.clone(),
        });
    }
    if background.is_periodic() {
        return Err(ScheduleError::PeriodicInBackgroundSlot {
            task: background.name.clone(),
        });
    }

    // Levels strictly above the background level
    let available = (band.max - band.min).max(0) as usize;
    if periodic.len() > available {
        return Err(ScheduleError::PriorityRangeExhausted {
            needed: periodic.len(),
            available,
        });
    }

    // Ascending period is the RM priority order; ties break by lower TaskId
    // (configuration order).
    let mut sorted = periodic;
    sorted.sort_by(|a, b| a.period.cmp(&b.period).then(a.id.cmp(&b.id)));

    let periodic: Vec<RtTask> = sorted
        .into_iter()
        .enumerate()
        .map(|(rank, spec)| {
            let priority = band.max - rank as i32;
            debug!(
                task = %spec.name,
                period_us = spec.period.as_micros() as u64,
                priority = priority,
                "RM priority assigned"
            );
            RtTask { spec, priority }
        })
        .collect();

    let background = RtTask {
        spec: background,
        priority: band.min,
    };

    info!(
        periodic_tasks = periodic.len(),
        top_priority = band.max,
        background_priority = background.priority,
        background = %background.spec.name,
        "priority assignment complete"
    );

    Ok(Schedule {
        periodic,
        background,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
