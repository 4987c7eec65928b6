/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for priority assignment.

use thiserror::Error;

/// Failures from [`assign_priorities`](super::assign_priorities).
///
/// Every variant carries enough data for the coordinator to log a
/// fully-qualified `tracing` event without re-deriving anything.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// No periodic tasks were supplied.
    #[error("cannot assign priorities to an empty periodic task set")]
    EmptyTaskSet,

    /// A zero-period (background) spec was found in the periodic set.
    #[error("task '{task}' has a zero period — it belongs in the background slot")]
    BackgroundInPeriodicSet { task: String },

    /// The spec supplied as background has a non-zero period.
    #[error("background task '{task}' has a non-zero period — expected the zero sentinel")]
    PeriodicInBackgroundSlot { task: String },

    /// More distinct levels are needed than the OS band offers above the
    /// background level.
    #[error(
        "priority range exhausted: {needed} periodic tasks need {needed} distinct \
         levels above the background level, but only {available} are available"
    )]
    PriorityRangeExhausted { needed: usize, available: usize },
}
