/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Cadenza – rate-monotonic task runtime
//!
//! Fixed-priority, preemptive scheduling of a small set of periodic tasks plus
//! one best-effort background task on a single CPU core, under the classic
//! Rate-Monotonic (RM) policy: shorter period → strictly higher priority.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── config/    – YAML task-set configuration
//! ├── task.rs    – TaskId / TaskSpec / Schedule data model
//! ├── analysis/  – utilisation, Liu & Layland admission test, WCET measurement
//! ├── sched/     – RM priority assignment
//! ├── rt/        – SCHED_FIFO elevation, CPU pinning, absolute-time sleeps
//! ├── dispatch/  – periodic & aperiodic dispatcher threads
//! ├── trace.rs   – trace-sink side channel (task start/stop markers)
//! └── workload.rs – task bodies (opaque to the scheduling core)
//! ```
//!
//! The pipeline a task set travels through:
//!
//! ```text
//! YAML ──► TaskSpec (measured WCET) ──► admission ──► RM priorities ──► dispatchers
//!                                        │ U > Ulub: abort before any thread spawns
//! ```

pub mod analysis;
pub mod config;
pub mod dispatch;
pub mod rt;
pub mod sched;
pub mod task;
pub mod trace;
pub mod workload;
