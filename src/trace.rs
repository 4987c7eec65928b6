/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Trace-sink side channel.
//!
//! Every task body brackets its execution with two marks — `Enter` when it
//! starts and `Exit` when it finishes — so an external observer can
//! reconstruct the interleaving.  The sink is an opaque, order-insensitive
//! side channel: the scheduling core never inspects its results, and a
//! failing sink must never block or alter a scheduling decision (dispatchers
//! log the failure and carry on).
//!
//! [`DeviceTraceSink`] speaks the trace character device's protocol: an
//! `Enter` mark for task 3 is the bytes `"[3"`, the matching `Exit` is
//! `"3]"`, written through an open/write/close cycle per mark.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

use tracing::info;

use crate::task::TaskId;

// ── Interface ─────────────────────────────────────────────────────────────────

/// Which side of the task body a mark brackets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Enter,
    Exit,
}

/// Execution-boundary marker sink, shared by all task threads.
///
/// Implementations must serialise their own writes; the core treats the sink
/// as order-insensitive and calls it concurrently from every dispatcher.
pub trait TraceSink: Send + Sync {
    fn mark(&self, task: TaskId, phase: Phase) -> io::Result<()>;
}

/// Render the on-wire marker for a `(task, phase)` pair.
fn marker(task: TaskId, phase: Phase) -> String {
    match phase {
        Phase::Enter => format!("[{task}"),
        Phase::Exit => format!("{task}]"),
    }
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

/// Writes markers to a trace character device (e.g. `/dev/taskdriver`).
///
/// The device is opened and closed per mark, matching the driver's
/// one-message-per-write protocol.  Serialisation across threads is the
/// driver's job (it guards its buffer with its own semaphore).
#[derive(Debug, Clone)]
pub struct DeviceTraceSink {
    path: PathBuf,
}

impl DeviceTraceSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl TraceSink for DeviceTraceSink {
    fn mark(&self, task: TaskId, phase: Phase) -> io::Result<()> {
        let mut device = OpenOptions::new().write(true).open(&self.path)?;
        device.write_all(marker(task, phase).as_bytes())?;
        Ok(())
    }
}

/// Emits marks as structured log events.  Default sink when no trace device
/// is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTraceSink;

impl TraceSink for LogTraceSink {
    fn mark(&self, task: TaskId, phase: Phase) -> io::Result<()> {
        info!(task = task.0, phase = ?phase, marker = %marker(task, phase), "trace mark");
        Ok(())
    }
}

/// Discards every mark.  Useful for benchmarks and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTraceSink;

impl TraceSink for NullTraceSink {
    fn mark(&self, _task: TaskId, _phase: Phase) -> io::Result<()> {
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
