/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! OS real-time integration: `SCHED_FIFO` elevation, CPU pinning and the
//! monotonic clock used for absolute-time waits.
//!
//! Elevation requires `CAP_SYS_NICE` or root.  Running without it voids every
//! RM guarantee downstream, so a failed elevation is a **typed error**
//! ([`RtError::PermissionDenied`]), never a silent fallback to default
//! scheduling — the caller decides whether degraded mode is acceptable.
//!
//! All timing below is `CLOCK_MONOTONIC` nanoseconds.  Waits are absolute
//! (`TIMER_ABSTIME`), so suspension overhead cannot accumulate into release
//! drift.

use std::io;

use thiserror::Error;

/// Nanoseconds per second.
const NANOS_PER_SEC: u64 = 1_000_000_000;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failures from the OS real-time layer.
#[derive(Debug, Error)]
pub enum RtError {
    /// The process lacks the privilege to enter the real-time scheduling
    /// class.  Surfaced explicitly: continuing without `SCHED_FIFO` breaks
    /// the admission guarantee.
    #[error(
        "permission denied elevating to SCHED_FIFO priority {priority} — \
         run with CAP_SYS_NICE or root, or pass --allow-degraded"
    )]
    PermissionDenied { priority: i32 },

    /// An OS call failed for a reason other than privilege.
    #[error("{op} failed: {source}")]
    Os {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// Real-time scheduling is not available on this platform.
    #[error("real-time scheduling is only supported on Linux")]
    Unsupported,
}

// ── Priority band ─────────────────────────────────────────────────────────────

/// The `SCHED_FIFO` priority range offered by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityBand {
    /// Lowest real-time priority (background level).
    pub min: i32,
    /// Highest real-time priority.
    pub max: i32,
}

impl PriorityBand {
    /// Number of distinct levels in the band.
    pub fn levels(&self) -> usize {
        (self.max - self.min + 1).max(0) as usize
    }
}

/// Query the OS for the `SCHED_FIFO` priority range (1..=99 on Linux).
#[cfg(target_os = "linux")]
pub fn fifo_priority_range() -> Result<PriorityBand, RtError> {
    let min = unsafe { libc::sched_get_priority_min(libc::SCHED_FIFO) };
    let max = unsafe { libc::sched_get_priority_max(libc::SCHED_FIFO) };
    if min < 0 || max < 0 {
        return Err(RtError::Os {
            op: "sched_get_priority_min/max",
            source: io::Error::last_os_error(),
        });
    }
    Ok(PriorityBand { min, max })
}

/// POSIX guarantees at least 32 levels; the exact values only matter for
/// relative ordering when elevation is unsupported anyway.
#[cfg(not(target_os = "linux"))]
pub fn fifo_priority_range() -> Result<PriorityBand, RtError> {
    Ok(PriorityBand { min: 1, max: 99 })
}

// ── Scheduling class ──────────────────────────────────────────────────────────

/// Move the calling thread into `SCHED_FIFO` at `priority`.
///
/// `EPERM` is mapped to [`RtError::PermissionDenied`]; everything else comes
/// back as [`RtError::Os`].
#[cfg(target_os = "linux")]
pub fn set_fifo_priority(priority: i32) -> Result<(), RtError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // pid 0 addresses the calling thread
    let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EPERM) {
            return Err(RtError::PermissionDenied { priority });
        }
        return Err(RtError::Os {
            op: "sched_setscheduler",
            source: err,
        });
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn set_fifo_priority(_priority: i32) -> Result<(), RtError> {
    Err(RtError::Unsupported)
}

/// Pin the calling thread to a single CPU core.
///
/// Single-core execution is load-bearing: the Liu & Layland bound is proven
/// only for one fixed-priority preemptive processor.
#[cfg(target_os = "linux")]
pub fn pin_to_cpu(cpu: u32) -> Result<(), RtError> {
    unsafe {
        let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut cpuset);
        libc::CPU_SET(cpu as usize, &mut cpuset);

        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &cpuset) != 0 {
            return Err(RtError::Os {
                op: "sched_setaffinity",
                source: io::Error::last_os_error(),
            });
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn pin_to_cpu(_cpu: u32) -> Result<(), RtError> {
    Err(RtError::Unsupported)
}

// ── Monotonic clock ───────────────────────────────────────────────────────────

/// Current `CLOCK_MONOTONIC` reading in nanoseconds.
#[cfg(target_os = "linux")]
pub fn now_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // Cannot fail for CLOCK_MONOTONIC with a valid pointer
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    ts.tv_sec as u64 * NANOS_PER_SEC + ts.tv_nsec as u64
}

/// Suspend the calling thread until the absolute monotonic timestamp
/// `deadline_ns`.  Returns immediately if the deadline already passed.
///
/// Interrupted sleeps (`EINTR`) are transparently resumed — the deadline is
/// absolute, so resuming cannot introduce drift.
#[cfg(target_os = "linux")]
pub fn sleep_until_ns(deadline_ns: u64) -> Result<(), RtError> {
    let ts = libc::timespec {
        tv_sec: (deadline_ns / NANOS_PER_SEC) as libc::time_t,
        tv_nsec: (deadline_ns % NANOS_PER_SEC) as libc::c_long,
    };
    loop {
        // clock_nanosleep returns the error number directly (not via errno)
        let rc = unsafe {
            libc::clock_nanosleep(
                libc::CLOCK_MONOTONIC,
                libc::TIMER_ABSTIME,
                &ts,
                std::ptr::null_mut(),
            )
        };
        match rc {
            0 => return Ok(()),
            libc::EINTR => continue,
            err => {
                return Err(RtError::Os {
                    op: "clock_nanosleep",
                    source: io::Error::from_raw_os_error(err),
                })
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod fallback_clock {
    use std::sync::OnceLock;
    use std::time::Instant;

    static ANCHOR: OnceLock<Instant> = OnceLock::new();

    pub fn anchor() -> Instant {
        *ANCHOR.get_or_init(Instant::now)
    }
}

#[cfg(not(target_os = "linux"))]
pub fn now_ns() -> u64 {
    fallback_clock::anchor().elapsed().as_nanos() as u64
}

#[cfg(not(target_os = "linux"))]
pub fn sleep_until_ns(deadline_ns: u64) -> Result<(), RtError> {
    let now = now_ns();
    if deadline_ns > now {
        std::thread::sleep(std::time::Duration::from_nanos(deadline_ns - now));
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
