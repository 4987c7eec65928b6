/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Task bodies.
//!
//! A [`Workload`] is the application-specific computation a dispatcher runs
//! once per release.  It is opaque to the scheduling core: the core only sees
//! the [`WorkloadOutcome`], through which a periodic body may request one
//! background-service release as a side effect of its own cycle.  Bodies are
//! not expected to block — a dispatcher's only suspension point is its
//! release wait.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

// ── Interface ─────────────────────────────────────────────────────────────────

/// Side effects a body reports back to its dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadOutcome {
    /// The body wants the background task released once.
    pub request_background: bool,
}

/// One task body.  `cycle` is the 0-based release count of the owning
/// dispatcher (for the background task: the release count of the trigger).
pub trait Workload: Send {
    fn run(&mut self, cycle: u64) -> WorkloadOutcome;
}

// ── Implementations ───────────────────────────────────────────────────────────

/// Simulated busy computation: a fixed number of xorshift rounds.
///
/// Background requests fire on a configured set of cycles rather than on a
/// random draw, so runs are reproducible.
#[derive(Debug, Clone)]
pub struct SpinWorkload {
    iters: u64,
    state: u64,
    request_cycles: BTreeSet<u64>,
}

impl SpinWorkload {
    pub fn new(iters: u64, request_cycles: impl IntoIterator<Item = u64>) -> Self {
        Self {
            iters,
            state: 0x9e37_79b9_7f4a_7c15,
            request_cycles: request_cycles.into_iter().collect(),
        }
    }
}

impl Workload for SpinWorkload {
    fn run(&mut self, cycle: u64) -> WorkloadOutcome {
        let mut x = self.state;
        for _ in 0..self.iters {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
        }
        // Fold the result back so the loop cannot be optimised away
        self.state = x | 1;

        WorkloadOutcome {
            request_background: self.request_cycles.contains(&cycle),
        }
    }
}

/// Busy-waits for a fixed wall-clock duration.  Handy for tests and for
/// calibrated demo task sets.
#[derive(Debug, Clone)]
pub struct FixedDurationWorkload {
    busy: Duration,
}

impl FixedDurationWorkload {
    pub fn new(busy: Duration) -> Self {
        Self { busy }
    }
}

impl Workload for FixedDurationWorkload {
    fn run(&mut self, _cycle: u64) -> WorkloadOutcome {
        let start = Instant::now();
        while start.elapsed() < self.busy {
            std::hint::spin_loop();
        }
        WorkloadOutcome::default()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spin_workload_requests_background_on_configured_cycles() {
        let mut w = SpinWorkload::new(10, [3, 7, 15]);
        for cycle in 0..20 {
            let expected = matches!(cycle, 3 | 7 | 15);
            assert_eq!(
                w.run(cycle).request_background,
                expected,
                "cycle {cycle}"
            );
        }
    }

    #[test]
    fn spin_workload_without_request_cycles_never_requests() {
        let mut w = SpinWorkload::new(10, []);
        for cycle in 0..50 {
            assert!(!w.run(cycle).request_background);
        }
    }

    #[test]
    fn fixed_duration_workload_busy_waits_at_least_its_budget() {
        let mut w = FixedDurationWorkload::new(Duration::from_millis(5));
        let start = Instant::now();
        w.run(0);
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
