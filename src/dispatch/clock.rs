/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Absolute release-time arithmetic.
//!
//! The drift-free invariant: `release(n+1) = release(n) + period`, always
//! computed from the previous **absolute** value, never resynchronised to
//! "now".  Suspension overhead and body jitter therefore cannot accumulate —
//! the release sequence is an exact arithmetic progression from the first
//! release.

use std::time::Duration;

/// Per-dispatcher clock holding the absolute timestamp (monotonic
/// nanoseconds) of the next release.
///
/// Owned exclusively by one periodic dispatcher; never shared.
#[derive(Debug, Clone)]
pub struct ArrivalClock {
    next_ns: u64,
    period_ns: u64,
}

impl ArrivalClock {
    /// Start the clock: the first release is one full period after `now_ns`
    /// (the end of the first period, not its beginning).
    pub fn start(now_ns: u64, period: Duration) -> Self {
        let period_ns = period.as_nanos() as u64;
        Self {
            next_ns: now_ns + period_ns,
            period_ns,
        }
    }

    /// Absolute timestamp of the upcoming release.
    pub fn next_release_ns(&self) -> u64 {
        self.next_ns
    }

    /// Advance by exactly one period and return the new upcoming release —
    /// which is also the absolute deadline of the cycle that just ran.
    pub fn advance(&mut self) -> u64 {
        self.next_ns += self.period_ns;
        self.next_ns
    }

    pub fn period(&self) -> Duration {
        Duration::from_nanos(self.period_ns)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
