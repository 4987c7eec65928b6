/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Background-service trigger and cooperative shutdown.
//!
//! [`BackgroundTrigger`] is a persistent counting event guarded by one mutex:
//! the signalling side and the waiting side both go through the same lock, so
//! a request raised before the aperiodic dispatcher is parked is retained in
//! the pending count instead of evaporating.  This is the designed-out
//! replacement for a bare condition-variable signal, whose pre-wait
//! notifications are lost.
//!
//! [`ShutdownToken`] is the cooperative cancellation flag every dispatcher
//! checks once per cycle.  Cancelling the run must also call
//! [`BackgroundTrigger::shutdown`] so the aperiodic dispatcher is woken out of
//! its wait and can observe termination.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

// ── ShutdownToken ─────────────────────────────────────────────────────────────

/// Shared cancellation flag: written once by the coordinator, read-only from
/// the dispatchers.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    cancelled: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

// ── BackgroundTrigger ─────────────────────────────────────────────────────────

/// What a completed [`BackgroundTrigger::wait`] observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// A background request was consumed; run the body once.
    Released,
    /// Shutdown was requested and no pending work remains.
    Shutdown,
}

#[derive(Debug, Default)]
struct TriggerState {
    /// Requests raised but not yet consumed.  Near-simultaneous requests
    /// accumulate here; none is ever dropped.
    pending: u64,
    shutdown: bool,
}

/// Guarded counting event releasing the aperiodic dispatcher.
#[derive(Debug, Default)]
pub struct BackgroundTrigger {
    state: Mutex<TriggerState>,
    wakeup: Condvar,
}

impl BackgroundTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recover the guard even if a peer thread panicked while holding the
    /// lock — a poisoned trigger must not deadlock shutdown.
    fn lock(&self) -> MutexGuard<'_, TriggerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Raise one background-service request.  Called by periodic task
    /// threads; never blocks beyond the guard.
    pub fn request(&self) {
        let mut state = self.lock();
        state.pending += 1;
        drop(state);
        self.wakeup.notify_one();
    }

    /// Park until a request is available or shutdown is observed.
    ///
    /// Pending requests are drained before `Shutdown` is reported, so a
    /// request raised just before cancellation is still served.
    pub fn wait(&self) -> Wake {
        let mut state = self.lock();
        loop {
            if state.pending > 0 {
                state.pending -= 1;
                return Wake::Released;
            }
            if state.shutdown {
                return Wake::Shutdown;
            }
            state = self
                .wakeup
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Request termination and wake any parked waiter.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.shutdown = true;
        drop(state);
        self.wakeup.notify_all();
    }

    /// Unconsumed request count (observability / tests).
    pub fn pending(&self) -> u64 {
        self.lock().pending
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
