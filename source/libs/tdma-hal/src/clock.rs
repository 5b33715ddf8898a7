// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Time sources for bounded busy-poll loops.
//!
//! Polling never relies on the device to terminate: every loop computes a
//! deadline from [`Clock::now_ns`] and gives up once it passes.

use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use std::sync::Arc;

/// Clock source used for budgeted loops.
pub trait Clock {
    /// Returns the current time in nanoseconds, or `None` if not available.
    fn now_ns(&self) -> Option<u64>;
    /// Called between two polls. Busy-wait loops only hint the CPU; they never yield.
    fn relax(&self);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ns(&self) -> Option<u64> {
        (**self).now_ns()
    }

    fn relax(&self) {
        (**self).relax()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ns(&self) -> Option<u64> {
        (**self).now_ns()
    }

    fn relax(&self) {
        (**self).relax()
    }
}

/// Host clock backed by `std::time::Instant`.
pub struct HostClock {
    start: std::time::Instant,
}

impl HostClock {
    /// Creates a new host clock.
    pub fn new() -> Self {
        Self { start: std::time::Instant::now() }
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for HostClock {
    fn now_ns(&self) -> Option<u64> {
        Some(duration_to_ns(self.start.elapsed()))
    }

    fn relax(&self) {
        core::hint::spin_loop();
    }
}

/// Deterministic synthetic clock: time only moves when someone relaxes or advances it.
pub struct StepClock {
    now: AtomicU64,
    step_ns: u64,
}

impl StepClock {
    /// Creates a clock at t=0 that advances by `step` on every [`Clock::relax`].
    pub fn new(step: Duration) -> Self {
        Self { now: AtomicU64::new(0), step_ns: duration_to_ns(step) }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(duration_to_ns(by), Ordering::SeqCst);
    }

    /// Current synthetic time.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.now.load(Ordering::SeqCst))
    }
}

impl Clock for StepClock {
    fn now_ns(&self) -> Option<u64> {
        Some(self.now.load(Ordering::SeqCst))
    }

    fn relax(&self) {
        self.now.fetch_add(self.step_ns, Ordering::SeqCst);
    }
}

/// Converts a duration to nanoseconds, saturating at `u64::MAX`.
pub fn duration_to_ns(d: Duration) -> u64 {
    d.as_secs().saturating_mul(1_000_000_000).saturating_add(d.subsec_nanos() as u64)
}
