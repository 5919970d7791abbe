// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! A monotonic clock that never regresses, even across OS clock-source hiccups.
//!
//! Timing-wheel correctness depends on monotonicity: wall-clock jumps (NTP step,
//! DST, user adjustment) must never corrupt timer ordering. [`Clock`] is built on
//! [`std::time::Instant`], which is documented to be monotonic on every platform Rust
//! targets, so the "falls back to wall-clock only if no monotonic source exists"
//! clause of `spec.md` §4.1 never triggers on a hosted std target - it's recorded here
//! for contract completeness and because [`Clock::now_real_ms`] is a convenience for
//! log timestamps, not for scheduler math.

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Monotonic millisecond/microsecond clock pinned to a per-process epoch.
///
/// The first call to any `Clock` method establishes `epoch`. [`crate::scheduler::Scheduler`]'s
/// tick positions are defined relative to whatever epoch the `Clock` used to hand it
/// `now_ms()` at `init` time - the `Clock` itself does not need to be shared to
/// preserve that relationship, only monotonic.
#[derive(Debug, Default, Clone, Copy)]
pub struct Clock;

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

fn real_epoch() -> SystemTime {
    static EPOCH: OnceLock<SystemTime> = OnceLock::new();
    *EPOCH.get_or_init(SystemTime::now)
}

impl Clock {
    /// Returns a monotonically non-decreasing millisecond count since the first call
    /// to any `Clock` method in this process. Two successive calls on the same thread
    /// never return a lower value.
    #[must_use]
    pub fn now_ms() -> u64 {
        let elapsed = Instant::now().saturating_duration_since(epoch());
        u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
    }

    /// Same clock, microsecond resolution.
    #[must_use]
    pub fn now_us() -> u64 {
        let elapsed = Instant::now().saturating_duration_since(epoch());
        u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
    }

    /// Wall-clock milliseconds since the Unix epoch, for log timestamps only. Never
    /// used for scheduler math - subject to clock jumps.
    #[must_use]
    pub fn now_real_ms() -> u64 {
        let _ = real_epoch();
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_never_regresses() {
        let a = Clock::now_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = Clock::now_ms();
        assert!(b >= a);
    }

    #[test]
    fn now_us_is_finer_grained_than_now_ms() {
        let a = Clock::now_us();
        let b = Clock::now_us();
        assert!(b >= a);
    }
}
