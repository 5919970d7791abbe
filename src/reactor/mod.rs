// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The thin loop that glues [`Clock`], [`Scheduler`], and [`PollHandle`] together.
//!
//! This module owns no dispatch table - it doesn't know what an fd's readiness or a
//! timer's fire means to the embedder. [`Reactor::turn`] runs exactly one iteration of
//! the wait/advance/drain cycle and hands back the events that became ready during it;
//! wiring those events (and the timer callbacks armed directly on
//! [`Reactor::scheduler_mut`]) to application behavior is left to the caller, same as
//! the split between `rrt.rs` and its `RRTWorker` trait upstream.

use tracing::trace;

use crate::clock::Clock;
use crate::error::{BuildError, PollError};
use crate::poller::{Event, PollHandle, PollerBackend};
use crate::scheduler::Scheduler;

/// Tuning knobs for a [`Reactor`]. `Default` picks the auto-selected native poll
/// backend, a 1ms scheduler tick, and an unbounded maximum wait.
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// The [`Scheduler`]'s tick granularity.
    pub interval_ms: u64,
    /// Which [`PollerBackend`] to build; `Auto` picks the best one available.
    pub poll_backend: PollerBackend,
    /// Passed through to [`PollHandle::create`] as a capacity hint.
    pub poll_capacity_hint: i32,
    /// Upper bound on how long a single [`Reactor::turn`] may block in
    /// [`PollHandle::wait`], even if no timer is armed or the nearest one is further
    /// out than this. Keeps the loop responsive to external shutdown signals instead
    /// of sleeping indefinitely when nothing is scheduled.
    pub max_wait_ms: u64,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        ReactorConfig {
            interval_ms: 10,
            poll_backend: PollerBackend::Auto,
            poll_capacity_hint: 1024,
            max_wait_ms: 1000,
        }
    }
}

/// Builds a [`Reactor`] from a [`ReactorConfig`].
#[derive(Debug, Clone, Default)]
pub struct ReactorBuilder {
    config: ReactorConfig,
}

impl ReactorBuilder {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn config(mut self, config: ReactorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn interval_ms(mut self, interval_ms: u64) -> Self {
        self.config.interval_ms = interval_ms;
        self
    }

    #[must_use]
    pub fn poll_backend(mut self, backend: PollerBackend) -> Self {
        self.config.poll_backend = backend;
        self
    }

    #[must_use]
    pub fn max_wait_ms(mut self, max_wait_ms: u64) -> Self {
        self.config.max_wait_ms = max_wait_ms;
        self
    }

    /// # Errors
    /// [`BuildError::Poller`] if the configured backend fails to initialize (for
    /// example, an explicit `DevPoll`/`PollSet` request on a build that doesn't
    /// support it).
    pub fn build(self) -> Result<Reactor, BuildError> {
        let poller = PollHandle::create(self.config.poll_backend, self.config.poll_capacity_hint)
            .map_err(BuildError::Poller)?;
        let now = Clock::now_ms();
        let scheduler = Scheduler::init(now, self.config.interval_ms);
        Ok(Reactor { poller, scheduler, max_wait_ms: self.config.max_wait_ms })
    }
}

/// `Clock → Scheduler::advance → PollHandle::wait → drain next_event` in one package.
/// Owned by exactly one logical thread, same as the pieces it glues together.
#[derive(Debug)]
pub struct Reactor {
    poller: PollHandle,
    scheduler: Scheduler,
    max_wait_ms: u64,
}

impl Reactor {
    /// Direct access to the poller, to register/deregister descriptors.
    pub fn poller_mut(&mut self) -> &mut PollHandle { &mut self.poller }

    /// Direct access to the scheduler, to arm/cancel timers.
    pub fn scheduler_mut(&mut self) -> &mut Scheduler { &mut self.scheduler }

    /// Runs one iteration: samples the clock, advances the scheduler (firing any due
    /// timers synchronously before this call returns), waits for readiness up to the
    /// next timer deadline (clamped to `max_wait_ms` if configured), and returns every
    /// event that became ready during the wait.
    ///
    /// # Errors
    /// Propagates [`PollError`] from the underlying [`PollHandle::wait`].
    pub fn turn(&mut self) -> Result<Vec<Event>, PollError> {
        let now = Clock::now_ms();
        self.scheduler.advance(now);

        let wait_ms = self.compute_wait_ms(now);
        trace!(wait_ms, "reactor turn: waiting for readiness");
        let ready = self.poller.wait(wait_ms)?;

        let mut events = Vec::with_capacity(ready);
        while let Some(event) = self.poller.next_event() {
            events.push(event);
        }
        Ok(events)
    }

    fn compute_wait_ms(&self, now: u64) -> i64 {
        let until_next_timer =
            self.scheduler.next_fire_ms().map_or(self.max_wait_ms, |deadline| deadline.saturating_sub(now));
        let bounded = until_next_timer.min(self.max_wait_ms);
        i64::try_from(bounded).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = ReactorConfig::default();
        assert_eq!(config.interval_ms, 10);
        assert_eq!(config.poll_backend, PollerBackend::Auto);
        assert_eq!(config.poll_capacity_hint, 1024);
        assert_eq!(config.max_wait_ms, 1000);
    }

    #[test]
    fn builder_overrides_compose() {
        let reactor = ReactorBuilder::new()
            .interval_ms(5)
            .poll_backend(PollerBackend::Poll)
            .max_wait_ms(1000)
            .build()
            .expect("poll(2) backend must always be constructible");
        assert_eq!(reactor.scheduler.interval_ms(), 5);
    }

    #[test]
    fn turn_fires_due_timers_before_waiting() {
        let mut reactor = ReactorBuilder::new()
            .interval_ms(1)
            .poll_backend(PollerBackend::Poll)
            .max_wait_ms(0)
            .build()
            .unwrap();
        let fired = std::rc::Rc::new(std::cell::RefCell::new(false));
        let fired_in_closure = std::rc::Rc::clone(&fired);
        reactor.scheduler_mut().arm(0, 1, move |_sched, _handle| {
            *fired_in_closure.borrow_mut() = true;
        });
        // A zero-ms period rounds up to one tick; give the clock a moment to pass it.
        std::thread::sleep(std::time::Duration::from_millis(2));
        reactor.turn().unwrap();
        assert!(*fired.borrow());
    }
}
