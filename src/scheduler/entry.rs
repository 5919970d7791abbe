// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use crate::scheduler::Scheduler;

/// A stable reference to an armed (or previously-armed) timer entry.
///
/// Rather than the intrusive `prev`/`next` pointers the upstream C implementation uses,
/// entries live in an arena owned by the [`Scheduler`] and are addressed by index plus
/// a generation counter - re-using a recycled slot bumps its generation, so a stale
/// handle is rejected with [`crate::error::StaleHandle`] instead of silently operating
/// on an unrelated entry. See `spec.md` §9's Design Notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// Which wheel a [`TimerEntry`] is currently linked into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Level {
    Near,
    Far(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryState {
    Idle,
    Armed,
    /// Mid-dispatch: the entry has been detached from its slot and its callback is
    /// running. If the callback cancels the entry, the state is flipped away from
    /// `Firing` so the tick step knows not to reinsert it.
    Firing,
}

pub(crate) type Callback = Box<dyn FnMut(&mut Scheduler, TimerHandle) + 'static>;

/// `{callback, user_context (captured in the closure), repeat_count, period_ms,
/// next_fire_ms, slot_link, state}` from `spec.md` §3, minus the intrusive
/// `slot_link` - that's represented by `prev`/`next` arena indices plus `location`.
pub(crate) struct TimerEntry {
    pub(crate) generation: u32,
    pub(crate) state: EntryState,
    pub(crate) callback: Option<Callback>,
    /// `period_ms` pre-divided by `interval_ms`, rounded up to at least 1.
    pub(crate) period_jiffies: u64,
    /// `0` means fire forever until cancelled.
    pub(crate) repeat_count: u32,
    pub(crate) next_fire_jiffy: u64,
    pub(crate) location: Option<(Level, usize)>,
    pub(crate) prev: Option<u32>,
    pub(crate) next: Option<u32>,
}

impl std::fmt::Debug for TimerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEntry")
            .field("generation", &self.generation)
            .field("state", &self.state)
            .field("period_jiffies", &self.period_jiffies)
            .field("repeat_count", &self.repeat_count)
            .field("next_fire_jiffy", &self.next_fire_jiffy)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl TimerEntry {
    /// Repeats remaining before this entry auto-cancels, `0` meaning "forever".
    /// Named for parity with the upstream `Timer::remain()` used by callbacks to tell
    /// whether they're firing for the last time.
    #[must_use]
    pub(crate) fn remaining_repeats(&self) -> u32 { self.repeat_count }
}
