// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use tracing::trace;

use crate::error::StaleHandle;
use crate::scheduler::entry::{Callback, EntryState, Level, TimerEntry, TimerHandle};

const NEAR_SLOTS: usize = 256;
const FAR_SLOTS: usize = 64;
const FAR_LEVELS: usize = 4;

enum Slot {
    Free { next_free: Option<u32>, next_generation: u32 },
    Occupied(TimerEntry),
}

/// A hierarchical (cascading) timing wheel: one near wheel of 256 slots ticking every
/// `interval_ms`, backed by four far wheels of 64 slots each that cascade down as the
/// near wheel wraps. See `spec.md` §4.5 and §9 for the algorithm this implements.
///
/// Entries are stored in an arena (`arena`) rather than behind individually-owned
/// pointers; wheel slots hold the arena index of their list head, and each
/// [`TimerEntry`] carries `prev`/`next` arena indices for its slot's doubly-linked
/// list, giving O(1) insert, detach-whole-slot, and cancel-by-handle.
pub struct Scheduler {
    /// The `now_ms` passed to `init`; `jiffy * interval_ms + epoch_ms` is the exact,
    /// drift-free wall-clock time of tick `jiffy`.
    epoch_ms: u64,
    current_time_ms: u64,
    interval_ms: u64,
    jiffies: u64,
    arena: Vec<Slot>,
    free_head: Option<u32>,
    wheel_near: Box<[Option<u32>; NEAR_SLOTS]>,
    wheel_near_tail: Box<[Option<u32>; NEAR_SLOTS]>,
    wheel_far: Box<[[Option<u32>; FAR_SLOTS]; FAR_LEVELS]>,
    wheel_far_tail: Box<[[Option<u32>; FAR_SLOTS]; FAR_LEVELS]>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("current_time_ms", &self.current_time_ms)
            .field("interval_ms", &self.interval_ms)
            .field("jiffies", &self.jiffies)
            .field("armed_entries", &self.arena.len())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Builds a scheduler whose clock starts at `now_ms`, ticking every `interval_ms`.
    /// `interval_ms` is clamped to at least 1 - a zero tick interval cannot advance.
    #[must_use]
    pub fn init(now_ms: u64, interval_ms: u64) -> Self {
        Scheduler {
            epoch_ms: now_ms,
            current_time_ms: now_ms,
            interval_ms: interval_ms.max(1),
            jiffies: 0,
            arena: Vec::new(),
            free_head: None,
            wheel_near: Box::new([None; NEAR_SLOTS]),
            wheel_near_tail: Box::new([None; NEAR_SLOTS]),
            wheel_far: Box::new([[None; FAR_SLOTS]; FAR_LEVELS]),
            wheel_far_tail: Box::new([[None; FAR_SLOTS]; FAR_LEVELS]),
        }
    }

    /// The tick granularity this scheduler was built with.
    #[must_use]
    pub fn interval_ms(&self) -> u64 { self.interval_ms }

    /// The `now_ms` passed to the most recent [`Self::advance`] call (or `init`'s
    /// `now_ms` if `advance` has never been called). While a tick is dispatching its
    /// slot, this instead reports that tick's own aligned time, so a firing callback
    /// always sees the wall-clock time its deadline corresponds to.
    #[must_use]
    pub fn current_time_ms(&self) -> u64 { self.current_time_ms }

    fn period_ms_to_jiffies(&self, period_ms: u64) -> u64 {
        period_ms.div_ceil(self.interval_ms).max(1)
    }

    /// Inserts `entry` into a recycled or fresh arena slot, stamping it with the
    /// correct generation, and returns `(index, generation)`.
    fn alloc_slot(&mut self, mut entry: TimerEntry) -> (u32, u32) {
        match self.free_head {
            Some(index) => {
                let next_generation = match &self.arena[index as usize] {
                    Slot::Free { next_free: _, next_generation } => *next_generation,
                    Slot::Occupied(_) => unreachable!("free list points at an occupied slot"),
                };
                self.free_head = match &self.arena[index as usize] {
                    Slot::Free { next_free, .. } => *next_free,
                    Slot::Occupied(_) => unreachable!(),
                };
                entry.generation = next_generation;
                self.arena[index as usize] = Slot::Occupied(entry);
                (index, next_generation)
            }
            None => {
                let index = self.arena.len() as u32;
                entry.generation = 0;
                self.arena.push(Slot::Occupied(entry));
                (index, 0)
            }
        }
    }

    fn entry(&self, index: u32) -> &TimerEntry {
        match &self.arena[index as usize] {
            Slot::Occupied(e) => e,
            Slot::Free { .. } => unreachable!("dangling arena index"),
        }
    }

    fn entry_mut(&mut self, index: u32) -> &mut TimerEntry {
        match &mut self.arena[index as usize] {
            Slot::Occupied(e) => e,
            Slot::Free { .. } => unreachable!("dangling arena index"),
        }
    }

    fn resolve(&self, handle: TimerHandle) -> Result<u32, StaleHandle> {
        let index = handle.index;
        if index as usize >= self.arena.len() {
            return Err(StaleHandle { index, expected: 0, got: handle.generation });
        }
        match &self.arena[index as usize] {
            Slot::Occupied(e) if e.generation == handle.generation => Ok(index),
            Slot::Occupied(e) => {
                Err(StaleHandle { index, expected: e.generation, got: handle.generation })
            }
            Slot::Free { next_generation, .. } => {
                Err(StaleHandle { index, expected: *next_generation, got: handle.generation })
            }
        }
    }

    fn slot_head_mut(&mut self, level: Level, slot: usize) -> &mut Option<u32> {
        match level {
            Level::Near => &mut self.wheel_near[slot],
            Level::Far(k) => &mut self.wheel_far[k][slot],
        }
    }

    fn slot_tail_mut(&mut self, level: Level, slot: usize) -> &mut Option<u32> {
        match level {
            Level::Near => &mut self.wheel_near_tail[slot],
            Level::Far(k) => &mut self.wheel_far_tail[k][slot],
        }
    }

    /// Links arena index `index` onto the **tail** of its target slot's list, so
    /// dispatch (which walks head-to-tail) fires entries in the order they were
    /// inserted - `spec.md` §4.5 Ordering, mirroring `list_add_tail` upstream.
    fn link(&mut self, index: u32, level: Level, slot: usize) {
        let old_tail = *self.slot_tail_mut(level, slot);
        {
            let e = self.entry_mut(index);
            e.prev = old_tail;
            e.next = None;
            e.location = Some((level, slot));
        }
        match old_tail {
            Some(tail) => self.entry_mut(tail).next = Some(index),
            None => *self.slot_head_mut(level, slot) = Some(index),
        }
        *self.slot_tail_mut(level, slot) = Some(index);
    }

    /// Unlinks arena index `index` from whichever slot it's currently in, if any.
    fn unlink(&mut self, index: u32) {
        let (prev, next, location) = {
            let e = self.entry(index);
            (e.prev, e.next, e.location)
        };
        let Some((level, slot)) = location else { return };
        match prev {
            Some(p) => self.entry_mut(p).next = next,
            None => *self.slot_head_mut(level, slot) = next,
        }
        match next {
            Some(n) => self.entry_mut(n).prev = prev,
            None => *self.slot_tail_mut(level, slot) = prev,
        }
        let e = self.entry_mut(index);
        e.prev = None;
        e.next = None;
        e.location = None;
    }

    /// Detaches an entire slot's list at once (for cascade/dispatch), returning its
    /// head index. Clears both the head and tail pointers - `take()`ing only the head
    /// would leave the tail pointer dangling at a soon-to-be-recycled arena index.
    fn take_slot(&mut self, level: Level, slot: usize) -> Option<u32> {
        *self.slot_tail_mut(level, slot) = None;
        self.slot_head_mut(level, slot).take()
    }

    /// Chooses the wheel slot for an entry whose absolute fire time is `target_jiffy`,
    /// given the scheduler is currently at `now_jiffies`. Mirrors the classic
    /// cascading-wheel placement: `r < 256` near, `r < 256*64` far level 0, and so on.
    fn place_for(now_jiffies: u64, target_jiffy: u64) -> (Level, usize) {
        let r = target_jiffy.saturating_sub(now_jiffies);
        if r < NEAR_SLOTS as u64 {
            (Level::Near, (target_jiffy & 0xFF) as usize)
        } else if r < (NEAR_SLOTS * FAR_SLOTS) as u64 {
            (Level::Far(0), ((target_jiffy >> 8) & 0x3F) as usize)
        } else if r < (NEAR_SLOTS * FAR_SLOTS * FAR_SLOTS) as u64 {
            (Level::Far(1), ((target_jiffy >> 14) & 0x3F) as usize)
        } else if r < (NEAR_SLOTS * FAR_SLOTS * FAR_SLOTS * FAR_SLOTS) as u64 {
            (Level::Far(2), ((target_jiffy >> 20) & 0x3F) as usize)
        } else {
            // Beyond the top wheel's reach; clamp into level 3. A period this long
            // will cascade down repeatedly until its real deadline is close, same as
            // any other far-wheel entry - see the cascade boundary test in `mod.rs`.
            (Level::Far(3), ((target_jiffy >> 26) & 0x3F) as usize)
        }
    }

    /// Arms a new periodic (or one-shot) timer. `period_ms` is rounded up to at least
    /// one tick. `repeat_count == 0` means "fire forever until cancelled"; otherwise
    /// the entry self-cancels after firing that many times.
    pub fn arm(
        &mut self,
        period_ms: u64,
        repeat_count: u32,
        callback: impl FnMut(&mut Scheduler, TimerHandle) + 'static,
    ) -> TimerHandle {
        let period_jiffies = self.period_ms_to_jiffies(period_ms);
        let next_fire_jiffy = self.jiffies + period_jiffies;
        let entry = TimerEntry {
            generation: 0,
            state: EntryState::Armed,
            callback: Some(Box::new(callback) as Callback),
            period_jiffies,
            repeat_count,
            next_fire_jiffy,
            location: None,
            prev: None,
            next: None,
        };
        let (index, generation) = self.alloc_slot(entry);
        let (level, slot) = Self::place_for(self.jiffies, next_fire_jiffy);
        self.link(index, level, slot);
        TimerHandle { index, generation }
    }

    /// Cancels an armed entry. Safe to call on an already-idle entry (a no-op) and,
    /// crucially, safe to call from within the entry's own callback - the tick step
    /// checks the entry's state after the callback returns before deciding whether to
    /// reinsert it, so a self-cancelling callback never gets re-armed.
    pub fn cancel(&mut self, handle: TimerHandle) -> Result<(), StaleHandle> {
        let index = self.resolve(handle)?;
        if self.entry(index).state == EntryState::Armed {
            self.unlink(index);
        }
        self.entry_mut(index).state = EntryState::Idle;
        self.entry_mut(index).callback = None;
        self.free_entry(index);
        Ok(())
    }

    /// Recycles `index`'s arena slot, bumping its generation so any handle still
    /// referring to the old occupant is rejected by [`Self::resolve`] as stale.
    fn free_entry(&mut self, index: u32) {
        let next_generation = self.entry(index).generation.wrapping_add(1);
        self.arena[index as usize] =
            Slot::Free { next_free: self.free_head, next_generation };
        self.free_head = Some(index);
    }

    /// The number of jiffies (ticks) that have elapsed so far. Exposed for tests and
    /// for `Reactor`'s wait-time computation.
    #[must_use]
    pub fn jiffies(&self) -> u64 { self.jiffies }

    /// Advances the scheduler's notion of time to `now_ms`, running one tick step for
    /// every whole `interval_ms` that has elapsed since `init`. Firing entries are
    /// dispatched synchronously, in slot order, before this call returns. After
    /// returning, `current_time_ms() == now_ms` exactly, per `spec.md` §4.5 - any
    /// sub-tick remainder is not dropped, since tick boundaries are computed from the
    /// fixed `epoch_ms` rather than by accumulating `interval_ms` steps.
    pub fn advance(&mut self, now_ms: u64) {
        if now_ms <= self.current_time_ms {
            return;
        }
        let target_ticks = (now_ms - self.epoch_ms) / self.interval_ms;
        while self.jiffies < target_ticks {
            self.tick();
        }
        self.current_time_ms = now_ms;
    }

    fn tick(&mut self) {
        self.jiffies += 1;
        self.current_time_ms = self.epoch_ms + self.jiffies * self.interval_ms;
        let near_idx = (self.jiffies & 0xFF) as usize;
        if near_idx == 0 {
            let mut level = 0usize;
            loop {
                let far_idx = ((self.jiffies >> (8 + 6 * level)) & 0x3F) as usize;
                self.cascade(level, far_idx);
                if far_idx != 0 || level == FAR_LEVELS - 1 {
                    break;
                }
                level += 1;
            }
        }
        self.dispatch_slot(near_idx);
    }

    /// Detaches every entry in far wheel `level`'s slot `slot` and reinserts each one
    /// at the wheel position appropriate for its (now much closer) absolute deadline.
    fn cascade(&mut self, level: usize, slot: usize) {
        let mut cursor = self.take_slot(Level::Far(level), slot);
        while let Some(index) = cursor {
            let next = self.entry(index).next;
            cursor = next;
            let e = self.entry_mut(index);
            e.prev = None;
            e.next = None;
            e.location = None;
            let target = self.entry(index).next_fire_jiffy;
            let (new_level, new_slot) = Self::place_for(self.jiffies, target);
            trace!(
                index,
                from_level = level,
                from_slot = slot,
                new_slot,
                is_near = matches!(new_level, Level::Near),
                "cascading timer entry"
            );
            self.link(index, new_level, new_slot);
        }
    }

    /// Detaches every entry in the near wheel's `slot` and fires each one.
    fn dispatch_slot(&mut self, slot: usize) {
        let mut cursor = self.take_slot(Level::Near, slot);
        while let Some(index) = cursor {
            let next = self.entry(index).next;
            cursor = next;
            {
                let e = self.entry_mut(index);
                e.prev = None;
                e.next = None;
                e.location = None;
                e.state = EntryState::Firing;
            }
            self.fire(index);
        }
    }

    fn fire(&mut self, index: u32) {
        let mut callback = self.entry_mut(index).callback.take();
        let handle = TimerHandle { index, generation: self.entry(index).generation };
        if let Some(cb) = callback.as_mut() {
            cb(self, handle);
        }
        // The callback may have cancelled `index` (freeing its arena slot and
        // invalidating `handle`'s generation) or armed brand-new entries that reused
        // this very index. Only touch the slot again if it's still the same entry,
        // still `Firing`, and still owns a callback to hand back.
        if index as usize >= self.arena.len() {
            return;
        }
        let still_ours = matches!(
            &self.arena[index as usize],
            Slot::Occupied(e) if e.generation == handle.generation && e.state == EntryState::Firing
        );
        if !still_ours {
            return;
        }
        self.entry_mut(index).callback = callback;

        let repeats_left = self.entry(index).repeat_count;
        if repeats_left == 1 {
            self.entry_mut(index).state = EntryState::Idle;
            self.entry_mut(index).callback = None;
            self.free_entry(index);
            return;
        }
        if repeats_left > 1 {
            self.entry_mut(index).repeat_count = repeats_left - 1;
        }
        let period = self.entry(index).period_jiffies;
        let target = self.jiffies + period;
        self.entry_mut(index).next_fire_jiffy = target;
        self.entry_mut(index).state = EntryState::Armed;
        let (level, slot) = Self::place_for(self.jiffies, target);
        self.link(index, level, slot);
    }

    /// Repeats remaining for `handle` before it self-cancels, `0` meaning "forever".
    /// Lets a callback (or anything else holding the handle) tell whether an entry is
    /// about to fire for the last time, mirroring the upstream `Timer::remain()`.
    pub fn remaining_repeats(&self, handle: TimerHandle) -> Result<u32, StaleHandle> {
        let index = self.resolve(handle)?;
        Ok(self.entry(index).remaining_repeats())
    }

    /// The absolute wall-clock time (in the same units passed to `init`/`advance`) at
    /// which the next armed entry is due, or `None` if nothing is armed. Scans all
    /// 256 + 4*64 slots; cheap relative to the syscalls the reactor loop otherwise
    /// performs each iteration.
    #[must_use]
    pub fn next_fire_ms(&self) -> Option<u64> {
        let mut earliest: Option<u64> = None;
        let mut consider = |jiffy: u64, earliest: &mut Option<u64>| {
            if earliest.is_none_or(|e| jiffy < e) {
                *earliest = Some(jiffy);
            }
        };
        for head in self.wheel_near.iter() {
            if let Some(index) = head {
                consider(self.entry(*index).next_fire_jiffy, &mut earliest);
            }
        }
        for level in self.wheel_far.iter() {
            for head in level.iter() {
                if let Some(index) = head {
                    consider(self.entry(*index).next_fire_jiffy, &mut earliest);
                }
            }
        }
        earliest.map(|jiffy| self.epoch_ms + jiffy * self.interval_ms)
    }
}
