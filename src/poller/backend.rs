// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::os::unix::io::RawFd;

use crate::error::PollError;
use crate::poller::types::{Event, ReadinessMask};

/// The uniform operation set every kernel readiness backend implements.
///
/// [`super::PollHandle`] is the public-facing type; it owns a `Box<dyn PollBackend>`
/// plus the per-fd table used to enforce observed-mask filtering and lazy stale-fd
/// cleanup uniformly across backends, so individual `PollBackend` impls only need to
/// talk to their kernel mechanism.
pub trait PollBackend: std::fmt::Debug {
    /// Registers or updates `fd`'s desired mask with the kernel mechanism.
    fn add(&mut self, fd: RawFd, mask: ReadinessMask) -> Result<(), PollError>;

    /// Deregisters `fd`. A no-op if `fd` was never added.
    fn remove(&mut self, fd: RawFd);

    /// Updates the desired mask for an already-added `fd`.
    fn set_mask(&mut self, fd: RawFd, mask: ReadinessMask) -> Result<(), PollError>;

    /// Blocks up to `timeout_ms` (negative = forever, zero = poll-only) and fills the
    /// backend's internal ready-event batch. Returns the number of ready descriptors.
    fn wait(&mut self, timeout_ms: i64) -> Result<usize, PollError>;

    /// Drains one event from the batch produced by the most recent [`Self::wait`],
    /// `None` once exhausted. The returned `observed_mask` is the *raw* kernel report -
    /// [`super::PollHandle::next_event`] is responsible for filtering it against the
    /// registered desired mask.
    fn next_event(&mut self) -> Option<(RawFd, ReadinessMask)>;

    /// A short, stable name for diagnostics (e.g. `"epoll"`, `"select"`).
    fn name(&self) -> &'static str;
}
