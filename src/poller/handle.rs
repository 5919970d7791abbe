// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::collections::HashMap;
use std::os::unix::io::RawFd;

use tracing::{debug, trace, warn};

use crate::error::PollError;
use crate::poller::backend::PollBackend;
use crate::poller::mio_backend::MioBackend;
use crate::poller::raw_poll_backend::RawPollBackend;
use crate::poller::select_backend::SelectBackend;
use crate::poller::types::{Event, FdState, PollerBackend, ReadinessMask};
use crate::poller::unsupported_backend::UnsupportedBackend;

fn native_edge_triggered_name() -> &'static str {
    if cfg!(target_os = "linux") {
        "epoll"
    } else {
        "kqueue"
    }
}

fn create_backend(backend: PollerBackend, capacity_hint: i32) -> Result<Box<dyn PollBackend>, PollError> {
    match backend {
        PollerBackend::Auto => {
            match MioBackend::new(capacity_hint, native_edge_triggered_name()) {
                Ok(b) => {
                    debug!(backend = b.name(), "auto-selected native readiness backend");
                    Ok(Box::new(b))
                }
                Err(e) => {
                    debug!(error = %e, "native backend unavailable, falling back to poll");
                    Ok(Box::new(RawPollBackend::new()))
                }
            }
        }
        PollerBackend::Epoll | PollerBackend::Kqueue => {
            let name = if matches!(backend, PollerBackend::Epoll) { "epoll" } else { "kqueue" };
            Ok(Box::new(MioBackend::new(capacity_hint, name)?))
        }
        PollerBackend::Poll => Ok(Box::new(RawPollBackend::new())),
        PollerBackend::Select => Ok(Box::new(SelectBackend::new())),
        PollerBackend::DevPoll => Ok(Box::new(UnsupportedBackend::unavailable("/dev/poll")?)),
        PollerBackend::PollSet => Ok(Box::new(UnsupportedBackend::unavailable("pollset")?)),
    }
}

/// Owner of kernel poll state: a dense per-fd table mapping descriptor to
/// `{desired_mask, user_cookie}`, plus whichever [`PollBackend`] is driving the
/// underlying kernel mechanism.
///
/// `observed_mask ⊆ desired_mask` is enforced here regardless of what the backend
/// reports, and edge-triggered backends are re-armed by reapplying the registered mask
/// whenever a delivery filters down to nothing - see `spec.md` §4.2.
#[derive(Debug)]
pub struct PollHandle {
    backend: Box<dyn PollBackend>,
    table: HashMap<RawFd, FdState>,
}

impl PollHandle {
    /// `hint` is a capacity estimate; implementations may ignore it.
    ///
    /// # Errors
    /// Returns [`PollError::OutOfResources`] if the kernel refuses to allocate the
    /// poll object (e.g. `DevPoll`/`PollSet` on this build).
    pub fn create(backend: PollerBackend, hint: i32) -> Result<Self, PollError> {
        Ok(Self { backend: create_backend(backend, hint)?, table: HashMap::new() })
    }

    /// Registers `fd` with desired `mask` and an opaque `cookie` returned verbatim on
    /// events. Re-adding an already-registered `fd` updates its mask and cookie.
    ///
    /// # Errors
    /// [`PollError::BadDescriptor`] or [`PollError::OutOfResources`] if the backend
    /// rejects the registration.
    pub fn add(&mut self, fd: RawFd, mask: ReadinessMask, cookie: u64) -> Result<(), PollError> {
        self.backend.add(fd, mask)?;
        self.table.insert(fd, FdState { desired_mask: mask, cookie });
        trace!(fd, ?mask, "registered descriptor");
        Ok(())
    }

    /// Deregisters `fd`. A no-op if `fd` is unknown.
    pub fn remove(&mut self, fd: RawFd) {
        if self.table.remove(&fd).is_some() {
            self.backend.remove(fd);
            trace!(fd, "deregistered descriptor");
        }
    }

    /// Changes the desired mask on an already-added `fd`.
    ///
    /// # Errors
    /// [`PollError::NotFound`] if `fd` was never added.
    pub fn set_mask(&mut self, fd: RawFd, mask: ReadinessMask) -> Result<(), PollError> {
        let state = self.table.get_mut(&fd).ok_or(PollError::NotFound { fd })?;
        self.backend.set_mask(fd, mask)?;
        state.desired_mask = mask;
        Ok(())
    }

    /// Blocks up to `timeout_ms` (negative = forever, zero = poll) and returns the
    /// number of descriptors with ready events.
    ///
    /// # Errors
    /// [`PollError::Io`] on a fatal kernel failure. Signal interruption is swallowed
    /// and reported as zero ready events, matching `spec.md` §7's propagation policy.
    pub fn wait(&mut self, timeout_ms: i64) -> Result<usize, PollError> {
        match self.backend.wait(timeout_ms) {
            Ok(n) => Ok(n),
            Err(PollError::Interrupted) => {
                trace!("wait interrupted by signal, reporting zero ready events");
                Ok(0)
            }
            Err(e) => {
                warn!(error = %e, "poller wait failed");
                Err(e)
            }
        }
    }

    /// Drains one ready event per call, `None` once the batch from the most recent
    /// [`Self::wait`] is exhausted.
    ///
    /// Events for descriptors that have since been [`Self::remove`]d are silently
    /// dropped. Events whose observed mask filters down to empty (either because the
    /// kernel reported bits outside the desired mask, or because an edge-triggered
    /// backend's interest needs reapplying) are also swallowed, after re-arming.
    pub fn next_event(&mut self) -> Option<Event> {
        loop {
            let (fd, raw_mask) = self.backend.next_event()?;
            let Some(state) = self.table.get(&fd) else {
                // Backend reported an fd we've since removed - drop it and let the
                // kernel entry get cleaned up lazily on the backend's own schedule.
                continue;
            };
            let observed = raw_mask.intersection(state.desired_mask);
            if observed.is_empty() {
                let desired = state.desired_mask;
                let _ = self.backend.set_mask(fd, desired);
                continue;
            }
            let cookie = state.cookie;
            return Some(Event { fd, observed_mask: observed, cookie });
        }
    }

    #[cfg(test)]
    pub(crate) fn cookie_for(&self, fd: RawFd) -> Option<u64> {
        self.table.get(&fd).map(|s| s.cookie)
    }
}
