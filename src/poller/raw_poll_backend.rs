// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The POSIX `poll(2)` fallback backend - used when neither `epoll` nor `kqueue` is
//! available, or when a caller explicitly asks for [`super::PollerBackend::Poll`].

use std::collections::HashMap;
use std::os::unix::io::RawFd;

use crate::error::PollError;
use crate::poller::backend::PollBackend;
use crate::poller::types::ReadinessMask;

fn events_for(mask: ReadinessMask) -> libc::c_short {
    let mut ev = 0;
    if mask.contains(ReadinessMask::READ) {
        ev |= libc::POLLIN;
    }
    if mask.contains(ReadinessMask::WRITE) {
        ev |= libc::POLLOUT;
    }
    ev as libc::c_short
}

fn mask_from_revents(revents: libc::c_short) -> ReadinessMask {
    let revents = i32::from(revents);
    let mut mask = ReadinessMask::NONE;
    if revents & libc::POLLIN != 0 {
        mask = mask.union(ReadinessMask::READ);
    }
    if revents & libc::POLLOUT != 0 {
        mask = mask.union(ReadinessMask::WRITE);
    }
    if revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        mask = mask.union(ReadinessMask::ERROR);
    }
    mask
}

#[derive(Debug, Default)]
pub(crate) struct RawPollBackend {
    desired: HashMap<RawFd, ReadinessMask>,
    ready: Vec<(RawFd, ReadinessMask)>,
    cursor: usize,
}

impl RawPollBackend {
    pub(crate) fn new() -> Self { Self::default() }
}

impl PollBackend for RawPollBackend {
    fn add(&mut self, fd: RawFd, mask: ReadinessMask) -> Result<(), PollError> {
        self.desired.insert(fd, mask);
        Ok(())
    }

    fn remove(&mut self, fd: RawFd) { self.desired.remove(&fd); }

    fn set_mask(&mut self, fd: RawFd, mask: ReadinessMask) -> Result<(), PollError> {
        if let std::collections::hash_map::Entry::Occupied(mut e) = self.desired.entry(fd) {
            e.insert(mask);
            Ok(())
        } else {
            Err(PollError::NotFound { fd })
        }
    }

    fn wait(&mut self, timeout_ms: i64) -> Result<usize, PollError> {
        let mut pollfds: Vec<libc::pollfd> = self
            .desired
            .iter()
            .map(|(&fd, &mask)| libc::pollfd { fd, events: events_for(mask), revents: 0 })
            .collect();

        let timeout = if timeout_ms < 0 { -1 } else { timeout_ms.min(i32::MAX as i64) as i32 };

        // SAFETY: `pollfds` is a valid, exclusively-owned buffer of the length passed.
        let rc = unsafe {
            libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout)
        };

        if rc < 0 {
            let err = std::io::Error::last_os_error();
            return if err.kind() == std::io::ErrorKind::Interrupted {
                Ok(0)
            } else {
                Err(PollError::Io(err))
            };
        }

        self.ready.clear();
        self.cursor = 0;
        for pfd in &pollfds {
            if pfd.revents != 0 {
                self.ready.push((pfd.fd, mask_from_revents(pfd.revents)));
            }
        }
        Ok(self.ready.len())
    }

    fn next_event(&mut self) -> Option<(RawFd, ReadinessMask)> {
        let ev = self.ready.get(self.cursor).copied();
        if ev.is_some() {
            self.cursor += 1;
        }
        ev
    }

    fn name(&self) -> &'static str { "poll" }
}
