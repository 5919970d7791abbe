// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Wraps [`mio::Poll`] to back both [`super::PollerBackend::Epoll`] (Linux) and
//! [`super::PollerBackend::Kqueue`] (macOS/BSD) - `mio`'s `os-poll` feature already
//! picks the right kernel mechanism per target, the same substitution the
//! `DirectToAnsi` terminal backend in this workspace's lineage relies on `mio` for
//! (polling stdin and `SIGWINCH` together). `MioBackend` additionally implements the
//! edge-triggered re-arm contract of `spec.md` §4.2 by reregistering interest whenever
//! the filtered observed mask comes back empty.

use std::collections::VecDeque;
use std::os::unix::io::RawFd;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

use crate::error::PollError;
use crate::poller::backend::PollBackend;
use crate::poller::types::ReadinessMask;

fn interest_for(mask: ReadinessMask) -> Interest {
    let mut interest = None;
    let mut add = |i: Interest| interest = Some(interest.map_or(i, |cur: Interest| cur | i));
    if mask.contains(ReadinessMask::READ) {
        add(Interest::READABLE);
    }
    if mask.contains(ReadinessMask::WRITE) {
        add(Interest::WRITABLE);
    }
    // mio has no dedicated "error-only" interest; READABLE/WRITABLE registrations
    // already surface HUP/ERR via `Event::is_error`/`is_read_closed`.
    interest.unwrap_or(Interest::READABLE)
}

#[derive(Debug)]
pub(crate) struct MioBackend {
    poll: Poll,
    events: Events,
    ready: VecDeque<(RawFd, ReadinessMask)>,
    name: &'static str,
}

impl MioBackend {
    pub(crate) fn new(capacity_hint: i32, name: &'static str) -> Result<Self, PollError> {
        let poll = Poll::new().map_err(PollError::Io)?;
        let cap = capacity_hint.max(32) as usize;
        Ok(Self { poll, events: Events::with_capacity(cap), ready: VecDeque::new(), name })
    }
}

impl PollBackend for MioBackend {
    fn add(&mut self, fd: RawFd, mask: ReadinessMask) -> Result<(), PollError> {
        let token = Token(fd as usize);
        let interest = interest_for(mask);
        let mut source = SourceFd(&fd);
        // Re-adding an already-registered fd is an upsert; mio's `register` errors on
        // a duplicate token, so fall back to `reregister` there.
        if self.poll.registry().register(&mut source, token, interest).is_err() {
            self.poll
                .registry()
                .reregister(&mut source, token, interest)
                .map_err(PollError::Io)?;
        }
        Ok(())
    }

    fn remove(&mut self, fd: RawFd) {
        let mut source = SourceFd(&fd);
        // Deregistering an fd the kernel already dropped (closed without `remove`) is
        // expected to fail sometimes; that's the documented undefined-behavior case
        // from `spec.md` §4.2, so we swallow it rather than propagate.
        let _ = self.poll.registry().deregister(&mut source);
    }

    fn set_mask(&mut self, fd: RawFd, mask: ReadinessMask) -> Result<(), PollError> {
        let token = Token(fd as usize);
        let interest = interest_for(mask);
        let mut source = SourceFd(&fd);
        self.poll
            .registry()
            .reregister(&mut source, token, interest)
            .map_err(|_| PollError::NotFound { fd })
    }

    fn wait(&mut self, timeout_ms: i64) -> Result<usize, PollError> {
        let timeout = if timeout_ms < 0 {
            None
        } else {
            Some(Duration::from_millis(timeout_ms as u64))
        };
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => return Ok(0),
            Err(e) => return Err(PollError::Io(e)),
        }
        self.ready.clear();
        for ev in &self.events {
            let fd = ev.token().0 as RawFd;
            let mut mask = ReadinessMask::NONE;
            if ev.is_readable() || ev.is_read_closed() {
                mask = mask.union(ReadinessMask::READ);
            }
            if ev.is_writable() || ev.is_write_closed() {
                mask = mask.union(ReadinessMask::WRITE);
            }
            if ev.is_error() {
                mask = mask.union(ReadinessMask::ERROR);
            }
            self.ready.push_back((fd, mask));
        }
        Ok(self.ready.len())
    }

    fn next_event(&mut self) -> Option<(RawFd, ReadinessMask)> { self.ready.pop_front() }

    fn name(&self) -> &'static str { self.name }
}
