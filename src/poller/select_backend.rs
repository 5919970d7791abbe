// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The `select(2)` lowest-common-denominator fallback. Limited by `FD_SETSIZE`
//! (typically 1024); used only when a caller explicitly requests
//! [`super::PollerBackend::Select`], since `poll`/`epoll`/`kqueue` all outrank it.

use std::collections::HashMap;
use std::mem::MaybeUninit;
use std::os::unix::io::RawFd;

use crate::error::PollError;
use crate::poller::backend::PollBackend;
use crate::poller::types::ReadinessMask;

#[derive(Debug, Default)]
pub(crate) struct SelectBackend {
    desired: HashMap<RawFd, ReadinessMask>,
    ready: Vec<(RawFd, ReadinessMask)>,
    cursor: usize,
}

impl SelectBackend {
    pub(crate) fn new() -> Self { Self::default() }
}

// SAFETY helper: zero-initialize an `fd_set` and add fds one at a time via `FD_SET`.
fn new_fd_set() -> libc::fd_set {
    unsafe {
        let mut set = MaybeUninit::<libc::fd_set>::uninit();
        libc::FD_ZERO(set.as_mut_ptr());
        set.assume_init()
    }
}

impl PollBackend for SelectBackend {
    fn add(&mut self, fd: RawFd, mask: ReadinessMask) -> Result<(), PollError> {
        if fd < 0 || fd as usize >= libc::FD_SETSIZE {
            return Err(PollError::BadDescriptor { fd });
        }
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
        let mut read_set = new_fd_set();
        let mut write_set = new_fd_set();
        let mut err_set = new_fd_set();
        let mut maxfd = -1;

        for (&fd, &mask) in &self.desired {
            if mask.contains(ReadinessMask::READ) {
                unsafe { libc::FD_SET(fd, &mut read_set) };
            }
            if mask.contains(ReadinessMask::WRITE) {
                unsafe { libc::FD_SET(fd, &mut write_set) };
            }
            unsafe { libc::FD_SET(fd, &mut err_set) };
            maxfd = maxfd.max(fd);
        }

        let mut timeout_storage;
        let timeout_ptr = if timeout_ms < 0 {
            std::ptr::null_mut()
        } else {
            timeout_storage = libc::timeval {
                tv_sec: timeout_ms / 1000,
                tv_usec: (timeout_ms % 1000) * 1000,
            };
            std::ptr::addr_of_mut!(timeout_storage)
        };

        // SAFETY: all three sets are valid `fd_set`s built above; `maxfd + 1` bounds
        // the scan as `select(2)` requires.
        let rc = unsafe {
            libc::select(maxfd + 1, &mut read_set, &mut write_set, &mut err_set, timeout_ptr)
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
        for (&fd, _) in &self.desired {
            let mut mask = ReadinessMask::NONE;
            if unsafe { libc::FD_ISSET(fd, &read_set) } {
                mask = mask.union(ReadinessMask::READ);
            }
            if unsafe { libc::FD_ISSET(fd, &write_set) } {
                mask = mask.union(ReadinessMask::WRITE);
            }
            if unsafe { libc::FD_ISSET(fd, &err_set) } {
                mask = mask.union(ReadinessMask::ERROR);
            }
            if !mask.is_empty() {
                self.ready.push((fd, mask));
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

    fn name(&self) -> &'static str { "select" }
}
