// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! A uniform readiness-poll abstraction over `select`/`poll`/`epoll`/`kqueue`.
//!
//! [`PollHandle`] owns one kernel poll object and a dense per-fd table. Every backend
//! implements the same [`backend::PollBackend`] trait; `PollHandle` enforces
//! `observed_mask ⊆ desired_mask` and edge-triggered re-arm uniformly on top, so
//! callers never see backend-specific quirks. See `spec.md` §4.2 for the full contract.

mod backend;
mod handle;
mod mio_backend;
mod raw_poll_backend;
mod select_backend;
mod types;
mod unsupported_backend;

pub use handle::PollHandle;
pub use types::{Event, PollerBackend, ReadinessMask};

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;

    use super::*;

    #[test]
    fn mask_filtering_strips_unrequested_bits() {
        let mut mask = ReadinessMask::READ;
        assert!(mask.contains(ReadinessMask::READ));
        assert!(!mask.contains(ReadinessMask::WRITE));
        mask = mask.union(ReadinessMask::WRITE);
        let observed = mask.intersection(ReadinessMask::READ);
        assert_eq!(observed, ReadinessMask::READ);
        assert!(!observed.contains(ReadinessMask::WRITE));
    }

    #[test]
    fn self_wake_delivers_exactly_one_read_event() {
        let (mut tx, rx) = UnixStream::pair().expect("socketpair");
        let rx_fd = rx.as_raw_fd();

        let mut handle = PollHandle::create(PollerBackend::Auto, 8).expect("create poller");
        handle.add(rx_fd, ReadinessMask::READ, 42).expect("add rx");

        tx.write_all(b"x").expect("write wake byte");

        let n = handle.wait(1_000).expect("wait");
        assert!(n >= 1);

        let ev = handle.next_event().expect("one event");
        assert_eq!(ev.fd, rx_fd);
        assert_eq!(ev.cookie, 42);
        assert!(ev.observed_mask.contains(ReadinessMask::READ));
        assert!(handle.next_event().is_none());

        let mut buf = [0u8; 1];
        let mut rx = rx;
        rx.read_exact(&mut buf).expect("drain byte");
    }

    #[test]
    fn adding_same_fd_twice_updates_in_place() {
        let (_tx, rx) = UnixStream::pair().expect("socketpair");
        let rx_fd = rx.as_raw_fd();

        let mut handle = PollHandle::create(PollerBackend::Auto, 8).expect("create poller");
        handle.add(rx_fd, ReadinessMask::READ, 1).expect("first add");
        handle.add(rx_fd, ReadinessMask::READ | ReadinessMask::WRITE, 2).expect("second add");

        assert_eq!(handle.cookie_for(rx_fd), Some(2));
    }

    #[test]
    fn removing_unknown_fd_is_a_no_op() {
        let mut handle = PollHandle::create(PollerBackend::Auto, 8).expect("create poller");
        handle.remove(999_999);
    }

    #[test]
    fn set_mask_on_unknown_fd_fails_not_found() {
        let mut handle = PollHandle::create(PollerBackend::Auto, 8).expect("create poller");
        let err = handle.set_mask(999_999, ReadinessMask::READ).unwrap_err();
        assert!(matches!(err, crate::error::PollError::NotFound { fd: 999_999 }));
    }
}
