// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Error categories shared across the reactor core.
//!
//! Split by owning subsystem rather than one crate-wide enum, so a caller matching on
//! [`PollError`] never has to reason about [`StreamError`] variants that can't occur
//! on that call path. Framing outcomes aren't errors at all - see
//! [`crate::stream::framing::Decision`].

use miette::Diagnostic;
use thiserror::Error;

/// Errors surfaced by [`crate::poller::PollHandle`] operations.
#[derive(Debug, Error, Diagnostic)]
pub enum PollError {
    /// The kernel refused to allocate a poll object or a per-fd registration.
    #[error("poller out of resources")]
    #[diagnostic(code(r3bl_async_core::poller::out_of_resources))]
    OutOfResources,

    /// The value passed as a file descriptor is not valid in this process.
    #[error("bad descriptor: {fd}")]
    #[diagnostic(code(r3bl_async_core::poller::bad_descriptor))]
    BadDescriptor {
        /// The offending descriptor.
        fd: i32,
    },

    /// `set_mask`/`remove` targeted a descriptor that was never added.
    #[error("descriptor {fd} is not registered")]
    #[diagnostic(code(r3bl_async_core::poller::not_found))]
    NotFound {
        /// The unregistered descriptor.
        fd: i32,
    },

    /// `wait` was interrupted by a signal. Treated as zero ready events by callers;
    /// kept as a variant so internal retry logic has something to match on.
    #[error("wait interrupted by signal")]
    #[diagnostic(code(r3bl_async_core::poller::interrupted))]
    Interrupted,

    /// Any other kernel failure.
    #[error("poller io error")]
    #[diagnostic(code(r3bl_async_core::poller::io_error))]
    Io(#[source] std::io::Error),
}

/// Named cause for [`crate::stream::Stream::write`]'s short-count return path. Never
/// returned as an `Err` - `write` cannot fail per `spec.md` §4.3 - but gives the
/// short-write warning something concrete to attach.
#[derive(Debug, Error, Diagnostic, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    /// The page allocator could not satisfy a page request.
    #[error("out of memory: page allocator exhausted")]
    #[diagnostic(code(r3bl_async_core::stream::out_of_memory))]
    OutOfMemory,
}

/// A [`crate::scheduler::TimerHandle`] referred to an entry that has since been
/// cancelled, fired to completion, and had its arena slot recycled for a new entry.
/// This is the generation-counter check from `spec.md` §9's Design Notes.
#[derive(Debug, Error, Diagnostic, Clone, Copy, PartialEq, Eq)]
#[error("stale timer handle (index {index}, expected generation {expected}, got {got})")]
#[diagnostic(code(r3bl_async_core::scheduler::stale_handle))]
pub struct StaleHandle {
    /// Arena slot index the handle pointed at.
    pub index: u32,
    /// Generation the arena slot is currently on.
    pub expected: u32,
    /// Generation the caller's handle was stamped with.
    pub got: u32,
}

/// Errors surfaced by [`crate::reactor::ReactorBuilder::build`].
#[derive(Debug, Error, Diagnostic)]
pub enum BuildError {
    /// The poller backend failed to initialize.
    #[error("failed to create poller")]
    #[diagnostic(code(r3bl_async_core::reactor::poller_creation))]
    Poller(#[source] PollError),
}
