// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

/// A fixed-capacity byte region. Non-tail pages in a [`super::Stream`]'s chain are
/// always full (`len == buf.capacity()`); only the head and tail pages may be
/// partially consumed/filled.
#[derive(Debug)]
pub(crate) struct Page {
    buf: Vec<u8>,
    /// Bytes currently written into this page, starting from index 0.
    len: usize,
}

impl Page {
    /// Allocates a page with at least `capacity` bytes of room. Returns `None` if the
    /// allocator can't satisfy the request - the caller treats this the same as a
    /// short `write`.
    pub(crate) fn try_new(capacity: usize) -> Option<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity).ok()?;
        buf.resize(capacity, 0);
        Some(Self { buf, len: 0 })
    }

    pub(crate) fn capacity(&self) -> usize { self.buf.len() }

    pub(crate) fn len(&self) -> usize { self.len }

    pub(crate) fn remaining_capacity(&self) -> usize { self.capacity() - self.len }

    pub(crate) fn is_full(&self) -> bool { self.len == self.capacity() }

    /// Appends as much of `src` as fits, returning the number of bytes copied.
    pub(crate) fn append(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.remaining_capacity());
        self.buf[self.len..self.len + n].copy_from_slice(&src[..n]);
        self.len += n;
        n
    }

    /// The valid byte range of this page, from `offset` (already-consumed prefix) to
    /// the write cursor.
    pub(crate) fn filled(&self, offset: usize) -> &[u8] { &self.buf[offset..self.len] }

    /// Resets the page to empty, keeping its backing allocation for reuse from the
    /// free-page LRU cache.
    pub(crate) fn reset(&mut self) { self.len = 0; }
}
