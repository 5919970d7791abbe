// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Length-prefixed message framing layered on top of [`super::Stream`].
//!
//! Wire format (all integers little-endian, fixed regardless of host):
//!
//! ```text
//! offset  size  field
//!    0     4    total_length (u32, = 16 + payload_len)
//!    4     4    msg_id       (i32)
//!    8     4    wparam       (i32)
//!   12     4    lparam       (i32)
//!   16     N    payload      (N = total_length - 16)
//! ```

use tracing::warn;

use crate::stream::Stream;

const HEADER_LEN: usize = 16;

/// The outcome of one [`pop_msg`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Fewer than 4 bytes, or fewer than `total_length` bytes, buffered yet. The
    /// stream is untouched; retry after more I/O arrives.
    Incomplete,
    /// The header decoded `total_length < 16` - not a real record. Fatal: the stream
    /// is left untouched since there's no way to know how many bytes to skip to
    /// resynchronize.
    Malformed,
    /// The header parsed and the record is fully buffered, but the caller's `buf`
    /// can't hold the payload. Non-destructive; retry with a buffer of at least this
    /// many bytes.
    NeedBuffer(usize),
    /// One full record was consumed and copied into the caller's buffer.
    Complete { msg_id: i32, w: i32, l: i32, payload_len: usize },
}

/// Appends one record to `stream`: a 16-byte header followed by `payload`.
pub fn push_msg(stream: &mut Stream, msg_id: i32, w: i32, l: i32, payload: &[u8]) {
    let total_length = (HEADER_LEN + payload.len()) as u32;
    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(&total_length.to_le_bytes());
    header[4..8].copy_from_slice(&msg_id.to_le_bytes());
    header[8..12].copy_from_slice(&w.to_le_bytes());
    header[12..16].copy_from_slice(&l.to_le_bytes());
    stream.write(&header);
    stream.write(payload);
}

/// Attempts to decode and consume one record from `stream` into `buf`. See
/// [`Decision`] for the possible outcomes; only [`Decision::Complete`] advances the
/// stream's read head.
pub fn pop_msg(stream: &mut Stream, buf: &mut [u8]) -> Decision {
    let mut header = [0u8; HEADER_LEN];
    let have = stream.peek(&mut header[..4]);
    if have < 4 {
        return Decision::Incomplete;
    }

    let total_length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if total_length < HEADER_LEN as u32 {
        warn!(total_length, "pop_msg: malformed header, total_length < 16");
        return Decision::Malformed;
    }

    let total_length = total_length as usize;
    if stream.byte_size() < total_length {
        return Decision::Incomplete;
    }

    let payload_len = total_length - HEADER_LEN;
    if buf.len() < payload_len {
        return Decision::NeedBuffer(payload_len);
    }

    // From here on the record is guaranteed complete and fits - consume it.
    let full_header_read = stream.peek(&mut header);
    debug_assert_eq!(full_header_read, HEADER_LEN);
    let msg_id = i32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let w = i32::from_le_bytes([header[8], header[9], header[10], header[11]]);
    let l = i32::from_le_bytes([header[12], header[13], header[14], header[15]]);

    stream.drop(HEADER_LEN);
    let copied = stream.read(&mut buf[..payload_len]);
    debug_assert_eq!(copied, payload_len);

    Decision::Complete { msg_id, w, l, payload_len }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_record() {
        let mut stream = Stream::create(1024, 1024);
        push_msg(&mut stream, 7, 0x11, 0x22, &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(stream.byte_size(), 20);

        let mut buf = [0u8; 4];
        let decision = pop_msg(&mut stream, &mut buf);
        assert_eq!(decision, Decision::Complete { msg_id: 7, w: 0x11, l: 0x22, payload_len: 4 });
        assert_eq!(buf, [0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(stream.byte_size(), 0);
    }

    #[test]
    fn fifteen_bytes_is_incomplete() {
        let mut stream = Stream::create(1024, 1024);
        stream.write(&[0u8; 15]);
        let mut buf = [0u8; 16];
        assert_eq!(pop_msg(&mut stream, &mut buf), Decision::Incomplete);
        assert_eq!(stream.byte_size(), 15);
    }

    #[test]
    fn total_length_of_fifteen_is_malformed_and_leaves_stream_untouched() {
        let mut stream = Stream::create(1024, 1024);
        stream.write(&15u32.to_le_bytes());
        stream.write(&[0u8; 11]);
        let mut buf = [0u8; 16];
        assert_eq!(pop_msg(&mut stream, &mut buf), Decision::Malformed);
        assert_eq!(stream.byte_size(), 26);
    }

    #[test]
    fn undersized_buffer_does_not_consume() {
        let mut stream = Stream::create(1024, 1024);
        push_msg(&mut stream, 1, 2, 3, &[9u8; 10]);
        let mut small = [0u8; 4];
        assert_eq!(pop_msg(&mut stream, &mut small), Decision::NeedBuffer(10));
        assert_eq!(stream.byte_size(), 26);

        let mut big = [0u8; 10];
        let decision = pop_msg(&mut stream, &mut big);
        assert_eq!(decision, Decision::Complete { msg_id: 1, w: 2, l: 3, payload_len: 10 });
        assert_eq!(stream.byte_size(), 0);
    }
}
