//! Datagram framing for the UDP transport.
//!
//! # Frame Format (19-byte header, big-endian)
//!
//! ```text
//! Byte/     0       |       1       |       2       |       3       |
//!   +---------------+---------------+---------------+---------------+
//!  0| Magic (0xA1A1)                | Version       | Message type  |
//!   +---------------+---------------+---------------+               +
//!  4| Message type (cont.)                          | Routing key   |
//!   +---------------+---------------+---------------+               +
//!  8| Routing key (cont.)                                           |
//!   +                                               +---------------+
//! 12|                                               | Payload length|
//!   +---------------+---------------+---------------+               +
//! 16| Payload length (cont.)                        | Payload ...   |
//!   +---------------+---------------+---------------+---------------+
//! ```
//!
//! One frame per datagram. The payload is the JSON message body.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

pub const FRAME_MAGIC: u16 = 0xA1A1;
pub const FRAME_VERSION: u8 = 1;
pub const FRAME_HEADER_SIZE: usize = 2 + 1 + 4 + 8 + 4;

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: i32,
    pub routing_key: i64,
    pub payload: Bytes,
}

/// Frame decode failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short: {0} bytes")]
    Truncated(usize),

    #[error("bad magic 0x{0:04x}")]
    BadMagic(u16),

    #[error("unsupported frame version {0}")]
    UnsupportedVersion(u8),

    #[error("payload length mismatch: header says {declared}, datagram has {actual}")]
    LengthMismatch { declared: usize, actual: usize },
}

/// Encode a frame into a datagram.
pub fn encode(frame: &Frame) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + frame.payload.len());
    buf.put_u16(FRAME_MAGIC);
    buf.put_u8(FRAME_VERSION);
    buf.put_i32(frame.message_type);
    buf.put_i64(frame.routing_key);
    buf.put_u32(frame.payload.len() as u32);
    buf.put_slice(&frame.payload);
    buf.freeze()
}

/// Decode one datagram.
pub fn decode(datagram: &[u8]) -> Result<Frame, FrameError> {
    if datagram.len() < FRAME_HEADER_SIZE {
        return Err(FrameError::Truncated(datagram.len()));
    }
    let mut buf = datagram;

    let magic = buf.get_u16();
    if magic != FRAME_MAGIC {
        return Err(FrameError::BadMagic(magic));
    }
    let version = buf.get_u8();
    if version != FRAME_VERSION {
        return Err(FrameError::UnsupportedVersion(version));
    }
    let message_type = buf.get_i32();
    let routing_key = buf.get_i64();
    let declared = buf.get_u32() as usize;
    if declared != buf.remaining() {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: buf.remaining(),
        });
    }

    Ok(Frame {
        message_type,
        routing_key,
        payload: Bytes::copy_from_slice(buf),
    })
}
