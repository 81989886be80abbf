//! Wire protocol error types.

use thiserror::Error;

/// Errors raised while encoding, decoding or framing bus messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// The payload ended before all declared fields could be read.
    #[error("payload truncated: needed {needed} more byte(s)")]
    Truncated { needed: usize },

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 in string field: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A string field exceeds the u16 length prefix the contract allows.
    #[error("string field of {0} bytes exceeds the wire limit")]
    StringTooLong(usize),

    /// A UUID field did not parse.
    #[error("invalid UUID field: {0}")]
    InvalidUuid(#[from] uuid::Error),

    /// The subchannel tag is not part of the protocol catalogue.
    #[error("unknown subchannel tag: {0:?}")]
    UnknownSubchannel(String),

    /// Bytes were left over after the last declared field.
    #[error("{0} trailing byte(s) after the last field")]
    TrailingBytes(usize),

    /// A direction field carried a spelling outside deposit/withdraw.
    #[error("unknown ledger direction: {0:?}")]
    UnknownDirection(String),

    /// A frame declared a length above the sanity cap.
    #[error("frame of {0} bytes exceeds the {max} byte cap", max = crate::frame::MAX_FRAME_BYTES)]
    FrameTooLarge(usize),

    /// The peer closed the connection between frames.
    #[error("connection closed")]
    Eof,

    /// Underlying socket failure while reading or writing a frame.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}
