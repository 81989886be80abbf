//! # Guild Wire Protocol
//!
//! The binary protocol spoken between guild nodes and the relay:
//! big-endian primitive encoding, `u32` length-prefixed frames, and the
//! typed subchannel catalogue in [`BusMessage`].
//!
//! Strings are a `u16` byte length followed by UTF-8. Integers and
//! doubles are fixed-width big-endian. A payload is the subchannel tag
//! (as a string) followed by that message's fields in a fixed order, so
//! both sides stay in lockstep without any schema negotiation.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{FieldReader, FieldWriter};
pub use error::WireError;
pub use frame::{read_frame, write_frame, MAX_FRAME_BYTES};
pub use message::{tags, BusMessage, NO_GUILD};
